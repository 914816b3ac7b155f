use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    chain_cursor_consumer::run().await?;
    Ok(())
}
