use chain_cursor_connector::{sources::MemorySource, Cursor};
use chain_cursor_consumer::{
    consumer::Consumer,
    proto::chain_cursor_client::ChainCursorClient,
    storage::{CursorStore, SledStore},
};
use chain_cursor_gateway::{
    config::GatewayConfig,
    grpc::{start, GatewayHandle},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

const PROMPTLY: Duration = Duration::from_secs(5);

struct Gateway {
    source: MemorySource,
    handle: GatewayHandle,
    endpoint: String,
}

async fn start_gateway(latest: u64) -> Gateway {
    let port = portpicker::pick_unused_port().expect("No free ports");
    let mut config = GatewayConfig::default();
    config.gateway.grpc.port = port;

    let source = MemorySource::new(latest);
    let handle = start(&config, Arc::new(source.clone()), CancellationToken::new())
        .await
        .expect("Failed to start gRPC server");
    wait_until(|| source.subscribers() == 1).await;

    let endpoint = format!("http://127.0.0.1:{port}");
    timeout(PROMPTLY, async {
        while ChainCursorClient::connect(endpoint.clone()).await.is_err() {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("gateway did not come up");

    Gateway {
        source,
        handle,
        endpoint,
    }
}

impl Gateway {
    async fn wait_for_waiters(&self, n: usize) {
        let notifier = self.handle.notifier().clone();
        wait_until(move || notifier.waiters() == n).await;
    }
}

fn spawn_consumer(
    endpoint: &str,
    store: Arc<dyn CursorStore>,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<u64>> {
    let consumer = Consumer::new(endpoint, store);
    tokio::spawn(async move { consumer.run(cancel).await })
}

async fn wait_for_cursor(store: &dyn CursorStore, expected: u64) {
    let expected = Cursor::from(expected);
    timeout(PROMPTLY, async {
        while store.last_cursor().await.unwrap().as_ref() != Some(&expected) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("store never reached {expected}"));
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(PROMPTLY, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn restarted_consumer_resumes_after_its_last_cursor() {
    let gateway = start_gateway(5).await;
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CursorStore> =
        Arc::new(SledStore::open(dir.path().to_str().unwrap(), "indexer").unwrap());

    // First run: starts at the latest cursor and follows a jump.
    let cancel = CancellationToken::new();
    let first = spawn_consumer(&gateway.endpoint, store.clone(), cancel.clone());
    wait_for_cursor(store.as_ref(), 5).await;
    gateway.wait_for_waiters(1).await;
    gateway.source.advance_to(8u64);
    wait_for_cursor(store.as_ref(), 8).await;

    cancel.cancel();
    let committed = timeout(PROMPTLY, first).await.unwrap().unwrap().unwrap();
    assert_eq!(committed, 4);
    gateway.wait_for_waiters(0).await;

    // The chain moves on while nobody is listening.
    gateway.source.advance_to(11u64);

    // Second run: picks up at 9, not at the latest value.
    let cancel = CancellationToken::new();
    let second = spawn_consumer(&gateway.endpoint, store.clone(), cancel.clone());
    wait_for_cursor(store.as_ref(), 11).await;
    cancel.cancel();
    let committed = timeout(PROMPTLY, second).await.unwrap().unwrap().unwrap();
    assert_eq!(committed, 3);

    let logged: Vec<String> = store
        .log()
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.cursor.to_string())
        .collect();
    assert_eq!(logged, ["5", "6", "7", "8", "9", "10", "11"]);

    gateway.handle.stop().await.unwrap();
}

#[tokio::test]
async fn gateway_shutdown_ends_the_consumer_cleanly() {
    let gateway = start_gateway(20).await;
    let store: Arc<dyn CursorStore> =
        Arc::new(chain_cursor_consumer::storage::MemoryStore::new());

    let consumer = spawn_consumer(&gateway.endpoint, store.clone(), CancellationToken::new());
    wait_for_cursor(store.as_ref(), 20).await;
    gateway.wait_for_waiters(1).await;

    gateway.handle.stop().await.unwrap();

    let committed = timeout(PROMPTLY, consumer).await.unwrap().unwrap();
    assert_eq!(committed.unwrap(), 1);
}

#[tokio::test]
async fn unreachable_gateway_is_an_error() {
    let port = portpicker::pick_unused_port().expect("No free ports");
    let store: Arc<dyn CursorStore> =
        Arc::new(chain_cursor_consumer::storage::MemoryStore::new());
    let consumer = Consumer::new(format!("http://127.0.0.1:{port}"), store);

    let result = timeout(PROMPTLY, consumer.run(CancellationToken::new()))
        .await
        .unwrap();
    assert!(result.is_err());
}
