use chain_cursor_connector::{sources::MemorySource, AdvancePolicy};
use chain_cursor_gateway::{
    config::GatewayConfig,
    grpc::{
        proto::{chain_cursor_client::ChainCursorClient, Cursor as CursorMessage, StartCursor},
        start, GatewayHandle,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tonic::{transport::Channel, Code, Streaming};

const PROMPTLY: Duration = Duration::from_secs(5);

/// Holds a running gateway fed by an in-memory chain, and a connected client.
struct TestEnvironment {
    source: MemorySource,
    handle: GatewayHandle,
    client: ChainCursorClient<Channel>,
}

/// A helper function to set up a complete test environment.
///
/// This function will:
/// 1. Find a free TCP port.
/// 2. Start the gateway on that port over a `MemorySource` at `latest`.
/// 3. Wait for the notifier subscription and connect a gRPC client.
async fn setup_test_environment(latest: u64, policy: AdvancePolicy) -> TestEnvironment {
    // Find a free port to avoid conflicts during parallel test runs.
    let port = portpicker::pick_unused_port().expect("No free ports");

    let mut config = GatewayConfig::default();
    config.gateway.grpc.port = port;
    config.gateway.streaming.output_stream_capacity = 16;
    config.connector.sequencer.advance_policy = policy;

    let source = MemorySource::new(latest);
    let handle = start(&config, Arc::new(source.clone()), CancellationToken::new())
        .await
        .expect("Failed to start gRPC server");

    wait_until(|| source.subscribers() == 1).await;

    let client = timeout(PROMPTLY, async {
        loop {
            match ChainCursorClient::connect(format!("http://127.0.0.1:{port}")).await {
                Ok(client) => break client,
                Err(_) => sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await
    .expect("Failed to connect to gRPC server");

    TestEnvironment {
        source,
        handle,
        client,
    }
}

impl TestEnvironment {
    async fn open(&mut self, start: Option<&str>) -> Streaming<CursorMessage> {
        self.client
            .cursors(StartCursor {
                value: start.map(str::to_string),
            })
            .await
            .expect("Cursors call failed")
            .into_inner()
    }

    /// Waits until `n` connections are blocked on the notifier.
    async fn wait_for_waiters(&self, n: usize) {
        let notifier = self.handle.notifier().clone();
        wait_until(move || notifier.waiters() == n).await;
    }
}

async fn next_value(stream: &mut Streaming<CursorMessage>) -> String {
    timeout(PROMPTLY, stream.message())
        .await
        .expect("no cursor delivered in time")
        .expect("stream failed")
        .expect("stream ended")
        .value
}

async fn next_values(
    stream: &mut Streaming<CursorMessage>,
    n: usize,
) -> Vec<String> {
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        values.push(next_value(stream).await);
    }
    values
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
async fn fresh_stream_starts_at_latest_and_back_fills_jumps() {
    let mut env = setup_test_environment(10, AdvancePolicy::Increment).await;
    let mut stream = env.open(None).await;

    assert_eq!(next_value(&mut stream).await, "10");
    env.wait_for_waiters(1).await;

    env.source.advance_to(13u64);
    assert_eq!(next_values(&mut stream, 3).await, ["11", "12", "13"]);

    env.handle.stop().await.unwrap();
}

#[tokio::test]
async fn resumed_stream_replays_from_the_start_cursor() {
    let mut env = setup_test_environment(10, AdvancePolicy::Increment).await;
    let mut stream = env.open(Some("7")).await;

    assert_eq!(next_values(&mut stream, 4).await, ["7", "8", "9", "10"]);

    // Caught up: the stream blocks until the chain advances.
    env.wait_for_waiters(1).await;
    assert!(timeout(Duration::from_millis(200), stream.message())
        .await
        .is_err());

    env.source.advance();
    assert_eq!(next_value(&mut stream).await, "11");

    env.handle.stop().await.unwrap();
}

#[tokio::test]
async fn requery_policy_also_delivers_every_cursor() {
    let mut env = setup_test_environment(10, AdvancePolicy::Requery).await;
    let mut stream = env.open(None).await;

    assert_eq!(next_value(&mut stream).await, "10");
    env.wait_for_waiters(1).await;

    env.source.advance_to(14u64);
    assert_eq!(next_values(&mut stream, 4).await, ["11", "12", "13", "14"]);

    env.handle.stop().await.unwrap();
}

#[tokio::test]
async fn cursors_beyond_u64_travel_intact() {
    let mut env = setup_test_environment(0, AdvancePolicy::Increment).await;
    env.source.advance_to(u64::MAX);
    let mut stream = env.open(Some("18446744073709551614")).await;

    assert_eq!(
        next_values(&mut stream, 2).await,
        ["18446744073709551614", "18446744073709551615"]
    );
    env.wait_for_waiters(1).await;

    env.source.advance();
    assert_eq!(next_value(&mut stream).await, "18446744073709551616");

    env.handle.stop().await.unwrap();
}

#[tokio::test]
async fn invalid_start_cursor_is_rejected_without_affecting_others() {
    let mut env = setup_test_environment(5, AdvancePolicy::Increment).await;
    let mut healthy = env.open(None).await;
    assert_eq!(next_value(&mut healthy).await, "5");

    let status = env
        .client
        .cursors(StartCursor {
            value: Some("five".to_string()),
        })
        .await
        .expect_err("an unparsable start cursor must be rejected");
    assert_eq!(status.code(), Code::InvalidArgument);

    let oversized = env
        .client
        .cursors(StartCursor {
            value: Some("9".repeat(1024 * 1024)),
        })
        .await
        .expect_err("an oversized start cursor must be rejected");
    assert_eq!(oversized.code(), Code::InvalidArgument);

    env.wait_for_waiters(1).await;
    env.source.advance();
    assert_eq!(next_value(&mut healthy).await, "6");

    env.handle.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let mut env = setup_test_environment(3, AdvancePolicy::Increment).await;
    let mut stream = env.open(None).await;
    assert_eq!(next_value(&mut stream).await, "3");
    env.wait_for_waiters(1).await;

    env.handle.stop().await.unwrap();

    // Either a clean end of stream or a terminal status, never a hang.
    if let Ok(Some(cursor)) = timeout(PROMPTLY, stream.message()).await.unwrap() {
        panic!("unexpected cursor {}", cursor.value);
    }
}

#[tokio::test]
async fn source_failure_stops_the_gateway() {
    let mut env = setup_test_environment(3, AdvancePolicy::Increment).await;
    let mut stream = env.open(None).await;
    assert_eq!(next_value(&mut stream).await, "3");
    env.wait_for_waiters(1).await;

    env.source.fail("node went away");

    timeout(PROMPTLY, env.handle.stopping()).await.unwrap();
    let result = timeout(PROMPTLY, stream.message()).await.unwrap();
    match result {
        Ok(Some(cursor)) => panic!("no cursor may follow a source failure, got {}", cursor.value),
        // Unlike a graceful shutdown, the failure is not reported as Cancelled.
        Err(status) => {
            assert_eq!(status.code(), Code::Internal, "got {status:?}");
            assert!(status.message().contains("node went away"));
        }
        Ok(None) => {}
    }

    let err = env.handle.stop().await.unwrap_err();
    assert!(format!("{err:#}").contains("node went away"), "got: {err:#}");
}

#[tokio::test]
async fn disconnecting_client_releases_its_waiter() {
    let mut env = setup_test_environment(1, AdvancePolicy::Increment).await;
    let mut stream = env.open(None).await;
    assert_eq!(next_value(&mut stream).await, "1");
    env.wait_for_waiters(1).await;

    drop(stream);
    env.wait_for_waiters(0).await;

    env.handle.stop().await.unwrap();
}
