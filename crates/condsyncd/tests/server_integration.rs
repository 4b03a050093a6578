//! Integration tests for the TCP sync server.
//!
//! These tests run a real SyncServer on an ephemeral loopback port and
//! drive it over raw sockets (hand-built frames, line-based reads) and
//! through condsync-client.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free behavior of
//! production code is checked through assertions.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use condsync_client::{ClientConfig, SyncClient};
use condsync_core::{WaitOutcome, WaitTimeout};
use condsyncd::config::ServerConfig;
use condsyncd::registry::SolutionRegistry;
use condsyncd::server::SyncServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for any single response in these tests
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for a waiter to block before it is released
const WAITER_SETTLE: Duration = Duration::from_millis(100);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    registry: Arc<SolutionRegistry>,
    cancel_token: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server in the background.
    async fn spawn() -> Self {
        let config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            bind_retry_delay: Duration::from_millis(50),
        };
        let registry = Arc::new(SolutionRegistry::new());
        let cancel_token = CancellationToken::new();

        let server = SyncServer::bind(&config, Arc::clone(&registry), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        tokio::spawn(server.run());

        TestServer {
            addr,
            registry,
            cancel_token,
        }
    }

    /// Creates a raw client connection to the server.
    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Creates a client library connection to the server.
    async fn client(&self) -> SyncClient {
        SyncClient::connect(&ClientConfig::for_address(self.addr.to_string()))
            .await
            .expect("client connect")
    }

    /// Shuts down the server gracefully.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Builds a frame: one length character followed by the body.
fn frame(body: &str) -> String {
    let len = u32::try_from(body.chars().count()).unwrap();
    let prefix = char::from_u32(len).expect("length in range");
    format!("{prefix}{body}")
}

/// Raw connection speaking the wire format directly.
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends one framed request body.
    async fn send(&mut self, body: &str) {
        self.send_raw(frame(body).as_bytes()).await;
    }

    /// Sends bytes as-is.
    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receives one response line without its terminator, or `None` on EOF.
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = timeout(RESPONSE_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("response within timeout")
            .unwrap();
        if read == 0 {
            return None;
        }
        Some(line.trim_end_matches('\n').to_string())
    }

    /// Sends a request and returns its response line.
    async fn call(&mut self, body: &str) -> String {
        self.send(body).await;
        self.recv().await.expect("response line")
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_server_accepts_connection() {
    let server = TestServer::spawn().await;

    let _client = server.connect().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_quit_closes_without_response() {
    let server = TestServer::spawn().await;

    for command in ["quit", "q"] {
        let mut client = server.connect().await;
        client.send(command).await;
        assert_eq!(client.recv().await, None, "{command} should close silently");
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_stops_accepting_after_shutdown() {
    let server = TestServer::spawn().await;
    let addr = server.addr;

    server.shutdown().await;

    assert!(TcpStream::connect(addr).await.is_err());
}

// ============================================================================
// Operation Tests
// ============================================================================

#[tokio::test]
async fn test_set_then_get() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("2 A cond 5").await, "Set: cond = 5");
    assert_eq!(client.call("6 A cond").await, "Get: 5");

    server.shutdown().await;
}

#[tokio::test]
async fn test_init_reports_unset_then_current() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("1 A cond").await, "Init: cond = -1");
    client.call("2 A cond 3").await;
    assert_eq!(client.call("1 A cond").await, "Init: cond = 3");

    server.shutdown().await;
}

#[tokio::test]
async fn test_state_is_shared_between_connections() {
    let server = TestServer::spawn().await;
    let mut writer = server.connect().await;
    let mut reader = server.connect().await;

    writer.call("2 A cond 42").await;
    assert_eq!(reader.call("6 A cond").await, "Get: 42");

    server.shutdown().await;
}

#[tokio::test]
async fn test_solutions_are_isolated() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.call("2 A cond 1").await;
    assert_eq!(client.call("6 B cond").await, "Get: -1");
    assert_eq!(server.registry.len().await, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_wait_times_out() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let started = Instant::now();
    assert_eq!(client.call("3 A cond 9 2000").await, "Waited: 0 :: cond = 9");
    assert!(started.elapsed() >= Duration::from_millis(1900));

    server.shutdown().await;
}

#[tokio::test]
async fn test_wait_already_satisfied_returns_immediately() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.call("2 A cond 9").await;
    assert_eq!(client.call("3 A cond 9 0").await, "Waited: 1 :: cond = 9");

    server.shutdown().await;
}

#[tokio::test]
async fn test_wait_released_by_set_from_other_connection() {
    let server = TestServer::spawn().await;
    let mut waiter = server.connect().await;
    let mut setter = server.connect().await;

    waiter.send("3 A go 1 0").await;
    sleep(WAITER_SETTLE).await;

    // Other values do not release the waiter.
    assert_eq!(setter.call("2 A go 7").await, "Set: go = 7");
    assert_eq!(setter.call("2 A go 1").await, "Set: go = 1");

    assert_eq!(waiter.recv().await.unwrap(), "Waited: 1 :: go = 1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_releases_waiters() {
    let server = TestServer::spawn().await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;
    let mut deleter = server.connect().await;

    first.send("3 A cond 9 10000").await;
    second.send("3 A cond 9 0").await;
    sleep(WAITER_SETTLE).await;

    assert_eq!(deleter.call("5 A cond").await, "Deleted: cond");

    assert_eq!(first.recv().await.unwrap(), "Waited: -2 :: cond = 9");
    assert_eq!(second.recv().await.unwrap(), "Waited: -2 :: cond = 9");

    // A later reference starts from scratch.
    assert_eq!(deleter.call("6 A cond").await, "Get: -1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_reset_clears_solution_and_releases_waiters() {
    let server = TestServer::spawn().await;
    let mut waiter = server.connect().await;
    let mut client = server.connect().await;

    client.call("2 A one 1").await;
    client.call("2 A two 2").await;
    waiter.send("3 A two 5 0").await;
    sleep(WAITER_SETTLE).await;

    assert_eq!(client.call("4 A").await, "Reset: A");
    assert_eq!(waiter.recv().await.unwrap(), "Waited: -2 :: two = 5");

    assert_eq!(client.call("6 A one").await, "Get: -1");
    assert_eq!(client.call("6 A two").await, "Get: -1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_missing_condition_still_acknowledged() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("5 A ghost").await, "Deleted: ghost");

    server.shutdown().await;
}

// ============================================================================
// Framing Tests
// ============================================================================

#[tokio::test]
async fn test_length_counts_characters_not_bytes() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("2 A café 3").await, "Set: café = 3");
    assert_eq!(client.call("6 A café").await, "Get: 3");

    server.shutdown().await;
}

#[tokio::test]
async fn test_pipelined_requests_answered_in_order() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let batch = [frame("2 A x 1"), frame("2 A y 2"), frame("6 A x")].concat();
    client.send_raw(batch.as_bytes()).await;

    assert_eq!(client.recv().await.unwrap(), "Set: x = 1");
    assert_eq!(client.recv().await.unwrap(), "Set: y = 2");
    assert_eq!(client.recv().await.unwrap(), "Get: 1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let request = frame("2 A cond 8");
    let (head, tail) = request.as_bytes().split_at(4);
    client.send_raw(head).await;
    sleep(Duration::from_millis(20)).await;
    client.send_raw(tail).await;

    assert_eq!(client.recv().await.unwrap(), "Set: cond = 8");

    server.shutdown().await;
}

// ============================================================================
// Client Library Tests
// ============================================================================

#[tokio::test]
async fn test_client_library_round_trip() {
    let server = TestServer::spawn().await;
    let mut client = server.client().await;

    assert_eq!(client.init("A", "cond").await.unwrap(), -1);
    assert_eq!(client.set("A", "cond", 4).await.unwrap(), 4);
    assert_eq!(client.get("A", "cond").await.unwrap(), 4);
    assert_eq!(
        client
            .wait("A", "cond", 4, WaitTimeout::from_millis(100))
            .await
            .unwrap(),
        WaitOutcome::Matched
    );
    assert_eq!(
        client
            .wait("A", "cond", 5, WaitTimeout::from_millis(100))
            .await
            .unwrap(),
        WaitOutcome::TimedOut
    );
    client.delete("A", "cond").await.unwrap();
    client.reset("A").await.unwrap();
    client.quit().await.unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_waiter_released_by_other_client() {
    let server = TestServer::spawn().await;
    let mut waiter = server.client().await;
    let mut setter = server.client().await;

    let waiting = tokio::spawn(async move {
        waiter
            .wait("A", "ready", 1, WaitTimeout::Unbounded)
            .await
            .unwrap()
    });
    sleep(WAITER_SETTLE).await;

    setter.set("A", "ready", 1).await.unwrap();

    let outcome = timeout(RESPONSE_TIMEOUT, waiting).await.unwrap().unwrap();
    assert_eq!(outcome, WaitOutcome::Matched);

    server.shutdown().await;
}
