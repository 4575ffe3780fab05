//! End-to-end scenarios against a real relay bound on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};

use chat_relay::config::ServerConfig;
use chat_relay::logger::Logger;
use chat_relay::server::{ServerContext, serve};

type ClientLines = Lines<BufReader<OwnedReadHalf>>;

async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<ServerContext>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ctx = Arc::new(ServerContext::new(config, Logger));
    let handle = tokio::spawn(serve(listener, ctx.clone()));
    (addr, ctx, handle)
}

struct Client {
    lines: ClientLines,
    writer: OwnedWriteHalf,
    /// The address the server knows this client by, parsed from the welcome.
    addr: String,
}

impl Client {
    /// Connects and consumes the welcome line.
    async fn join(server: SocketAddr) -> Client {
        let stream = TcpStream::connect(server).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let welcome = next_line(&mut lines).await.expect("welcome expected");
        assert!(welcome.starts_with("Welcome to the chat!"), "got: {}", welcome);
        let addr = welcome
            .rsplit(' ')
            .next()
            .expect("welcome names the peer address")
            .to_string();
        Client { lines, writer, addr }
    }

    async fn send(&mut self, text: &str) {
        self.writer
            .write_all(format!("{}\n", text).as_bytes())
            .await
            .unwrap();
    }

    /// Reads lines until one contains `needle`. Panics after a few lines of
    /// unrelated traffic; scenarios here never produce more than that.
    async fn read_until(&mut self, needle: &str) -> String {
        for _ in 0..20 {
            let line = next_line(&mut self.lines)
                .await
                .unwrap_or_else(|| panic!("stream ended while waiting for {:?}", needle));
            if line.contains(needle) {
                return line;
            }
        }
        panic!("never saw {:?}", needle);
    }

    /// Asserts that nothing arrives for a little while.
    async fn expect_silence(&mut self) {
        let quiet = timeout(Duration::from_millis(200), self.lines.next_line()).await;
        assert!(quiet.is_err(), "unexpected traffic: {:?}", quiet);
    }
}

async fn next_line(lines: &mut ClientLines) -> Option<String> {
    timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for a line")
        .unwrap()
}

#[tokio::test]
async fn relays_to_everyone_but_the_sender() {
    let (server, ctx, handle) = start_server(ServerConfig::default()).await;

    let mut a = Client::join(server).await;
    let mut b = Client::join(server).await;
    a.read_until(&b.addr).await; // join announcement for b
    let mut c = Client::join(server).await;
    a.read_until(&c.addr).await;
    b.read_until(&c.addr).await;

    a.send("hello").await;
    let at_b = b.read_until("hello").await;
    let at_c = c.read_until("hello").await;
    assert_eq!(at_b, format!("[{}]: hello", a.addr));
    assert_eq!(at_c, format!("[{}]: hello", a.addr));

    // The sender gets neither its own line nor a duplicate.
    a.expect_silence().await;

    assert_eq!(ctx.registry.count(), 3);
    ctx.shutdown.trigger();
    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn empty_lines_and_truncation_do_not_break_the_relay() {
    let (server, ctx, handle) = start_server(ServerConfig::default()).await;

    let mut a = Client::join(server).await;
    let mut b = Client::join(server).await;
    a.read_until(&b.addr).await;

    // An empty line is ignored entirely.
    a.send("").await;
    b.expect_silence().await;

    // An oversized line arrives truncated, not split into two messages.
    let oversized = "y".repeat(4000);
    a.send(&oversized).await;
    let relayed = b.read_until("yyy").await;
    assert!(relayed.len() < oversized.len());
    assert!(relayed.starts_with(&format!("[{}]: ", a.addr)));
    b.expect_silence().await;

    ctx.shutdown.trigger();
    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn extra_client_is_rejected_with_the_capacity_notice() {
    let mut config = ServerConfig::default();
    config.max_clients = 2;
    let (server, ctx, handle) = start_server(config).await;

    let mut a = Client::join(server).await;
    let mut b = Client::join(server).await;
    a.read_until(&b.addr).await;

    // The third connection is accepted at the transport level, then turned
    // away with one notice line and a close.
    let stream = TcpStream::connect(server).await.unwrap();
    let (reader, _writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let notice = next_line(&mut lines).await.expect("rejection notice expected");
    assert_eq!(notice, "Server full. Try again later.");
    let eof = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("rejected stream must close")
        .unwrap();
    assert!(eof.is_none());

    // The two admitted clients are untouched.
    assert_eq!(ctx.registry.count(), 2);
    a.send("still alive").await;
    b.read_until("still alive").await;

    ctx.shutdown.trigger();
    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn quit_keyword_ends_the_session_and_announces_the_leave() {
    let (server, ctx, handle) = start_server(ServerConfig::default()).await;

    let mut a = Client::join(server).await;
    let mut b = Client::join(server).await;
    a.read_until(&b.addr).await;

    a.send("sair").await;

    let leave = b.read_until("User left").await;
    assert!(leave.contains(&a.addr));

    // The quitting client's stream is closed by the server.
    let eof = timeout(Duration::from_secs(5), a.lines.next_line())
        .await
        .expect("quitter's stream must close")
        .unwrap();
    assert!(eof.is_none());

    // Its slot frees up once the session finishes tearing down.
    for _ in 0..50 {
        if ctx.registry.count() == 1 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(ctx.registry.count(), 1);

    ctx.shutdown.trigger();
    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_notifies_clients_drains_and_stops_admitting() {
    let (server, ctx, handle) = start_server(ServerConfig::default()).await;

    let mut a = Client::join(server).await;
    let mut b = Client::join(server).await;
    a.read_until(&b.addr).await;

    ctx.shutdown.trigger();

    a.read_until("Warning: Server is shutting down.").await;
    b.read_until("Warning: Server is shutting down.").await;

    // serve() returns only after sessions are joined and the queue writer
    // has drained past the final record.
    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    assert_eq!(ctx.registry.count(), 0);
    assert!(ctx.queue.is_empty());

    // Both streams end, and nobody new gets in.
    let eof = timeout(Duration::from_secs(5), a.lines.next_line())
        .await
        .expect("stream must close on shutdown")
        .unwrap();
    assert!(eof.is_none());
    assert!(TcpStream::connect(server).await.is_err());
}
