//! End-to-end tests over real loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use url::Url;

use lcode_hub::http::hub_version;
use lcode_hub::lifecycle::probe_running;
use lcode_hub::net::HubConnection;
use lcode_hub::session::SessionServer;

mod common;

/// Reads one line from every session connection and reports it with the
/// connection's timed-out flag.
struct LineCapture {
    tx: mpsc::UnboundedSender<(bool, String)>,
}

impl SessionServer for LineCapture {
    fn serve(&self, conn: HubConnection) -> BoxFuture<'static, ()> {
        let tx = self.tx.clone();
        Box::pin(async move {
            let timed_out = conn.timed_out();
            let mut line = String::new();
            let mut reader = BufReader::new(conn);
            if reader.read_line(&mut line).await.is_ok() {
                let _ = tx.send((timed_out, line));
            }
        })
    }
}

fn capture() -> (Arc<dyn SessionServer>, mpsc::UnboundedReceiver<(bool, String)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(LineCapture { tx }), rx)
}

#[tokio::test]
async fn test_version_endpoint_and_probe() {
    let hub = common::start_hub(None).await;

    let body = reqwest::get(format!("http://{}/proc/lcode-version", hub.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, hub_version());

    probe_running(&hub.addr.to_string()).await.unwrap();
}

#[tokio::test]
async fn test_http_dispatch_statuses() {
    let hub = common::start_hub(None).await;
    hub.hub
        .directory()
        .open("devbox", "/home/me", Arc::new(common::IdleShell))
        .unwrap();

    let ok = common::raw_http(hub.addr, "PROPFIND", "devbox.lo.localhost", "/home/me/src").await;
    assert!(ok.starts_with("HTTP/1.1 207"), "{ok}");
    assert!(ok.ends_with("/home/me"), "{ok}");

    let missing = common::raw_http(hub.addr, "GET", "devbox.lo.localhost", "/etc/passwd").await;
    assert!(missing.starts_with("HTTP/1.1 403"), "{missing}");
    assert!(missing.ends_with("no webdav server for this host devbox"), "{missing}");

    let bad_host = common::raw_http(hub.addr, "GET", "127.0.0.1", "/home/me").await;
    assert!(bad_host.starts_with("HTTP/1.1 500"), "{bad_host}");
    assert!(bad_host.contains("match host failed"), "{bad_host}");
}

#[tokio::test]
async fn test_report_handshake_end_to_end() {
    let hub = common::start_hub(None).await;
    let handler = hub.hub.registry().new_handler();

    let stream = TcpStream::connect(hub.addr).await.unwrap();
    let mut reader = BufReader::new(stream);
    let opening = format!(
        ">2: {}\n>2: webdav://devbox.lo.localhost:{}/home/me/\n",
        handler.header(),
        hub.addr.port()
    );
    reader.get_mut().write_all(opening.as_bytes()).await.unwrap();

    let mut descriptor = tokio::time::timeout(Duration::from_secs(2), handler.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(descriptor.host, "devbox");
    assert_eq!(descriptor.workdir, "/home/me/");
    assert_eq!(descriptor.peer_addr, Some(reader.get_ref().local_addr().unwrap()));

    let mut echoed = String::new();
    reader.read_line(&mut echoed).await.unwrap();
    assert_eq!(echoed, format!("webdav://devbox.lo.localhost:{}/home/me/\n", hub.addr.port()));

    drop(reader);
    tokio::time::timeout(Duration::from_secs(2), descriptor.closed())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_default_links_route_back_to_their_session() {
    let hub = common::start_hub(None).await;
    let supervisor = hub.hub.supervisor();

    let follower = Arc::new(common::ScriptShell::new(
        "--leader=false",
        "DevBox",
        "/home/me/my proj 中文",
    ));
    let _follower_guard = supervisor.open(follower.clone()).await.unwrap();
    let welcome = follower.echoed()[0].clone();

    // The printed link reaches the follower's session over HTTP.
    let url = Url::parse(welcome.strip_prefix(">2: ").unwrap()).unwrap();
    let host = format!("{}:{}", url.host_str().unwrap(), url.port().unwrap());
    let response = common::raw_http(hub.addr, "PROPFIND", &host, url.path()).await;
    assert!(response.starts_with("HTTP/1.1 207"), "{response}");
    assert!(response.ends_with("/home/me/my proj 中文"), "{response}");

    // The same link, reported by a leader's sub-shell, lets the leader find
    // and close the follower once the report channel goes away.
    let leader = Arc::new(common::ScriptShell::new("", "DevBox", "/home/me"));
    let _leader_guard = supervisor.open(leader.clone()).await.unwrap();
    let command = leader.lines()[0].clone();
    let hex = command
        .split(">2: ")
        .nth(1)
        .unwrap()
        .split('\'')
        .next()
        .unwrap()
        .to_string();

    let stream = TcpStream::connect(hub.addr).await.unwrap();
    let mut reader = BufReader::new(stream);
    let report = format!(">2: {hex}\n{welcome}\n");
    reader.get_mut().write_all(report.as_bytes()).await.unwrap();

    let mut echoed = String::new();
    reader.read_line(&mut echoed).await.unwrap();
    assert_eq!(echoed, format!("{}\n", welcome.strip_prefix(">2: ").unwrap()));
    common::eventually(|| hub.hub.registry().pending_count() == 0).await;
    assert!(!follower.is_closed());

    drop(reader);
    common::eventually(|| follower.is_closed() && leader.is_closed()).await;
}

#[tokio::test]
async fn test_session_connections_keep_their_bytes() {
    let (server, mut lines) = capture();
    let hub = common::start_hub(Some(server)).await;

    let mut tagged = TcpStream::connect(hub.addr).await.unwrap();
    tagged.write_all(b"0001000000000000\n").await.unwrap();
    let line = tokio::time::timeout(Duration::from_secs(2), lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, (false, "0001000000000000\n".to_string()));

    // A silent client is handed to the session server after the grace
    // period, flagged as timed out, and nothing is made up on its behalf.
    let mut silent = TcpStream::connect(hub.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    silent.write_all(b"late\n").await.unwrap();
    let line = tokio::time::timeout(Duration::from_secs(2), lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, (true, "late\n".to_string()));
}

#[tokio::test]
async fn test_silent_client_does_not_block_http() {
    let hub = common::start_hub(None).await;
    let _silent = TcpStream::connect(hub.addr).await.unwrap();

    let response = tokio::time::timeout(
        Duration::from_millis(90),
        common::raw_http(hub.addr, "GET", "127.0.0.1", "/proc/lcode-version"),
    )
    .await
    .unwrap();
    assert!(response.ends_with(&hub_version()), "{response}");
}

#[tokio::test]
async fn test_shutdown_stops_serving() {
    let hub = common::start_hub(None).await;
    // Let the serving task subscribe first.
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(2), hub.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
