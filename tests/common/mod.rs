//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use lcode_hub::config::HubConfig;
use lcode_hub::dav::{DavHandlerFactory, DavService};
use lcode_hub::net::{Classifier, Listener};
use lcode_hub::session::{RemoteShell, SessionServer};
use lcode_hub::{Hub, HubError, Shutdown};

/// A hub serving on an ephemeral loopback port.
pub struct TestHub {
    pub addr: SocketAddr,
    pub hub: Arc<Hub>,
    pub shutdown: Arc<Shutdown>,
    pub handle: JoinHandle<Result<(), HubError>>,
}

/// Start a hub with a 100ms grace period.
pub async fn start_hub(session_server: Option<Arc<dyn SessionServer>>) -> TestHub {
    let mut config = HubConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.classifier.grace_period_ms = 100;

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut hub = Hub::new(&config, addr.port(), workdir_factory()).unwrap();
    if let Some(server) = session_server {
        hub = hub.with_session_server(server);
    }
    let hub = Arc::new(hub);
    let shutdown = Arc::new(Shutdown::new());
    let classifier = Classifier::from_config(&config.classifier);

    let handle = tokio::spawn({
        let hub = Arc::clone(&hub);
        let shutdown = Arc::clone(&shutdown);
        async move { hub.serve(listener, classifier, &shutdown).await }
    });

    TestHub {
        addr,
        hub,
        shutdown,
        handle,
    }
}

/// Shell that does nothing.
#[derive(Default)]
pub struct IdleShell;

impl RemoteShell for IdleShell {
    fn run<'a>(&'a self, _command: &'a str) -> BoxFuture<'a, io::Result<String>> {
        Box::pin(async { Ok(String::new()) })
    }

    fn send_line<'a>(&'a self, _line: &'a str) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) {}
}

/// Shell that plays a client: fixed arguments, hostname and working
/// directory, every path a directory. Status lines it is asked to print are
/// recorded unquoted.
pub struct ScriptShell {
    args: String,
    hostname: String,
    pwd: String,
    lines: Mutex<Vec<String>>,
    echoed: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl ScriptShell {
    pub fn new(args: &str, hostname: &str, pwd: &str) -> Self {
        Self {
            args: args.to_string(),
            hostname: format!("{hostname}\n"),
            pwd: format!("{pwd}\n"),
            lines: Mutex::new(Vec::new()),
            echoed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Raw lines written to the shell's input.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Status lines printed through `>&2 echo`.
    pub fn echoed(&self) -> Vec<String> {
        self.echoed.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RemoteShell for ScriptShell {
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, io::Result<String>> {
        Box::pin(async move {
            let out = match command {
                "echo -n $@" => self.args.clone(),
                "pwd" => self.pwd.clone(),
                c if c.starts_with("cat /proc/sys/kernel/hostname") => self.hostname.clone(),
                c if c.starts_with("if [ -d ") => "dir\n".to_string(),
                c => {
                    if let Some(word) = c.strip_prefix(">&2 echo ") {
                        let text = shlex::split(word).unwrap_or_default().join(" ");
                        self.echoed.lock().unwrap().push(text);
                    }
                    String::new()
                }
            };
            Ok(out)
        })
    }

    fn send_line<'a>(&'a self, line: &'a str) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Poll `check` until it holds, for up to two seconds.
pub async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// WebDAV stand-in answering 207 with the session's workdir.
struct WorkdirDav(String);

impl DavService for WorkdirDav {
    fn serve(&self, _request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let body = self.0.clone();
        Box::pin(async move {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = StatusCode::MULTI_STATUS;
            response
        })
    }
}

pub fn workdir_factory() -> Arc<dyn DavHandlerFactory> {
    Arc::new(|_shell: Arc<dyn RemoteShell>, workdir: &str| {
        Arc::new(WorkdirDav(workdir.to_string())) as Arc<dyn DavService>
    })
}

/// Send one HTTP/1.1 request over a fresh connection and return the raw
/// response.
pub async fn raw_http(addr: SocketAddr, method: &str, host: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
