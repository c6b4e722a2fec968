//! Lifecycle of remote shell sessions.
//!
//! # Responsibilities
//! - Read the client's arguments from a freshly opened shell
//! - Leader shells: allocate a correlation handler and start the report
//!   sub-shell, then watch it until it goes away
//! - Follower shells: register the working directory as a WebDAV session and
//!   print the links a user can open
//!
//! # Design Decisions
//! - `open` returns a [`SessionGuard`]; whoever owns the shell drops or closes
//!   the guard when the shell ends, and teardown runs exactly once
//! - Any failure while opening closes the shell and refuses the session
//! - Everything shown to the user goes to the shell's stderr as a status
//!   line, so the report channel can pick it up

use std::borrow::Cow;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::{HubConfig, DEFAULT_LINK_TEMPLATE};
use crate::dav::{DavSession, DirectoryError, SessionDirectory};
use crate::handshake::HandshakeRegistry;
use crate::protocol::Header;
use crate::session::args::SessionArgs;
use crate::session::remote::RemoteShell;

const STATUS_PREFIX: &str = ">2: ";
const HOSTNAME_COMMAND: &str = "cat /proc/sys/kernel/hostname";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("args parse failed: {0}")]
    Args(#[source] clap::Error),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("no edit target. exitted.")]
    NoEditTarget,

    #[error("remote shell: {0}")]
    Shell(#[from] io::Error),
}

/// Values the supervisor renders into commands and links.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// How long a leader waits for its report sub-shell.
    pub handshake_timeout: Duration,
    /// Port the hub is actually listening on.
    pub port: u16,
    pub welcome_link: String,
    pub edit_link: String,
}

impl SupervisorSettings {
    pub fn from_config(config: &HubConfig, port: u16) -> Self {
        Self {
            handshake_timeout: Duration::from_secs(config.handshake.timeout_secs),
            port,
            welcome_link: config.sessions.welcome_link.clone(),
            edit_link: config.sessions.edit_link.clone(),
        }
    }

    fn default_server(&self) -> String {
        format!("127.0.0.1/{}", self.port)
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            port: 4349,
            welcome_link: DEFAULT_LINK_TEMPLATE.to_string(),
            edit_link: DEFAULT_LINK_TEMPLATE.to_string(),
        }
    }
}

/// Keeps an opened session registered until dropped or closed.
#[must_use = "dropping the guard tears the session down"]
pub struct SessionGuard {
    teardown: Option<Teardown>,
}

enum Teardown {
    Leader {
        header: Header,
    },
    Follower {
        directory: Arc<SessionDirectory>,
        session: Arc<DavSession>,
    },
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.teardown {
            Some(Teardown::Leader { header }) => write!(f, "SessionGuard(leader {header})"),
            Some(Teardown::Follower { session, .. }) => {
                write!(f, "SessionGuard(follower {session})")
            }
            None => f.write_str("SessionGuard(closed)"),
        }
    }
}

impl SessionGuard {
    /// Whether this guard belongs to a leader shell.
    pub fn is_leader(&self) -> bool {
        matches!(self.teardown, Some(Teardown::Leader { .. }))
    }

    /// The WebDAV session held by a follower shell.
    pub fn session(&self) -> Option<&Arc<DavSession>> {
        match &self.teardown {
            Some(Teardown::Follower { session, .. }) => Some(session),
            _ => None,
        }
    }

    /// Tear the session down now.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        match self.teardown.take() {
            Some(Teardown::Leader { header }) => {
                tracing::info!(header = %header, "Leader shell closed");
            }
            Some(Teardown::Follower { directory, session }) => {
                directory.close(&session);
            }
            None => {}
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Reacts to remote shells being opened.
pub struct SessionSupervisor {
    registry: Arc<HandshakeRegistry>,
    directory: Arc<SessionDirectory>,
    settings: SupervisorSettings,
}

impl SessionSupervisor {
    pub fn new(
        registry: Arc<HandshakeRegistry>,
        directory: Arc<SessionDirectory>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            registry,
            directory,
            settings,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Set up a newly opened shell. On error the shell has been closed.
    pub async fn open(&self, shell: Arc<dyn RemoteShell>) -> Result<SessionGuard, SessionError> {
        match self.start(&shell).await {
            Ok(guard) => Ok(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Session refused");
                shell.close();
                Err(e)
            }
        }
    }

    async fn start(&self, shell: &Arc<dyn RemoteShell>) -> Result<SessionGuard, SessionError> {
        let raw = shell.run("echo -n $@").await?;
        let args = match SessionArgs::parse_raw(&raw) {
            Ok(args) => args,
            Err(e) => {
                let usage = e.to_string();
                shell
                    .send_line(&format!(" >&2 echo {}", shell_quote(&usage)))
                    .await?;
                return Err(SessionError::Args(e));
            }
        };

        if args.leader {
            self.start_leader(shell, &args).await
        } else {
            self.start_follower(shell, &args).await
        }
    }

    async fn start_leader(
        &self,
        shell: &Arc<dyn RemoteShell>,
        args: &SessionArgs,
    ) -> Result<SessionGuard, SessionError> {
        let handler = self.registry.new_handler();
        let header = handler.header();
        let server = args
            .server
            .clone()
            .unwrap_or_else(|| self.settings.default_server());

        tracing::debug!(header = %header, server = %server, "Starting leader");
        shell
            .send_line(&format!(" {}", sub_shell_command(&server, &header, &args.paths)))
            .await?;

        let directory = Arc::clone(&self.directory);
        let shell = Arc::clone(shell);
        let timeout = self.settings.handshake_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, handler.recv()).await {
                Err(_) => {
                    tracing::warn!(header = %header, "Report sub-shell start timed out");
                }
                Ok(Err(e)) => {
                    tracing::warn!(header = %header, error = %e, "Report sub-shell lost");
                }
                Ok(Ok(mut descriptor)) => {
                    descriptor.closed().await;
                    if let Some(session) = directory.lookup(&descriptor.host, &descriptor.workdir) {
                        session.shell().close();
                    }
                    tracing::info!(
                        header = %header,
                        host = %descriptor.host,
                        workdir = %descriptor.workdir,
                        "Report sub-shell closed"
                    );
                }
            }
            shell.close();
        });

        Ok(SessionGuard {
            teardown: Some(Teardown::Leader { header }),
        })
    }

    async fn start_follower(
        &self,
        shell: &Arc<dyn RemoteShell>,
        args: &SessionArgs,
    ) -> Result<SessionGuard, SessionError> {
        // An empty prompt keeps stderr parseable.
        shell.send_line(r#"export PS1="""#).await?;

        let host = shell
            .run(HOSTNAME_COMMAND)
            .await?
            .trim_end_matches('\n')
            .to_lowercase();
        let pwd = shell.run("pwd").await?.trim_end_matches('\n').to_string();

        let session = match self.directory.open(&host, &pwd, Arc::clone(shell)) {
            Ok(session) => session,
            Err(e) => {
                echo_status(shell.as_ref(), &format!("{STATUS_PREFIX}{e}")).await?;
                return Err(e.into());
            }
        };
        let guard = SessionGuard {
            teardown: Some(Teardown::Follower {
                directory: Arc::clone(&self.directory),
                session,
            }),
        };

        let welcome = format!(
            "{STATUS_PREFIX}{}",
            render_link(&self.settings.welcome_link, &host, self.settings.port, &format!("{pwd}/"))
        );
        echo_status(shell.as_ref(), &welcome).await?;

        let targets = EditTargets {
            shell: Arc::clone(shell),
            host,
            pwd,
            port: self.settings.port,
            template: self.settings.edit_link.clone(),
            welcome,
        };
        let paths = args.edit_targets();
        tokio::spawn(async move { targets.announce(paths).await });

        Ok(guard)
    }
}

/// Edit links printed after a follower has been registered.
struct EditTargets {
    shell: Arc<dyn RemoteShell>,
    host: String,
    pwd: String,
    port: u16,
    template: String,
    welcome: String,
}

impl EditTargets {
    async fn announce(self, paths: Vec<String>) {
        if let Err(e) = self.emit(&paths).await {
            tracing::debug!(
                host = %self.host,
                workdir = %self.pwd,
                error = %e,
                "No usable edit target"
            );
            let warning = format!("{STATUS_PREFIX}err: {e}");
            if let Err(e) = echo_status(self.shell.as_ref(), &warning).await {
                tracing::debug!(error = %e, "Failed to report edit target error");
            }
            self.shell.close();
        }
    }

    async fn emit(&self, paths: &[String]) -> Result<(), SessionError> {
        let shell = self.shell.as_ref();
        let mut hits = 0;

        for target in paths {
            let path = clean_join(&self.pwd, target);
            let kind = PathKind::probe(shell, &path).await?;
            if kind == PathKind::Missing {
                echo_status(shell, &format!("{STATUS_PREFIX}404://{path} path not exist.")).await?;
                continue;
            }
            if !is_within(&self.pwd, &path) {
                echo_status(
                    shell,
                    &format!("{STATUS_PREFIX}404://{path} don't allow edit parent directory files"),
                )
                .await?;
                continue;
            }

            hits += 1;
            let link_path = if kind == PathKind::Dir {
                format!("{path}/")
            } else {
                path
            };
            let link = format!(
                "{STATUS_PREFIX}{}",
                render_link(&self.template, &self.host, self.port, &link_path)
            );
            if link == self.welcome {
                continue;
            }
            echo_status(shell, &link).await?;
        }

        if hits == 0 {
            return Err(SessionError::NoEditTarget);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Dir,
    File,
    Missing,
}

impl PathKind {
    async fn probe(shell: &dyn RemoteShell, path: &str) -> io::Result<Self> {
        let quoted = shell_quote(path);
        let command = format!(
            "if [ -d {quoted} ]; then echo dir; elif [ -e {quoted} ]; then echo file; else echo none; fi"
        );
        Ok(match shell.run(&command).await?.trim() {
            "dir" => PathKind::Dir,
            "file" => PathKind::File,
            _ => PathKind::Missing,
        })
    }
}

async fn echo_status(shell: &dyn RemoteShell, line: &str) -> io::Result<()> {
    shell.run(&format!(">&2 echo {}", shell_quote(line))).await?;
    Ok(())
}

/// Command line that turns a leader shell into a follower whose stderr is
/// mirrored onto a report connection opened with `header`.
pub fn sub_shell_command(server: &str, header: &Header, paths: &[String]) -> String {
    let report = format!(
        "4>&0 5>/dev/tcp/{server} 3> >(>&5 echo '{STATUS_PREFIX}{header}' && >&5 dd conv=sync <&4) dd conv=sync <&5 >&2"
    );
    let mut command =
        format!("exec <>/dev/tcp/{server} 2> >({report}) bash +o history -i -s -- --leader=false");
    for path in paths {
        command.push(' ');
        command.push_str(&shell_quote(path));
    }
    command
}

/// Fill `{host}`, `{port}` and `{path}` in a link template.
pub fn render_link(template: &str, host: &str, port: u16, path: &str) -> String {
    template
        .replace("{host}", host)
        .replace("{port}", &port.to_string())
        .replace("{path}", path)
}

/// Quote `s` as one POSIX shell word. NUL bytes cannot travel in a shell
/// word and are dropped.
pub fn shell_quote(s: &str) -> String {
    let s = s.replace('\0', "");
    // NUL is the only input `try_quote` rejects.
    shlex::try_quote(&s).map(Cow::into_owned).unwrap_or_default()
}

/// Join `rel` onto `base` and resolve `.`, `..` and repeated separators.
fn clean_join(base: &str, rel: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in base.split('/').chain(rel.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

fn is_within(root: &str, path: &str) -> bool {
    let root = root.trim_end_matches('/');
    root.is_empty() || path == root || path.starts_with(&format!("{root}/"))
}
