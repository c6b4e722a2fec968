//! Registry of open WebDAV sessions and HTTP dispatch.
//!
//! # Responsibilities
//! - Register at most one session per exact (host, workdir) pair
//! - Tombstone registrations on close, keeping the host's sub-map
//! - Route each HTTP request to the session with the longest matching
//!   workdir prefix for the request's logical host
//!
//! # Design Decisions
//! - Read-heavy: one RwLock, held for map operations only
//! - Prefix matching is plain string prefix matching, case-sensitive
//! - Registered paths are distinct, so two real matches never tie on length

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::dav::host::HostPattern;
use crate::dav::service::{DavHandlerFactory, DavService};
use crate::observability::metrics;
use crate::session::RemoteShell;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{host} {path} session is already opened")]
    AlreadyOpen { host: String, path: String },
}

/// An open WebDAV session bound to a remote shell.
pub struct DavSession {
    host: String,
    workdir: String,
    handler: Arc<dyn DavService>,
    shell: Arc<dyn RemoteShell>,
}

impl DavSession {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn shell(&self) -> &Arc<dyn RemoteShell> {
        &self.shell
    }

    pub async fn serve(&self, request: Request<Body>) -> Response {
        self.handler.serve(request).await
    }
}

impl fmt::Display for DavSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.workdir)
    }
}

impl fmt::Debug for DavSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavSession")
            .field("host", &self.host)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

/// `None` marks a closed registration.
type HostSessions = HashMap<String, Option<Arc<DavSession>>>;

/// Host → workdir → session.
pub struct SessionDirectory {
    host_pattern: HostPattern,
    factory: Arc<dyn DavHandlerFactory>,
    sessions: RwLock<HashMap<String, HostSessions>>,
}

impl SessionDirectory {
    pub fn new(host_pattern: HostPattern, factory: Arc<dyn DavHandlerFactory>) -> Self {
        Self {
            host_pattern,
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn host_pattern(&self) -> &HostPattern {
        &self.host_pattern
    }

    /// Register a session for the exact (`host`, `path`) pair.
    pub fn open(
        &self,
        host: &str,
        path: &str,
        shell: Arc<dyn RemoteShell>,
    ) -> Result<Arc<DavSession>, DirectoryError> {
        let handler = self.factory.build(Arc::clone(&shell), path);
        let session = Arc::new(DavSession {
            host: host.to_string(),
            workdir: path.to_string(),
            handler,
            shell,
        });

        let active = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let by_path = sessions.entry(host.to_string()).or_default();
            if matches!(by_path.get(path), Some(Some(_))) {
                return Err(DirectoryError::AlreadyOpen {
                    host: host.to_string(),
                    path: path.to_string(),
                });
            }
            by_path.insert(path.to_string(), Some(Arc::clone(&session)));
            count_active(&sessions)
        };

        metrics::record_webdav_sessions(active);
        tracing::info!(host = %host, workdir = %path, "WebDAV session opened");
        Ok(session)
    }

    /// Clear the registration held by `session`.
    ///
    /// A registration that has since been replaced by another session is left
    /// alone.
    pub fn close(&self, session: &Arc<DavSession>) {
        let active = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = sessions
                .get_mut(&session.host)
                .and_then(|by_path| by_path.get_mut(&session.workdir))
            else {
                return;
            };
            if !matches!(slot, Some(current) if Arc::ptr_eq(current, session)) {
                return;
            }
            *slot = None;
            count_active(&sessions)
        };

        metrics::record_webdav_sessions(active);
        tracing::info!(host = %session.host, workdir = %session.workdir, "WebDAV session closed");
    }

    /// Session whose workdir is the longest prefix of `path` under `host`.
    pub fn lookup(&self, host: &str, path: &str) -> Option<Arc<DavSession>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let by_path = sessions.get(host)?;

        by_path
            .iter()
            .filter_map(|(prefix, slot)| slot.as_ref().map(|s| (prefix, s)))
            .filter(|(prefix, _)| !prefix.is_empty() && path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, session)| Arc::clone(session))
    }

    /// Number of open sessions.
    pub fn active_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        count_active(&sessions)
    }

    /// Route `request` to the matching session.
    ///
    /// - 500 when the declared host does not satisfy the host pattern
    /// - 403 when no session covers the request path
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let declared = declared_host(&request);
        let host = match self.host_pattern.extract(&declared) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(host = %declared, error = %e, "Cannot derive logical host");
                metrics::record_dispatch(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
                return (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response();
            }
        };

        // Workdirs are registered decoded, as `pwd` printed them.
        let path = percent_decode_str(request.uri().path())
            .decode_utf8_lossy()
            .into_owned();
        let Some(session) = self.lookup(&host, &path) else {
            tracing::debug!(host = %host, path = %path, "No WebDAV session for request");
            metrics::record_dispatch(StatusCode::FORBIDDEN.as_u16());
            return (
                StatusCode::FORBIDDEN,
                format!("no webdav server for this host {host}"),
            )
                .into_response();
        };

        tracing::debug!(
            session = %session,
            method = %request.method(),
            path = %path,
            "Dispatching to WebDAV session"
        );
        let response = session.serve(request).await;
        metrics::record_dispatch(response.status().as_u16());
        response
    }
}

fn count_active(sessions: &HashMap<String, HostSessions>) -> usize {
    sessions
        .values()
        .flat_map(|by_path| by_path.values())
        .filter(|slot| slot.is_some())
        .count()
}

/// Host as declared by the client: the `Host` header, else the URI authority.
fn declared_host(request: &Request<Body>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}
