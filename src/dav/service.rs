//! Contracts for the WebDAV engine collaborator.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;

use crate::session::RemoteShell;

/// HTTP handler serving one WebDAV session.
pub trait DavService: Send + Sync + 'static {
    fn serve(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>>;
}

/// Builds the WebDAV handler for a newly opened session, bound to a
/// filesystem adapter over the session's remote shell.
pub trait DavHandlerFactory: Send + Sync + 'static {
    fn build(&self, shell: Arc<dyn RemoteShell>, workdir: &str) -> Arc<dyn DavService>;
}

impl<F> DavHandlerFactory for F
where
    F: Fn(Arc<dyn RemoteShell>, &str) -> Arc<dyn DavService> + Send + Sync + 'static,
{
    fn build(&self, shell: Arc<dyn RemoteShell>, workdir: &str) -> Arc<dyn DavService> {
        self(shell, workdir)
    }
}

/// Factory for builds that link no WebDAV engine.
///
/// Every request to a session is answered with 501.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDavFactory;

struct UnavailableDav;

impl DavService for UnavailableDav {
    fn serve(&self, _request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        Box::pin(async {
            let mut response = Response::new(Body::from("no webdav engine attached\n"));
            *response.status_mut() = StatusCode::NOT_IMPLEMENTED;
            response
        })
    }
}

impl DavHandlerFactory for UnavailableDavFactory {
    fn build(&self, _shell: Arc<dyn RemoteShell>, _workdir: &str) -> Arc<dyn DavService> {
        Arc::new(UnavailableDav)
    }
}
