//! Remote shell sessions.
//!
//! # Data Flow
//! ```text
//! Session-protocol connection → external SessionServer → shell opened
//!     → supervisor.rs reads `$@` (args.rs)
//!     → leader: handler + report sub-shell, watched until it closes
//!     → follower: WebDAV registration + links on stderr
//!     → SessionGuard dropped when the shell ends
//! ```

pub mod args;
pub mod remote;
pub mod supervisor;

pub use args::SessionArgs;
pub use remote::{DetachedSessionServer, RemoteShell, SessionServer};
pub use supervisor::{
    render_link, SessionError, SessionGuard, SessionSupervisor, SupervisorSettings,
};
