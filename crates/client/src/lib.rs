//! Real-time sync client for the classline dashboard.
//!
//! Keeps one user's chat and notification state continuously consistent
//! with the backend, merging REST snapshots with push events from the
//! messaging socket. Three layers:
//!
//! - [`ws`]: the socket, with automatic reconnect and exponential backoff
//! - [`store`]: the reconciliation store all consumers read from
//! - [`api`] and [`session`]: the REST boundary and the per-user facade
//!
//! ```no_run
//! use classline_client::Session;
//!
//! # async fn demo() -> Result<(), classline_shared::ApiError> {
//! let session = Session::open(
//!     "https://campus.example/api",
//!     "wss://campus.example/api",
//!     "bearer-token",
//!     42,
//!     "Meera Joshi",
//! );
//! session.connect();
//! session.refresh_chats().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod logging;
pub mod session;
pub mod store;
pub mod ws;

pub use api::{ApiClient, MessagingApi};
pub use session::Session;
pub use store::{BadgeView, Scope, ScopeView, Subscription, SyncStore};
pub use ws::{ConnectionManager, ConnectionStatus, ReconnectConfig};
