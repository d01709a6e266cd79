//! Session verification, refresh and the axum glue around it.

pub mod container;
pub mod cookie;
pub mod errors;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod verify;

pub use container::SessionContainer;
pub use errors::{ErrorKind, SessionError};
pub use extractors::{MaybeSession, Session};
pub use middleware::{SessionGuard, require_session, verify_session};
pub use response::PendingHeaders;
pub use verify::VerifyOptions;
