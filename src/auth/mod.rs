mod backend;
mod error;
pub mod session_store;

pub use backend::CasBackend;
pub use error::{AuthError, ErrorInfo, ErrorResponse};
pub use session_store::{
    AuthBackend, LocalSession, MemorySessionStore, SessionError, SessionStore, SharedSessionStore,
};
