//! Process-local repository implementations.
//!
//! Used when no database is configured and by tests. State is lost on
//! restart and is not shared between processes.

mod session_tickets;
mod tickets;
mod users;

pub use session_tickets::MemorySessionTicketRegistry;
pub use tickets::MemoryTicketStore;
pub use users::MemoryUserRepo;
