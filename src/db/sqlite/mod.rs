mod session_tickets;
mod tickets;
mod users;

pub use session_tickets::SqliteSessionTicketRegistry;
pub use tickets::SqliteTicketStore;
pub use users::SqliteUserRepo;
