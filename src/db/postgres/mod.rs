mod session_tickets;
mod tickets;
mod users;

pub use session_tickets::PostgresSessionTicketRegistry;
pub use tickets::PostgresTicketStore;
pub use users::PostgresUserRepo;
