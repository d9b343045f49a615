mod session_tickets;
mod tickets;
mod users;

pub use session_tickets::*;
pub use tickets::*;
pub use users::*;
