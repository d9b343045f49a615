mod tickets;
mod user;

pub use tickets::*;
pub use user::*;
