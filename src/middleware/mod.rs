mod client_ip;
mod request_id;

pub use client_ip::client_ip;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
