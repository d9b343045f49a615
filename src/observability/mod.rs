//! Observability: structured logging and Prometheus metrics.
//!
//! Logging uses `tracing` throughout the crate; this module only installs
//! the subscriber (when running as a server) and the metrics recorder.

pub mod metrics;
#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;

/// Shorten a ticket for logging. Tickets are bearer credentials, so only a
/// recognizable prefix ever reaches the logs.
pub fn ticket_prefix(ticket: &str) -> &str {
    const VISIBLE: usize = 12;
    match ticket.char_indices().nth(VISIBLE) {
        Some((idx, _)) => &ticket[..idx],
        None => ticket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_prefix() {
        assert_eq!(ticket_prefix("ST-1"), "ST-1");
        assert_eq!(
            ticket_prefix("ST-123456-abcdefghijklmnop-cas"),
            "ST-123456-ab"
        );
        assert_eq!(ticket_prefix(""), "");
    }
}
