//! Matching PGT IOUs with proxy callbacks.
//!
//! The CAS server delivers the proxy-granting ticket to the callback URL
//! before answering `/proxyValidate`, but that callback may be handled by a
//! different request (or node) than the one validating the ticket. The two
//! meet in the [`TicketStore`]: the callback stores `(iou, pgt)`, and the
//! validating request polls for the IOU here.

use std::{sync::Arc, time::Duration};

use super::error::CorrelationError;
use crate::{
    config::CorrelationConfig,
    db::TicketStore,
    observability::{metrics, ticket_prefix},
};

pub struct PgtCorrelator {
    tickets: Arc<dyn TicketStore>,
    extra_lookups: u32,
    retry_interval: Duration,
}

impl PgtCorrelator {
    pub fn new(tickets: Arc<dyn TicketStore>, config: &CorrelationConfig) -> Self {
        Self {
            tickets,
            extra_lookups: config.extra_lookups,
            retry_interval: config.retry_interval(),
        }
    }

    /// Consume the IOU record for `pgt_iou`, store its PGT as the ticket
    /// granting ticket of `username`, and return it.
    ///
    /// Makes one lookup immediately and up to `extra_lookups` more after a
    /// fixed pause each. The IOU is removed atomically, so concurrent callers
    /// for the same IOU cannot both succeed.
    ///
    /// The IOU is consumed before the TGT is written. If that write fails the
    /// delivered PGT is gone and the user has no proxy capability until the
    /// next login.
    #[tracing::instrument(skip(self, pgt_iou), fields(iou = %ticket_prefix(pgt_iou)))]
    pub async fn correlate(&self, username: &str, pgt_iou: &str) -> Result<String, CorrelationError> {
        let max_attempts = self.extra_lookups + 1;
        let mut attempts = 0;

        let record = loop {
            attempts += 1;
            match self.tickets.take_pgt_iou(pgt_iou).await {
                Ok(Some(record)) => break record,
                Ok(None) if attempts < max_attempts => {
                    tracing::debug!(attempt = attempts, "PGT IOU not delivered yet, waiting");
                    tokio::time::sleep(self.retry_interval).await;
                }
                Ok(None) => {
                    metrics::record_pgt_correlation("timeout", attempts);
                    return Err(CorrelationError::Timeout { attempts });
                }
                Err(e) => {
                    metrics::record_pgt_correlation("storage", attempts);
                    return Err(e.into());
                }
            }
        };

        if let Err(e) = self.tickets.upsert_tgt(username, &record.tgt).await {
            tracing::warn!(
                username = %username,
                error = %e,
                "Failed to store ticket-granting ticket; the delivered PGT is discarded"
            );
            metrics::record_pgt_correlation("storage", attempts);
            return Err(e.into());
        }

        metrics::record_pgt_correlation("success", attempts);
        tracing::debug!(attempts, "Stored proxy-granting ticket");
        Ok(record.tgt)
    }
}
