//! CAS 2.0 protocol client.
//!
//! - [`TicketValidator`] checks service and proxy tickets with `/proxyValidate`
//! - [`PgtCorrelator`] pairs a returned PGT IOU with the proxy callback
//! - [`ProxyTicketManager`] obtains proxy tickets with `/proxy`
//! - [`SingleSignOutResolver`] maps logout notifications to local sessions
//! - [`LogoutOriginPolicy`] decides who may send those notifications
//! - [`CasUrls`] builds the login, logout and service URLs

pub mod client;
pub mod correlator;
pub mod error;
pub mod logout;
pub mod origin;
pub mod proxy;
pub mod response;
pub mod urls;
pub mod validator;
pub mod xml;

use std::sync::Arc;

pub use client::{CasClient, CasClientError, FetchError};
pub use correlator::PgtCorrelator;
pub use error::{CasSetupError, CorrelationError, ProxyError, ValidationError};
pub use logout::{LogoutNotification, ResolvedLogout, SingleSignOutResolver};
pub use origin::{AllowAll, AllowListPolicy, HostResolver, LogoutOriginPolicy};
pub use proxy::ProxyTicketManager;
pub use urls::CasUrls;
pub use validator::{TicketKind, TicketValidator, ValidatedTicket};

use crate::{config::CasConfig, db::DbPool};

/// Everything needed to speak CAS for one deployment, wired to one store.
pub struct CasServices {
    pub urls: CasUrls,
    pub validator: Arc<TicketValidator>,
    pub proxy: ProxyTicketManager,
    pub logout: SingleSignOutResolver,
    pub origin_policy: Arc<dyn LogoutOriginPolicy>,
}

impl CasServices {
    pub fn from_config(config: &CasConfig, db: &DbPool) -> Result<Self, CasSetupError> {
        Self::with_client(config, db, CasClient::new(config)?)
    }

    /// Share an existing HTTP client (and its connection pool).
    pub fn with_client(
        config: &CasConfig,
        db: &DbPool,
        client: CasClient,
    ) -> Result<Self, CasSetupError> {
        let correlator = Arc::new(PgtCorrelator::new(db.tickets(), &config.correlation));
        Ok(Self {
            urls: CasUrls::new(config)?,
            validator: Arc::new(TicketValidator::new(
                client.clone(),
                config.proxy_callback_url.clone(),
                correlator,
            )),
            proxy: ProxyTicketManager::new(client, db.tickets(), config.proxy_enabled()),
            logout: SingleSignOutResolver::new(db.session_tickets()),
            origin_policy: origin::policy_from_config(&config.logout_allowed)?,
        })
    }
}
