//! CAS routes.
//!
//! - `GET /cas/login` - Redirects to the CAS server, or validates the returned ticket
//! - `POST /cas/login` - Receives single sign-out notifications from the CAS server
//! - `GET /cas/logout` - Ends the local session and optionally the CAS session
//! - `GET /cas/proxy-callback` - Receives proxy-granting tickets from the CAS server
//! - `POST /cas/proxy-ticket` - Obtains a proxy ticket for the current user
//! - `GET /cas/me` - Returns the current session's user

use std::net::SocketAddr;

use axum::{
    Form, Json,
    extract::{ConnectInfo, Query, State},
    http::{Extensions, HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies, cookie::time::Duration as CookieDuration};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthBackend, AuthError, LocalSession},
    cas::LogoutNotification,
    config::SessionConfig,
    db::DbError,
    middleware::client_ip,
    observability::{metrics, ticket_prefix},
};

fn build_session_cookie(session_config: &SessionConfig, session: &LocalSession) -> Cookie<'static> {
    Cookie::build((session_config.cookie_name.clone(), session.key()))
        .path("/")
        .http_only(true)
        .secure(session_config.secure)
        .same_site(session_config.same_site.into())
        .max_age(CookieDuration::seconds(session_config.duration_secs as i64))
        .build()
}

/// Build a session removal cookie with the same security attributes as the login cookie.
fn build_removal_cookie(session_config: &SessionConfig) -> Cookie<'static> {
    Cookie::build(session_config.cookie_name.clone())
        .path("/")
        .http_only(true)
        .secure(session_config.secure)
        .same_site(session_config.same_site.into())
        .max_age(CookieDuration::ZERO)
        .build()
}

/// The live session named by the request's cookie, if any.
async fn current_session(
    state: &AppState,
    cookies: &Cookies,
) -> Result<Option<LocalSession>, AuthError> {
    let Some(cookie) = cookies.get(&state.config.session.cookie_name) else {
        return Ok(None);
    };
    let Ok(session_id) = cookie.value().parse::<Uuid>() else {
        return Ok(None);
    };
    Ok(state.sessions.get_session(session_id).await?)
}

fn referer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::REFERER).and_then(|v| v.to_str().ok())
}

/// Drop a session and its single sign-out mappings.
async fn end_session(state: &AppState, session: &LocalSession) -> Result<(), AuthError> {
    state.sessions.delete_session(session.id).await?;
    state.backend.on_logout(session).await;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Login
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Service ticket issued by the CAS server.
    pub ticket: Option<String>,
    /// Where to go once logged in. Must be a path on this service.
    pub next: Option<String>,
}

/// Start or finish a CAS login.
///
/// Without a ticket the browser is sent to the CAS login page. With one, the
/// ticket is validated, a local session is opened and the browser is sent on
/// to its destination.
#[tracing::instrument(
    name = "cas.login",
    skip(state, query, headers, cookies),
    fields(ticket = query.ticket.as_deref().map(ticket_prefix))
)]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Response, AuthError> {
    let urls = &state.cas.urls;
    let target = urls.redirect_target(query.next.as_deref(), referer(&headers));

    if current_session(&state, &cookies).await?.is_some() {
        return Ok(Redirect::to(&target).into_response());
    }

    // The destination travels inside the service URL, so the URL sent with
    // the ticket for validation is the one the CAS server issued it for.
    let service = urls.login_service_url(Some(&target));

    let Some(ticket) = query.ticket.as_deref().filter(|t| !t.is_empty()) else {
        return Ok(Redirect::to(&urls.login_url(&service)).into_response());
    };

    let Some(user) = state.backend.authenticate(ticket, &service).await? else {
        if state.config.cas.retry_login {
            tracing::info!("Login failed, sending the user back to CAS");
            return Ok(Redirect::to(&urls.login_url(&service)).into_response());
        }
        return Err(AuthError::LoginFailed);
    };

    let session_config = &state.config.session;
    let session = LocalSession::new(
        user.id,
        user.username.clone(),
        AuthBackend::Cas,
        session_config.duration(),
    );
    state.sessions.create_session(session.clone()).await?;
    cookies.add(build_session_cookie(session_config, &session));
    state.backend.on_login_success(&session, ticket).await;

    tracing::info!(
        session_id = %session.id,
        username = %session.username,
        "CAS login succeeded"
    );

    Ok(Redirect::to(&target).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Single sign-out
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogoutNotificationForm {
    #[serde(rename = "logoutRequest")]
    pub logout_request: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SingleSignOutResponse {
    pub status: String,
}

/// Handle a logout notification POSTed by the CAS server.
///
/// The notification names the service ticket a session was opened with; that
/// session is ended. Unknown tickets get a 404 so the CAS server can tell
/// nothing happened.
#[tracing::instrument(name = "cas.single_sign_out", skip_all)]
pub async fn single_sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Form(form): Form<LogoutNotificationForm>,
) -> Result<Json<SingleSignOutResponse>, AuthError> {
    if !state.config.cas.single_sign_out {
        return Err(AuthError::NoSuchSession);
    }
    let Some(body) = form.logout_request.filter(|b| !b.trim().is_empty()) else {
        return Err(AuthError::BadRequest("missing logoutRequest".into()));
    };

    let remote_addr = client_ip(
        &headers,
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        &state.config.server.trusted_proxies,
    );
    if !state.cas.origin_policy.is_allowed(remote_addr).await {
        tracing::warn!(?remote_addr, "Rejected logout notification from disallowed sender");
        metrics::record_single_sign_out("forbidden");
        return Err(AuthError::LogoutForbidden);
    }

    let notification = LogoutNotification { body, remote_addr };
    let Some(resolved) = state.cas.logout.resolve(&notification).await else {
        metrics::record_single_sign_out("unresolved");
        return Err(AuthError::NoSuchSession);
    };

    let session = match resolved.session_key.parse::<Uuid>() {
        Ok(id) => state.sessions.get_session(id).await?,
        Err(_) => None,
    };

    match session {
        Some(session) => {
            end_session(&state, &session).await?;
            tracing::info!(
                session_id = %session.id,
                username = %session.username,
                ticket = %ticket_prefix(&resolved.ticket),
                "Single sign-out ended session"
            );
            metrics::record_single_sign_out("logged_out");
            Ok(Json(SingleSignOutResponse {
                status: "logged_out".into(),
            }))
        }
        None => {
            // The mapping outlived its session (expiry or restart)
            if let Err(e) = state
                .db
                .session_tickets()
                .delete_by_session_key(&resolved.session_key)
                .await
            {
                tracing::warn!(error = %e, "Failed to remove stale service ticket mapping");
            }
            metrics::record_single_sign_out("stale");
            Err(AuthError::NoSuchSession)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logout
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    pub next: Option<String>,
}

/// End the local session, then continue to the CAS logout page or straight
/// to the destination.
#[tracing::instrument(name = "cas.logout", skip(state, query, headers, cookies))]
pub async fn logout(
    State(state): State<AppState>,
    Query(query): Query<LogoutQuery>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Response, AuthError> {
    if let Some(session) = current_session(&state, &cookies).await? {
        end_session(&state, &session).await?;
        tracing::info!(session_id = %session.id, username = %session.username, "Logged out");
    }
    cookies.remove(build_removal_cookie(&state.config.session));

    let urls = &state.cas.urls;
    let target = urls.redirect_target(query.next.as_deref(), referer(&headers));
    let location = if state.config.cas.logout_completely {
        urls.logout_url(Some(&target))
    } else {
        target
    };
    Ok(Redirect::to(&location).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Proxy tickets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProxyCallbackQuery {
    #[serde(rename = "pgtIou")]
    pub pgt_iou: Option<String>,
    #[serde(rename = "pgtId")]
    pub pgt_id: Option<String>,
}

/// Receive a proxy-granting ticket from the CAS server.
///
/// Always answers 200: the CAS server probes the URL without parameters, and
/// it has no use for anything but an acknowledgement.
#[tracing::instrument(name = "cas.proxy_callback", skip_all)]
pub async fn proxy_callback(
    State(state): State<AppState>,
    Query(query): Query<ProxyCallbackQuery>,
) -> StatusCode {
    let iou = query.pgt_iou.filter(|v| !v.is_empty());
    let pgt = query.pgt_id.filter(|v| !v.is_empty());
    let (Some(iou), Some(pgt)) = (iou, pgt) else {
        tracing::debug!("Proxy callback without pgtIou and pgtId");
        return StatusCode::OK;
    };

    match state.db.tickets().put_pgt_iou(&iou, &pgt).await {
        Ok(_) => {
            tracing::debug!(pgt_iou = %ticket_prefix(&iou), "Stored proxy-granting ticket");
        }
        Err(DbError::Conflict(_)) => {
            tracing::warn!(pgt_iou = %ticket_prefix(&iou), "Duplicate PGT IOU ignored");
        }
        Err(e) => {
            tracing::error!(
                pgt_iou = %ticket_prefix(&iou),
                error = %e,
                "Failed to store proxy-granting ticket"
            );
        }
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct ProxyTicketRequest {
    pub target_service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyTicketResponse {
    pub proxy_ticket: String,
}

/// Obtain a proxy ticket for `target_service` on behalf of the logged-in user.
#[tracing::instrument(name = "cas.proxy_ticket", skip(state, cookies, request))]
pub async fn proxy_ticket(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(request): Json<ProxyTicketRequest>,
) -> Result<Json<ProxyTicketResponse>, AuthError> {
    let session = current_session(&state, &cookies)
        .await?
        .ok_or(AuthError::SessionNotFound)?;

    let target_service = request.target_service.trim();
    if target_service.is_empty() {
        return Err(AuthError::BadRequest("target_service is required".into()));
    }

    let proxy_ticket = state
        .cas
        .proxy
        .issue_proxy_ticket(&session.username, target_service)
        .await?;
    Ok(Json(ProxyTicketResponse { proxy_ticket }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Current user
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub backend: AuthBackend,
    pub expires_at: DateTime<Utc>,
}

#[tracing::instrument(name = "cas.me", skip(state, cookies))]
pub async fn me(State(state): State<AppState>, cookies: Cookies) -> Result<Json<MeResponse>, AuthError> {
    let session = current_session(&state, &cookies)
        .await?
        .ok_or(AuthError::SessionNotFound)?;
    Ok(Json(MeResponse {
        user_id: session.user_id,
        username: session.username,
        backend: session.backend,
        expires_at: session.expires_at,
    }))
}
