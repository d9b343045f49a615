pub mod cas;
pub mod health;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// CAS login, logout and proxy routes, mounted under `/cas`.
pub fn cas_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(cas::login).post(cas::single_sign_out))
        .route("/logout", get(cas::logout))
        .route("/proxy-callback", get(cas::proxy_callback))
        .route("/proxy-ticket", post(cas::proxy_ticket))
        .route("/me", get(cas::me))
}
