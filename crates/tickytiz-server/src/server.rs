use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use tickytiz_auth::{AccountService, AccountStorage, AuthState, RevokedTokenStorage, account_routes};

use crate::cache::{CacheBackend, CacheFacade};
use crate::config::AppConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub accounts: Arc<AccountService>,
    pub cache: CacheFacade,
    pub cors_origins: Arc<[HeaderValue]>,
}

impl AppState {
    /// Wire the auth services and cache from configuration and the already
    /// connected stores.
    pub fn new(
        cfg: &AppConfig,
        accounts: Arc<dyn AccountStorage>,
        revoked_tokens: Arc<dyn RevokedTokenStorage>,
        cache_backend: CacheBackend,
    ) -> anyhow::Result<Self> {
        let cors_origins = cfg.server.cors_origins().map_err(anyhow::Error::msg)?;
        let jwt_service = Arc::new(cfg.auth.jwt_service()?);
        let hasher = cfg.auth.password_hasher()?;

        let auth = AuthState::new(Arc::clone(&jwt_service), Arc::clone(&revoked_tokens))
            .with_store_timeout(cfg.auth.store_timeout);
        let accounts = AccountService::new(accounts, hasher, jwt_service, revoked_tokens)
            .with_min_password_length(cfg.auth.min_password_length)
            .with_store_timeout(cfg.auth.store_timeout);
        let cache = CacheFacade::new(cache_backend, cfg.cache.ttl)
            .with_key_prefix(cfg.cache.key_prefix.clone());

        Ok(Self {
            auth,
            accounts: Arc::new(accounts),
            cache,
            cors_origins: cors_origins.into(),
        })
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<AccountService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.accounts)
    }
}

impl FromRef<AppState> for CacheFacade {
    fn from_ref(state: &AppState) -> Self {
        state.cache.clone()
    }
}

/// CORS for the browser front ends: only listed origins are echoed back, with
/// credentials allowed.
fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(account_routes())
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
}

async fn healthz(State(cache): State<CacheFacade>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "cache": cache.backend().mode(),
    }))
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub struct TickytizServer {
    addr: SocketAddr,
    app: Router,
}

impl TickytizServer {
    pub fn new(cfg: &AppConfig, state: AppState) -> Self {
        Self {
            addr: cfg.addr(),
            app: build_router(state),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
