//! HTTP surface: the access-controlled API router and the metrics listener.

pub mod handlers;
pub mod middleware;
pub mod scope;

use crate::authz::Authorizer;
use crate::config::Config;
use crate::invitation::InvitationService;
use crate::mailer::Mailer;
use crate::security::{CredentialGate, RateLimitManager, TokenError, TokenService};
use crate::session::LoginService;
use crate::store::{AccessStore, PostStore};
use axum::handler::Handler;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use axum::Router;
use middleware::RoleGate;
use std::net::SocketAddr;
use std::sync::Arc;

pub use scope::RequestScope;

/// Shared state handed to every middleware and handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn AccessStore>,
    pub posts: Arc<dyn PostStore>,
    pub mailer: Arc<dyn Mailer>,
    pub tokens: Arc<TokenService>,
    pub gate: Arc<CredentialGate>,
    pub limiter: Arc<RateLimitManager>,
    pub invitations: InvitationService,
    pub authz: Authorizer,
    pub login: LoginService,
}

impl AppState {
    /// Build every component from configuration and the injected collaborators.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn AccessStore>,
        posts: Arc<dyn PostStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, TokenError> {
        let tokens = Arc::new(TokenService::new(&config.auth.token)?);
        Ok(Self {
            gate: Arc::new(CredentialGate::new(&config.auth.basic)),
            limiter: Arc::new(RateLimitManager::new(&config.rate_limiter)),
            invitations: InvitationService::new(store.clone()),
            authz: Authorizer::new(store.clone()),
            login: LoginService::new(store.clone(), tokens.clone()),
            tokens,
            store,
            posts,
            mailer,
            config,
        })
    }

    /// Replace the admission limiter.
    pub fn with_limiter(mut self, limiter: RateLimitManager) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let health = Router::new()
        .route("/health", get(handlers::health))
        .route_layer(from_fn_with_state(state.clone(), middleware::basic_auth));

    let authentication = Router::new()
        .route("/authentication/user", post(handlers::register_user))
        .route("/authentication/token", post(handlers::create_token))
        .route("/users/activate/:token", put(handlers::activate_user));

    let users = Router::new()
        .route("/users/:user_id", get(handlers::get_user))
        .route_layer(from_fn_with_state(state.clone(), middleware::bearer_auth));

    let moderator = RoleGate {
        authz: state.authz.clone(),
        role: "moderator",
    };
    let admin = RoleGate {
        authz: state.authz.clone(),
        role: "admin",
    };
    // Layers run outermost-last: bearer_auth, then post_context, then the role gate.
    let posts = Router::new()
        .route(
            "/posts/:post_id",
            get(handlers::get_post)
                .patch(handlers::update_post.layer(from_fn_with_state(
                    moderator,
                    middleware::require_post_ownership,
                )))
                .delete(handlers::delete_post.layer(from_fn_with_state(
                    admin,
                    middleware::require_post_ownership,
                ))),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::post_context))
        .route_layer(from_fn_with_state(state.clone(), middleware::bearer_auth));

    let v1 = Router::new()
        .merge(health)
        .merge(authentication)
        .merge(users)
        .merge(posts);

    Router::new()
        .nest("/v1", v1)
        .layer(from_fn_with_state(state.clone(), middleware::admission))
        .layer(from_fn(middleware::trace_request))
        .with_state(state)
}

/// Serve the API until ctrl-c.
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves the `/metrics` endpoint.
/// This is a long-running task that should be spawned in the background.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prometheus HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Metrics server error: {}", e);
    }
}
