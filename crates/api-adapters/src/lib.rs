//! # api-adapters
//!
//! HTTP surface over the action façade. Only axum is implemented.

#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
pub mod metrics;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod response;

#[cfg(feature = "web-axum")]
pub use router::{router, AppState};

#[cfg(feature = "web-axum")]
mod router {
    use std::sync::Arc;

    use axum::extract::FromRef;
    use axum::routing::{get, patch, post};
    use axum::Router;

    use domains::ports::SessionProvider;
    use services::ActionFacade;

    use crate::handlers;
    use crate::metrics::Metrics;
    use crate::middleware::{cors_policy, trace_layer};

    /// State shared across all requests.
    #[derive(Clone)]
    pub struct AppState {
        pub facade: Arc<ActionFacade>,
        pub sessions: Arc<dyn SessionProvider>,
        pub metrics: Arc<Metrics>,
    }

    impl FromRef<AppState> for Arc<dyn SessionProvider> {
        fn from_ref(state: &AppState) -> Self {
            state.sessions.clone()
        }
    }

    /// Mounts every route under `/api` plus `/metrics`.
    pub fn router(state: AppState) -> Router {
        let api = Router::new()
            .route("/session", post(handlers::issue_session))
            .route("/profile-ready", get(handlers::profile_ready))
            .route("/rate-limit/{action}", get(handlers::rate_limit_check))
            .route("/questions", post(handlers::create_question))
            .route(
                "/questions/{id}",
                patch(handlers::edit_question).delete(handlers::delete_question),
            )
            .route("/answers", post(handlers::create_answer))
            .route(
                "/answers/{id}",
                patch(handlers::edit_answer).delete(handlers::delete_answer),
            )
            .route("/answers/{id}/verify", post(handlers::verify_answer))
            .route("/replies", post(handlers::create_reply))
            .route("/votes", post(handlers::vote))
            .route("/reports", post(handlers::report))
            .route("/recovery-code", post(handlers::create_recovery_code))
            .route("/recover", post(handlers::recover_account));

        Router::new()
            .nest("/api", api)
            .route("/metrics", get(handlers::metrics))
            .layer(trace_layer())
            .layer(cors_policy())
            .with_state(state)
    }
}
