use super::state::AppState;
use crate::cleanup;
use crate::web::handlers::handler_404;
use crate::web::handlers::health::health;
use crate::web::handlers::recent::recent_decisions;
use crate::web::handlers::rooms::{add_option, create_room, get_room, join_room, spin, veto_option};
use anyhow::Result;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tokio::task::AbortHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/:code", get(get_room))
        .route("/rooms/:code/join", post(join_room))
        .route("/rooms/:code/options", post(add_option))
        .route("/rooms/:code/options/:option_id/veto", post(veto_option))
        .route("/rooms/:code/spin", post(spin))
        .route("/recent", get(recent_decisions))
        .route("/health", get(health));

    Router::new()
        .nest("/api", api_router)
        .fallback(handler_404)
        .layer(cors_layer(&state.config.app_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(app_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, COOKIE]);

    match HeaderValue::from_str(app_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!("app_url {:?} is not a valid origin, CORS disabled: {}", app_url, e);
            layer
        }
    }
}

pub struct App {
    state: AppState,
}

impl App {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn serve(self) -> Result<()> {
        let cleanup_task = cleanup::spawn_periodic(
            self.state.store.clone(),
            self.state.config.room_retention,
            self.state.config.cleanup_interval,
        );
        let sweeper_task = self.state.rate_limiter.clone().spawn_sweeper();

        let bind_addr = self.state.config.bind_addr.clone();
        let app = build_router(self.state);

        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        tracing::info!("listening on {}", listener.local_addr()?);

        // Background tasks are aborted once the shutdown signal arrives.
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal(vec![
                cleanup_task.abort_handle(),
                sweeper_task.abort_handle(),
            ]))
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(background_tasks: Vec<AbortHandle>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { for task in &background_tasks { task.abort() } },
        _ = terminate => { for task in &background_tasks { task.abort() } },
    }
}
