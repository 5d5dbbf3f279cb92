//! Application startup and lifecycle management.

use axum::middleware::from_fn;
use axum::{
    routing::{get, patch, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::{Config, SessionConfig, StorageBackend};
use crate::handlers;
use crate::services::{
    FedaPayClient, InMemoryPaymentStore, PaymentRepository, PaymentStore, PendingPaymentSweeper,
};
use crate::AppState;

pub fn build_router(state: AppState, session: &SessionConfig) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(session.secure_cookie)
        // Lax so the cookie survives the top-level redirect back from the gateway
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(2)));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/courses/:course_id/enrollments",
            post(handlers::enrollments::create_enrollment),
        )
        .route("/enrollments/:id", get(handlers::enrollments::get_enrollment))
        .route(
            "/enrollments/:id/payment",
            post(handlers::payments::start_checkout),
        )
        .route(
            handlers::payments::CALLBACK_PATH,
            get(handlers::payments::payment_callback),
        )
        .route(
            "/payments/:transaction_id/status",
            patch(handlers::manager::override_payment_status),
        )
        .route("/session/messages", get(handlers::flash::take_flash))
        .route("/webhooks/fedapay", post(handlers::webhooks::fedapay_webhook))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                    learner_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    sweeper: Option<PendingPaymentSweeper>,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn PaymentStore> = match config.storage.backend {
            StorageBackend::MongoDb => {
                let mut client_options =
                    ClientOptions::parse(config.storage.mongodb_uri.expose_secret()).await?;
                client_options.app_name = Some(config.service_name.clone());

                let client = Client::with_options(client_options)?;
                let db = client.database(&config.storage.database);

                let repository = PaymentRepository::new(&db);
                repository.init_indexes().await?;
                Arc::new(repository)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage - records are lost on restart");
                Arc::new(InMemoryPaymentStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    /// Builds the application around an existing store.
    pub async fn build_with_store(
        config: Config,
        store: Arc<dyn PaymentStore>,
    ) -> anyhow::Result<Self> {
        let fedapay = FedaPayClient::new(config.fedapay.clone())?;
        let gateway_configured = fedapay.is_configured();
        if gateway_configured {
            tracing::info!(
                environment = %config.fedapay.environment,
                "FedaPay client initialized"
            );
        } else {
            tracing::warn!("FedaPay credentials not configured - checkout will fail");
        }
        if config.fedapay.webhook_secret.expose_secret().is_empty() {
            tracing::warn!("FEDAPAY_AUTH_KEY not set - all webhooks will be rejected");
        }

        let sweeper = config
            .sweeper
            .enabled()
            .then(|| PendingPaymentSweeper::new(store.clone(), &config.sweeper));

        let state = AppState::new(
            config.clone(),
            store,
            Arc::new(fedapay),
            gateway_configured,
        );
        let router = build_router(state, &config.session);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            sweeper,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = self
            .sweeper
            .map(|sweeper| tokio::spawn(sweeper.run(shutdown_rx)));

        tracing::info!("Listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        let _ = shutdown_tx.send(true);
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sweeper task failed");
            }
        }

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
