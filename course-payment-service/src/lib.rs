pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use std::sync::Arc;

use config::Config;
use services::{CheckoutService, PaymentGateway, PaymentStore, Reconciler};

pub use startup::Application;

/// Shared application state, built once per process.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn PaymentStore>,
    pub checkout: CheckoutService,
    pub reconciler: Reconciler,
    pub gateway_configured: bool,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_configured: bool,
    ) -> Self {
        let checkout = CheckoutService::new(
            store.clone(),
            gateway.clone(),
            config.checkout.clone(),
        );
        let reconciler = Reconciler::new(store.clone(), gateway);

        Self {
            config,
            store,
            checkout,
            reconciler,
            gateway_configured,
        }
    }
}
