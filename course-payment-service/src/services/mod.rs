pub mod checkout;
pub mod events;
pub mod fedapay;
pub mod gateway;
pub mod in_memory;
pub mod metrics;
pub mod reconciliation;
pub mod redirect;
pub mod repository;
pub mod store;
pub mod sweeper;
pub mod webhook_signature;

pub use checkout::{CheckoutError, CheckoutService};
pub use fedapay::FedaPayClient;
pub use gateway::{GatewayError, PaymentGateway};
pub use in_memory::InMemoryPaymentStore;
pub use self::metrics::{get_metrics, init_metrics};
pub use reconciliation::Reconciler;
pub use repository::PaymentRepository;
pub use store::PaymentStore;
pub use sweeper::PendingPaymentSweeper;
