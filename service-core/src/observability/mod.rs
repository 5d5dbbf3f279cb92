pub mod logging;

pub use logging::{TracingOptions, init_tracing};
