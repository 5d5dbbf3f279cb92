use course_payment_service::{config::Config, services::init_metrics, Application};
use service_core::observability::{init_tracing, TracingOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(&TracingOptions {
        service_name: config.service_name.clone(),
        filter: config.log.filter(),
        otlp_endpoint: config.common.otlp_endpoint.clone(),
    })?;
    init_metrics()?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
