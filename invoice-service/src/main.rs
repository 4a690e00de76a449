use invoice_service::config::InvoiceConfig;
use invoice_service::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InvoiceConfig::load().expect("Failed to load configuration");
    init_tracing("invoice-service", &config.common.log_level);

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
