use tender_notifier::browser::ChromePageSource;
use tender_notifier::config::{ConfigManager, FileConfigManager};
use tender_notifier::monitor::TenderMonitor;
use tender_notifier::notifier::{EmailNotifier, NotificationManager};
use tender_notifier::storage::JsonMatchStore;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> tender_notifier::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_manager = FileConfigManager::from_env();
    let config = config_manager.load_config().await?;

    tracing::info!("Starting tender check for {} site(s)", config.sites.len());

    let mut notifications = NotificationManager::new();
    notifications.add_provider(Box::new(EmailNotifier::new(config.email.clone())));

    let monitor = TenderMonitor::new(
        &config,
        ChromePageSource::new(config.browser.clone()),
        JsonMatchStore::new(config.storage.matches_file.clone()),
        notifications,
    )?;

    match monitor.run_once().await {
        Ok(summary) => {
            tracing::info!(
                "Tender check complete: {} new match(es), {} notification(s) delivered",
                summary.new_matches,
                summary.notifications_delivered
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Tender check failed: {}", e);
            Err(e)
        }
    }
}
