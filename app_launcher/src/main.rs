use app_launcher::{config, shutdown_signal, HttpHealthChecker, Launcher, SystemBrowser, TokioSpawner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .init();

    let config = config::get_configuration()?;
    let checker = HttpHealthChecker::new(&config)?;

    let spawner = TokioSpawner::new(config.shutdown_grace());

    let launcher = Launcher::new(config, checker, spawner, SystemBrowser);
    launcher.run(shutdown_signal()).await?;

    Ok(())
}
