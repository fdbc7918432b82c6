mod bot;
mod config;

use tidal::Tidal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or("tidal=debug,tidegram=debug".into()),
        )
        .init();

    let config = config::load()?;
    let engine = Tidal::new(config.engine.clone()).await?;

    bot::start(engine, config).await?;

    Ok(())
}
