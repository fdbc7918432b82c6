use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub engine: tidal::Config,
}

#[derive(Debug, Deserialize)]
pub struct BotConfig {
    pub token: String,
    /// Chat that receives the uploaded audio.
    pub chat_id: i64,
}

/// Layered load: `./config.toml`, then the user config dir, then
/// `TIDEGRAM_*` environment variables (e.g. `TIDEGRAM_BOT_TOKEN`).
pub fn load() -> anyhow::Result<Config> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("failed to get config directory"))?
        .join("tidegram")
        .join("config.toml");

    Ok(Figment::new()
        .merge(Toml::file("config.toml"))
        .merge(Toml::file(config_dir))
        .merge(Env::prefixed("TIDEGRAM_").split("_"))
        .extract()?)
}
