mod upload;

use crate::config::Config;
use std::sync::Arc;
use teloxide::utils::command::BotCommands;
use teloxide::{dptree, prelude::*};
use tidal::id::ArtistId;
use tidal::{Link, LinkKind, Tidal};
use tokio_util::sync::CancellationToken;

pub struct App {
    pub engine: Tidal,
    pub chat_id: ChatId,
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "send a tidal link to download it, or use:"
)]
enum Command {
    #[command(description = "show login state")]
    Start,
    #[command(description = "log in with a device link")]
    Login,
    #[command(description = "forget stored credentials")]
    Logout,
    #[command(description = "download every track an artist is credited on")]
    Credits(String),
}

pub async fn start(engine: Tidal, config: Config) -> anyhow::Result<()> {
    tracing::info!("starting bot");

    let bot = Bot::new(config.bot.token.clone());
    let app = Arc::new(App {
        engine,
        chat_id: ChatId(config.bot.chat_id),
    });

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    app: Arc<App>,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => {
            let creds = app.engine.credentials();
            let text = if creds.is_logged_in() {
                let expires = chrono::DateTime::from_timestamp(creds.expires_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".into());
                format!(
                    "logged in (country {}), token expires {expires}. send a link to download.",
                    creds.country_code
                )
            } else {
                "not logged in. use /login first.".into()
            };
            bot.send_message(msg.chat.id, text).await?;
        }

        Command::Login => {
            match app.engine.start_login(CancellationToken::new()).await {
                Ok(flow) => {
                    bot.send_message(
                        msg.chat.id,
                        format!("open {} and approve the login.", flow.verification_url),
                    )
                    .await?;

                    let bot = bot.clone();
                    let chat = msg.chat.id;
                    tokio::spawn(async move {
                        let text = match flow.finished().await {
                            Ok(()) => "logged in.".to_string(),
                            Err(e) => format!("login failed: {e}"),
                        };
                        if let Err(e) = bot.send_message(chat, text).await {
                            tracing::error!(error = %e, "failed to report login outcome");
                        }
                    });
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("login failed: {e}"))
                        .await?;
                }
            }
        }

        Command::Logout => {
            let text = match app.engine.logout().await {
                Ok(()) => "credentials removed.".to_string(),
                Err(e) => format!("logout failed: {e}"),
            };
            bot.send_message(msg.chat.id, text).await?;
        }

        Command::Credits(arg) => {
            let id = parse_artist_id(&arg);
            let Some(id) = id else {
                bot.send_message(msg.chat.id, "usage: /credits <artist link or id>")
                    .await?;
                return Ok(());
            };

            bot.send_message(msg.chat.id, "downloading artist credits...")
                .await?;
            let cancel = CancellationToken::new();
            match app.engine.download_artist_credits(id, &cancel).await {
                Ok(dir) => {
                    report_upload(&bot, &msg, &app, LinkKind::Artist, &dir).await?;
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("download failed: {e}"))
                        .await?;
                }
            }
        }
    }

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, app: Arc<App>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(link) = text
        .split_whitespace()
        .find_map(|token| Link::parse(token).ok())
    else {
        return Ok(());
    };

    tracing::info!(kind = ?link.kind, id = %link.id, "link received");
    bot.send_message(msg.chat.id, "downloading...").await?;

    let cancel = CancellationToken::new();
    match app.engine.download(&link, &cancel).await {
        Ok(dir) => {
            report_upload(&bot, &msg, &app, link.kind, &dir).await?;
        }
        Err(e) => {
            tracing::error!(error = %e, "download failed");
            bot.send_message(msg.chat.id, format!("download failed: {e}"))
                .await?;
        }
    }

    Ok(())
}

async fn report_upload(
    bot: &Bot,
    msg: &Message,
    app: &App,
    kind: LinkKind,
    dir: &std::path::Path,
) -> ResponseResult<()> {
    match upload::send_entity(bot, app.chat_id, kind, dir).await {
        Ok(count) => {
            bot.send_message(msg.chat.id, format!("done, uploaded {count} track(s)."))
                .await?;
        }
        Err(e) => {
            tracing::error!(error = %e, "upload failed");
            bot.send_message(msg.chat.id, format!("upload failed: {e}"))
                .await?;
        }
    }
    Ok(())
}

/// Accepts a bare numeric id or any artist link.
fn parse_artist_id(arg: &str) -> Option<ArtistId> {
    let arg = arg.trim();
    if let Ok(id) = arg.parse::<ArtistId>() {
        return Some(id);
    }
    match Link::parse(arg) {
        Ok(link) if link.kind == LinkKind::Artist => link.id.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_id_from_id_or_link() {
        assert!(parse_artist_id("3566512").is_some());
        assert!(parse_artist_id("https://tidal.com/artist/3566512").is_some());
        assert!(parse_artist_id("https://tidal.com/album/1").is_none());
        assert!(parse_artist_id("nonsense").is_none());
    }
}
