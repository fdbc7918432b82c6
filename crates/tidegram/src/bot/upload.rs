use bytesize::ByteSize;
use std::path::{Path, PathBuf};
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tidal::LinkKind;
use tidal::descriptor::{self, AUDIO_FILE, AlbumInfo, COVER_FILE, ListInfo, TrackInfo};

/// Sends every finished track of a downloaded entity to the destination
/// chat, in descriptor order, then removes the entity subtree. Returns the
/// number of uploaded tracks.
pub(crate) async fn send_entity(
    bot: &Bot,
    chat: ChatId,
    kind: LinkKind,
    dir: &Path,
) -> anyhow::Result<usize> {
    let count = match kind {
        LinkKind::Track => {
            send_track(bot, chat, dir, None).await?;
            1
        }
        LinkKind::Album => {
            let info: AlbumInfo = descriptor::read(dir).await?;
            let cover = dir.join(COVER_FILE);
            let mut count = 0;
            for (volume, row) in info.volume_track_ids.iter().enumerate() {
                for track_id in row {
                    let track_dir = dir
                        .join((volume as u32 + 1).to_string())
                        .join(track_id.to_string());
                    send_track(bot, chat, &track_dir, Some(cover.clone())).await?;
                    count += 1;
                }
            }
            count
        }
        _ => {
            let info: ListInfo = descriptor::read(dir).await?;
            let mut count = 0;
            for track_id in &info.track_ids {
                send_track(bot, chat, &dir.join(track_id.to_string()), None).await?;
                count += 1;
            }
            count
        }
    };

    tokio::fs::remove_dir_all(dir).await?;
    tracing::info!(dir = %dir.display(), count, "entity uploaded and cleaned up");
    Ok(count)
}

/// One audio upload: named from the descriptor, captioned, with the cover as
/// thumbnail.
async fn send_track(
    bot: &Bot,
    chat: ChatId,
    dir: &Path,
    shared_cover: Option<PathBuf>,
) -> anyhow::Result<()> {
    let info: TrackInfo = descriptor::read(dir).await?;
    let audio = dir.join(AUDIO_FILE);
    let cover = shared_cover.unwrap_or_else(|| dir.join(COVER_FILE));

    let file_name = format!("{} - {}.{}", info.lead_artist, info.title, info.extension);
    let size = tokio::fs::metadata(&audio).await?.len();
    tracing::info!(file = %file_name, size = %ByteSize(size), "uploading track");

    bot.send_audio(chat, InputFile::file(audio).file_name(file_name))
        .caption(info.caption.clone())
        .performer(info.lead_artist.clone())
        .title(info.title.clone())
        .thumbnail(InputFile::file(cover))
        .await?;

    Ok(())
}
