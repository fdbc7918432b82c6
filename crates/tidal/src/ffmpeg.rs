use crate::error::Error;
use crate::track::{Track, TrackCredits};
use chrono::Datelike;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

const KILL_GRACE: Duration = Duration::from_secs(5);
const STDERR_TAIL_LEN: usize = 512;

/// The tag bundle written into a finished audio file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tags {
    pub artist: String,
    pub lead_performer: String,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub copyright: String,
    pub isrc: String,
    pub track: u32,
    pub track_total: Option<u32>,
    pub disc: u32,
    pub disc_total: Option<u32>,
    pub date: Option<chrono::NaiveDate>,
    pub lyrics: String,
    pub composers: Vec<String>,
    pub lyricists: Vec<String>,
    pub producers: Vec<String>,
    pub additional_producers: Vec<String>,
    pub version: Option<String>,
}

impl Tags {
    pub fn for_track(
        track: &Track,
        credits: &TrackCredits,
        lyrics: String,
        totals: Option<(u32, u32)>,
    ) -> Self {
        Self {
            artist: track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            lead_performer: track.lead_artist().unwrap_or_default().to_string(),
            title: track.title.clone(),
            album: track.album.title.clone(),
            album_artist: track.lead_artist().unwrap_or_default().to_string(),
            copyright: track.copyright.clone().unwrap_or_default(),
            isrc: track.isrc.clone().unwrap_or_default(),
            track: track.track_number,
            track_total: totals.map(|(tracks, _)| tracks),
            disc: track.volume_number,
            disc_total: totals.map(|(_, volumes)| volumes),
            date: track.album.release_date,
            lyrics,
            composers: credits.composers.clone(),
            lyricists: credits.lyricists.clone(),
            producers: credits.producers.clone(),
            additional_producers: credits.additional_producers.clone(),
            version: track.version.clone(),
        }
    }

    /// The `-metadata key=value` pairs, in a stable order.
    fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("artist".into(), self.artist.clone()),
            ("lead_performer".into(), self.lead_performer.clone()),
            ("title".into(), self.title.clone()),
            ("album".into(), self.album.clone()),
            ("album_artist".into(), self.album_artist.clone()),
            ("copyright".into(), self.copyright.clone()),
            ("isrc".into(), self.isrc.clone()),
            ("track".into(), self.track.to_string()),
            ("disc".into(), self.disc.to_string()),
        ];
        if let Some(total) = self.track_total {
            pairs.push(("tracktotal".into(), total.to_string()));
        }
        if let Some(total) = self.disc_total {
            pairs.push(("disctotal".into(), total.to_string()));
        }
        if let Some(date) = self.date {
            pairs.push(("date".into(), date.format("%Y-%m-%d").to_string()));
            pairs.push(("year".into(), date.year().to_string()));
        }
        pairs.push(("lyrics".into(), self.lyrics.clone()));
        if !self.composers.is_empty() {
            pairs.push(("composer".into(), self.composers.join(", ")));
        }
        if !self.lyricists.is_empty() {
            pairs.push(("lyricist".into(), self.lyricists.join(", ")));
        }
        if !self.producers.is_empty() {
            pairs.push(("producer".into(), self.producers.join(", ")));
        }
        if !self.additional_producers.is_empty() {
            pairs.push(("coproducer".into(), self.additional_producers.join(", ")));
        }
        if let Some(version) = &self.version {
            pairs.push(("version".into(), version.clone()));
        }
        pairs
    }
}

fn embed_args(audio: &Path, cover: &Path, tags: &Tags, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        audio.into(),
        "-i".into(),
        cover.into(),
        "-map".into(),
        "0".into(),
        "-map".into(),
        "1".into(),
        "-c".into(),
        "copy".into(),
        "-disposition:v:0".into(),
        "attached_pic".into(),
    ];
    for (key, value) in tags.pairs() {
        args.push("-metadata".into());
        args.push(format!("{key}={value}").into());
    }
    args.push(output.into());
    args
}

/// Appends `.<ext>` to a path that has no extension of its own.
fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Embeds tags and cover art into the audio file at `path`.
///
/// ffmpeg writes to `<path>.<ext>`; only on success is the output renamed
/// over the original, so a failure leaves the audio untouched.
pub(crate) async fn embed(
    audio: &Path,
    cover: &Path,
    tags: &Tags,
    ext: &str,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let output = with_appended_extension(audio, ext);
    let args = embed_args(audio, cover, tags, &output);

    let result = run(args, cancel).await;
    match result {
        Ok(()) => {
            tokio::fs::rename(&output, audio).await?;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&output).await;
            Err(e)
        }
    }
}

/// Best-effort chroma-subsampling normalization for cover art.
pub(crate) async fn normalize_cover(cover: &Path) -> Result<(), Error> {
    let output = with_appended_extension(cover, "norm.jpg");
    let args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        cover.into(),
        "-pix_fmt".into(),
        "yuvj420p".into(),
        output.as_os_str().to_owned(),
    ];

    let result = run(args, &CancellationToken::new()).await;
    match result {
        Ok(()) => {
            tokio::fs::rename(&output, cover).await?;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&output).await;
            Err(e)
        }
    }
}

/// Runs ffmpeg detached into its own process group.
///
/// Cancellation signals the whole group with SIGTERM and escalates to
/// SIGKILL after a grace period, so a wedged transcode cannot outlive us.
async fn run(args: Vec<OsString>, cancel: &CancellationToken) -> Result<(), Error> {
    let mut command = Command::new("ffmpeg");
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;
    let mut stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status?,
        None => {
            terminate(&mut child).await;
            return Err(Error::Canceled);
        }
    };

    if !status.success() {
        let stderr = stderr_task.await.unwrap_or_default();
        return Err(Error::Ffmpeg {
            status,
            stderr_tail: stderr_tail(&stderr),
        });
    }
    Ok(())
}

#[cfg(unix)]
async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGTERM);
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let tail: String = text
        .chars()
        .rev()
        .take(STDERR_TAIL_LEN)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    tail
}
