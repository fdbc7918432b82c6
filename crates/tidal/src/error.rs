use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not logged in")]
    LoginRequired,

    #[error("another login flow is already running")]
    LoginInProgress,

    #[error("login link expired before it was authorized")]
    LoginLinkExpired,

    #[error("another token refresh is already running")]
    TokenRefreshInProgress,

    #[error("access token rejected: {0}")]
    Unauthorized(String),

    #[error("rate limited")]
    RateLimited,

    #[error("another download is already running")]
    DownloadInProgress,

    #[error("artist links are not supported")]
    UnsupportedArtistLink,

    #[error("video links are not supported")]
    UnsupportedVideoLink,

    #[error("canceled")]
    Canceled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("unrecognized link: {0}")]
    InvalidLink(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected response ({status}): {tail}")]
    UnexpectedResponse { status: u16, tail: String },

    #[error("stream manifest is encrypted: {0}")]
    EncryptedStream(String),

    #[error("unsupported manifest mime type: {0}")]
    UnsupportedManifestMimeType(String),

    #[error("failed to decode manifest: {0}")]
    ManifestDecode(String),

    #[error("catalog payload invalid: {0}")]
    InvalidPayload(String),

    #[error("ffmpeg exited with {status}: {stderr_tail}")]
    Ffmpeg {
        status: std::process::ExitStatus,
        stderr_tail: String,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("xml parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
