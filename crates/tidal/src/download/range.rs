use crate::error::Error;
use crate::manifest::RawStream;
use crate::{Tidal, response};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use std::path::Path;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub(crate) const RANGE_CHUNK_SIZE: u64 = 1024 * 1024;

/// Inclusive byte ranges of at most 1 MiB covering `[0, size)`.
pub(crate) fn byte_ranges(size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::with_capacity(size.div_ceil(RANGE_CHUNK_SIZE) as usize);
    let mut start = 0;
    while start < size {
        let end = (start + RANGE_CHUNK_SIZE).min(size) - 1;
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

impl Tidal {
    /// Downloads a single-URL stream by concurrent byte-range parts.
    ///
    /// A HEAD sizes the file, each part GET must answer 206, and the part
    /// count in flight is bounded by the configured limit.
    pub(crate) async fn download_raw(
        &self,
        stream: &RawStream,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let size = self.raw_stream_size(stream, cancel).await?;
        let ranges = byte_ranges(size);
        if ranges.is_empty() {
            return Err(Error::InvalidPayload("stream has zero length".into()));
        }
        let count = ranges.len() as u64;
        tracing::debug!(size, parts = count, dest = %dest.display(), "downloading raw stream");

        let creds = self.auth.snapshot();
        let parts = Semaphore::new(self.config.concurrency.vnd_track_parts);

        let fetched = futures::future::try_join_all(ranges.into_iter().enumerate().map(
            |(index, (start, end))| {
                let parts = &parts;
                let token = creds.access_token.as_str();
                async move {
                    let _permit = parts.acquire().await.map_err(|_| Error::Canceled)?;
                    let path = super::chunk_path(dest, index as u64);

                    let request = self
                        .http
                        .get(&stream.url)
                        .bearer_auth(token)
                        .header(RANGE, format!("bytes={start}-{end}"))
                        .timeout(self.config.timeouts.download_vnd_segment());
                    let sent = cancel
                        .run_until_cancelled(response::send(request))
                        .await
                        .ok_or(Error::Canceled)??;
                    let (status, headers, body) = response::read(sent).await?;
                    response::ensure_success(status, &headers, &body)?;
                    if status != StatusCode::PARTIAL_CONTENT {
                        return Err(Error::UnexpectedResponse {
                            status: status.as_u16(),
                            tail: "expected 206 for a ranged request".into(),
                        });
                    }
                    let expected = end - start + 1;
                    if body.len() as u64 != expected {
                        return Err(Error::InvalidPayload(format!(
                            "range {start}-{end} returned {} bytes, expected {expected}",
                            body.len()
                        )));
                    }

                    tokio::fs::write(&path, &body).await?;
                    Ok(())
                }
            },
        ))
        .await;

        let result = match fetched {
            Ok(_) => super::assemble_chunks(dest, count).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            super::discard_chunks(dest, count).await;
            return Err(e);
        }
        Ok(())
    }

    async fn raw_stream_size(
        &self,
        stream: &RawStream,
        cancel: &CancellationToken,
    ) -> Result<u64, Error> {
        let creds = self.auth.snapshot();
        let request = self
            .http
            .head(&stream.url)
            .bearer_auth(&creds.access_token)
            .timeout(self.config.timeouts.get_vnd_track_file_size());

        let sent = cancel
            .run_until_cancelled(response::send(request))
            .await
            .ok_or(Error::Canceled)??;
        let (status, headers, body) = response::read(sent).await?;
        response::ensure_success(status, &headers, &body)?;
        if status != StatusCode::OK {
            return Err(Error::UnexpectedResponse {
                status: status.as_u16(),
                tail: "expected 200 for the sizing request".into(),
            });
        }

        headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::InvalidPayload("sizing response lacks content-length".into()))
    }
}
