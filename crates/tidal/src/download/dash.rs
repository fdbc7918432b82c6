use crate::error::Error;
use crate::manifest::DashStream;
use crate::{Tidal, response};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Segments per worker. Each worker downloads its group sequentially, which
/// bounds the open-connection count without a separate semaphore.
pub(crate) const CHUNK_GROUP_SIZE: u64 = 10;

pub(crate) fn group_count(segment_count: u64) -> u64 {
    segment_count.div_ceil(CHUNK_GROUP_SIZE)
}

/// The `[start, end)` segment index range of one chunk group.
pub(crate) fn group_bounds(group: u64, segment_count: u64) -> (u64, u64) {
    let start = group * CHUNK_GROUP_SIZE;
    let end = (start + CHUNK_GROUP_SIZE).min(segment_count);
    (start, end)
}

impl Tidal {
    /// Downloads a segmented DASH stream into `dest`.
    ///
    /// Workers write disjoint side files; the ordered assembly pass at the
    /// end establishes the canonical byte order. Any failure removes every
    /// side file and the partial destination.
    pub(crate) async fn download_dash(
        &self,
        stream: &DashStream,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let groups = group_count(stream.segment_count);
        tracing::debug!(
            segments = stream.segment_count,
            groups,
            dest = %dest.display(),
            "downloading dash stream"
        );

        let fetched = futures::future::try_join_all(
            (0..groups).map(|group| self.fetch_chunk_group(stream, dest, group, cancel)),
        )
        .await;

        let result = match fetched {
            Ok(_) => super::assemble_chunks(dest, groups).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            super::discard_chunks(dest, groups).await;
            return Err(e);
        }
        Ok(())
    }

    async fn fetch_chunk_group(
        &self,
        stream: &DashStream,
        dest: &Path,
        group: u64,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let path = super::chunk_path(dest, group);
        let mut side = tokio::fs::File::create(&path).await?;
        let creds = self.auth.snapshot();
        let (start, end) = group_bounds(group, stream.segment_count);

        for segment in start..end {
            let url = stream.url_template.replace("$Number$", &segment.to_string());
            let request = self
                .http
                .get(&url)
                .bearer_auth(&creds.access_token)
                .timeout(self.config.timeouts.download_dash_segment());

            let sent = cancel
                .run_until_cancelled(response::send(request))
                .await
                .ok_or(Error::Canceled)??;
            let (status, headers, body) = response::read(sent).await?;
            response::ensure_success(status, &headers, &body)?;
            if body.is_empty() {
                return Err(Error::InvalidPayload(format!(
                    "segment {segment} came back empty"
                )));
            }

            side.write_all(&body).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_23_segments_into_3_groups() {
        assert_eq!(group_count(23), 3);
        assert_eq!(group_bounds(0, 23), (0, 10));
        assert_eq!(group_bounds(1, 23), (10, 20));
        assert_eq!(group_bounds(2, 23), (20, 23));
    }

    #[test]
    fn exact_multiples_have_full_groups() {
        assert_eq!(group_count(20), 2);
        assert_eq!(group_bounds(1, 20), (10, 20));
        assert_eq!(group_count(1), 1);
        assert_eq!(group_bounds(0, 1), (0, 1));
    }
}
