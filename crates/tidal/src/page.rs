use crate::error::Error;
use serde::Deserialize;
use std::future::Future;

pub(crate) const PAGE_LIMIT: u32 = 100;

/// One page of a limit/offset catalog listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total_number_of_items: u64,
}

/// Drains a paged listing: fetch a page, accumulate it, and stop once the
/// remainder against the last reported total reaches zero. A page that adds
/// nothing while the server still reports missing items is a stall and fails
/// instead of spinning.
pub(crate) async fn drain_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, Error>>,
{
    let mut items = Vec::new();
    loop {
        let page = fetch(items.len() as u32).await?;
        let total = page.total_number_of_items;
        let got = page.items.len();
        items.extend(page.items);

        let rem = total.saturating_sub(items.len() as u64);
        if rem == 0 {
            return Ok(items);
        }
        if got == 0 {
            return Err(Error::InvalidPayload(format!(
                "paging stalled at {} of {total} items",
                items.len()
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn page(items: Vec<u32>, total: u64) -> Page<u32> {
        Page {
            items,
            total_number_of_items: total,
        }
    }

    #[tokio::test]
    async fn accumulates_until_total() {
        let calls = AtomicU32::new(0);
        let items = drain_pages(|offset| {
            calls.fetch_add(1, Ordering::SeqCst);
            let result = match offset {
                0 => Ok(page(vec![1, 2, 3], 5)),
                3 => Ok(page(vec![4, 5], 5)),
                _ => Err(Error::InvalidPayload("unexpected offset".into())),
            };
            async move { result }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_full_page_terminates_after_accumulating() {
        // the termination check runs after the page is folded in, so an
        // exactly-full first page never triggers a second request
        let items = drain_pages(|offset| {
            let result = match offset {
                0 => Ok(page(vec![1, 2], 2)),
                _ => Err(Error::InvalidPayload("paged past the end".into())),
            };
            async move { result }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_listing_is_empty() {
        let items = drain_pages(|_| async { Ok(page(vec![], 0)) }).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn stalled_paging_fails() {
        let result = drain_pages(|offset| {
            let result = match offset {
                0 => Ok(page(vec![1], 3)),
                _ => Ok(page(vec![], 3)),
            };
            async move { result }
        })
        .await;
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let result: Result<Vec<u32>, _> =
            drain_pages(|_| async { Err(Error::RateLimited) }).await;
        assert!(matches!(result, Err(Error::RateLimited)));
    }
}
