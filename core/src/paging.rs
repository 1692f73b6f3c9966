//! Continuation-token paging.
//!
//! List operations return pages carrying an opaque continuation token; an
//! absent token signals exhaustion. [`Pager`] drives the fetch loop and
//! exposes both an explicit page-by-page cursor and a flat item stream. The
//! token rides on each yielded [`Page`], so a caller can persist it and
//! later resume a fresh pager from that point with
//! [`by_page`](Pager::by_page).

use crate::error::Error;
use futures::future::BoxFuture;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// The standard list-response wire shape: a batch of items plus the link to
/// the next batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub value: Vec<T>,
    #[serde(rename = "nextLink")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

/// One page of results.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` means the sequence is exhausted.
    pub continuation_token: Option<String>,
}

/// Settings for starting (or resuming) page-by-page iteration.
#[derive(Clone, Debug, Default)]
pub struct PageSettings {
    /// Resume from a token saved off a previously yielded page.
    pub continuation_token: Option<String>,
    /// Server-side page size cap. Rejected with
    /// [`Error::MaxPageSizeUnsupported`] when the operation's wire protocol
    /// has no page-size knob.
    pub max_page_size: Option<u32>,
}

type PageFetcher<T> =
    Arc<dyn Fn(Option<String>, Option<u32>) -> BoxFuture<'static, Result<Page<T>, Error>> + Send + Sync>;

enum PagerState {
    Start(Option<String>),
    Continuation(String),
    Done,
}

/// Drives a paged list operation.
///
/// The fetcher is called with the continuation token of the page to fetch
/// (`None` for the first page) and the optional page-size cap. A fetch
/// failure is surfaced at that pull and leaves the cursor in place, so
/// pages already yielded stay valid and the failed pull may be retried.
pub struct Pager<T> {
    fetch: PageFetcher<T>,
    supports_max_page_size: bool,
    max_page_size: Option<u32>,
    state: PagerState,
}

impl<T> std::fmt::Debug for Pager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("supports_max_page_size", &self.supports_max_page_size)
            .field("max_page_size", &self.max_page_size)
            .finish_non_exhaustive()
    }
}

impl<T> Pager<T> {
    /// Creates a pager for an operation without a page-size knob.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(Option<String>, Option<u32>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Page<T>, Error>> + Send + 'static,
    {
        Self::build(fetch, false)
    }

    /// Creates a pager for an operation that honors a page-size cap.
    pub fn with_page_size_support<F, Fut>(fetch: F) -> Self
    where
        F: Fn(Option<String>, Option<u32>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Page<T>, Error>> + Send + 'static,
    {
        Self::build(fetch, true)
    }

    fn build<F, Fut>(fetch: F, supports_max_page_size: bool) -> Self
    where
        F: Fn(Option<String>, Option<u32>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Page<T>, Error>> + Send + 'static,
    {
        Self {
            fetch: Arc::new(
                move |token, max| -> BoxFuture<'static, Result<Page<T>, Error>> {
                    Box::pin(fetch(token, max))
                },
            ),
            supports_max_page_size,
            max_page_size: None,
            state: PagerState::Start(None),
        }
    }

    /// A fresh pager starting from the given settings.
    ///
    /// Fails with [`Error::MaxPageSizeUnsupported`] when a page-size cap is
    /// requested from an operation that cannot honor one.
    pub fn by_page(&self, settings: PageSettings) -> Result<Pager<T>, Error> {
        if settings.max_page_size.is_some() && !self.supports_max_page_size {
            return Err(Error::MaxPageSizeUnsupported);
        }
        Ok(Pager {
            fetch: self.fetch.clone(),
            supports_max_page_size: self.supports_max_page_size,
            max_page_size: settings.max_page_size,
            state: PagerState::Start(settings.continuation_token),
        })
    }

    /// Fetches the next page, or `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Page<T>, Error>> {
        let token = match &self.state {
            PagerState::Done => return None,
            PagerState::Start(token) => token.clone(),
            PagerState::Continuation(token) => Some(token.clone()),
        };
        match (self.fetch)(token, self.max_page_size).await {
            Ok(page) => {
                self.state = match &page.continuation_token {
                    Some(token) => PagerState::Continuation(token.clone()),
                    None => PagerState::Done,
                };
                Some(Ok(page))
            }
            // Cursor unchanged: the caller may retry this pull.
            Err(e) => Some(Err(e)),
        }
    }

    /// Flattens the pages into a stream of items.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Error>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(
            (self, VecDeque::new()),
            |(mut pager, mut buffer)| async move {
                loop {
                    if let Some(item) = buffer.pop_front() {
                        return Some((Ok(item), (pager, buffer)));
                    }
                    match pager.next_page().await? {
                        Ok(page) => buffer.extend(page.items),
                        Err(e) => return Some((Err(e), (pager, buffer))),
                    }
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_none, assert_ok};
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Three pages keyed by token: None -> t1 -> t2 -> end.
    fn three_page_fetcher(calls: Arc<AtomicUsize>) -> Pager<i32> {
        Pager::new(move |token: Option<String>, _max: Option<u32>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let page = match token.as_deref() {
                    None => Page {
                        items: vec![1, 2],
                        continuation_token: Some("t1".to_string()),
                    },
                    Some("t1") => Page {
                        items: vec![3, 4],
                        continuation_token: Some("t2".to_string()),
                    },
                    Some("t2") => Page {
                        items: vec![5],
                        continuation_token: None,
                    },
                    Some(other) => {
                        return Err(Error::Configuration(format!("unexpected token {other}")));
                    }
                };
                Ok(page)
            }
        })
    }

    #[tokio::test]
    async fn cursor_walks_all_pages_and_terminates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pager = three_page_fetcher(calls.clone());

        let first = assert_ok!(pager.next_page().await.unwrap());
        assert_eq!(first.items, vec![1, 2]);
        assert_eq!(first.continuation_token.as_deref(), Some("t1"));

        let second = assert_ok!(pager.next_page().await.unwrap());
        assert_eq!(second.continuation_token.as_deref(), Some("t2"));

        let third = assert_ok!(pager.next_page().await.unwrap());
        assert_none!(third.continuation_token);

        assert!(pager.next_page().await.is_none());
        assert!(pager.next_page().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stream_yields_all_items_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pager = three_page_fetcher(calls.clone());

        let items: Vec<i32> = pager
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn by_page_resumes_from_a_saved_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pager = three_page_fetcher(calls);

        let mut resumed = assert_ok!(pager.by_page(PageSettings {
            continuation_token: Some("t2".to_string()),
            max_page_size: None,
        }));
        let page = assert_ok!(resumed.next_page().await.unwrap());
        assert_eq!(page.items, vec![5]);
        assert!(resumed.next_page().await.is_none());
    }

    #[tokio::test]
    async fn max_page_size_rejected_without_support() {
        let pager = Pager::<i32>::new(|_token, _max| async {
            Ok(Page {
                items: vec![],
                continuation_token: None,
            })
        });
        let err = pager
            .by_page(PageSettings {
                continuation_token: None,
                max_page_size: Some(10),
            })
            .unwrap_err();
        assert!(matches!(err, Error::MaxPageSizeUnsupported));
    }

    #[tokio::test]
    async fn failed_pull_leaves_cursor_retryable() {
        let fail_once = Arc::new(Mutex::new(true));
        let mut pager = Pager::new(move |token: Option<String>, _max| {
            let fail_once = fail_once.clone();
            async move {
                match token.as_deref() {
                    None => Ok(Page {
                        items: vec![1],
                        continuation_token: Some("t1".to_string()),
                    }),
                    Some("t1") => {
                        let mut pending = fail_once.lock().unwrap();
                        if *pending {
                            *pending = false;
                            Err(Error::Transport {
                                url: "https://example.org".to_string(),
                                reason: "connection reset".to_string(),
                            })
                        } else {
                            Ok(Page {
                                items: vec![2],
                                continuation_token: None,
                            })
                        }
                    }
                    Some(other) => Err(Error::Configuration(format!("unexpected token {other}"))),
                }
            }
        });

        assert_ok!(pager.next_page().await.unwrap());
        let failed = pager.next_page().await.unwrap();
        assert!(failed.is_err());
        // Same pull again succeeds.
        let page = assert_ok!(pager.next_page().await.unwrap());
        assert_eq!(page.items, vec![2]);
        assert!(pager.next_page().await.is_none());
    }
}
