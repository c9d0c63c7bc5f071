//! Next-link pagination.
//!
//! List endpoints answer with one page of `data` plus, while more remain, a
//! `links.next` URL. Each page's URL comes from the previous page, so pages
//! are always fetched one after another.
//!
//! Two ways to walk them are offered:
//!
//! - [`ConnectClient::collect_all`] / [`ConnectClient::collect_pages`] fetch
//!   eagerly and return everything at once.
//! - [`ConnectClient::stream`] returns a [`PaginatedStream`] that fetches a
//!   page only when the previous one has been consumed.
//!
//! Every walk is bounded by `max_pages`. Reaching the bound with a `next`
//! link still pending is not an error; [`Collected::is_complete`] tells the
//! two cases apart. A `max_pages` of `0` is treated as `1`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ClientInner, ConnectClient, Request};
use crate::models::Document;
use crate::Result;

/// Page ceiling used by call-sites that have no better bound.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Result of an eager walk.
#[derive(Debug, Clone)]
pub struct Collected<T> {
    /// Items of every fetched page, in the order received.
    pub items: Vec<T>,
    /// Number of pages fetched.
    pub pages_fetched: usize,
    /// The `next` link of the last fetched page, if the walk was capped.
    pub next: Option<String>,
    /// `meta.paging.total` of the last page that carried it.
    pub total: Option<u64>,
}

impl<T> Collected<T> {
    /// `true` when the last fetched page had no `next` link.
    pub fn is_complete(&self) -> bool {
        self.next.is_none()
    }
}

fn page_limit(max_pages: usize) -> usize {
    max_pages.max(1)
}

impl ConnectClient {
    /// Fetch every page of a list endpoint, up to `max_pages`, and return the
    /// items in order.
    ///
    /// The first failing page aborts the walk; no partial result is returned.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use connect_core::{ConnectClient, Request};
    ///
    /// # async fn example(client: ConnectClient) -> connect_core::Result<()> {
    /// let builds: Vec<serde_json::Value> = client
    ///     .collect_all(Request::get("/v1/builds").query("limit", "200"), 10)
    ///     .await?;
    /// println!("{} builds", builds.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn collect_all<T: DeserializeOwned>(
        &self,
        request: Request,
        max_pages: usize,
    ) -> Result<Vec<T>> {
        Ok(self.inner.collect_pages(&request, max_pages).await?.items)
    }

    /// Like [`collect_all`](Self::collect_all), but also reports how many
    /// pages were fetched and whether the walk was cut short.
    pub async fn collect_pages<T: DeserializeOwned>(
        &self,
        request: Request,
        max_pages: usize,
    ) -> Result<Collected<T>> {
        self.inner.collect_pages(&request, max_pages).await
    }

    /// Lazily walk the pages of a list endpoint, yielding one item at a time.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use futures_util::StreamExt;
    /// use connect_core::{ConnectClient, Request};
    ///
    /// # async fn example(client: ConnectClient) -> connect_core::Result<()> {
    /// let mut apps = client.stream::<serde_json::Value>(Request::get("/v1/apps"), 5);
    ///
    /// while let Some(app) = apps.next().await {
    ///     println!("{}", app?["id"]);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn stream<T>(&self, request: Request, max_pages: usize) -> PaginatedStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let inner = self.inner.clone();
        PaginatedStream::new(max_pages, move |next: Option<String>| {
            let inner = inner.clone();
            let request = match next {
                Some(url) => Request::get(url),
                None => request.clone(),
            };
            Box::pin(async move { inner.fetch::<Vec<T>>(&request).await })
        })
    }
}

impl ClientInner {
    pub(crate) async fn collect_pages<T: DeserializeOwned>(
        &self,
        request: &Request,
        max_pages: usize,
    ) -> Result<Collected<T>> {
        let max_pages = page_limit(max_pages);
        let mut items = Vec::new();
        let mut next: Option<String> = None;
        let mut total = None;
        let mut pages_fetched = 0;

        while pages_fetched < max_pages {
            let page: Document<Vec<T>> = match &next {
                Some(url) => self.fetch(&Request::get(url.as_str())).await?,
                None => self.fetch(request).await?,
            };
            pages_fetched += 1;

            total = page.total().or(total);
            next = page.next_link().map(str::to_string);
            debug!(
                page = pages_fetched,
                items = page.data.len(),
                has_next = next.is_some(),
                "Fetched page"
            );
            items.extend(page.data);

            if next.is_none() {
                break;
            }
        }

        if next.is_some() {
            debug!(pages_fetched, "Page ceiling reached; result is partial");
        }

        Ok(Collected {
            items,
            pages_fetched,
            next,
            total,
        })
    }
}

/// Type alias for a boxed future used internally.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type FetchPage<T> =
    Box<dyn Fn(Option<String>) -> BoxFuture<'static, Result<Document<Vec<T>>>> + Send + Sync>;

enum Cursor {
    First,
    Next(String),
    Done,
}

/// A stream that lazily follows `links.next`.
///
/// Items are yielded in the order the service returned them. The stream
/// ends after the last page, after `max_pages` pages, or right after the
/// first error.
pub struct PaginatedStream<T> {
    /// Fetches the first page (`None`) or the page at a `next` URL.
    fetch_page: FetchPage<T>,
    /// Items of the current page not yet yielded.
    current_items: VecDeque<T>,
    cursor: Cursor,
    pages_fetched: usize,
    max_pages: usize,
    total: Option<u64>,
    /// Current in-flight fetch future.
    pending_fetch: Option<BoxFuture<'static, Result<Document<Vec<T>>>>>,
}

impl<T> PaginatedStream<T>
where
    T: Send + 'static,
{
    /// Create a stream from a page-fetching function.
    pub fn new<F>(max_pages: usize, fetch_page: F) -> Self
    where
        F: Fn(Option<String>) -> BoxFuture<'static, Result<Document<Vec<T>>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            fetch_page: Box::new(fetch_page),
            current_items: VecDeque::new(),
            cursor: Cursor::First,
            pages_fetched: 0,
            max_pages: page_limit(max_pages),
            total: None,
            pending_fetch: None,
        }
    }
}

impl<T> PaginatedStream<T> {
    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// `meta.paging.total` of the most recent page that carried it.
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

impl<T> Stream for PaginatedStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(item) = this.current_items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(fut) = this.pending_fetch.as_mut() {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.pending_fetch = None;
                        this.pages_fetched += 1;
                        this.total = page.total().or(this.total);
                        this.cursor = match page.next_link() {
                            Some(next) if this.pages_fetched < this.max_pages => {
                                Cursor::Next(next.to_string())
                            }
                            _ => Cursor::Done,
                        };
                        this.current_items = page.data.into();
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.pending_fetch = None;
                        this.cursor = Cursor::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let next = match std::mem::replace(&mut this.cursor, Cursor::Done) {
                Cursor::First => None,
                Cursor::Next(url) => Some(url),
                Cursor::Done => return Poll::Ready(None),
            };
            this.pending_fetch = Some((this.fetch_page)(next));
        }
    }
}

impl<T> Unpin for PaginatedStream<T> {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::{StreamExt, TryStreamExt};

    use super::*;
    use crate::models::{Links, Meta, Paging};
    use crate::Error;

    fn page(items: &[u32], next: Option<&str>) -> Document<Vec<u32>> {
        Document {
            data: items.to_vec(),
            links: Some(Links {
                self_link: None,
                next: next.map(str::to_string),
            }),
            included: None,
            meta: Some(Meta {
                paging: Some(Paging {
                    total: Some(7),
                    limit: Some(3),
                }),
            }),
        }
    }

    type PageFuture = BoxFuture<'static, Result<Document<Vec<u32>>>>;

    fn three_pages(calls: Arc<AtomicUsize>) -> impl Fn(Option<String>) -> PageFuture + Send + Sync {
        move |next: Option<String>| -> PageFuture {
            calls.fetch_add(1, Ordering::SeqCst);
            let result = match next.as_deref() {
                None => Ok(page(&[1, 2, 3], Some("https://x/p2"))),
                Some("https://x/p2") => Ok(page(&[4, 5, 6], Some("https://x/p3"))),
                Some("https://x/p3") => Ok(page(&[7], None)),
                Some(other) => Err(Error::InvalidUrl(other.to_string())),
            };
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_stream_follows_next_links_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stream = PaginatedStream::new(10, three_pages(calls.clone()));
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(stream.pages_fetched(), 3);
        assert_eq!(stream.total(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stream_respects_page_ceiling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = PaginatedStream::new(2, three_pages(calls.clone()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stream_zero_pages_means_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = PaginatedStream::new(0, three_pages(calls.clone()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_stops_after_error() {
        let mut stream = PaginatedStream::<u32>::new(10, |_next| {
            Box::pin(async { Err::<Document<Vec<u32>>, _>(Error::Http { status: 500 }) })
        });
        assert!(matches!(stream.next().await, Some(Err(Error::Http { status: 500 }))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_collected_completeness() {
        let done = Collected::<u32> {
            items: vec![1],
            pages_fetched: 1,
            next: None,
            total: Some(1),
        };
        assert!(done.is_complete());

        let capped = Collected::<u32> {
            next: Some("https://x/p2".into()),
            ..done
        };
        assert!(!capped.is_complete());
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(page_limit(0), 1);
        assert_eq!(page_limit(1), 1);
        assert_eq!(page_limit(25), 25);
    }
}
