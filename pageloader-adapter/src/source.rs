use std::future::Future;

use async_trait::async_trait;
use pageloader::{Page, PageIndex};
use tokio_util::sync::CancellationToken;

/// A remote, paginated collection.
///
/// `fetch_page` runs on its own task. `cancel` is triggered when the request is superseded (reset,
/// refresh, dependency change) or the controller shuts down; the controller stops polling the
/// future at that point, so observing the token is only needed to abort work that lives outside
/// the future (e.g. a blocking thread).
///
/// A panicking `fetch_page` abandons the attempt: loading stops without an error value and `retry`
/// requests the same page again.
#[async_trait]
pub trait PageSource<T, E>: Send + Sync + 'static {
    async fn fetch_page(&self, page: PageIndex, cancel: CancellationToken) -> Result<Page<T>, E>;
}

/// A [`PageSource`] backed by a closure; see [`source_fn`].
pub struct FnSource<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

/// Adapts a closure returning a future into a [`PageSource`].
pub fn source_fn<T, E, F, Fut>(f: F) -> FnSource<F>
where
    F: Fn(PageIndex, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, E>> + Send + 'static,
{
    FnSource { f }
}

#[async_trait]
impl<T, E, F, Fut> PageSource<T, E> for FnSource<F>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(PageIndex, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, E>> + Send + 'static,
{
    async fn fetch_page(&self, page: PageIndex, cancel: CancellationToken) -> Result<Page<T>, E> {
        (self.f)(page, cancel).await
    }
}
