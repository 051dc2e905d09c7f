use crate::*;

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pageloader::{LoaderOptions, Page, PageIndex, RetryPolicy, ScrollMetrics, SentinelRect};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("catalog unavailable")]
struct FetchError;

struct Call {
    page: PageIndex,
    at: Instant,
    token: CancellationToken,
}

struct CatalogInner {
    total: u64,
    page_size: u64,
    latency: Duration,
    failures_left: AtomicU32,
    calls: Mutex<Vec<Call>>,
}

/// An in-memory collection of `0..total`, served `page_size` items at a time.
#[derive(Clone)]
struct Catalog {
    inner: Arc<CatalogInner>,
}

impl Catalog {
    fn new(total: u64, page_size: u64) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                total,
                page_size,
                latency: Duration::ZERO,
                failures_left: AtomicU32::new(0),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    fn with_latency(self, latency: Duration) -> Self {
        self.rebuild(|inner| inner.latency = latency)
    }

    fn failing_first(self, failures: u32) -> Self {
        self.rebuild(|inner| inner.failures_left = AtomicU32::new(failures))
    }

    fn rebuild(self, f: impl FnOnce(&mut CatalogInner)) -> Self {
        let mut inner = Arc::try_unwrap(self.inner).ok().expect("catalog already shared");
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    fn calls(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    fn pages(&self) -> Vec<PageIndex> {
        self.inner.calls.lock().unwrap().iter().map(|c| c.page).collect()
    }

    fn offsets_ms(&self, start: Instant) -> Vec<u64> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.at.duration_since(start).as_millis() as u64)
            .collect()
    }

    fn token(&self, call: usize) -> CancellationToken {
        self.inner.calls.lock().unwrap()[call].token.clone()
    }
}

#[async_trait]
impl PageSource<u64, FetchError> for Catalog {
    async fn fetch_page(
        &self,
        page: PageIndex,
        cancel: CancellationToken,
    ) -> Result<Page<u64>, FetchError> {
        self.inner.calls.lock().unwrap().push(Call {
            page,
            at: Instant::now(),
            token: cancel,
        });
        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        let fail = self
            .inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(FetchError);
        }
        let start = page * self.inner.page_size;
        let end = (start + self.inner.page_size).min(self.inner.total);
        Ok(Page::new((start..end).collect(), end < self.inner.total).with_total(self.inner.total))
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn initial_load_is_published_and_user_on_change_still_runs() {
    let changes = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&changes);
    let source = Catalog::new(25, 10).with_latency(Duration::from_millis(40));
    let controller = Controller::spawn(
        source.clone(),
        LoaderOptions::new().with_on_change(Some(move |_: &pageloader::PageLoader<u64, FetchError>| {
            seen.fetch_add(1, Ordering::SeqCst);
        })),
    );

    // The initial load is already in flight when `spawn` returns.
    assert!(controller.state().is_loading);

    let state = controller.wait_for(|s| !s.is_loading).await.unwrap();
    assert_eq!(state.items, (0..10).collect::<Vec<_>>());
    assert_eq!(state.current_page, 0);
    assert_eq!(state.total_count, Some(25));
    assert!(state.has_more);
    assert_eq!(source.pages(), vec![0]);
    assert!(changes.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn load_more_appends_until_exhausted() {
    let source = source_fn(|page: PageIndex, _cancel| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, FetchError>(Page::new(vec![page * 10, page * 10 + 1], page < 2))
    });
    let controller = Controller::spawn(source, LoaderOptions::new());

    controller.wait_for(|s| s.len() == 2).await.unwrap();
    controller.load_more();
    controller.wait_for(|s| s.len() == 4).await.unwrap();
    controller.load_more();
    let state = controller.wait_for(|s| s.len() == 6).await.unwrap();
    assert!(!state.has_more);
    assert_eq!(state.items, vec![0, 1, 10, 11, 20, 21]);

    // Exhausted: further intents are rejected without touching state.
    controller.load_more();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.state().len(), 6);
    assert_eq!(controller.state().current_page, 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn retries_follow_the_backoff_schedule() {
    let start = Instant::now();
    let source = Catalog::new(25, 10).failing_first(2);
    let controller = Controller::spawn(
        source.clone(),
        LoaderOptions::new().with_retry(RetryPolicy::new(3, 100)),
    );

    let state = controller.wait_for(|s| s.len() == 10).await.unwrap();
    assert!(!state.has_error());
    assert!(!state.is_retrying);
    // attempt 0 at t=0, attempt 1 after 100ms, attempt 2 after a further 200ms.
    assert_eq!(source.offsets_ms(start), vec![0, 100, 300]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn exhausted_retries_surface_the_error_until_retry() {
    let errors = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&errors);
    let source = Catalog::new(25, 10).failing_first(3);
    let controller = Controller::spawn(
        source.clone(),
        LoaderOptions::new()
            .with_retry(RetryPolicy::new(2, 50))
            .with_on_error(Some(move |_: &FetchError| {
                counted.fetch_add(1, Ordering::SeqCst);
            })),
    );

    let state = controller.wait_for(|s| s.has_error()).await.unwrap();
    assert!(!state.is_loading);
    assert!(state.is_empty());
    assert_eq!(source.calls(), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // Scroll-driven intents stay blocked while the error is shown.
    controller.load_more();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.calls(), 3);

    controller.retry();
    let state = controller.wait_for(|s| s.len() == 10).await.unwrap();
    assert!(!state.has_error());
    assert_eq!(source.pages(), vec![0, 0, 0, 0]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dependency_change_cancels_the_in_flight_fetch() {
    let source = Catalog::new(25, 10).with_latency(Duration::from_millis(500));
    let controller = Controller::spawn(source.clone(), LoaderOptions::new());

    controller.set_reset_triggers("rust");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 1);
    assert!(!source.token(0).is_cancelled());

    controller.set_reset_triggers("tokio");
    let state = controller.wait_for(|s| s.len() == 10).await.unwrap();
    assert!(source.token(0).is_cancelled());
    assert!(!source.token(1).is_cancelled());
    assert_eq!(source.calls(), 2);
    assert_eq!(state.current_page, 0);

    // Same value again: no reset.
    controller.set_reset_triggers("tokio");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(controller.state().len(), 10);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn refresh_replaces_the_accumulated_items() {
    let source = Catalog::new(100, 10);
    let controller = Controller::spawn(source.clone(), LoaderOptions::new());

    controller.wait_for(|s| s.len() == 10).await.unwrap();
    controller.load_more();
    controller.wait_for(|s| s.len() == 20).await.unwrap();

    controller.refresh();
    let state = controller
        .wait_for(|s| !s.is_loading && s.len() == 10)
        .await
        .unwrap();
    assert_eq!(state.current_page, 0);
    assert_eq!(source.pages(), vec![0, 1, 0]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn sentinel_proximity_and_scroll_fallback_load_pages() {
    let source = Catalog::new(1000, 10);
    let controller = Controller::spawn(
        source.clone(),
        LoaderOptions::new().with_proximity_threshold(100),
    );
    controller.wait_for(|s| s.len() == 10).await.unwrap();

    controller.on_scroll(ScrollMetrics {
        scroll_offset: 0,
        viewport_size: 600,
        content_size: 1000,
    });
    let mut sentinel = controller.sentinel();
    sentinel.attach(SentinelRect {
        start: 1000,
        size: 1,
    });
    // Out of range for the sentinel and too far from the end for the fallback.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);

    controller.on_scroll(ScrollMetrics {
        scroll_offset: 350,
        viewport_size: 600,
        content_size: 1000,
    });
    let state = controller.wait_for(|s| s.len() >= 20).await.unwrap();
    assert!(state.current_page >= 1);
    assert_eq!(source.pages()[1], 1);

    // Without a sentinel, the debounced scroll check alone keeps loading near the end.
    sentinel.detach();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let before = source.calls();
    controller.on_scroll(ScrollMetrics {
        scroll_offset: 1950,
        viewport_size: 600,
        content_size: 2600,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), before);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.calls(), before + 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn hidden_controller_holds_the_pending_retry() {
    let source = Catalog::new(25, 10).failing_first(1);
    let controller = Controller::spawn(
        source.clone(),
        LoaderOptions::new().with_retry(RetryPolicy::new(3, 100)),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.calls(), 1);
    controller.set_visible(false);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);
    assert!(controller.state().is_loading);

    controller.set_visible(true);
    controller.wait_for(|s| s.len() == 10).await.unwrap();
    assert_eq!(source.calls(), 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn disabled_controller_waits_for_enable() {
    let source = Catalog::new(25, 10);
    let controller = Controller::spawn(source.clone(), LoaderOptions::new().with_enabled(false));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 0);
    assert!(!controller.state().is_loading);

    controller.set_enabled(true);
    controller.wait_for(|s| s.len() == 10).await.unwrap();
    assert_eq!(source.calls(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropping_the_controller_cancels_the_live_fetch() {
    let source = Catalog::new(25, 10).with_latency(Duration::from_secs(10));
    let controller = Controller::spawn(source.clone(), LoaderOptions::new());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.calls(), 1);
    let token = source.token(0);
    assert!(!token.is_cancelled());

    drop(controller);
    assert!(token.is_cancelled());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_stops_the_driver_and_closes_the_channel() {
    let source = Catalog::new(25, 10).with_latency(Duration::from_secs(10));
    let controller = Controller::spawn(source.clone(), LoaderOptions::new());
    let mut rx = controller.subscribe();

    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.shutdown().await;

    assert!(source.token(0).is_cancelled());
    let state = Arc::clone(&rx.borrow_and_update());
    assert!(!state.is_loading);
    assert!(rx.changed().await.is_err());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn panicking_source_abandons_the_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let source = source_fn(move |page: PageIndex, _cancel| {
        let call = counted.fetch_add(1, Ordering::SeqCst);
        async move {
            if call == 0 {
                panic!("backend crashed");
            }
            Ok::<_, FetchError>(Page::new(vec![page], false))
        }
    });
    let controller = Controller::spawn(source, LoaderOptions::new());

    let state = controller.wait_for(|s| !s.is_loading).await.unwrap();
    assert!(state.is_empty());
    assert!(!state.has_error());

    controller.retry();
    let state = controller.wait_for(|s| s.len() == 1).await.unwrap();
    assert_eq!(state.items, vec![0]);
    assert!(!state.has_more);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
