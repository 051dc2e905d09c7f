use alloc::sync::Arc;

use crate::loader::PageLoader;
use crate::{PageIndex, RetryPolicy};

/// Called after a page is merged, with the newly fetched items and their page index.
pub type OnSuccessCallback<T> = Arc<dyn Fn(&[T], PageIndex) + Send + Sync>;

/// Called once retries for a page are exhausted.
pub type OnErrorCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Called after any observable loader state change.
///
/// Use `PageLoader::batch_update` to coalesce several changes into one call.
pub type OnChangeCallback<T, E> = Arc<dyn Fn(&PageLoader<T, E>) + Send + Sync>;

/// Configuration for [`crate::PageLoader`].
///
/// Callbacks are stored in `Arc`s, so cloning options and handing them to
/// `PageLoader::set_options` does not reallocate closures.
pub struct LoaderOptions<T, E> {
    /// Page requested by the initial (and every refresh) load.
    pub initial_page: PageIndex,

    /// Distance from the viewport at which the sentinel counts as visible. Also used by the
    /// scroll-position fallback as the distance from the end of content.
    pub proximity_threshold: u32,

    /// Enables/disables loading. A disabled loader keeps its state but starts no new loads.
    pub enabled: bool,

    /// Quiet period after the last scroll report before the scroll fallback is evaluated.
    pub debounce_delay_ms: u64,

    pub retry: RetryPolicy,

    pub on_success: Option<OnSuccessCallback<T>>,
    pub on_error: Option<OnErrorCallback<E>>,
    pub on_change: Option<OnChangeCallback<T, E>>,
}

impl<T, E> Clone for LoaderOptions<T, E> {
    fn clone(&self) -> Self {
        Self {
            initial_page: self.initial_page,
            proximity_threshold: self.proximity_threshold,
            enabled: self.enabled,
            debounce_delay_ms: self.debounce_delay_ms,
            retry: self.retry,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_change: self.on_change.clone(),
        }
    }
}

impl<T, E> Default for LoaderOptions<T, E> {
    fn default() -> Self {
        Self {
            initial_page: 0,
            proximity_threshold: 300,
            enabled: true,
            debounce_delay_ms: 250,
            retry: RetryPolicy::default(),
            on_success: None,
            on_error: None,
            on_change: None,
        }
    }
}

impl<T, E> LoaderOptions<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_page(mut self, initial_page: PageIndex) -> Self {
        self.initial_page = initial_page;
        self
    }

    pub fn with_proximity_threshold(mut self, threshold: u32) -> Self {
        self.proximity_threshold = threshold;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_debounce_delay_ms(mut self, delay_ms: u64) -> Self {
        self.debounce_delay_ms = delay_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shorthand for setting the retry limit and base delay while keeping the delay cap.
    pub fn with_retry_limit(mut self, limit: u32, base_delay_ms: u64) -> Self {
        self.retry.limit = limit;
        self.retry.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_on_success(
        mut self,
        on_success: Option<impl Fn(&[T], PageIndex) + Send + Sync + 'static>,
    ) -> Self {
        self.on_success = on_success.map(|f| Arc::new(f) as _);
        self
    }

    pub fn with_on_error(mut self, on_error: Option<impl Fn(&E) + Send + Sync + 'static>) -> Self {
        self.on_error = on_error.map(|f| Arc::new(f) as _);
        self
    }

    pub fn with_on_change(
        mut self,
        on_change: Option<impl Fn(&PageLoader<T, E>) + Send + Sync + 'static>,
    ) -> Self {
        self.on_change = on_change.map(|f| Arc::new(f) as _);
        self
    }
}

impl<T, E> core::fmt::Debug for LoaderOptions<T, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("initial_page", &self.initial_page)
            .field("proximity_threshold", &self.proximity_threshold)
            .field("enabled", &self.enabled)
            .field("debounce_delay_ms", &self.debounce_delay_ms)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
