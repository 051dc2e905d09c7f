use alloc::vec::Vec;
use core::fmt;

/// Zero-based index of a page in the remote collection.
pub type PageIndex = u64;

/// Identity of one fetch attempt.
///
/// Every attempt (including each retry) gets a fresh id. An id acts as the attempt's cancellation
/// token: once the loader has moved on to another id, completions reported for the old one are
/// dropped without touching state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a load replaces the accumulated items or appends to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadKind {
    /// Initial or refresh load: the fetched items replace everything.
    Replace,
    /// Next page: the fetched items are appended.
    Append,
}

/// One page as returned by the data source.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// Total number of items in the collection, when the source knows it.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self {
            items,
            has_more,
            total: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

/// A fetch the host must perform on behalf of the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchRequest {
    pub id: RequestId,
    pub page: PageIndex,
    /// 0 for the first try, incremented on every retry.
    pub attempt: u32,
    pub kind: LoadKind,
}

/// Side effects emitted by [`crate::PageLoader`], drained with `drain_commands`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start fetching a page and report the outcome through `PageLoader::complete`.
    Fetch(FetchRequest),
    /// The attempt was superseded. Its result will be ignored; the host may abort the work.
    Cancel(RequestId),
}

/// The source of a load intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Trigger {
    /// The one-shot automatic load of the initial page.
    Initial,
    /// The sentinel marker came within the proximity threshold.
    Proximity,
    /// The debounced scroll-position check found the viewport near the end of content.
    ScrollFallback,
    /// An explicit `load_more` call.
    Manual,
    /// An explicit `retry` call after retries were exhausted.
    Retry,
    /// The deferred reload scheduled by `refresh`.
    Refresh,
}

/// Scroll geometry reported by the host, in arbitrary but consistent units (px, rows, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScrollMetrics {
    pub scroll_offset: u64,
    pub viewport_size: u32,
    /// Full size of the scrollable content.
    pub content_size: u64,
}

impl ScrollMetrics {
    pub fn viewport_end(&self) -> u64 {
        self.scroll_offset.saturating_add(self.viewport_size as u64)
    }

    /// Distance between the end of the viewport and the end of the content.
    pub fn distance_to_end(&self) -> u64 {
        self.content_size.saturating_sub(self.viewport_end())
    }
}

/// Position of the sentinel marker on the scroll axis (same units as [`ScrollMetrics`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SentinelRect {
    pub start: u64,
    pub size: u32,
}

impl SentinelRect {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size as u64)
    }
}

/// Why the gate refused a load.
///
/// Rejections are informational: the loader state is untouched when one is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("loader is disabled")]
    Disabled,
    #[error("the data source reported no further pages")]
    Exhausted,
    #[error("page {page} is still loading")]
    Busy { page: PageIndex },
    #[error("page {0} is already being requested")]
    Duplicate(PageIndex),
    #[error("loading is halted by an error; call retry")]
    Errored,
    #[error("there is no failed page to retry")]
    NothingToRetry,
}
