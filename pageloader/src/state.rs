use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::PageIndex;

/// The accumulated result of paginated loading.
///
/// The loader is the only writer. Hosts read it through `PageLoader::state` or take an owned copy
/// with `PageLoader::snapshot`.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize` (the error is skipped).
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(serialize = "T: serde::Serialize", deserialize = "T: serde::Deserialize<'de>"))
)]
pub struct LoadState<T, E> {
    /// Items of every loaded page, in page order.
    pub items: Vec<T>,
    /// `true` while a request is in flight or waiting for a retry.
    pub is_loading: bool,
    /// `true` while the current attempt is a retry.
    pub is_retrying: bool,
    /// Set once retries are exhausted; cleared by the next load, `reset` or `refresh`.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub error: Option<Arc<E>>,
    pub has_more: bool,
    /// Page of the last successful fetch (the initial page before any fetch).
    pub current_page: PageIndex,
    pub total_count: Option<u64>,
}

impl<T, E> LoadState<T, E> {
    pub fn new(initial_page: PageIndex) -> Self {
        Self {
            items: Vec::new(),
            is_loading: false,
            is_retrying: false,
            error: None,
            has_more: true,
            current_page: initial_page,
            total_count: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T: Clone, E> Clone for LoadState<T, E> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            is_loading: self.is_loading,
            is_retrying: self.is_retrying,
            error: self.error.clone(),
            has_more: self.has_more,
            current_page: self.current_page,
            total_count: self.total_count,
        }
    }
}

impl<T: PartialEq, E> PartialEq for LoadState<T, E> {
    /// Errors compare by identity: two states are equal only if they share the same error value.
    fn eq(&self, other: &Self) -> bool {
        let same_error = match (&self.error, &other.error) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_error
            && self.items == other.items
            && self.is_loading == other.is_loading
            && self.is_retrying == other.is_retrying
            && self.has_more == other.has_more
            && self.current_page == other.current_page
            && self.total_count == other.total_count
    }
}
