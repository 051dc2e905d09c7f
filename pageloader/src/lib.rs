//! A headless paginated-loading engine for infinite scrolling.
//!
//! For a tokio-driven controller (fetch execution, cancellation tokens, timers), see the
//! `pageloader-adapter` crate.
//!
//! This crate focuses on the state machine that decides *when* the next page of a remote
//! collection is fetched and how results are merged: one gate for every load intent, at most one
//! request in flight, retry with exponential backoff, and silent cancellation of superseded
//! requests.
//!
//! It is UI- and runtime-agnostic. A host layer is expected to:
//! - execute the [`Command`]s drained from the loader and report results via `complete`
//! - provide scroll geometry and the sentinel marker position
//! - call `tick(now_ms)` when the deadline returned by the loader passes
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod backoff;
mod loader;
mod options;
mod phase;
mod state;
pub mod trigger;
mod types;


pub use backoff::RetryPolicy;
pub use loader::PageLoader;
pub use options::{LoaderOptions, OnChangeCallback, OnErrorCallback, OnSuccessCallback};
pub use phase::{Phase, RequestContext};
pub use state::LoadState;
pub use types::{
    Command, FetchRequest, LoadKind, Page, PageIndex, Rejection, RequestId, ScrollMetrics,
    SentinelRect, Trigger,
};
