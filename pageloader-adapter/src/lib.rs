//! A tokio driver for the `pageloader` crate.
//!
//! `pageloader` is runtime-agnostic: it emits fetch/cancel commands and expects the host to run
//! them and keep its clock ticking. This crate is that host for tokio applications:
//!
//! - [`PageSource`]: the async data source (`fetch_page(page, cancel)`), or [`source_fn`] for
//!   closures
//! - [`Controller`]: owns the loader on a driver task, maps request ids to
//!   `tokio_util::sync::CancellationToken`s, sleeps until backoff/debounce deadlines, and publishes
//!   [`pageloader::LoadState`] snapshots over a `tokio::sync::watch` channel
//! - [`SentinelHandle`]: reports the sentinel marker position from the view layer
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod controller;
mod error;
mod sentinel;
mod source;

#[cfg(test)]
mod tests;

pub use controller::{Controller, SharedState};
pub use error::ControllerError;
pub use sentinel::SentinelHandle;
pub use source::{FnSource, PageSource, source_fn};
