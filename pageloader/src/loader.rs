use alloc::sync::Arc;
use alloc::vec::{Drain, Vec};
use core::any::Any;
use core::cell::Cell;

use crate::phase::{Phase, RequestContext};
use crate::trigger::{self, ProximityLatch};
use crate::{
    Command, FetchRequest, LoadKind, LoadState, LoaderOptions, Page, PageIndex, Rejection,
    RequestId, ScrollMetrics, SentinelRect, Trigger,
};

/// A headless paginated-loading engine.
///
/// This type is intentionally runtime-agnostic:
/// - It performs no I/O and owns no timers.
/// - Fetches are requested through [`Command`]s which the host drains, executes, and reports back
///   with `complete`.
/// - Time only advances through the `now_ms` arguments of `complete`, `apply_scroll_metrics` and
///   `tick`.
///
/// Every load intent (initial load, sentinel proximity, scroll fallback, `load_more`, `retry`,
/// refresh) goes through one gate, which guarantees at most one outstanding request and never two
/// requests for the same page.
///
/// For a tokio-driven controller, see the `pageloader-adapter` crate.
#[derive(Debug)]
pub struct PageLoader<T, E> {
    options: LoaderOptions<T, E>,
    state: LoadState<T, E>,
    phase: Phase,
    // Dedup key: set when a load is dispatched, cleared once its retry chain settles.
    in_flight_page: Option<PageIndex>,
    initial_load_started: bool,
    has_loaded: bool,
    failed: Option<(PageIndex, LoadKind)>,
    reload_pending: bool,
    suspended: bool,
    torn_down: bool,
    next_request_id: u64,

    metrics: Option<ScrollMetrics>,
    sentinel: Option<SentinelRect>,
    proximity: ProximityLatch,
    proximity_rearm_pending: bool,
    scroll_check_at_ms: Option<u64>,

    reset_triggers: Option<Arc<dyn Any + Send + Sync>>,
    commands: Vec<Command>,

    notify_depth: Cell<usize>,
    notify_pending: Cell<bool>,
}

impl<T, E> PageLoader<T, E> {
    /// Creates a loader from options.
    ///
    /// When `options.enabled` is set, the initial replace-load is dispatched immediately: the first
    /// `drain_commands` call yields its [`Command::Fetch`].
    pub fn new(options: LoaderOptions<T, E>) -> Self {
        ldebug!(
            initial_page = options.initial_page,
            enabled = options.enabled,
            retry_limit = options.retry.limit,
            "PageLoader::new"
        );
        let mut loader = Self {
            state: LoadState::new(options.initial_page),
            phase: Phase::Idle,
            in_flight_page: None,
            initial_load_started: false,
            has_loaded: false,
            failed: None,
            reload_pending: false,
            suspended: false,
            torn_down: false,
            next_request_id: 0,
            metrics: None,
            sentinel: None,
            proximity: ProximityLatch::default(),
            proximity_rearm_pending: false,
            scroll_check_at_ms: None,
            reset_triggers: None,
            commands: Vec::new(),
            options,
            notify_depth: Cell::new(0),
            notify_pending: Cell::new(false),
        };
        loader.ensure_initial_load();
        loader
    }

    pub fn options(&self) -> &LoaderOptions<T, E> {
        &self.options
    }

    pub fn state(&self) -> &LoadState<T, E> {
        &self.state
    }

    /// Returns an owned copy of the current state.
    pub fn snapshot(&self) -> LoadState<T, E>
    where
        T: Clone,
    {
        self.state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The load operation currently requesting or backing off, if any.
    pub fn current_request(&self) -> Option<RequestContext> {
        self.phase.context()
    }

    pub fn in_flight_page(&self) -> Option<PageIndex> {
        self.in_flight_page
    }

    /// `true` when the configured flag is set, the host is visible, and the loader is not torn down.
    pub fn is_enabled(&self) -> bool {
        self.options.enabled && !self.suspended && !self.torn_down
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn has_pending_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    /// Drains the commands emitted since the last call, in emission order.
    ///
    /// A `Cancel` for an attempt always precedes the `Fetch` that superseded it.
    pub fn drain_commands(&mut self) -> Drain<'_, Command> {
        self.commands.drain(..)
    }

    pub fn set_options(&mut self, options: LoaderOptions<T, E>) {
        let was_enabled = self.is_enabled();
        let threshold_changed = self.options.proximity_threshold != options.proximity_threshold;
        self.options = options;
        ltrace!(
            enabled = self.options.enabled,
            proximity_threshold = self.options.proximity_threshold,
            "PageLoader::set_options"
        );

        if !was_enabled && self.is_enabled() {
            self.on_enabled();
        } else if threshold_changed {
            self.rearm_proximity();
        }
        self.notify();
    }

    /// Clones the current options, applies `f`, then delegates to `set_options`.
    pub fn update_options(&mut self, f: impl FnOnce(&mut LoaderOptions<T, E>)) {
        let mut next = self.options.clone();
        f(&mut next);
        self.set_options(next);
    }

    fn notify_now(&self) {
        if let Some(cb) = &self.options.on_change {
            cb(self);
        }
    }

    fn notify(&self) {
        if self.notify_depth.get() > 0 {
            self.notify_pending.set(true);
            return;
        }
        self.notify_now();
    }

    /// Batches multiple updates into a single `on_change` notification.
    pub fn batch_update(&mut self, f: impl FnOnce(&mut Self)) {
        let depth = self.notify_depth.get();
        self.notify_depth.set(depth.saturating_add(1));

        f(self);

        let depth = self.notify_depth.get();
        debug_assert!(depth > 0, "notify_depth underflow");
        let next = depth.saturating_sub(1);
        self.notify_depth.set(next);

        if next == 0 && self.notify_pending.replace(false) {
            self.notify_now();
        }
    }

    // --- gate ---------------------------------------------------------------------------------

    /// Asks the gate to load `page`.
    ///
    /// Rejected when the loader is disabled, when another load is in progress, or when `page` is
    /// already being requested.
    ///
    /// A terminal error always settles the retry chain first, so `retry` passes the same checks as
    /// every other intent.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn request_load(
        &mut self,
        page: PageIndex,
        kind: LoadKind,
        trigger: Trigger,
    ) -> Result<RequestId, Rejection> {
        if !self.is_enabled() {
            return Err(Rejection::Disabled);
        }
        if self.state.is_loading {
            let busy = self.in_flight_page.unwrap_or(page);
            if busy == page && kind == LoadKind::Append {
                return Err(Rejection::Duplicate(page));
            }
            return Err(Rejection::Busy { page: busy });
        }
        // Checked independently of `is_loading`: the marker is the dedup key.
        if kind == LoadKind::Append && self.in_flight_page == Some(page) {
            return Err(Rejection::Duplicate(page));
        }
        ltrace!(page, ?kind, ?trigger, "gate: accepted");
        self.attempt_load(page, kind, 0)
    }

    /// Funnel for every "load the next page" intent.
    ///
    /// Before the first successful fetch the next page is the initial page itself (as a replace).
    fn request_next(&mut self, trigger: Trigger) -> Result<RequestId, Rejection> {
        if !self.is_enabled() {
            return Err(Rejection::Disabled);
        }
        if self.state.error.is_some() {
            return Err(Rejection::Errored);
        }
        if !self.state.has_more {
            return Err(Rejection::Exhausted);
        }
        if let Some(page) = self.in_flight_page {
            return Err(Rejection::Busy { page });
        }
        let (page, kind) = if self.has_loaded {
            (self.state.current_page.saturating_add(1), LoadKind::Append)
        } else {
            (self.options.initial_page, LoadKind::Replace)
        };
        self.request_load(page, kind, trigger)
    }

    // --- orchestrator -------------------------------------------------------------------------

    fn attempt_load(
        &mut self,
        page: PageIndex,
        kind: LoadKind,
        attempt: u32,
    ) -> Result<RequestId, Rejection> {
        if !self.is_enabled() {
            lwarn!(page, attempt, "attempt_load on a disabled loader");
            return Err(Rejection::Disabled);
        }

        self.in_flight_page = Some(page);
        if kind == LoadKind::Replace {
            // Any replace-load satisfies both the initial latch and a pending refresh.
            self.initial_load_started = true;
            self.reload_pending = false;
        }
        if let Some(prev) = self.phase.live_request() {
            ldebug!(id = prev.get(), "cancelling superseded request");
            self.commands.push(Command::Cancel(prev));
        }

        self.next_request_id = self.next_request_id.wrapping_add(1);
        let id = RequestId(self.next_request_id);
        self.phase = Phase::Requesting(RequestContext {
            id,
            page,
            kind,
            attempt,
        });
        self.failed = None;
        self.state.is_loading = true;
        self.state.error = None;
        self.state.is_retrying = attempt > 0;

        ldebug!(id = id.get(), page, attempt, ?kind, "fetch");
        self.commands.push(Command::Fetch(FetchRequest {
            id,
            page,
            attempt,
            kind,
        }));
        self.notify();
        Ok(id)
    }

    /// Reports the outcome of a [`Command::Fetch`].
    ///
    /// Returns `false` when `id` is no longer the live attempt (superseded, reset, torn down); the
    /// result is then discarded without any state change or callback.
    pub fn complete(&mut self, id: RequestId, result: Result<Page<T>, E>, now_ms: u64) -> bool {
        let context = match self.phase {
            Phase::Requesting(context) if context.id == id => context,
            _ => {
                ltrace!(id = id.get(), "discarding result of a cancelled request");
                return false;
            }
        };
        match result {
            Ok(page) => self.settle_success(context, page),
            Err(err) => self.settle_failure(context, err, now_ms),
        }
        true
    }

    /// Gives up on a live attempt whose result will never be reported (e.g. its fetch task died).
    ///
    /// The chain ends without an error value: loading stops, the page is remembered for `retry`,
    /// and later intents may load again. Returns `false` when `id` is no longer the live attempt.
    pub fn abandon(&mut self, id: RequestId) -> bool {
        let context = match self.phase {
            Phase::Requesting(context) if context.id == id => context,
            _ => return false,
        };
        lwarn!(id = id.get(), page = context.page, attempt = context.attempt, "request abandoned");
        self.phase = Phase::Idle;
        self.in_flight_page = None;
        self.state.is_loading = false;
        self.state.is_retrying = false;
        self.failed = Some((context.page, context.kind));
        self.proximity_rearm_pending = true;
        self.notify();
        true
    }

    fn settle_success(&mut self, context: RequestContext, page: Page<T>) {
        let Page {
            items,
            has_more,
            total,
        } = page;
        let start = match context.kind {
            LoadKind::Replace => {
                self.state.items = items;
                0
            }
            LoadKind::Append => {
                let start = self.state.items.len();
                self.state.items.extend(items);
                start
            }
        };
        self.state.has_more = has_more;
        self.state.current_page = context.page;
        if total.is_some() {
            self.state.total_count = total;
        }
        self.state.is_retrying = false;
        self.state.is_loading = false;
        self.in_flight_page = None;
        self.phase = Phase::Idle;
        self.has_loaded = true;
        self.proximity_rearm_pending = true;

        ldebug!(
            page = context.page,
            attempt = context.attempt,
            fetched = self.state.items.len() - start,
            has_more,
            "page loaded"
        );
        if let Some(cb) = self.options.on_success.clone() {
            cb(&self.state.items[start..], context.page);
        }
        self.notify();
    }

    fn settle_failure(&mut self, context: RequestContext, err: E, now_ms: u64) {
        let retry = self.options.retry;
        if retry.should_retry(context.attempt) {
            let delay_ms = retry.delay_ms(context.attempt);
            ldebug!(
                page = context.page,
                attempt = context.attempt,
                delay_ms,
                "fetch failed, retry scheduled"
            );
            // Still loading from the caller's point of view; the page stays marked in flight.
            self.phase = Phase::Backoff {
                context,
                retry_at_ms: now_ms.saturating_add(delay_ms),
            };
            return;
        }

        lwarn!(
            page = context.page,
            attempt = context.attempt,
            "fetch failed, retries exhausted"
        );
        let err = Arc::new(err);
        self.state.error = Some(Arc::clone(&err));
        self.state.is_retrying = false;
        self.state.is_loading = false;
        self.in_flight_page = None;
        self.phase = Phase::Idle;
        self.failed = Some((context.page, context.kind));
        if let Some(cb) = self.options.on_error.clone() {
            cb(&err);
        }
        self.notify();
    }

    // --- clock --------------------------------------------------------------------------------

    /// Advances timers: the backoff retry, the debounced scroll check, and deferred
    /// initial/refresh loads.
    ///
    /// Returns the next deadline (see `next_deadline_ms`).
    pub fn tick(&mut self, now_ms: u64) -> Option<u64> {
        self.batch_update(|l| {
            l.run_deferred_loads();
            l.fire_due_retry(now_ms);
            l.fire_due_scroll_check(now_ms);
        });
        self.next_deadline_ms()
    }

    /// Earliest time at which `tick` has work to do.
    ///
    /// `Some(0)` means "as soon as possible" (a deferred load is waiting).
    pub fn next_deadline_ms(&self) -> Option<u64> {
        if !self.is_enabled() {
            return None;
        }
        if self.deferred_load_due() {
            return Some(0);
        }
        let retry_at = match self.phase {
            Phase::Backoff { retry_at_ms, .. } => Some(retry_at_ms),
            _ => None,
        };
        match (retry_at, self.scroll_check_at_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn deferred_load_due(&self) -> bool {
        self.reload_pending || self.initial_load_wanted()
    }

    fn initial_load_wanted(&self) -> bool {
        !self.initial_load_started
            && self.is_enabled()
            && self.state.items.is_empty()
            && !self.state.is_loading
            && self.state.error.is_none()
    }

    fn run_deferred_loads(&mut self) {
        if self.reload_pending && self.is_enabled() {
            self.reload_pending = false;
            let result = self.request_load(self.options.initial_page, LoadKind::Replace, Trigger::Refresh);
            if let Err(rejection) = result {
                ldebug!(%rejection, "refresh load rejected");
            }
        }
        self.ensure_initial_load();
    }

    /// Dispatches the one-shot initial load if it has not happened since construction or reset.
    fn ensure_initial_load(&mut self) {
        if !self.initial_load_wanted() {
            return;
        }
        let result = self.request_load(self.options.initial_page, LoadKind::Replace, Trigger::Initial);
        if let Err(rejection) = result {
            ldebug!(%rejection, "initial load rejected");
        }
    }

    fn fire_due_retry(&mut self, now_ms: u64) {
        let Phase::Backoff {
            context,
            retry_at_ms,
        } = self.phase
        else {
            return;
        };
        // A suspended loader holds the retry until it is visible again.
        if now_ms < retry_at_ms || !self.is_enabled() {
            return;
        }
        let attempt = context.attempt.saturating_add(1);
        if let Err(rejection) = self.attempt_load(context.page, context.kind, attempt) {
            ldebug!(%rejection, page = context.page, attempt, "backoff retry rejected");
        }
    }

    fn fire_due_scroll_check(&mut self, now_ms: u64) {
        let Some(at) = self.scroll_check_at_ms else {
            return;
        };
        if now_ms < at {
            return;
        }
        self.scroll_check_at_ms = None;
        let Some(metrics) = self.metrics else {
            return;
        };
        if trigger::near_end(&metrics, self.options.proximity_threshold) {
            if let Err(rejection) = self.request_next(Trigger::ScrollFallback) {
                ltrace!(%rejection, "scroll fallback rejected");
            }
        }
    }

    // --- triggers -----------------------------------------------------------------------------

    /// Requests the next page on behalf of a caller (e.g. a "load more" button).
    ///
    /// A no-op returning the rejection when there are no more pages, a load is in progress, an
    /// error is pending (use `retry`), or the loader is disabled.
    pub fn load_more(&mut self) -> Result<RequestId, Rejection> {
        self.request_next(Trigger::Manual)
    }

    /// Re-attempts the page whose retries were exhausted, starting again from attempt 0.
    pub fn retry(&mut self) -> Result<RequestId, Rejection> {
        let Some((page, kind)) = self.failed else {
            return Err(Rejection::NothingToRetry);
        };
        self.request_load(page, kind, Trigger::Retry)
    }

    /// Reports scroll geometry from the host.
    ///
    /// Re-evaluates sentinel proximity immediately and (re)starts the debounce window of the
    /// scroll-position fallback.
    pub fn apply_scroll_metrics(&mut self, metrics: ScrollMetrics, now_ms: u64) {
        ltrace!(
            scroll_offset = metrics.scroll_offset,
            viewport_size = metrics.viewport_size,
            content_size = metrics.content_size,
            now_ms,
            "apply_scroll_metrics"
        );
        self.metrics = Some(metrics);
        self.scroll_check_at_ms = Some(now_ms.saturating_add(self.options.debounce_delay_ms));
        self.evaluate_proximity();
    }

    pub fn scroll_metrics(&self) -> Option<ScrollMetrics> {
        self.metrics
    }

    /// Attaches (`Some`) or detaches (`None`) the sentinel marker, or reports its new position.
    ///
    /// Hosts should report the sentinel position after rendering newly loaded items: the proximity
    /// signal re-arms after every load and is re-evaluated on that report.
    pub fn set_sentinel(&mut self, sentinel: Option<SentinelRect>) {
        self.sentinel = sentinel;
        if sentinel.is_none() {
            self.proximity.rearm();
            return;
        }
        self.evaluate_proximity();
    }

    pub fn sentinel(&self) -> Option<SentinelRect> {
        self.sentinel
    }

    pub fn set_proximity_threshold(&mut self, threshold: u32) {
        if self.options.proximity_threshold == threshold {
            return;
        }
        self.options.proximity_threshold = threshold;
        self.rearm_proximity();
        self.notify();
    }

    fn rearm_proximity(&mut self) {
        self.proximity_rearm_pending = true;
        self.evaluate_proximity();
    }

    fn evaluate_proximity(&mut self) {
        // Without geometry the marker position means nothing yet; the first scroll report decides.
        let (Some(sentinel), Some(metrics)) = (self.sentinel, self.metrics) else {
            return;
        };
        if core::mem::take(&mut self.proximity_rearm_pending) {
            self.proximity.rearm();
        }
        let visible =
            trigger::sentinel_in_range(&metrics, &sentinel, self.options.proximity_threshold);
        if self.proximity.observe(visible) {
            if let Err(rejection) = self.request_next(Trigger::Proximity) {
                ltrace!(%rejection, "proximity trigger rejected");
            }
        }
    }

    // --- lifecycle ----------------------------------------------------------------------------

    /// Cancels any live request, drops a pending retry, and restores construction-time state.
    ///
    /// The initial-load latch is re-armed: the next `tick` on an enabled loader issues a fresh
    /// initial load.
    pub fn reset(&mut self) {
        ldebug!("reset");
        self.abort_request();
        self.state = LoadState::new(self.options.initial_page);
        self.initial_load_started = false;
        self.has_loaded = false;
        self.failed = None;
        self.reload_pending = false;
        self.scroll_check_at_ms = None;
        self.proximity.rearm();
        self.proximity_rearm_pending = true;
        self.notify();
    }

    /// `reset`, then a replace-load of the initial page on the next `tick`.
    pub fn refresh(&mut self) {
        self.batch_update(|l| {
            l.reset();
            l.reload_pending = true;
        });
    }

    fn abort_request(&mut self) {
        if let Some(id) = self.phase.live_request() {
            ldebug!(id = id.get(), "cancelling request");
            self.commands.push(Command::Cancel(id));
        }
        self.phase = Phase::Idle;
        self.in_flight_page = None;
    }

    /// Sets the caller-controlled enabled flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.options.enabled == enabled {
            return;
        }
        let was_enabled = self.is_enabled();
        self.options.enabled = enabled;
        if !was_enabled && self.is_enabled() {
            self.on_enabled();
        }
        self.notify();
    }

    /// Background/foreground signal from the host.
    ///
    /// A suspended loader starts no new loads but keeps items, errors and `has_more`. Resuming
    /// restores whatever the `enabled` option says; it never force-enables.
    pub fn set_suspended(&mut self, suspended: bool) {
        if self.suspended == suspended {
            return;
        }
        let was_enabled = self.is_enabled();
        self.suspended = suspended;
        ldebug!(suspended, "set_suspended");
        if !was_enabled && self.is_enabled() {
            self.on_enabled();
        }
        self.notify();
    }

    fn on_enabled(&mut self) {
        self.ensure_initial_load();
        self.rearm_proximity();
    }

    /// Records the external parameters the loaded data depends on (e.g. a search term).
    ///
    /// The first call only records them. Any later call with a different value (or a different
    /// type) performs a full `reset`. Returns `true` when a reset happened.
    pub fn set_reset_triggers<D>(&mut self, triggers: D) -> bool
    where
        D: PartialEq + Send + Sync + 'static,
    {
        let changed = match &self.reset_triggers {
            None => false,
            Some(prev) => prev
                .downcast_ref::<D>()
                .is_none_or(|prev| *prev != triggers),
        };
        self.reset_triggers = Some(Arc::new(triggers));
        if changed {
            ldebug!("reset triggers changed");
            self.reset();
        }
        changed
    }

    /// Cancels any live request and stops all timers. The loader accepts no further loads.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        ldebug!("teardown");
        self.abort_request();
        self.state.is_loading = false;
        self.state.is_retrying = false;
        self.reload_pending = false;
        self.scroll_check_at_ms = None;
        self.torn_down = true;
        self.notify();
    }
}
