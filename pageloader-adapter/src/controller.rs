use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pageloader::{
    Command, FetchRequest, LoadState, LoaderOptions, Page, PageLoader, Rejection, RequestId,
    ScrollMetrics, SentinelRect,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{ControllerError, PageSource, SentinelHandle};

/// Snapshot published after every observable state change.
pub type SharedState<T, E> = Arc<LoadState<T, E>>;

pub(crate) enum Action<T, E> {
    LoadMore,
    Retry,
    Reset,
    Refresh,
    SetEnabled(bool),
    SetVisible(bool),
    SetProximityThreshold(u32),
    Scroll(ScrollMetrics),
    Sentinel(Option<SentinelRect>),
    Update(Box<dyn FnOnce(&mut PageLoader<T, E>) + Send>),
}

enum Completion<T, E> {
    Settled {
        id: RequestId,
        result: Result<Page<T>, E>,
    },
    /// The fetch task panicked; no result will ever arrive.
    Lost(RequestId),
}

/// A tokio-driven paginated loader.
///
/// `spawn` moves a [`PageLoader`] onto a driver task, which is its only writer. The driver runs
/// fetches through the [`PageSource`] (one task per attempt, each with its own cancellation
/// token), sleeps until the loader's next deadline, and publishes a [`LoadState`] snapshot over a
/// `watch` channel after every change.
///
/// Actions are fire-and-forget: they are queued to the driver and rejections are logged rather
/// than returned. Observe the outcome through `state`, `subscribe` or `wait_for`.
///
/// Dropping the controller stops the driver and cancels the token of any live fetch.
pub struct Controller<T, E> {
    actions: mpsc::UnboundedSender<Action<T, E>>,
    state: watch::Receiver<SharedState<T, E>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T, E> Controller<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Starts the driver task on the current tokio runtime.
    ///
    /// When `options.enabled` is set the initial load starts right away.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn<S>(source: S, options: LoaderOptions<T, E>) -> Self
    where
        S: PageSource<T, E>,
    {
        let (state_tx, state_rx) = watch::channel(Arc::new(LoadState::new(options.initial_page)));
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let loader = PageLoader::new(publish_snapshots(options, Arc::new(state_tx)));
        let driver = Driver {
            loader,
            source: Arc::new(source),
            clock: Clock::start(),
            in_flight: HashMap::new(),
            completions: completions_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(driver.run(actions_rx, completions_rx));

        Self {
            actions: actions_tx,
            state: state_rx,
            shutdown,
            task: Some(task),
        }
    }

    /// The latest published snapshot.
    pub fn state(&self) -> SharedState<T, E> {
        Arc::clone(&self.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<SharedState<T, E>> {
        self.state.clone()
    }

    /// Waits until a published snapshot satisfies `predicate` and returns it.
    ///
    /// The current snapshot is checked first. Fails with [`ControllerError::Closed`] when the
    /// driver stops before that happens.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&LoadState<T, E>) -> bool,
    ) -> Result<SharedState<T, E>, ControllerError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| ControllerError::Closed)?;
        Ok(Arc::clone(&state))
    }
}

impl<T, E> Controller<T, E> {
    fn send(&self, action: Action<T, E>) {
        if self.actions.send(action).is_err() {
            atrace!("action dropped: driver has stopped");
        }
    }

    /// Requests the next page (e.g. from a "load more" button).
    pub fn load_more(&self) {
        self.send(Action::LoadMore);
    }

    /// Re-attempts the page whose retries were exhausted.
    pub fn retry(&self) {
        self.send(Action::Retry);
    }

    pub fn reset(&self) {
        self.send(Action::Reset);
    }

    pub fn refresh(&self) {
        self.send(Action::Refresh);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.send(Action::SetEnabled(enabled));
    }

    /// Foreground/background signal. A hidden controller starts no loads and holds pending
    /// retries until it is visible again.
    pub fn set_visible(&self, visible: bool) {
        self.send(Action::SetVisible(visible));
    }

    pub fn set_proximity_threshold(&self, threshold: u32) {
        self.send(Action::SetProximityThreshold(threshold));
    }

    /// Records the parameters the loaded data depends on; a later change resets the loader.
    pub fn set_reset_triggers<D>(&self, triggers: D)
    where
        D: PartialEq + Send + Sync + 'static,
    {
        self.send(Action::Update(Box::new(move |loader| {
            loader.set_reset_triggers(triggers);
        })));
    }

    /// Reports scroll geometry. Feeds the debounced near-end fallback and sentinel proximity.
    pub fn on_scroll(&self, metrics: ScrollMetrics) {
        self.send(Action::Scroll(metrics));
    }

    /// A handle for reporting the sentinel marker position. Detached until `attach` is called.
    pub fn sentinel(&self) -> SentinelHandle<T, E> {
        SentinelHandle::new(self.actions.clone())
    }

    /// Stops the driver and waits for it to finish.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                adebug!(%err, "driver task did not finish cleanly");
            }
        }
    }
}

impl<T, E> Drop for Controller<T, E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<T, E> std::fmt::Debug for Controller<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("running", &!self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn publish_snapshots<T, E>(
    mut options: LoaderOptions<T, E>,
    tx: Arc<watch::Sender<SharedState<T, E>>>,
) -> LoaderOptions<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let user = options.on_change.take();
    options.on_change = Some(Arc::new(move |loader: &PageLoader<T, E>| {
        tx.send_replace(Arc::new(loader.snapshot()));
        if let Some(cb) = &user {
            cb(loader);
        }
    }));
    options
}

/// Maps the loader's millisecond timeline onto tokio's clock.
#[derive(Clone, Copy, Debug)]
struct Clock {
    origin: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Driver<T, E> {
    loader: PageLoader<T, E>,
    source: Arc<dyn PageSource<T, E>>,
    clock: Clock,
    in_flight: HashMap<RequestId, CancellationToken>,
    completions: mpsc::UnboundedSender<Completion<T, E>>,
    shutdown: CancellationToken,
}

impl<T, E> Driver<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn run(
        mut self,
        mut actions: mpsc::UnboundedReceiver<Action<T, E>>,
        mut completions: mpsc::UnboundedReceiver<Completion<T, E>>,
    ) {
        adebug!("driver started");
        let shutdown = self.shutdown.clone();
        loop {
            self.flush_commands();
            let deadline = self
                .loader
                .next_deadline_ms()
                .map(|ms| self.clock.instant_at(ms));

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                action = actions.recv() => match action {
                    Some(action) => self.apply(action),
                    None => break,
                },
                Some(done) = completions.recv() => self.settle(done),
                _ = sleep_until(deadline) => {
                    self.loader.tick(self.clock.now_ms());
                }
            }
        }

        self.loader.teardown();
        self.flush_commands();
        adebug!("driver stopped");
    }

    fn apply(&mut self, action: Action<T, E>) {
        let loader = &mut self.loader;
        match action {
            Action::LoadMore => log_outcome("load_more", loader.load_more()),
            Action::Retry => log_outcome("retry", loader.retry()),
            Action::Reset => loader.reset(),
            Action::Refresh => loader.refresh(),
            Action::SetEnabled(enabled) => loader.set_enabled(enabled),
            Action::SetVisible(visible) => loader.set_suspended(!visible),
            Action::SetProximityThreshold(threshold) => loader.set_proximity_threshold(threshold),
            Action::Scroll(metrics) => loader.apply_scroll_metrics(metrics, self.clock.now_ms()),
            Action::Sentinel(sentinel) => loader.set_sentinel(sentinel),
            Action::Update(f) => f(loader),
        }
    }

    fn settle(&mut self, done: Completion<T, E>) {
        match done {
            Completion::Settled { id, result } => {
                self.in_flight.remove(&id);
                let now_ms = self.clock.now_ms();
                if !self.loader.complete(id, result, now_ms) {
                    atrace!(id = id.get(), "stale completion discarded");
                }
            }
            Completion::Lost(id) => {
                self.in_flight.remove(&id);
                awarn!(id = id.get(), "fetch task panicked, abandoning the attempt");
                self.loader.abandon(id);
            }
        }
    }

    fn flush_commands(&mut self) {
        let commands: Vec<Command> = self.loader.drain_commands().collect();
        for command in commands {
            match command {
                Command::Fetch(request) => self.start_fetch(request),
                Command::Cancel(id) => {
                    if let Some(token) = self.in_flight.remove(&id) {
                        adebug!(id = id.get(), "cancelling fetch");
                        token.cancel();
                    }
                }
            }
        }
    }

    fn start_fetch(&mut self, request: FetchRequest) {
        let token = self.shutdown.child_token();
        self.in_flight.insert(request.id, token.clone());

        let source = Arc::clone(&self.source);
        let completions = self.completions.clone();
        atrace!(
            id = request.id.get(),
            page = request.page,
            attempt = request.attempt,
            "spawning fetch"
        );
        let fetch = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = source.fetch_page(request.page, token.clone()) => Some(result),
            }
        });
        // Watches the fetch: a panicking source still settles the attempt.
        tokio::spawn(async move {
            let done = match fetch.await {
                Ok(Some(result)) => Completion::Settled {
                    id: request.id,
                    result,
                },
                Ok(None) => return,
                Err(err) if err.is_panic() => Completion::Lost(request.id),
                Err(_) => return,
            };
            // The driver may be gone; the result is moot then.
            let _ = completions.send(done);
        });
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn log_outcome(action: &'static str, outcome: Result<RequestId, Rejection>) {
    match outcome {
        Ok(id) => {
            adebug!(action, id = id.get(), "accepted");
        }
        Err(rejection) => {
            atrace!(action, %rejection, "rejected");
        }
    }
}
