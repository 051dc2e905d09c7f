use pageloader::SentinelRect;
use tokio::sync::mpsc;

use crate::controller::Action;

/// Reports the position of the sentinel marker rendered after the last item.
///
/// Call `attach` when the marker is mounted and `update` after every layout change (in
/// particular after newly loaded items were rendered). Dropping an attached handle detaches it.
pub struct SentinelHandle<T, E> {
    actions: mpsc::UnboundedSender<Action<T, E>>,
    attached: bool,
}

impl<T, E> SentinelHandle<T, E> {
    pub(crate) fn new(actions: mpsc::UnboundedSender<Action<T, E>>) -> Self {
        Self {
            actions,
            attached: false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn attach(&mut self, rect: SentinelRect) {
        self.attached = true;
        self.report(Some(rect));
    }

    /// Reports a new position. Ignored while detached.
    pub fn update(&mut self, rect: SentinelRect) {
        if self.attached {
            self.report(Some(rect));
        }
    }

    pub fn detach(&mut self) {
        if std::mem::take(&mut self.attached) {
            self.report(None);
        }
    }

    fn report(&self, rect: Option<SentinelRect>) {
        if self.actions.send(Action::Sentinel(rect)).is_err() {
            atrace!("sentinel report dropped: driver has stopped");
        }
    }
}

impl<T, E> Drop for SentinelHandle<T, E> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T, E> std::fmt::Debug for SentinelHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelHandle")
            .field("attached", &self.attached)
            .finish_non_exhaustive()
    }
}
