/// Errors surfaced by [`crate::Controller`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// The driver task has stopped (shutdown, drop, or runtime shutdown).
    #[error("page loader driver has stopped")]
    Closed,
}
