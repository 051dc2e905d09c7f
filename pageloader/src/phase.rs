use crate::{LoadKind, PageIndex, RequestId};

/// One logical load operation: a page, how it merges, and which attempt is current.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestContext {
    pub id: RequestId,
    pub page: PageIndex,
    pub kind: LoadKind,
    pub attempt: u32,
}

/// Where the orchestrator is in the retry state machine.
///
/// `Idle → Requesting → Backoff(n) → Requesting → ... → Idle`. A settled chain (success, exhausted
/// retries, cancellation) always returns to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    #[default]
    Idle,
    /// An attempt is awaiting its fetch result.
    Requesting(RequestContext),
    /// The last attempt failed; the next one fires at `retry_at_ms`.
    Backoff {
        context: RequestContext,
        retry_at_ms: u64,
    },
}

impl Phase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn context(&self) -> Option<RequestContext> {
        match *self {
            Self::Idle => None,
            Self::Requesting(context) | Self::Backoff { context, .. } => Some(context),
        }
    }

    /// The attempt that currently owns a live cancellation token, if any.
    pub fn live_request(&self) -> Option<RequestId> {
        match self {
            Self::Requesting(context) => Some(context.id),
            _ => None,
        }
    }
}
