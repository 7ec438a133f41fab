use thiserror::Error;

/// Errors returned by timer admission and cancellation.
///
/// Failures inside the tick loop itself (a panicking callback) are never
/// surfaced here; they are logged against the offending timer id and the
/// scan moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The admission arguments were rejected before the timer was created.
    #[error("invalid timer argument: {0}")]
    InvalidArgument(&'static str),

    /// The id does not refer to a live timer.
    #[error("timer not found")]
    NotFound,

    /// The timer was already cancelled.
    #[error("timer already closed")]
    AlreadyClosed,
}
