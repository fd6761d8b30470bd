//! Errors - 失敗の分類
//!
//! Every failure a combinator or pool reports travels as a [`FlowError`]
//! inside [`CompletionResult::Failure`](super::CompletionResult::Failure).
//! Construction errors are the only ones returned directly as `Err`.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed error type accepted from user tasks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared cause of a domain failure.
///
/// `Arc` so that one cause can be handed to several callbacks
/// (e.g. every unreported item of a failed cargo batch).
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A task reported failure through its callback.
    #[error("task failed: {0}")]
    Failed(SharedError),

    /// A task panicked instead of invoking its callback.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// No completion arrived within the allowed time.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Invalid configuration, raised at construction time.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cargo batch finished before the worker reported this item.
    #[error("batch finished before the item was reported")]
    Unreported,

    /// The scheduler line is gone; the outcome could not be delivered.
    #[error("scheduler is closed")]
    SchedulerClosed,
}

impl FlowError {
    /// Wrap any error (or a plain message) as a domain failure.
    ///
    /// ```ignore
    /// callback(CompletionResult::Failure(FlowError::failed("disk full")));
    /// ```
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(err.into()))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_keeps_the_message() {
        let err = FlowError::failed("disk full");
        assert_eq!(err.to_string(), "task failed: disk full");
    }

    #[test]
    fn failed_wraps_std_errors() {
        let io = std::io::Error::other("broken pipe");
        let err = FlowError::failed(io);
        assert!(matches!(err, FlowError::Failed(_)));
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(
            FlowError::from_panic(payload.as_ref()).to_string(),
            "task panicked: boom"
        );

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert!(FlowError::from_panic(payload.as_ref()).is_panic());

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(
            FlowError::from_panic(payload.as_ref()).to_string(),
            "task panicked: non-string panic payload"
        );
    }

    #[test]
    fn clones_share_the_cause() {
        let err = FlowError::failed("shared");
        let copy = err.clone();
        match (err, copy) {
            (FlowError::Failed(a), FlowError::Failed(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("expected Failed"),
        }
    }
}
