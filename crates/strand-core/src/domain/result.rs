//! CompletionResult: the success/failure carrier handed to every callback.
//!
//! This module does not know about schedulers or combinators. It only defines
//! the "shape" of an outcome, the same way for a single task, a whole series,
//! or a pooled work item.

use super::errors::FlowError;

/// Outcome of one logical operation.
///
/// - `Success(value)`: the operation finished; `()` / `None` are valid
///   "void" values.
/// - `Failure(cause)`: the operation failed; a cause is always present.
#[derive(Debug, Clone)]
#[must_use]
pub enum CompletionResult<T> {
    Success(T),
    Failure(FlowError),
}

impl<T> CompletionResult<T> {
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    pub fn failure(cause: FlowError) -> Self {
        Self::Failure(cause)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn cause(&self) -> Option<&FlowError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(cause) => Some(cause),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CompletionResult<U> {
        match self {
            Self::Success(value) => CompletionResult::Success(f(value)),
            Self::Failure(cause) => CompletionResult::Failure(cause),
        }
    }

    pub fn into_result(self) -> Result<T, FlowError> {
        self.into()
    }
}

impl<T> From<Result<T, FlowError>> for CompletionResult<T> {
    fn from(result: Result<T, FlowError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(cause) => Self::Failure(cause),
        }
    }
}

impl<T> From<CompletionResult<T>> for Result<T, FlowError> {
    fn from(result: CompletionResult<T>) -> Self {
        match result {
            CompletionResult::Success(value) => Ok(value),
            CompletionResult::Failure(cause) => Err(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_success_is_valid() {
        let r = CompletionResult::success(());
        assert!(r.is_success());
        assert!(r.cause().is_none());

        let r: CompletionResult<Option<u8>> = CompletionResult::success(None);
        assert_eq!(r.value(), Some(&None));
    }

    #[test]
    fn failure_exposes_cause_only() {
        let r: CompletionResult<u8> = CompletionResult::failure(FlowError::failed("nope"));
        assert!(r.is_failure());
        assert!(r.value().is_none());
        assert_eq!(r.cause().map(ToString::to_string).as_deref(), Some("task failed: nope"));
    }

    #[test]
    fn map_keeps_failures_untouched() {
        let ok = CompletionResult::success(2).map(|v| v * 10);
        assert_eq!(ok.value(), Some(&20));

        let err: CompletionResult<i32> = CompletionResult::failure(FlowError::Unreported);
        let mapped = err.map(|v| v * 10);
        assert!(matches!(mapped, CompletionResult::Failure(FlowError::Unreported)));
    }

    #[test]
    fn converts_to_and_from_result() {
        let r: Result<u8, FlowError> = CompletionResult::success(7).into_result();
        assert_eq!(r.ok(), Some(7));

        let back: CompletionResult<u8> = Err(FlowError::SchedulerClosed).into();
        assert!(matches!(back, CompletionResult::Failure(FlowError::SchedulerClosed)));
    }
}
