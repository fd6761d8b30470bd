//! Bridge between callback tasks and `async` code.
//!
//! - [`into_future`]: await a callback task
//! - [`from_future`]: run a future as a callback task on a tokio runtime

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::warn;

use crate::domain::{BoxError, CompletionResult, FlowError, Latch, Task, call_guarded, task};

/// Await the outcome of `task`.
///
/// The task starts on first poll. If its callback is dropped without being
/// called, the future resolves to `Failure(FlowError::SchedulerClosed)`.
pub fn into_future<T: Send + 'static>(task: Task<T>) -> impl Future<Output = CompletionResult<T>> + Send {
    async move {
        let (tx, rx) = oneshot::channel();
        call_guarded(
            task,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await
            .unwrap_or(CompletionResult::Failure(FlowError::SchedulerClosed))
    }
}

/// Wrap `future` as a [`Task`] that runs on `handle`.
///
/// `Err(e)` becomes `FlowError::Failed(e)`; a panic inside the future
/// becomes `FlowError::Panicked`.
pub fn from_future<T, E, Fut>(handle: Handle, future: Fut) -> Task<T>
where
    T: Send + 'static,
    E: Into<BoxError>,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    task(move |callback| {
        let latch = Latch::new(callback);
        let on_output = latch.clone();
        let join = handle.spawn(async move {
            let result = match future.await {
                Ok(value) => CompletionResult::Success(value),
                Err(err) => CompletionResult::Failure(FlowError::failed(err)),
            };
            on_output.fire(result);
        });
        handle.spawn(async move {
            if let Err(err) = join.await {
                let cause = if err.is_panic() {
                    FlowError::from_panic(err.into_panic().as_ref())
                } else {
                    FlowError::SchedulerClosed
                };
                warn!(error = %cause, "future did not complete");
                latch.fire(CompletionResult::Failure(cause));
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::domain::Callback;
    use crate::flow::Flow;
    use crate::impls::TokioScheduler;

    #[tokio::test]
    async fn into_future_resolves_with_the_callback_value() {
        let result = into_future(task(|cb: Callback<&str>| cb(CompletionResult::success("ready")))).await;
        assert_eq!(result.value(), Some(&"ready"));
    }

    #[tokio::test]
    async fn dropped_callback_means_scheduler_closed() {
        let result = into_future(task(|cb: Callback<u8>| drop(cb))).await;
        assert!(matches!(result.cause(), Some(FlowError::SchedulerClosed)));
    }

    #[tokio::test]
    async fn from_future_maps_ok_err_and_panic() {
        let handle = Handle::current();

        let ok = into_future(from_future(handle.clone(), async { Ok::<_, io::Error>(3) })).await;
        assert_eq!(ok.value(), Some(&3));

        let err = into_future(from_future(handle.clone(), async {
            Err::<u8, _>(io::Error::other("refused"))
        }))
        .await;
        assert_eq!(err.cause().map(ToString::to_string).as_deref(), Some("task failed: refused"));

        let boom = into_future(from_future(handle, async {
            if true {
                panic!("poll failed");
            }
            Ok::<u8, io::Error>(0)
        }))
        .await;
        assert!(boom.cause().is_some_and(FlowError::is_panic));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flow_over_async_tasks() {
        let flow = Flow::new(Arc::new(TokioScheduler::current()));
        let handle = Handle::current();
        let tasks = (1..=4u64)
            .map(|n| {
                from_future(handle.clone(), async move {
                    tokio::time::sleep(Duration::from_millis(5 * (5 - n))).await;
                    Ok::<_, io::Error>(n * n)
                })
            })
            .collect();

        let result = into_future(task(move |cb| flow.parallel(tasks, cb))).await;
        assert_eq!(result.value(), Some(&vec![1, 4, 9, 16]));
    }
}
