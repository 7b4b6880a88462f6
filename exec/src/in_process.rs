//! Reference strategy: run the operation on a Tokio task and bound the wait.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tether_types::{BoxError, CancelMode, Outcome};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutionError, NotStarted, join_failure};
use crate::settle::settle;
use crate::{ExecutionContext, ExecutionStrategy};

/// Spawns each operation and waits for completion, caller cancellation, or the
/// deadline, whichever happens first.
///
/// The deadline is fixed before the task is spawned, so time spent waiting for
/// a concurrency slot or for the runtime to schedule the task counts against
/// the caller's budget.
///
/// Dropping the `execute` future before it resolves (for example from an outer
/// `tokio::time::timeout`) fires the operation's token the same way a timeout
/// does, without logging.
///
/// Unless a runtime handle is supplied with [`with_runtime`](Self::with_runtime),
/// `execute` must be awaited from inside a Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct InProcessStrategy {
    cancel_mode: CancelMode,
    max_concurrency: Option<usize>,
    limiter: Option<Arc<Semaphore>>,
    runtime: Option<Handle>,
}

impl InProcessStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_mode(mut self, mode: CancelMode) -> Self {
        self.cancel_mode = mode;
        self
    }

    /// Bound how many operations run at once. Extra submissions queue for a
    /// slot; a limit of zero is treated as one.
    pub fn with_max_concurrency(mut self, permits: usize) -> Self {
        let permits = permits.max(1);
        self.max_concurrency = Some(permits);
        self.limiter = Some(Arc::new(Semaphore::new(permits)));
        self
    }

    /// Spawn operations onto `handle` instead of the caller's runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    #[must_use]
    pub fn cancel_mode(&self) -> CancelMode {
        self.cancel_mode
    }

    #[must_use]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Free concurrency slots, or `None` when unbounded.
    #[must_use]
    pub fn available_slots(&self) -> Option<usize> {
        self.limiter
            .as_ref()
            .map(|semaphore| semaphore.available_permits())
    }

    fn spawn<T>(&self, future: impl Future<Output = T> + Send + 'static) -> JoinHandle<T>
    where
        T: Send + 'static,
    {
        match &self.runtime {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        }
    }
}

impl ExecutionStrategy for InProcessStrategy {
    fn execute<T, E, F, Fut>(
        &self,
        ctx: &ExecutionContext,
        operation: F,
    ) -> impl Future<Output = Result<T, ExecutionError>> + Send
    where
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        async move {
            ctx.validate()?;
            if ctx.is_interrupted() {
                return settle(ctx, Outcome::Interrupted);
            }

            let deadline = deadline_after(ctx.timeout());
            let signal = ctx.cancellation().child_token();
            let mut task = self.spawn(run_operation(
                operation,
                signal.clone(),
                self.limiter.clone(),
            ));
            // Abandoning this future mid-wait cancels the operation as well.
            let pending = signal.drop_guard();

            // Caller cancellation wins ties so an interrupt is never reported
            // as success or timeout.
            let outcome = tokio::select! {
                biased;
                () = ctx.cancellation().cancelled() => Outcome::Interrupted,
                joined = &mut task => match joined {
                    Ok(result) => Outcome::from(result),
                    Err(err) => Outcome::Failed(join_failure(err)),
                },
                () = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            };

            let signal = pending.disarm();
            if outcome.requires_cancellation() {
                signal.cancel();
                if self.cancel_mode == CancelMode::Abort {
                    task.abort();
                }
            }

            settle(ctx, outcome)
        }
    }
}

/// Timeouts too large to represent are treated as "far future".
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

async fn run_operation<T, E, F, Fut>(
    operation: F,
    signal: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
) -> Result<T, BoxError>
where
    E: Into<BoxError>,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let _permit = match limiter {
        Some(semaphore) => tokio::select! {
            biased;
            () = signal.cancelled() => return Err(Box::new(NotStarted)),
            permit = semaphore.acquire_owned() => Some(permit?),
        },
        None => None,
    };

    operation(signal).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use std::future::{Ready, ready};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    use tether_types::{Attempt, BoxError, CancelMode, ContextError};
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    use super::InProcessStrategy;
    use crate::{ExecutionContext, ExecutionError, ExecutionStrategy, OperationPanicked};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct IllegalState(String);

    fn ctx(id: &str, timeout_ms: u64) -> ExecutionContext {
        ExecutionContext::new(id, Duration::from_millis(timeout_ms))
    }

    async fn sleep_then(delay_ms: u64, value: u32) -> Result<u32, BoxError> {
        sleep(Duration::from_millis(delay_ms)).await;
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operation_returns_its_value() {
        let value = InProcessStrategy::new()
            .execute(&ctx("req-1", 50), |_signal| sleep_then(10, 42))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_times_out_with_context_fields() {
        let err = InProcessStrategy::new()
            .execute(&ctx("req-2", 10), |_signal| sleep_then(50, 42))
            .await
            .unwrap_err();

        match err {
            ExecutionError::Timeout {
                interaction_id,
                attempt,
                timeout_ms,
            } => {
                assert_eq!(interaction_id.as_str(), "req-2");
                assert_eq!(attempt, Attempt::FIRST);
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_signals_the_operation() {
        let (tx, rx) = oneshot::channel();
        let err = InProcessStrategy::new()
            .execute(&ctx("req-2", 10), move |signal| async move {
                tokio::select! {
                    () = signal.cancelled() => {
                        let _ = tx.send(());
                        Err::<u32, BoxError>("cancelled".into())
                    }
                    () = sleep(Duration::from_millis(50)) => Ok(42),
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout { .. }));
        rx.await.expect("operation observed the cancellation signal");
    }

    #[tokio::test(start_paused = true)]
    async fn signal_mode_leaves_ignoring_operation_running() {
        let finished = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&finished);

        let err = InProcessStrategy::new()
            .execute(&ctx("req", 10), move |_signal| async move {
                sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(42)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_mode_stops_the_task() {
        let finished = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&finished);

        let strategy = InProcessStrategy::new().with_cancel_mode(CancelMode::Abort);
        let err = strategy
            .execute(&ctx("req", 10), move |_signal| async move {
                sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(42)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_interrupts_and_stays_visible() {
        let caller = CancellationToken::new();
        let context = ctx("req-4", 5_000)
            .with_attempt(Attempt::new(3).unwrap())
            .with_cancellation(caller.clone());

        let canceller = caller.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let (tx, rx) = oneshot::channel();
        let err = InProcessStrategy::new()
            .execute(&context, move |signal| async move {
                signal.cancelled().await;
                let _ = tx.send(());
                Ok::<u32, BoxError>(0)
            })
            .await
            .unwrap_err();

        match err {
            ExecutionError::Interrupted {
                interaction_id,
                attempt,
            } => {
                assert_eq!(interaction_id.as_str(), "req-4");
                assert_eq!(attempt.get(), 3);
            }
            other => panic!("expected Interrupted, got {other:?}"),
        }
        assert!(caller.is_cancelled());
        rx.await.expect("operation observed the cancellation signal");
    }

    #[tokio::test]
    async fn already_cancelled_caller_never_submits() {
        let caller = CancellationToken::new();
        caller.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let err = InProcessStrategy::new()
            .execute(
                &ctx("req", 50).with_cancellation(caller.clone()),
                move |_signal| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Interrupted { .. }));
        assert!(caller.is_cancelled());
        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn synchronous_failure_is_wrapped_with_original_cause() {
        let err = InProcessStrategy::new()
            .execute(&ctx("req-3", 100).with_attempt(Attempt::FIRST.next()), |_signal| {
                ready(Err::<u32, _>(IllegalState("x".to_string())))
            })
            .await
            .unwrap_err();

        assert_eq!(err.interaction_id().map(|id| id.as_str()), Some("req-3"));
        let cause = err.cause::<IllegalState>().expect("original cause preserved");
        assert_eq!(cause.to_string(), "x");
    }

    #[tokio::test]
    async fn nested_execution_errors_are_not_rewrapped() {
        let err = InProcessStrategy::new()
            .execute(&ctx("outer", 100), |_signal| async {
                Err::<u32, _>(ExecutionError::Interrupted {
                    interaction_id: "inner".into(),
                    attempt: Attempt::FIRST,
                })
            })
            .await
            .unwrap_err();

        match err {
            ExecutionError::Interrupted { interaction_id, .. } => {
                assert_eq!(interaction_id.as_str(), "inner");
            }
            other => panic!("expected the inner Interrupted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_surfaces_as_failure() {
        async fn explode(_signal: CancellationToken) -> Result<u32, BoxError> {
            panic!("kaboom")
        }

        let err = InProcessStrategy::new()
            .execute(&ctx("req", 100), explode)
            .await
            .unwrap_err();

        let panicked = err
            .cause::<OperationPanicked>()
            .expect("panic reported as cause");
        assert_eq!(panicked.message, "kaboom");
    }

    #[tokio::test]
    async fn panic_while_building_the_future_is_caught() {
        let err = InProcessStrategy::new()
            .execute(
                &ctx("req", 100),
                |_signal: CancellationToken| -> Ready<Result<u32, BoxError>> {
                    panic!("eager kaboom")
                },
            )
            .await
            .unwrap_err();

        let panicked = err
            .cause::<OperationPanicked>()
            .expect("panic reported as cause");
        assert_eq!(panicked.message, "eager kaboom");
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_signals_the_operation() {
        let (tx, rx) = oneshot::channel();
        let strategy = InProcessStrategy::new();
        let context = ctx("req-5", 1_000);

        let waited = timeout(
            Duration::from_millis(5),
            strategy.execute(&context, move |signal| async move {
                let observed = tokio::select! {
                    () = signal.cancelled() => true,
                    () = sleep(Duration::from_millis(200)) => false,
                };
                let _ = tx.send(observed);
                Ok::<_, BoxError>(())
            }),
        )
        .await;

        assert!(waited.is_err());
        assert!(rx.await.expect("operation finished"));
        assert!(!context.is_interrupted());
    }

    #[tokio::test]
    async fn zero_timeout_fails_before_running() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let err = InProcessStrategy::new()
            .execute(
                &ExecutionContext::new("req", Duration::ZERO),
                move |_signal| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::Validation(ContextError::NonPositiveTimeout)
        ));
        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn queueing_for_a_slot_counts_against_the_timeout() {
        let strategy = InProcessStrategy::new().with_max_concurrency(1);
        assert_eq!(strategy.max_concurrency(), Some(1));

        let second_ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&second_ran);

        let first_ctx = ctx("first", 500);
        let second_ctx = ctx("second", 50);
        let (first, second) = tokio::join!(
            strategy.execute(&first_ctx, |_signal| sleep_then(100, 1)),
            async {
                // Let the first call take the only slot.
                tokio::task::yield_now().await;
                strategy
                    .execute(&second_ctx, move |_signal| async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok::<u32, BoxError>(2)
                    })
                    .await
            },
        );

        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(ExecutionError::Timeout { .. })));
        assert!(!second_ran.load(Ordering::SeqCst));
        assert_eq!(strategy.available_slots(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_operation_runs_once_a_slot_frees() {
        let strategy = InProcessStrategy::new().with_max_concurrency(1);
        let first_ctx = ctx("first", 500);
        let second_ctx = ctx("second", 500);
        let (first, second) = tokio::join!(
            strategy.execute(&first_ctx, |_signal| sleep_then(20, 1)),
            strategy.execute(&second_ctx, |_signal| sleep_then(20, 2)),
        );
        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_does_not_overflow() {
        let value = InProcessStrategy::new()
            .execute(
                &ExecutionContext::new("req", Duration::MAX),
                |_signal| sleep_then(10, 7),
            )
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let strategy = InProcessStrategy::new().with_max_concurrency(0);
        assert_eq!(strategy.max_concurrency(), Some(1));
        assert_eq!(strategy.available_slots(), Some(1));
        assert_eq!(InProcessStrategy::new().available_slots(), None);
    }

    #[test]
    fn explicit_runtime_hosts_the_operation() {
        let worker = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tether-worker")
            .enable_all()
            .build()
            .unwrap();
        let driver = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let strategy = InProcessStrategy::new().with_runtime(worker.handle().clone());
        let thread_name = driver
            .block_on(strategy.execute(&ctx("req", 1_000), |_signal| async {
                Ok::<_, BoxError>(thread::current().name().map(str::to_owned))
            }))
            .unwrap();

        assert_eq!(thread_name.as_deref(), Some("tether-worker"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn timeout_is_logged_with_error_fields() {
        let _ = InProcessStrategy::new()
            .execute(&ctx("req-2", 10), |_signal| sleep_then(50, 42))
            .await;

        assert!(logs_contain("Operation timed out"));
        assert!(logs_contain("interaction_id=req-2"));
        assert!(logs_contain("timeout_ms=10"));
    }

    #[tokio::test]
    #[traced_test]
    async fn success_and_failure_are_not_logged() {
        let strategy = InProcessStrategy::new();
        let _ = strategy
            .execute(&ctx("quiet-ok", 1_000), |_signal| async { Ok::<_, BoxError>(1) })
            .await;
        let _ = strategy
            .execute(&ctx("quiet-err", 1_000), |_signal| async {
                Err::<u32, _>(IllegalState("nope".into()))
            })
            .await;

        assert!(!logs_contain("quiet-ok"));
        assert!(!logs_contain("quiet-err"));
    }
}
