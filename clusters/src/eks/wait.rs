use crate::error::{self, Result};
use std::future::Future;
use std::time::Duration;

/// How often a resource is polled while waiting for it to become active.
pub(crate) const READY_POLL_PERIOD: Duration = Duration::from_secs(10);
/// How long a resource may take to become active before the build fails.
pub(crate) const READY_DEADLINE: Duration = Duration::from_secs(600);
/// How often a resource is polled while waiting for it to disappear.
pub(crate) const DELETE_POLL_PERIOD: Duration = Duration::from_secs(5);

pub(crate) enum PollOutcome<T> {
    Ready(T),
    Pending,
}

/// Poll `poll` every `period` until it reports `Ready`, failing with a
/// state-timeout error naming `what` when a deadline is given and exceeded.
///
/// Deletion waits pass `None` and run until the caller's own timeout cancels
/// them; an error from `poll` aborts the wait immediately in either mode.
pub(crate) async fn wait_until<T, F, Fut>(
    what: &str,
    period: Duration,
    deadline: Option<Duration>,
    mut poll: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>>>,
{
    let waiting = async move {
        loop {
            if let PollOutcome::Ready(value) = poll().await? {
                return Ok(value);
            }
            tokio::time::sleep(period).await;
        }
    };
    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, waiting).await {
            Ok(result) => result,
            Err(_) => error::WaitTimeoutSnafu { what }.fail(),
        },
        None => waiting.await,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ready_value_is_returned() {
        let polls = AtomicU32::new(0);
        let polls = &polls;
        let value = wait_until(
            "test resource",
            Duration::from_secs(10),
            Some(Duration::from_secs(600)),
            || async move {
                if polls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Ok(PollOutcome::Pending)
                } else {
                    Ok(PollOutcome::Ready(42))
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_produces_a_timeout_error() {
        let err = wait_until(
            "cluster 'stuck'",
            Duration::from_secs(10),
            Some(Duration::from_secs(600)),
            || async { Ok(PollOutcome::<()>::Pending) },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("cluster 'stuck'"));
        assert!(err.to_string().contains("Timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_abort_the_wait() {
        let err = wait_until(
            "test resource",
            Duration::from_secs(5),
            None,
            || async {
                error::WaitTimeoutSnafu {
                    what: "inner failure",
                }
                .fail::<PollOutcome<()>>()
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("inner failure"));
    }
}
