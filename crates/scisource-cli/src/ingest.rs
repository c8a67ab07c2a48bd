//! Bounded-concurrency dispatch of per-paper work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Outcome of a run once every task has finished.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    /// Ids of the items whose work failed or panicked.
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `work` over every item with at most `limit` in flight.
///
/// Each outcome is logged with the item id as soon as that item finishes,
/// while others may still be waiting for a permit. A failure or panic never
/// cancels the others. Returns only after every task has finished.
pub async fn run_bounded<T, F, Fut>(items: Vec<(String, T)>, limit: usize, work: F) -> RunSummary
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let work = Arc::new(work);
    let mut tasks = JoinSet::new();
    let total = items.len();

    for (id, item) in items {
        // The semaphore is never closed, so acquisition only waits.
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let work = work.clone();
        tasks.spawn(async move {
            let _permit = permit;
            info!(paper = %id, "processing");
            // An inner task turns a panic into an error for this item alone.
            let outcome = match tokio::spawn(work(item)).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("task panicked: {e}")),
            };
            match &outcome {
                Ok(()) => info!(paper = %id, "finished"),
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(paper = %id, error = %message, "failed to process paper");
                }
            }
            (id, outcome.is_ok())
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, true)) => summary.succeeded += 1,
            Ok((id, false)) => summary.failed.push(id),
            Err(e) => {
                error!(error = %e, "worker task lost");
                summary.failed.push("<unknown>".into());
            }
        }
    }
    summary.failed.sort();

    info!(
        total,
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        "run complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn items(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("PMC{i}"), i)).collect()
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (f, p) = (in_flight.clone(), peak.clone());
        let summary = run_bounded(items(5), 2, move |_| {
            let (f, p) = (f.clone(), p.clone());
            async move {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                f.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(summary.succeeded, 5);
        assert!(summary.is_success());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let summary = run_bounded(items(6), 3, |i| async move {
            match i {
                1 => anyhow::bail!("fetch failed"),
                4 => panic!("boom"),
                _ => Ok(()),
            }
        })
        .await;

        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, vec!["PMC1".to_string(), "PMC4".to_string()]);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn failure_is_logged_before_later_items_run() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        // One permit: item 1 only starts once item 0 has released it, while
        // the dispatch loop is still waiting to admit item 2.
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let (c, s) = (capture.clone(), seen.clone());
        let summary = run_bounded(items(3), 1, move |i| {
            let (c, s) = (c.clone(), s.clone());
            async move {
                match i {
                    0 => anyhow::bail!("fetch failed"),
                    1 => {
                        *s.lock().unwrap() = c.contents();
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
        })
        .await;

        let seen = seen.lock().unwrap().clone();
        assert!(seen.contains("failed to process paper"), "{seen}");
        assert!(seen.contains("PMC0"));
        assert!(seen.contains("fetch failed"));
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, vec!["PMC0".to_string()]);
    }

    #[tokio::test]
    async fn empty_input_finishes() {
        let summary = run_bounded(Vec::<(String, ())>::new(), 5, |_| async { Ok(()) }).await;
        assert_eq!(summary, RunSummary::default());
    }
}
