//! One reusable loop for every background task: run a pass immediately,
//! then once per tick, until the shutdown token fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_core::Result;

/// Upper bound on a single pass, whatever the task's cadence.
pub const MAX_PASS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The work a periodic task performs on every tick.
#[async_trait]
pub trait Pass: Send + Sync + 'static {
    async fn run(&self) -> Result<()>;
}

pub struct PeriodicTask {
    name: &'static str,
    every: Duration,
    pass_timeout: Duration,
    pass: Arc<dyn Pass>,
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("every", &self.every)
            .field("pass_timeout", &self.pass_timeout)
            .finish()
    }
}

impl PeriodicTask {
    /// Passes time out after the shorter of `every` and [`MAX_PASS_TIMEOUT`].
    pub fn new(name: &'static str, every: Duration, pass: Arc<dyn Pass>) -> Self {
        Self {
            name,
            every,
            pass_timeout: every.min(MAX_PASS_TIMEOUT),
            pass,
        }
    }

    pub fn with_pass_timeout(mut self, pass_timeout: Duration) -> Self {
        self.pass_timeout = pass_timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Never starts a pass once `shutdown` is cancelled; a pass already
    /// running is allowed to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(task = self.name, every = ?self.every, "Periodic task started");

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_pass().await;
        }

        info!(task = self.name, "Periodic task stopped");
    }

    async fn run_pass(&self) {
        match timeout(self.pass_timeout, self.pass.run()).await {
            Ok(Ok(())) => debug!(task = self.name, "Pass finished"),
            Ok(Err(e)) => error!(task = self.name, "Pass failed: {}", e),
            Err(_) => warn!(
                task = self.name,
                timeout = ?self.pass_timeout,
                "Pass timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::VigilError;

    #[derive(Default)]
    struct CountingPass {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Pass for CountingPass {
        async fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VigilError::store("database unavailable"));
            }
            Ok(())
        }
    }

    struct SlowPass {
        finished: AtomicUsize,
    }

    #[async_trait]
    impl Pass for SlowPass {
        async fn run(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_tick_until_cancelled() {
        let pass = Arc::new(CountingPass::default());
        let token = CancellationToken::new();
        let handle =
            PeriodicTask::new("counting", Duration::from_secs(60), pass.clone()).spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(125)).await;
        token.cancel();
        handle.await.unwrap();
        assert_eq!(pass.runs.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(pass.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_does_not_stop_the_loop() {
        let pass = Arc::new(CountingPass {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let token = CancellationToken::new();
        let handle =
            PeriodicTask::new("failing", Duration::from_secs(60), pass.clone()).spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(65)).await;
        token.cancel();
        handle.await.unwrap();
        assert_eq!(pass.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_pass_finishes_after_cancellation() {
        let pass = Arc::new(SlowPass {
            finished: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();
        let handle =
            PeriodicTask::new("slow", Duration::from_secs(3600), pass.clone()).spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(pass.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pass_is_bounded_by_timeout() {
        let pass = Arc::new(SlowPass {
            finished: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();
        let handle = PeriodicTask::new("bounded", Duration::from_secs(3600), pass.clone())
            .with_pass_timeout(Duration::from_secs(2))
            .spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(pass.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_token_starts_no_pass() {
        let pass = Arc::new(CountingPass::default());
        let token = CancellationToken::new();
        token.cancel();

        PeriodicTask::new("idle", Duration::from_secs(60), pass.clone())
            .run(token)
            .await;

        assert_eq!(pass.runs.load(Ordering::SeqCst), 0);
    }
}
