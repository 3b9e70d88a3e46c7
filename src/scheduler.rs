use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Owns one periodic background task: an atomic running flag plus the tick
/// interval. Each service instantiates its own; there is no shared module
/// state.
///
/// `stop` only stops scheduling: a tick already in flight runs to
/// completion, and the timer task exits at its next wakeup.
pub struct Scheduler {
    name: &'static str,
    period: Duration,
    run_flag: Mutex<Option<Arc<AtomicBool>>>,
}

impl Scheduler {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            run_flag: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the periodic task. Returns false without side effects when the
    /// scheduler is already running. The first tick fires immediately.
    pub fn start<F, Fut>(&self, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.run_flag.lock().unwrap();
        if slot.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            tracing::debug!(scheduler = self.name, "already running");
            return false;
        }

        let flag = Arc::new(AtomicBool::new(true));
        *slot = Some(flag.clone());

        let name = self.name;
        let period = self.period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                tick().await;
            }

            tracing::debug!(scheduler = name, "timer task exited");
        });

        tracing::info!(scheduler = self.name, period_secs = self.period.as_secs(), "started");
        true
    }

    /// Stop scheduling new ticks. Returns false when not running.
    pub fn stop(&self) -> bool {
        let mut slot = self.run_flag.lock().unwrap();
        match slot.take() {
            Some(flag) if flag.load(Ordering::SeqCst) => {
                flag.store(false, Ordering::SeqCst);
                tracing::info!(scheduler = self.name, "stopped");
                true
            }
            _ => {
                tracing::debug!(scheduler = self.name, "not running");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_flag
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
