use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Paces probe launches to at most `per_sec` per second with a burst of one.
/// Refilling stops when the limiter is dropped.
pub struct RateLimiter {
    sem: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl RateLimiter {
    /// Must be called from within a tokio runtime.
    pub fn new(per_sec: u32) -> Self {
        let sem = Arc::new(Semaphore::new(1));
        let sem_bg = sem.clone();
        // Interval periods must be non-zero; rates above 1M/s pace at 1µs.
        let period = (Duration::from_secs(1) / per_sec.max(1)).max(Duration::from_micros(1));
        let refill = tokio::spawn(async move {
            let mut t = tokio::time::interval(period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t.tick().await;
            loop {
                t.tick().await;
                if sem_bg.available_permits() == 0 {
                    sem_bg.add_permits(1);
                }
            }
        });
        RateLimiter { sem, refill }
    }

    pub async fn acquire(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill.abort();
    }
}
