//! Background Expiry Sweeper
//!
//! Items written with an `exptime` are expired lazily when a `get` touches
//! them. Items that are never read again would stay resident forever, so a
//! background task periodically walks every shard and drops expired entries
//! ("active expiry").
//!
//! The sweep interval adapts to the observed expiry rate: it halves (down to
//! `min_interval`) while many keys are expiring and doubles (up to
//! `max_interval`) while nothing is.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval used for the first sweep
    pub base_interval: Duration,

    /// Lower bound for the adaptive interval
    pub min_interval: Duration,

    /// Upper bound for the adaptive interval
    pub max_interval: Duration,

    /// Expired fraction of keys above which sweeping speeds up
    pub speedup_threshold: f64,

    /// Expired fraction of keys below which sweeping slows down
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// Handle to the running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    ///
    /// ```ignore
    /// use memline::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&engine), ExpiryConfig::default());
    /// // ...
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Signals the task to exit. Also called on drop.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = engine.len();
        let expired = engine.cleanup_expired();

        interval = next_interval(interval, &config, expired, keys_before);

        if expired > 0 {
            debug!(
                expired,
                keys_remaining = engine.len(),
                next_ms = interval.as_millis() as u64,
                "Expired keys cleaned up"
            );
        } else {
            trace!(next_ms = interval.as_millis() as u64, "Sweep found nothing");
        }
    }
}

/// Picks the delay before the next sweep from the outcome of the last one.
fn next_interval(
    current: Duration,
    config: &ExpiryConfig,
    expired: u64,
    keys_before: u64,
) -> Duration {
    if keys_before == 0 {
        return current;
    }

    let rate = expired as f64 / keys_before as f64;
    if rate > config.speedup_threshold {
        (current / 2).max(config.min_interval)
    } else if expired == 0 && rate < config.slowdown_threshold {
        (current * 2).min(config.max_interval)
    } else {
        current
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine.set_with_ttl(
                Bytes::from(format!("key{}", i)),
                Bytes::from("value"),
                Duration::from_millis(50),
            );
        }
        engine.set(Bytes::from("persistent"), Bytes::from("value"));
        assert_eq!(engine.len(), 11);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.len(), 1);
        assert!(engine.exists(b"persistent"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody swept it, so it is still counted until a lookup expires it lazily.
        assert_eq!(engine.len(), 1);
        assert!(engine.get(b"key").is_none());
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn test_next_interval_adapts() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        assert_eq!(next_interval(base, &config, 50, 100), base / 2);
        assert_eq!(next_interval(base, &config, 0, 100), base * 2);
        assert_eq!(next_interval(base, &config, 10, 100), base);
        assert_eq!(next_interval(base, &config, 0, 0), base);

        assert_eq!(
            next_interval(config.min_interval, &config, 100, 100),
            config.min_interval
        );
        assert_eq!(
            next_interval(config.max_interval, &config, 0, 100),
            config.max_interval
        );
    }
}
