use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::booking::BookingService;

/// Background task releasing holds whose payment window closed.
pub struct Sweeper {
    bookings: Arc<BookingService>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(bookings: Arc<BookingService>, interval: Duration) -> Self {
        Self { bookings, interval }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        tracing::info!("Expiry sweeper started (every {}s)", self.interval.as_secs());

        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }

    async fn sweep_once(&self) {
        match self.bookings.sweep_expired().await {
            Ok(report) if report.expired > 0 || report.reschedules_rolled_back > 0 => {
                tracing::info!(
                    expired = report.expired,
                    reschedules_rolled_back = report.reschedules_rolled_back,
                    "Sweep finished"
                );
            }
            Ok(_) => tracing::debug!("Sweep found nothing to release"),
            Err(e) => tracing::error!("Sweep failed: {}", e),
        }
    }
}
