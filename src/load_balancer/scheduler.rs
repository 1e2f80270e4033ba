//! Delayed reactivation of failed servers.

use std::sync::Arc;
use std::time::Duration;

use crate::load_balancer::server::Server;

/// Schedules a deactivated server to come back into rotation.
///
/// Implementations must not block the caller: release runs on request tasks.
pub trait ReactivationScheduler: Send + Sync + std::fmt::Debug {
    fn schedule(&self, delay: Duration, server: Arc<Server>);
}

/// Scheduler backed by the ambient Tokio runtime.
///
/// Outside of a runtime the timer runs on a short-lived helper thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl ReactivationScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, server: Arc<Server>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    server.activate();
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    server.activate();
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::server::{ServerDescriptor, TrackerWindows};

    #[tokio::test(start_paused = true)]
    async fn test_reactivates_after_delay() {
        let server = Arc::new(
            Server::new(&ServerDescriptor::new("127.0.0.1:8080", 1), TrackerWindows::default()).unwrap(),
        );
        server.deactivate();

        TokioScheduler.schedule(Duration::from_millis(500), server.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!server.is_active());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(server.is_active());
    }
}
