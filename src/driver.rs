//! Counter-driven publish loop with orderly shutdown
//!
//! The driver owns the messaging service and a shutdown token. It publishes
//! a bounded batch per cycle, pauses between sends and between cycles, and
//! on shutdown always terminates the publisher before disconnecting, no
//! matter where in the cycle the signal arrived.

use crate::config::PublishSettings;
use crate::error::{PublisherError, PublisherResult};
use crate::message::{MessageBuilder, Topic};
use crate::transport::MessagingService;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Bounded counter cycling through `[1, max]`
#[derive(Debug, Clone)]
pub struct CycleCounter {
    next: u32,
    max: u32,
}

impl CycleCounter {
    pub fn new(max: u32) -> Self {
        debug_assert!(max >= 1);
        Self { next: 1, max }
    }

    /// Return the current value and step forward, wrapping back to 1
    pub fn advance(&mut self) -> u32 {
        let value = self.next;
        self.next = if value >= self.max { 1 } else { value + 1 };
        value
    }

    /// True right after a full batch, before the counter restarts
    pub fn at_cycle_start(&self) -> bool {
        self.next == 1
    }
}

/// Drives the publish loop against an injected messaging service
pub struct PublisherLoopDriver<T: MessagingService> {
    service: T,
    settings: PublishSettings,
    shutdown_rx: watch::Receiver<bool>,
    published: u64,
}

impl<T: MessagingService> PublisherLoopDriver<T> {
    /// The service must already be connected; `run` starts the publisher
    /// itself. Flipping the watch channel to `true` requests shutdown.
    pub fn new(service: T, settings: PublishSettings, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            service,
            settings,
            shutdown_rx,
            published: 0,
        }
    }

    /// Run the loop until shutdown is requested, then terminate the
    /// publisher and disconnect. The shutdown sequence runs exactly once,
    /// on every exit path out of the loop.
    pub async fn run(mut self) -> PublisherResult<u64> {
        self.service
            .start_publisher()
            .await
            .map_err(PublisherError::transport)?;
        if !self.service.is_ready() {
            return Err(PublisherError::startup("publisher is not ready"));
        }

        let builder = MessageBuilder::new()
            .with_property("application", "samples")
            .with_property("language", "Rust");

        let mut counter = CycleCounter::new(self.settings.message_count);
        info!("Publishing; send an interrupt signal to stop");

        loop {
            // Shutdown is only observed at iteration boundaries, so a
            // message already being published is never cut short
            if *self.shutdown_rx.borrow() {
                break;
            }

            let count = counter.advance();
            let topic = Topic::direct(&self.settings.topic_prefix, count);
            let message = builder
                .clone()
                .with_application_message_id(format!("msg-{count}"))
                .build(format!("{} + {count}", self.settings.message_body));

            match self.service.publish(&topic, &message).await {
                Ok(()) => {
                    self.published += 1;
                    info!(topic = %topic, count, "Message published");
                }
                // Non-fatal: the failure listener already reported it
                Err(e) => warn!(topic = %topic, count, "Publish failed, continuing: {e}"),
            }

            if self.pause(self.settings.per_message_delay).await {
                break;
            }
            if counter.at_cycle_start() {
                // Longer pause between cycles before the counter restarts
                if self.pause(self.settings.cycle_delay).await {
                    break;
                }
            }
        }

        self.shutdown().await?;
        Ok(self.published)
    }

    /// Sleep, waking early on shutdown; returns true if shutdown arrived
    async fn pause(&mut self, delay: Duration) -> bool {
        let interrupted = tokio::select! {
            _ = self.shutdown_rx.wait_for(|stop| *stop) => true,
            _ = tokio::time::sleep(delay) => false,
        };
        interrupted || *self.shutdown_rx.borrow()
    }

    /// Terminate the publisher strictly before closing the connection.
    /// A terminate failure is logged but never skips the disconnect.
    async fn shutdown(&mut self) -> PublisherResult<()> {
        info!("Shutting down: terminating publisher");
        if let Err(e) = self.service.terminate_publisher().await {
            error!("Error terminating publisher: {e}");
        }
        info!("Shutting down: disconnecting from messaging service");
        self.service
            .disconnect()
            .await
            .map_err(PublisherError::transport)?;
        info!(published = self.published, "Publisher loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_cycles_through_bounds() {
        let mut counter = CycleCounter::new(3);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.advance(), 3);
        // Wraps back to 1, never exceeding the bound
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
    }

    #[test]
    fn test_counter_reports_cycle_boundary() {
        let mut counter = CycleCounter::new(2);
        counter.advance();
        assert!(!counter.at_cycle_start());
        counter.advance();
        assert!(counter.at_cycle_start());
    }

    #[test]
    fn test_counter_with_batch_of_one() {
        let mut counter = CycleCounter::new(1);
        assert_eq!(counter.advance(), 1);
        assert!(counter.at_cycle_start());
        assert_eq!(counter.advance(), 1);
    }
}
