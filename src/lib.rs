//! pubcycle - reconnection-aware direct message publisher loop
//!
//! Connects to an MQTT broker with a bounded fixed-interval retry policy,
//! registers reconnection / service-interruption / publish-failure
//! listeners, then publishes a small batch of direct (QoS 0, non-retained)
//! messages to counter-suffixed topics on an endless cycle until an
//! interrupt signal triggers an orderly terminate-then-disconnect shutdown.
//!
//! # Overview
//!
//! - [`config`] - environment-driven broker configuration and fixed loop settings
//! - [`transport`] - the [`MessagingService`] seam and its MQTT implementation
//! - [`listener`] - notification callbacks for session and publish events
//! - [`driver`] - the counter-driven publish loop with shutdown ordering
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pubcycle::config::{BrokerConfig, PublishSettings};
//! use pubcycle::driver::PublisherLoopDriver;
//! use pubcycle::transport::{mqtt::RetryPolicy, MessagingService, MqttMessaging};
//!
//! # tokio_test::block_on(async {
//! let config = BrokerConfig::from_env();
//! let mut service = MqttMessaging::new(config, RetryPolicy::default())?;
//! service.connect().await?;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let driver = PublisherLoopDriver::new(service, PublishSettings::default(), shutdown_rx);
//! # drop(shutdown_tx);
//! driver.run().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod listener;
pub mod message;
pub mod observability;
pub mod transport;

pub use config::{BrokerConfig, PublishSettings};
pub use driver::PublisherLoopDriver;
pub use error::{PublisherError, PublisherResult};
pub use listener::{
    FailedPublishEvent, LoggingPublishFailureHandler, LoggingServiceEventHandler,
    PublishFailureListener, ReconnectionListener, ServiceEvent, ServiceInterruptionListener,
};
pub use message::{MessageBuilder, OutboundMessage, Topic};
pub use transport::{MessagingService, MqttMessaging};
