//! MQTT messaging client with an event loop supervisor
//!
//! All I/O lives here: the rumqttc event loop runs in a spawned supervisor
//! task that tracks connection state over a watch channel, drives the
//! bounded fixed-interval retry policy, and dispatches reconnection and
//! interruption notifications to registered listeners. The main task only
//! sees the `MessagingService` surface.

use super::connection::{
    classify_drop, configure_mqtt_options, endpoint_for_attempt, is_reconnect, BrokerError,
    ConnectionState, DropAction, RetryPolicy,
};
use crate::config::BrokerConfig;
use crate::listener::{
    FailedPublishEvent, PublishFailureListener, ReconnectionListener, ServiceEvent,
    ServiceInterruptionListener,
};
use crate::message::{OutboundMessage, Topic};
use crate::transport::MessagingService;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::PublishProperties;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// User property carrying the application-assigned message id
const MESSAGE_ID_PROPERTY: &str = "application-message-id";

/// Reconnection-aware MQTT messaging client
pub struct MqttMessaging {
    config: BrokerConfig,
    retry: RetryPolicy,
    client: Arc<Mutex<AsyncClient>>,
    // Behind a Mutex until connect() hands it to the supervisor; the raw
    // EventLoop is not shareable across threads
    event_loop: Option<Mutex<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnection_listeners: Vec<Arc<dyn ReconnectionListener>>,
    interruption_listeners: Vec<Arc<dyn ServiceInterruptionListener>>,
    failure_listener: Option<Arc<dyn PublishFailureListener>>,
    publisher_started: bool,
}

impl MqttMessaging {
    /// Build a client for the first configured endpoint. The retry policy
    /// is fixed here and never mutated afterward.
    pub fn new(config: BrokerConfig, retry: RetryPolicy) -> Result<Self, BrokerError> {
        let endpoint = endpoint_for_attempt(&config.hosts, 1)
            .ok_or_else(|| BrokerError::InvalidBrokerUrl("empty host list".to_string()))?;
        let mqtt_options = configure_mqtt_options(&config, endpoint)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        Ok(Self {
            config,
            retry,
            client: Arc::new(Mutex::new(client)),
            event_loop: Some(Mutex::new(event_loop)),
            event_loop_handle: None,
            state_tx: None,
            state_rx: None,
            shutdown_tx: None,
            reconnection_listeners: Vec::new(),
            interruption_listeners: Vec::new(),
            failure_listener: None,
            publisher_started: false,
        })
    }

    /// Connect to the broker, spawning the event loop supervisor.
    ///
    /// Blocks until the broker acknowledges the session or the retry
    /// policy is exhausted; exhaustion at startup is fatal to the caller.
    pub async fn connect(&mut self) -> Result<(), BrokerError> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| BrokerError::ConnectionFailed("event loop already started".to_string()))?
            .into_inner();

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state_tx = Some(state_tx.clone());
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let supervisor = Supervisor {
            config: self.config.clone(),
            retry: self.retry.clone(),
            client: self.client.clone(),
            reconnection_listeners: self.reconnection_listeners.clone(),
            interruption_listeners: self.interruption_listeners.clone(),
            state_tx,
            shutdown_rx,
        };
        self.event_loop_handle = Some(tokio::spawn(supervisor.run(event_loop)));

        let max_attempts = self.retry.max_attempts;
        Self::wait_for_connection(state_rx, self.retry.connect_window(), max_attempts).await?;
        info!("Connected to messaging service");
        Ok(())
    }

    /// Wait for the session to reach `Connected`, or fail on retry
    /// exhaustion or timeout
    async fn wait_for_connection(
        mut state_rx: watch::Receiver<ConnectionState>,
        window: Duration,
        max_attempts: u32,
    ) -> Result<(), BrokerError> {
        let outcome = tokio::time::timeout(window, async {
            loop {
                let state = state_rx.borrow().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::PermanentlyDisconnected(_) => {
                        return Err(BrokerError::RetriesExhausted {
                            attempts: max_attempts,
                        });
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(BrokerError::ConnectionFailed(
                        "state channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ConnectionFailed(
                "no connection confirmation within the retry window".to_string(),
            )),
        }
    }

    /// Activate the outbound channel; verifies the session is up
    pub fn start_publisher(&mut self) -> Result<(), BrokerError> {
        let state = self.connection_state().ok_or(BrokerError::NotConnected {
            state: ConnectionState::Disconnected("never connected".to_string()),
        })?;
        if !state.can_publish() {
            return Err(BrokerError::NotConnected { state });
        }
        self.publisher_started = true;
        info!("Direct message publisher ready");
        Ok(())
    }

    /// Deactivate the outbound channel; later publishes are rejected.
    /// Idempotent.
    pub fn terminate_publisher(&mut self) {
        if self.publisher_started {
            self.publisher_started = false;
            info!("Direct message publisher terminated");
        }
    }

    /// Publish one direct message: QoS 0, not retained, properties and the
    /// application message id carried as MQTT v5 user properties.
    ///
    /// Failures are reported to the publish-failure listener and returned;
    /// they never affect the supervisor or the session.
    pub async fn publish(
        &self,
        topic: &Topic,
        message: &OutboundMessage,
    ) -> Result<(), BrokerError> {
        if !self.publisher_started {
            return Err(BrokerError::PublisherNotStarted);
        }
        let state = self.connection_state().unwrap_or(ConnectionState::Connecting);
        if !state.can_publish() {
            self.report_publish_failure(topic, message, format!("not connected: {state:?}"));
            return Err(BrokerError::NotConnected { state });
        }

        let mut props = PublishProperties::default();
        props.user_properties = message
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        props
            .user_properties
            .push((MESSAGE_ID_PROPERTY.to_string(), message.application_message_id.clone()));

        let payload = Bytes::from(message.payload.clone().into_bytes());
        let result = {
            let client = self.client.lock().await;
            client
                .publish_with_properties(topic.as_str(), QoS::AtMostOnce, false, payload, props)
                .await
        };

        if let Err(e) = result {
            let reason = e.to_string();
            self.report_publish_failure(topic, message, reason.clone());
            return Err(BrokerError::PublishFailed(reason));
        }

        debug!(topic = %topic, id = %message.application_message_id, "Enqueued direct message");
        Ok(())
    }

    fn report_publish_failure(&self, topic: &Topic, message: &OutboundMessage, reason: String) {
        if let Some(listener) = &self.failure_listener {
            listener.on_failed_publish(&FailedPublishEvent {
                topic: topic.to_string(),
                message_id: message.application_message_id.clone(),
                reason,
            });
        }
    }

    /// Disconnect from the broker and stop the supervisor
    pub async fn disconnect(&mut self) -> Result<(), BrokerError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        // Best effort: the session may already be gone
        {
            let client = self.client.lock().await;
            let _ = client.disconnect().await;
        }

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(ConnectionState::Disconnected(
                "client disconnected".to_string(),
            ));
        }

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!("Event loop supervisor shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop supervisor ended with error: {e}");
                }
                Err(_) => warn!("Event loop supervisor did not stop in time, aborting"),
                _ => {}
            }
        }

        info!("Disconnected from messaging service");
        Ok(())
    }

    /// Current connection state; None before the first connect
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    pub fn is_ready(&self) -> bool {
        self.publisher_started && self.is_connected()
    }
}

#[async_trait::async_trait]
impl MessagingService for MqttMessaging {
    type Error = BrokerError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttMessaging::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttMessaging::disconnect(self).await
    }

    async fn start_publisher(&mut self) -> Result<(), Self::Error> {
        MqttMessaging::start_publisher(self)
    }

    async fn terminate_publisher(&mut self) -> Result<(), Self::Error> {
        MqttMessaging::terminate_publisher(self);
        Ok(())
    }

    async fn publish(&self, topic: &Topic, message: &OutboundMessage) -> Result<(), Self::Error> {
        MqttMessaging::publish(self, topic, message).await
    }

    fn is_connected(&self) -> bool {
        MqttMessaging::is_connected(self)
    }

    fn is_ready(&self) -> bool {
        MqttMessaging::is_ready(self)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttMessaging::connection_state(self)
    }

    fn add_reconnection_listener(&mut self, listener: Arc<dyn ReconnectionListener>) {
        self.reconnection_listeners.push(listener);
    }

    fn add_service_interruption_listener(
        &mut self,
        listener: Arc<dyn ServiceInterruptionListener>,
    ) {
        self.interruption_listeners.push(listener);
    }

    fn set_publish_failure_listener(&mut self, listener: Arc<dyn PublishFailureListener>) {
        self.failure_listener = Some(listener);
    }
}

/// Routing decision for one polled MQTT event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Broker acknowledged the session
    ConnectionAcknowledged,
    /// Broker closed the session
    Disconnected,
    /// Infrastructure traffic (ping, acks); logged at debug only
    Infrastructure(String),
    /// Outgoing packet, handled by rumqttc
    Outgoing,
}

/// Classify a polled event; pure decision, no I/O
pub(crate) fn route_event(event: &Event) -> EventRoute {
    use rumqttc::v5::mqttbytes::v5::Packet;
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Disconnect(_) => EventRoute::Disconnected,
            other => EventRoute::Infrastructure(format!("{other:?}")),
        },
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

/// Owns the rumqttc event loop for the lifetime of the session.
///
/// Single writer of the connection state channel. Listener callbacks are
/// invoked inline; they are log-only by contract and must not block.
struct Supervisor {
    config: BrokerConfig,
    retry: RetryPolicy,
    client: Arc<Mutex<AsyncClient>>,
    reconnection_listeners: Vec<Arc<dyn ReconnectionListener>>,
    interruption_listeners: Vec<Arc<dyn ServiceInterruptionListener>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self, mut event_loop: EventLoop) {
        info!("Starting MQTT event loop supervisor");
        // Failed attempts since the last acknowledged session
        let mut attempts = 0u32;
        // Once true, later drops count as reconnections, not startup failures
        let mut was_connected = false;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping supervisor");
                        break;
                    }
                }
                polled = event_loop.poll() => {
                    match polled {
                        Ok(event) => match route_event(&event) {
                            EventRoute::ConnectionAcknowledged => {
                                if is_reconnect(was_connected, attempts) {
                                    let e = ServiceEvent::new(
                                        "session re-established",
                                        format!("broker accepted the session after {attempts} attempts"),
                                    );
                                    for listener in &self.reconnection_listeners {
                                        listener.on_reconnected(&e);
                                    }
                                }
                                attempts = 0;
                                was_connected = true;
                                let _ = self.state_tx.send(ConnectionState::Connected);
                            }
                            EventRoute::Disconnected => {
                                let cause = "disconnected by broker".to_string();
                                let _ = self
                                    .state_tx
                                    .send(ConnectionState::Disconnected(cause.clone()));
                                if !self
                                    .handle_drop(&mut attempts, was_connected, &cause, &mut event_loop)
                                    .await
                                {
                                    break;
                                }
                            }
                            EventRoute::Infrastructure(desc) => {
                                debug!(target: "mqtt_transport", "MQTT event: {desc}");
                            }
                            EventRoute::Outgoing => {}
                        },
                        Err(e) => {
                            let cause = e.to_string();
                            let _ = self
                                .state_tx
                                .send(ConnectionState::Disconnected(cause.clone()));
                            if !self
                                .handle_drop(&mut attempts, was_connected, &cause, &mut event_loop)
                                .await
                            {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!("MQTT event loop supervisor stopped");
    }

    /// React to a dropped or failed session. Returns false when the
    /// supervisor should stop.
    async fn handle_drop(
        &mut self,
        attempts: &mut u32,
        was_connected: bool,
        cause: &str,
        event_loop: &mut EventLoop,
    ) -> bool {
        // An orderly shutdown closes the connection too; that drop is not
        // a reconnection and the listeners stay silent
        if *self.shutdown_rx.borrow() {
            return false;
        }

        match classify_drop(&self.retry, *attempts, was_connected) {
            DropAction::GiveUp { notify_interrupted } => {
                let reason = format!(
                    "retry policy exhausted after {} attempts: {cause}",
                    self.retry.max_attempts
                );
                let _ = self
                    .state_tx
                    .send(ConnectionState::PermanentlyDisconnected(reason.clone()));
                if notify_interrupted {
                    let event = ServiceEvent::new(cause, reason);
                    for listener in &self.interruption_listeners {
                        listener.on_service_interrupted(&event);
                    }
                }
                error!(cause = %cause, "Connection retries exhausted");
                false
            }
            DropAction::Retry {
                next_attempt,
                notify_reconnecting,
            } => {
                *attempts = next_attempt;
                let _ = self
                    .state_tx
                    .send(ConnectionState::Reconnecting(next_attempt));
                if notify_reconnecting {
                    let event = ServiceEvent::new(
                        cause,
                        format!(
                            "reconnection attempt {next_attempt} of {}",
                            self.retry.max_attempts
                        ),
                    );
                    for listener in &self.reconnection_listeners {
                        listener.on_reconnecting(&event);
                    }
                }

                info!(
                    attempt = next_attempt,
                    max = self.retry.max_attempts,
                    cause = %cause,
                    "Waiting before next connection attempt"
                );
                if !self.interruptible_sleep(self.retry.interval).await {
                    return false;
                }
                if *self.shutdown_rx.borrow() {
                    return false;
                }

                // Rotate to the next configured endpoint for the coming dial
                self.apply_new_connection(next_attempt + 1, event_loop).await;
                true
            }
        }
    }

    /// Sleep the retry interval; returns false if shutdown arrived first
    async fn interruptible_sleep(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown_rx.wait_for(|stop| *stop) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Swap in a fresh client and event loop for the next attempt's
    /// endpoint, keeping the shared client handle publishable
    async fn apply_new_connection(&self, attempt: u32, event_loop: &mut EventLoop) {
        let Some(endpoint) = endpoint_for_attempt(&self.config.hosts, attempt) else {
            return;
        };
        match configure_mqtt_options(&self.config, endpoint) {
            Ok(options) => {
                let (new_client, new_event_loop) = AsyncClient::new(options, 10);
                *event_loop = new_event_loop;
                let mut guard = self.client.lock().await;
                *guard = new_client;
                debug!(endpoint = %endpoint, "Prepared connection for next attempt");
            }
            Err(e) => {
                // Keep polling the current event loop; it re-dials on its own
                error!(endpoint = %endpoint, "Failed to build options for endpoint: {e}");
            }
        }
    }
}
