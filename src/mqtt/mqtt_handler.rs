//! Broker connection actor
//!
//! A single task owns the rumqttc client and event loop. Publishes reach it
//! through [`MQTTHandle`] over an mpsc channel and are answered on a oneshot,
//! so the session is never touched by two requests at once and a reconnect
//! never overlaps a publish.
//!
//! ```text
//! MQTTHandle ─[BrokerAction]→ MqttHandler ─[rumqttc]→ Broker
//!      ↑                          │
//!      └──────[MQTTStatus]────────┘ (watch)
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::error::{ConnectError, PublishError};
use super::message_manager::{BrokerAction, MQTTMessage};

const CLIENT_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
/// Extra time a requester waits beyond the actor's deadline for the reply
const REPLY_MARGIN: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the broker session, published on every change
#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_sent: usize,
    pub publish_failures: usize,
    pub reconnect_attempts: usize,
    /// A background reconnect is scheduled
    pub reconnect_pending: bool,
    pub last_activity: Option<DateTime<Local>>,
}

/// Resolves the configured broker host
///
/// Called once at startup; failure here is treated as a fatal configuration
/// error by the caller.
pub async fn resolve_broker(config: &MqttConfig) -> Result<SocketAddr, ConnectError> {
    let addr = config.broker_addr();
    let mut addrs = tokio::net::lookup_host(addr.as_str())
        .await
        .map_err(|e| ConnectError::Resolve {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    addrs.next().ok_or_else(|| ConnectError::Resolve {
        addr: addr.clone(),
        reason: "no addresses returned".to_string(),
    })
}

fn build_session(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut mqtt_options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    mqtt_options.set_keep_alive(config.keep_alive());

    if let Some((user, pw)) = config.credentials() {
        mqtt_options.set_credentials(user, pw);
    } else if config.username.is_some() || config.password.is_some() {
        warn!("MQTT username and password must both be set; connecting without credentials");
    }

    AsyncClient::new(mqtt_options, CLIENT_CHANNEL_CAPACITY)
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(ConnectError::Refused(ack.code))
                };
            }
            Ok(event) => debug!("Event while connecting: {:?}", event),
            Err(ConnectionError::ConnectionRefused(code)) => return Err(ConnectError::Refused(code)),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Polls until the queued publish has left the client (QoS 0) or has been
/// acknowledged (QoS 1 and 2)
async fn wait_for_delivery(eventloop: &mut EventLoop, qos: QoS) -> Result<(), ConnectionError> {
    loop {
        let event = eventloop.poll().await?;
        let delivered = matches!(
            (&event, qos),
            (Event::Outgoing(Outgoing::Publish(_)), QoS::AtMostOnce)
                | (Event::Incoming(Packet::PubAck(_)), QoS::AtLeastOnce)
                | (Event::Incoming(Packet::PubComp(_)), QoS::ExactlyOnce)
        );
        if delivered {
            return Ok(());
        }
        debug!("Event while publishing: {:?}", event);
    }
}

fn time_left(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Owner of the broker session
pub struct MqttHandler {
    config: MqttConfig,
    qos: QoS,
    client: AsyncClient,
    eventloop: EventLoop,
    status_tx: watch::Sender<MQTTStatus>,
    actions: mpsc::Receiver<BrokerAction>,
    next_reconnect: Option<Instant>,
}

impl MqttHandler {
    pub fn new(
        config: MqttConfig,
        actions: mpsc::Receiver<BrokerAction>,
        status_tx: watch::Sender<MQTTStatus>,
    ) -> Self {
        let qos = config.qos().unwrap_or_else(|| {
            warn!("Unsupported QoS {}, falling back to QoS 0", config.qos);
            QoS::AtMostOnce
        });
        let (client, eventloop) = build_session(&config);

        MqttHandler {
            config,
            qos,
            client,
            eventloop,
            status_tx,
            actions,
            next_reconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status_tx.borrow().connection_state
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state();
        if previous != state {
            info!("Broker connection state {:?} -> {:?}", previous, state);
        }
        self.status_tx.send_modify(|status| {
            status.connection_state = state;
            if state == ConnectionState::Connected {
                status.last_error = None;
            }
        });
    }

    /// Establishes a fresh session and waits for the broker's CONNACK
    ///
    /// Every attempt starts from a new client and event loop so nothing queued
    /// on a broken session can be replayed later.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.connect_within(self.config.connect_timeout()).await
    }

    async fn connect_within(&mut self, limit: Duration) -> Result<(), ConnectError> {
        self.set_state(ConnectionState::Connecting);
        let (client, eventloop) = build_session(&self.config);
        self.client = client;
        self.eventloop = eventloop;

        let result = match timeout(limit, wait_for_connack(&mut self.eventloop)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(limit)),
        };

        match &result {
            Ok(()) => {
                info!(
                    "Connected to MQTT broker {} as {}",
                    self.config.broker_addr(),
                    self.config.client_id
                );
                self.next_reconnect = None;
                self.status_tx
                    .send_modify(|status| status.reconnect_pending = false);
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                let reason = e.to_string();
                self.status_tx
                    .send_modify(|status| status.last_error = Some(reason));
                self.set_state(ConnectionState::Disconnected);
            }
        }
        result
    }

    /// One publish attempt over the session, finished before `deadline`
    ///
    /// Reconnects once first if the session is down. Never retries the publish.
    /// Each step is bounded by its configured timeout or by the time left
    /// until `deadline`, whichever is shorter.
    pub async fn publish(
        &mut self,
        message: &MQTTMessage,
        deadline: Instant,
    ) -> Result<(), PublishError> {
        if self.state() != ConnectionState::Connected {
            let limit = self.config.connect_timeout().min(time_left(deadline));
            if limit.is_zero() {
                debug!("No time left to reconnect for {}", message.topic);
                return Err(PublishError::BrokerUnavailable);
            }

            info!("Session down, reconnecting before publish to {}", message.topic);
            if let Err(e) = self.connect_within(limit).await {
                warn!("Reconnect before publish failed: {}", e);
                self.schedule_reconnect();
                return Err(PublishError::BrokerUnavailable);
            }
        }

        let limit = self.config.publish_timeout().min(time_left(deadline));
        if limit.is_zero() {
            debug!("No time left to publish {}", message.topic);
            return Err(PublishError::BrokerUnavailable);
        }

        debug!("Publishing {}", message);
        if let Err(e) = self.client.try_publish(
            message.topic.clone(),
            self.qos,
            self.config.retain,
            message.payload.clone().into_bytes(),
        ) {
            warn!("Client refused publish to {}: {}", message.topic, e);
            return Err(PublishError::BrokerRejected(e.to_string()));
        }

        match timeout(limit, wait_for_delivery(&mut self.eventloop, self.qos)).await {
            Ok(Ok(())) => {
                debug!("Published to {}", message.topic);
                Ok(())
            }
            Ok(Err(ConnectionError::MqttState(e))) => {
                warn!("Broker rejected publish to {}: {}", message.topic, e);
                let reason = e.to_string();
                self.connection_lost(reason.clone());
                Err(PublishError::BrokerRejected(reason))
            }
            Ok(Err(e)) => {
                warn!("Connection failed during publish to {}: {}", message.topic, e);
                self.connection_lost(e.to_string());
                Err(PublishError::BrokerUnavailable)
            }
            Err(_) => {
                warn!("Publish to {} not delivered within {:?}", message.topic, limit);
                self.connection_lost(format!("publish timed out after {:?}", limit));
                Err(PublishError::BrokerUnavailable)
            }
        }
    }

    fn connection_lost(&mut self, reason: String) {
        self.status_tx
            .send_modify(|status| status.last_error = Some(reason));
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.next_reconnect.is_none() {
            let delay = self.config.reconnect_delay();
            debug!("Scheduling reconnect in {:?}", delay);
            self.next_reconnect = Some(Instant::now() + delay);
            self.status_tx
                .send_modify(|status| status.reconnect_pending = true);
        }
    }

    async fn reconnect(&mut self) {
        self.next_reconnect = None;
        self.status_tx.send_modify(|status| {
            status.reconnect_pending = false;
            status.reconnect_attempts += 1;
        });

        if let Err(e) = self.connect().await {
            warn!(
                "Reconnect to {} failed: {}; retrying in {:?}",
                self.config.broker_addr(),
                e,
                self.config.reconnect_delay()
            );
            self.schedule_reconnect();
        }
    }

    fn handle_event(&mut self, event: Result<Event, ConnectionError>) {
        match event {
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the session");
                self.connection_lost("broker sent DISCONNECT".to_string());
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                warn!("Lost connection to broker: {}", e);
                self.connection_lost(e.to_string());
            }
        }
    }

    async fn handle_action(&mut self, action: BrokerAction) {
        match action {
            BrokerAction::Publish {
                message,
                deadline,
                response_tx,
            } => {
                if response_tx.is_closed() {
                    debug!("Dropping publish to {}, requester gave up", message.topic);
                    return;
                }

                let result = self.publish(&message, deadline).await;
                let sent = result.is_ok();
                self.status_tx.send_modify(|status| {
                    if sent {
                        status.messages_sent += 1;
                    } else {
                        status.publish_failures += 1;
                    }
                    status.last_activity = Some(Local::now());
                });

                if response_tx.send(result).is_err() {
                    debug!("Publish result for {} discarded", message.topic);
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        if self.state() == ConnectionState::Connected {
            info!("Disconnecting from MQTT broker");
            if let Err(e) = self.client.try_disconnect() {
                warn!("Failed to queue DISCONNECT: {}", e);
            } else {
                let flushed = timeout(DISCONNECT_GRACE, async {
                    loop {
                        match self.eventloop.poll().await {
                            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                })
                .await;
                if flushed.is_err() {
                    debug!("DISCONNECT not flushed within {:?}", DISCONNECT_GRACE);
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Main loop of the actor
    ///
    /// Polls the event loop only while connected, so keep-alives flow and a
    /// dropped connection is noticed. While disconnected it waits for the next
    /// scheduled reconnect instead.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Connecting to MQTT broker {} as {}",
            self.config.broker_addr(),
            self.config.client_id
        );
        if let Err(e) = self.connect().await {
            warn!("Initial broker connection failed: {}", e);
            self.schedule_reconnect();
        }

        loop {
            let connected = self.state() == ConnectionState::Connected;
            let reconnect_at = self.next_reconnect;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.shutdown().await;
                    break;
                }
                action = self.actions.recv() => match action {
                    Some(action) => self.handle_action(action).await,
                    None => {
                        info!("All broker handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                event = self.eventloop.poll(), if connected => self.handle_event(event),
                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if !connected && reconnect_at.is_some() => {
                    self.reconnect().await;
                }
            }
        }

        info!("Broker connection task stopped");
    }
}

/// Cloneable front of the connection actor
#[derive(Clone, Debug)]
pub struct MQTTHandle {
    tx: mpsc::Sender<BrokerAction>,
    status: watch::Receiver<MQTTStatus>,
    deadline: Duration,
}

impl MQTTHandle {
    /// Spawns the connection actor; the initial connect happens inside the task
    pub fn spawn(config: MqttConfig, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(MQTTStatus::default());
        let deadline = config.request_deadline();

        let handler = MqttHandler::new(config, rx, status_tx);
        let task = tokio::spawn(handler.run(shutdown));

        (
            Self {
                tx,
                status: status_rx,
                deadline,
            },
            task,
        )
    }

    /// Publishes one message, bounded by connect + publish timeout
    ///
    /// Waiting in the queue behind other publishes or a reconnect counts
    /// against the same deadline. The actor answers by that deadline, so a
    /// `BrokerUnavailable` here means the message was not handed to the broker.
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let (response_tx, response_rx) = oneshot::channel();
        let action = BrokerAction::Publish {
            message: MQTTMessage::from_topic(topic.to_string(), payload.to_string()),
            deadline: Instant::now() + self.deadline,
            response_tx,
        };

        let exchange = async {
            if self.tx.send(action).await.is_err() {
                error!("Broker connection task is not running");
                return Err(PublishError::BrokerUnavailable);
            }
            match response_rx.await {
                Ok(result) => result,
                Err(_) => Err(PublishError::BrokerUnavailable),
            }
        };

        let limit = self.deadline + REPLY_MARGIN;
        match timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No publish result for {} within {:?}", topic, limit);
                Err(PublishError::BrokerUnavailable)
            }
        }
    }

    pub fn status(&self) -> MQTTStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().connection_state
    }
}
