//! MQTT publisher built on rumqttc's async client.
//!
//! The connection is established in the background: `MqttPublisher::connect`
//! returns immediately and a spawned task drives the event loop, translating
//! broker events into [`ConnectionState`] flags. The main loop gates on
//! those flags before publishing.

use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet, QoS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::readings::OutboundMessage;
use crate::utils::error::BridgeError;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Broker connection flags, written only by the event-loop task and read by
/// the control loop and reconciler. Single-flag last-write-wins; no locking
/// needed.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
    bad_connection: AtomicBool,
    shutting_down: AtomicBool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The broker actively refused us; the process should give up.
    pub fn is_bad(&self) -> bool {
        self.bad_connection.load(Ordering::SeqCst)
    }

    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn mark_refused(&self) {
        self.bad_connection.store(true, Ordering::SeqCst);
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Publish seam between the reconciler and the broker client.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a reading value at the configured QoS, not retained.
    async fn publish(&self, message: &OutboundMessage) -> Result<(), BridgeError>;

    /// Publish the retained "online" liveness marker to the LWT topic.
    async fn publish_online(&self) -> Result<(), BridgeError>;
}

pub struct MqttPublisher {
    client: AsyncClient,
    state: Arc<ConnectionState>,
    lwt_topic: String,
    qos: QoS,
    event_task: JoinHandle<()>,
}

impl MqttPublisher {
    /// Configure the client (last will, credentials, keepalive) and start
    /// connecting asynchronously. Returns before the connection completes;
    /// watch [`ConnectionState`] for the outcome.
    pub fn connect(settings: &Settings) -> Self {
        let mut options = MqttOptions::new(
            &settings.mqtt_client_name,
            &settings.mqtt_server,
            settings.mqtt_port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        let lwt_topic = settings.topic("lwt");
        let qos = qos_level(settings.mqtt_qos);
        options.set_last_will(LastWill::new(&lwt_topic, "offline", qos, true));
        if !settings.mqtt_username.is_empty() {
            options.set_credentials(&settings.mqtt_username, &settings.mqtt_password);
        }

        let (client, event_loop) = AsyncClient::new(options, 10);
        let state = Arc::new(ConnectionState::new());
        let event_task = tokio::spawn(drive_event_loop(event_loop, state.clone()));

        info!(
            "Connecting to MQTT broker {}:{} as {}",
            settings.mqtt_server, settings.mqtt_port, settings.mqtt_client_name
        );

        Self {
            client,
            state,
            lwt_topic,
            qos,
            event_task,
        }
    }

    pub fn state(&self) -> Arc<ConnectionState> {
        self.state.clone()
    }

    /// Send the MQTT disconnect and stop the background event loop.
    pub async fn disconnect(&self) {
        self.state.begin_shutdown();
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect while shutting down: {}", e);
        }
        self.event_task.abort();
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), BridgeError> {
        match serde_json::to_string(message) {
            Ok(json) => info!("📤 {}", json),
            Err(e) => info!("📤 {:?} (serialize error: {})", message, e),
        }
        self.client
            .publish(&message.topic, self.qos, false, message.value.to_string())
            .await?;
        Ok(())
    }

    async fn publish_online(&self) -> Result<(), BridgeError> {
        self.client
            .publish(&self.lwt_topic, self.qos, true, "online")
            .await?;
        Ok(())
    }
}

/// Drive the rumqttc event loop, mirroring the broker callbacks into the
/// shared state flags. A refused connection is terminal; transient
/// connection errors keep the loop polling so rumqttc can reconnect.
async fn drive_event_loop(mut event_loop: EventLoop, state: Arc<ConnectionState>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT.");
                    state.mark_connected();
                } else {
                    error!("🚨 Error on MQTT connect: {:?}", ack.code);
                    state.mark_refused();
                    state.mark_disconnected();
                    break;
                }
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                if state.is_shutting_down() {
                    break;
                }
                if state.is_connected() {
                    error!("MQTT disconnected, error {}", e);
                }
                state.mark_disconnected();
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

fn qos_level(raw: u8) -> QoS {
    match raw {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_defaults() {
        let state = ConnectionState::new();
        assert!(!state.is_connected());
        assert!(!state.is_bad());
    }

    #[test]
    fn connection_state_transitions() {
        let state = ConnectionState::new();
        state.mark_connected();
        assert!(state.is_connected());
        state.mark_disconnected();
        assert!(!state.is_connected());
        state.mark_refused();
        assert!(state.is_bad());
    }

    #[test]
    fn qos_levels_map_like_the_cli_flag() {
        assert_eq!(qos_level(0), QoS::AtMostOnce);
        assert_eq!(qos_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_level(2), QoS::ExactlyOnce);
    }
}
