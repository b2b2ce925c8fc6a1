//! Startup and shutdown sequencing around the reconcile loop.
//!
//! Startup: begin the asynchronous broker connect, open the EMU serial port
//! (fail fast), prime the three readings, then enter the loop, which blocks
//! until the broker reports connected. Shutdown: on Ctrl-C, stop the broker
//! loop, disconnect, stop the serial reader and wait a fixed grace period
//! for in-flight QoS handshakes and serial teardown.

use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::reconciler::ReadingReconciler;
use crate::config::Settings;
use crate::devices::EmuDevice;
use crate::output::{ConnectionState, MqttPublisher, Publisher};
use crate::utils::error::BridgeError;

/// Fixed sleep between reconcile cycles; not drift-corrected, so the actual
/// period is this plus the cycle duration.
const CYCLE_INTERVAL: Duration = Duration::from_secs(10);
/// Poll interval while waiting for the broker connection.
const CONNECT_POLL: Duration = Duration::from_secs(3);
/// Grace period after teardown before the process exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(4);

pub struct LifecycleController {
    settings: Settings,
    device: Arc<EmuDevice>,
    publisher: Arc<MqttPublisher>,
    state: Arc<ConnectionState>,
    shutting_down: AtomicBool,
}

impl LifecycleController {
    /// Idle → Starting → Running: kick off the broker connect, open the
    /// serial port and prime the demand, summation and price readings.
    pub fn start(settings: Settings) -> Result<Self, BridgeError> {
        let publisher = Arc::new(MqttPublisher::connect(&settings));
        let state = publisher.state();

        let device = Arc::new(EmuDevice::new(settings.serial_port.clone()));
        device.start_serial()?;
        info!("Connected to EMU serial");

        device.get_instantaneous_demand(true)?;
        device.get_current_summation_delivered()?;
        device.get_price_blocks()?;

        Ok(Self {
            settings,
            device,
            publisher,
            state,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Run the reconcile loop until interrupted or the broker refuses the
    /// connection. Returns `Ok` after a graceful shutdown.
    pub async fn run(self) -> Result<(), BridgeError> {
        let mut reconciler = ReadingReconciler::new(
            self.device.clone(),
            self.publisher.clone(),
            self.state.clone(),
            self.settings.mqtt_topic.clone(),
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Caught an interrupt, cleaning up and exiting");
                    break;
                }
                result = self.cycle(&mut reconciler) => {
                    if let Err(e) = result {
                        error!("🚨 {}", e);
                        self.abort().await;
                        return Err(e);
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn cycle(&self, reconciler: &mut ReadingReconciler) -> Result<(), BridgeError> {
        wait_for_broker(&self.state).await?;

        if let Err(e) = self.publisher.publish_online().await {
            error!("❌ Failed to publish liveness marker: {}", e);
        }

        debug!("Checking for serial messages");
        reconciler.reconcile_once().await;

        debug!("Sleeping for 10 seconds");
        sleep(CYCLE_INTERVAL).await;
        Ok(())
    }

    /// Teardown for the fatal path (broker refused the connection): stop
    /// the broker event loop and the serial reader, no grace period.
    async fn abort(&self) {
        self.publisher.disconnect().await;
        self.device.stop_serial();
    }

    /// Running → ShuttingDown → Stopped. Idempotent: a second invocation
    /// (or a second interrupt) does nothing.
    pub async fn shutdown(&self) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.publisher.disconnect().await;
        self.device.stop_serial();
        sleep(SHUTDOWN_GRACE).await;
        info!("Shutdown complete");
        true
    }
}

/// Block until the broker reports connected, polling every few seconds. A
/// refused connection aborts the process instead of waiting forever.
pub(crate) async fn wait_for_broker(state: &ConnectionState) -> Result<(), BridgeError> {
    while !state.is_connected() {
        if state.is_bad() {
            return Err(BridgeError::BrokerConnection(
                "connection refused by broker".to_string(),
            ));
        }
        debug!("Waiting to connect to MQTT...");
        sleep(CONNECT_POLL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_connected() {
        let state = ConnectionState::new();
        state.mark_connected();
        assert!(wait_for_broker(&state).await.is_ok());
    }

    #[tokio::test]
    async fn bad_connection_aborts_the_wait() {
        let state = ConnectionState::new();
        state.mark_refused();
        let result = wait_for_broker(&state).await;
        assert!(matches!(result, Err(BridgeError::BrokerConnection(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_polls_until_connected() {
        let state = Arc::new(ConnectionState::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { wait_for_broker(&state).await })
        };
        // Let a couple of poll rounds elapse before the broker comes up.
        tokio::time::sleep(Duration::from_secs(7)).await;
        state.mark_connected();
        let result = waiter.await.expect("waiter panicked");
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_teardown_stops_publisher_and_serial() {
        let settings = Settings::for_tests("/dev/ttyUNUSED");
        let publisher = Arc::new(MqttPublisher::connect(&settings));
        let controller = LifecycleController {
            settings,
            device: Arc::new(EmuDevice::new("/dev/ttyUNUSED")),
            state: publisher.state(),
            publisher,
            shutting_down: AtomicBool::new(false),
        };

        controller.abort().await;
        // Repeat teardown must be harmless; the event task is already gone.
        controller.abort().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_runs_exactly_once() {
        let settings = Settings::for_tests("/dev/ttyUNUSED");
        let publisher = Arc::new(MqttPublisher::connect(&settings));
        let controller = LifecycleController {
            settings,
            device: Arc::new(EmuDevice::new("/dev/ttyUNUSED")),
            state: publisher.state(),
            publisher,
            shutting_down: AtomicBool::new(false),
        };

        assert!(controller.shutdown().await);
        // Second interrupt while already shutting down is a no-op.
        assert!(!controller.shutdown().await);
    }
}
