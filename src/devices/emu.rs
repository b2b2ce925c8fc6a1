//! Rainforest EMU-2 serial driver.
//!
//! Opens the USB CDC serial port, issues command envelopes, and runs a
//! background reader thread that decodes notification fragments into a
//! latest-value cache. Consumers read the cache through [`ReadingSource`];
//! reads are non-blocking and tolerate stale snapshots.

use log::{debug, error, info, warn};
use serialport::SerialPort;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use super::protocol::{command, FragmentBuffer};
use super::traits::ReadingSource;
use crate::readings::{Reading, ReadingKind};
use crate::utils::error::BridgeError;

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(200);

type ReadingCache = Arc<RwLock<HashMap<ReadingKind, Reading>>>;

pub struct EmuDevice {
    port_name: String,
    port: Mutex<Option<Box<dyn SerialPort>>>,
    cache: ReadingCache,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl EmuDevice {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            port: Mutex::new(None),
            cache: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    /// Open the serial port and start the background reader. The open is
    /// synchronous: a missing or busy port fails the caller immediately.
    pub fn start_serial(&self) -> Result<(), BridgeError> {
        let mut port_guard = self.port.lock().map_err(|_| BridgeError::Lock)?;
        if port_guard.is_some() {
            warn!("📟 EMU serial already started on {}", self.port_name);
            return Ok(());
        }

        let port = serialport::new(&self.port_name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                BridgeError::SerialConnection(format!(
                    "Failed to open EMU port {}: {}",
                    self.port_name, e
                ))
            })?;
        let reader_port = port.try_clone()?;
        *port_guard = Some(port);
        drop(port_guard);

        self.running.store(true, Ordering::SeqCst);
        let cache = self.cache.clone();
        let running = self.running.clone();
        let port_name = self.port_name.clone();
        let handle = std::thread::spawn(move || {
            info!("📟 EMU reader started on {}", port_name);
            reader_loop(reader_port, cache, running);
            info!("📟 EMU reader stopped");
        });
        *self.reader.lock().map_err(|_| BridgeError::Lock)? = Some(handle);

        Ok(())
    }

    /// Stop the reader thread and release the port. Safe to call more than
    /// once.
    pub fn stop_serial(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                // The reader wakes at least every READ_TIMEOUT, so the join
                // is bounded.
                let _ = handle.join();
            }
        }
        if let Ok(mut port) = self.port.lock() {
            port.take();
        }
    }

    pub fn get_instantaneous_demand(&self, refresh: bool) -> Result<(), BridgeError> {
        self.send_command(&command("get_instantaneous_demand", Some(refresh)))
    }

    pub fn get_current_summation_delivered(&self) -> Result<(), BridgeError> {
        self.send_command(&command("get_current_summation_delivered", Some(true)))
    }

    pub fn get_price_blocks(&self) -> Result<(), BridgeError> {
        self.send_command(&command("get_price_blocks", None))
    }

    fn send_command(&self, envelope: &str) -> Result<(), BridgeError> {
        debug!("📤 EMU command: {}", envelope.trim_end());
        let mut port_guard = self.port.lock().map_err(|_| BridgeError::Lock)?;
        let port = port_guard.as_mut().ok_or_else(|| {
            BridgeError::SerialConnection("EMU serial not started".to_string())
        })?;
        port.write_all(envelope.as_bytes())?;
        port.flush()?;
        Ok(())
    }
}

impl ReadingSource for EmuDevice {
    fn latest(&self, kind: ReadingKind) -> Option<Reading> {
        self.cache
            .read()
            .ok()
            .and_then(|slots| slots.get(&kind).copied())
    }
}

impl Drop for EmuDevice {
    fn drop(&mut self) {
        self.stop_serial();
    }
}

fn reader_loop(mut port: Box<dyn SerialPort>, cache: ReadingCache, running: Arc<AtomicBool>) {
    let mut fragments = FragmentBuffer::new();
    let mut buf = [0u8; 256];

    while running.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => std::thread::sleep(Duration::from_millis(50)),
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                for reading in fragments.feed(&text) {
                    debug!(
                        "📟 {} reading, device time {}",
                        reading.kind, reading.timestamp
                    );
                    if let Ok(mut slots) = cache.write() {
                        slots.insert(reading.kind, reading);
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                error!("❌ EMU serial read error: {}", e);
                std::thread::sleep(Duration::from_millis(500));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_is_none_before_any_reading() {
        let device = EmuDevice::new("/dev/null");
        assert!(device.latest(ReadingKind::Demand).is_none());
        assert!(device.latest(ReadingKind::Price).is_none());
        assert!(device.latest(ReadingKind::Summation).is_none());
    }

    #[test]
    fn command_before_start_fails() {
        let device = EmuDevice::new("/dev/ttyUNUSED");
        assert!(device.get_price_blocks().is_err());
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let device = EmuDevice::new("/dev/ttyUNUSED");
        device.stop_serial();
        device.stop_serial();
    }
}
