pub mod mqtt;

pub use mqtt::{ConnectionState, MqttPublisher, Publisher};
