use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Serial connection error: {0}")]
    SerialConnection(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MQTT connection failed: {0}")]
    BrokerConnection(String),

    #[error("MQTT publish error: {0}")]
    Publish(String),

    #[error("Lock acquisition failed")]
    Lock,
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Communication(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        BridgeError::SerialConnection(format!("Serial error: {}", err))
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::Publish(format!("{}", err))
    }
}
