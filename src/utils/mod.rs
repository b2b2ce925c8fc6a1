pub mod error;

pub use error::BridgeError;
