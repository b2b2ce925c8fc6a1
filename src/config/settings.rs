use clap::ArgMatches;
use serde::{Deserialize, Serialize};

use crate::utils::error::BridgeError;

/// Runtime settings, built from the parsed CLI arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub serial_port: String,
    pub debug: bool,
    pub mqtt_client_name: String,
    pub mqtt_server: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    /// Root topic; per-reading topics hang under it.
    pub mqtt_topic: String,
    pub mqtt_qos: u8,
}

impl Settings {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, BridgeError> {
        let settings = Self {
            serial_port: required_string(matches, "serial_port")?,
            debug: matches.get_flag("debug"),
            mqtt_client_name: required_string(matches, "mqtt_client_name")?,
            mqtt_server: required_string(matches, "mqtt_server")?,
            mqtt_port: *matches
                .get_one::<u16>("mqtt_port")
                .ok_or_else(|| missing("mqtt_port"))?,
            mqtt_username: required_string(matches, "mqtt_username")?,
            mqtt_password: required_string(matches, "mqtt_password")?,
            mqtt_topic: required_string(matches, "mqtt_topic")?,
            mqtt_qos: *matches
                .get_one::<u8>("mqtt_qos")
                .ok_or_else(|| missing("mqtt_qos"))?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.serial_port.is_empty() {
            return Err(BridgeError::Config("serial port must not be empty".to_string()));
        }
        if self.mqtt_qos > 2 {
            return Err(BridgeError::Config(format!(
                "MQTT QoS must be 0, 1 or 2, got {}",
                self.mqtt_qos
            )));
        }
        Ok(())
    }

    /// Derive a topic under the root topic, e.g. `topic("lwt")`.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.mqtt_topic, suffix)
    }

    #[cfg(test)]
    pub fn for_tests(serial_port: &str) -> Self {
        Self {
            serial_port: serial_port.to_string(),
            debug: false,
            mqtt_client_name: "emu2mqtt".to_string(),
            mqtt_server: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            mqtt_topic: "emu2mqtt".to_string(),
            mqtt_qos: 0,
        }
    }
}

fn required_string(matches: &ArgMatches, name: &str) -> Result<String, BridgeError> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> BridgeError {
    BridgeError::Config(format!("missing argument: {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;

    fn parse(args: &[&str]) -> Settings {
        let matches = cli::build_cli()
            .try_get_matches_from(args.iter().copied())
            .expect("arguments should parse");
        Settings::from_matches(&matches).expect("settings should build")
    }

    #[test]
    fn defaults() {
        let settings = parse(&["emu2mqtt", "/dev/ttyACM0"]);
        assert_eq!(settings.serial_port, "/dev/ttyACM0");
        assert!(!settings.debug);
        assert_eq!(settings.mqtt_client_name, "emu2mqtt");
        assert_eq!(settings.mqtt_server, "localhost");
        assert_eq!(settings.mqtt_port, 1883);
        assert_eq!(settings.mqtt_username, "");
        assert_eq!(settings.mqtt_password, "");
        assert_eq!(settings.mqtt_topic, "emu2mqtt");
        assert_eq!(settings.mqtt_qos, 0);
    }

    #[test]
    fn overrides() {
        let settings = parse(&[
            "emu2mqtt",
            "/dev/ttyACM1",
            "--debug",
            "--mqtt_client_name",
            "bridge-1",
            "--mqtt_server",
            "broker.lan",
            "--mqtt_port",
            "8883",
            "--mqtt_username",
            "energy",
            "--mqtt_password",
            "hunter2",
            "--mqtt_topic",
            "home/energy",
            "--mqtt_qos",
            "1",
        ]);
        assert!(settings.debug);
        assert_eq!(settings.mqtt_client_name, "bridge-1");
        assert_eq!(settings.mqtt_server, "broker.lan");
        assert_eq!(settings.mqtt_port, 8883);
        assert_eq!(settings.mqtt_username, "energy");
        assert_eq!(settings.mqtt_password, "hunter2");
        assert_eq!(settings.mqtt_topic, "home/energy");
        assert_eq!(settings.mqtt_qos, 1);
    }

    #[test]
    fn serial_port_is_required() {
        assert!(cli::build_cli().try_get_matches_from(["emu2mqtt"]).is_err());
    }

    #[test]
    fn qos_out_of_range_is_rejected() {
        let result = cli::build_cli().try_get_matches_from([
            "emu2mqtt",
            "/dev/ttyACM0",
            "--mqtt_qos",
            "3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn derived_topics() {
        let settings = parse(&["emu2mqtt", "/dev/ttyACM0", "--mqtt_topic", "home/energy"]);
        assert_eq!(settings.topic("lwt"), "home/energy/lwt");
        assert_eq!(settings.topic("demand"), "home/energy/demand");
    }
}
