use clap::{value_parser, Arg, ArgAction, Command};

/// Build the argument surface. The option names keep their historic
/// underscore spelling so existing service files keep working.
pub fn build_cli() -> Command {
    Command::new("emu2mqtt")
        .about("Export Rainforest Automation EMU-2 energy monitoring data to MQTT")
        .arg(
            Arg::new("serial_port")
                .required(true)
                .help("Rainforest EMU-2 serial port, e.g. '/dev/ttyACM0'"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("enable debug logging"),
        )
        .arg(
            Arg::new("mqtt_client_name")
                .long("mqtt_client_name")
                .default_value("emu2mqtt")
                .help("MQTT client name"),
        )
        .arg(
            Arg::new("mqtt_server")
                .long("mqtt_server")
                .default_value("localhost")
                .help("MQTT server"),
        )
        .arg(
            Arg::new("mqtt_port")
                .long("mqtt_port")
                .default_value("1883")
                .value_parser(value_parser!(u16))
                .help("MQTT server port"),
        )
        .arg(
            Arg::new("mqtt_username")
                .long("mqtt_username")
                .default_value("")
                .help("MQTT username"),
        )
        .arg(
            Arg::new("mqtt_password")
                .long("mqtt_password")
                .default_value("")
                .help("MQTT password"),
        )
        .arg(
            Arg::new("mqtt_topic")
                .long("mqtt_topic")
                .default_value("emu2mqtt")
                .help("MQTT root topic"),
        )
        .arg(
            Arg::new("mqtt_qos")
                .long("mqtt_qos")
                .default_value("0")
                .value_parser(value_parser!(u8).range(0..=2))
                .help("MQTT QoS (0-2)"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }
}
