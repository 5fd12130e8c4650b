use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "http2mqtt")]
#[command(about = "Relays HTTP GET requests to an MQTT broker", version)]
pub struct Cli {
    /// Set logging mode: ERROR (default), WARN, INFO, DEBUG, TRACE
    #[arg(long = "log", value_name = "LEVEL")]
    pub log: Option<String>,

    /// TOML configuration file (default: <config_dir>/http2mqtt/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_log_and_config() {
        let cli = Cli::try_parse_from(["http2mqtt", "--log", "DEBUG", "-c", "/etc/relay.toml"])
            .unwrap();
        assert_eq!(cli.log.as_deref(), Some("DEBUG"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/relay.toml")));
    }

    #[test]
    fn everything_is_optional() {
        let cli = Cli::try_parse_from(["http2mqtt"]).unwrap();
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }
}
