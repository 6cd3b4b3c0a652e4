use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "thingfishd",
    about = "ThingFish: a network-accessible object store with searchable metadata",
    version
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the configured one
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from(["thingfishd", "-c", "fish.toml", "--bind", "0.0.0.0:9000", "--json"]);
        assert_eq!(cli.config, Some(PathBuf::from("fish.toml")));
        assert_eq!(cli.bind, Some("0.0.0.0:9000".parse().unwrap()));
        assert!(cli.json);
        assert!(!cli.verbose);
    }
}
