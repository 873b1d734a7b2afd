//! Built-in `authproxy` commands.
use clap::Parser;
use clap::Subcommand;

pub mod bootstrap;
pub mod server;

/// Authenticate and authorise requests in front of an HTTP service.
#[derive(Debug, Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the Auth Proxy configuration to use.
    #[arg(short = 'c', long = "config", default_value_t = String::from("authproxy.yaml"))]
    pub config: String,

    /// Select the authproxy command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Select the authproxy command to run.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Create the default user accounts, if missing, and exit.
    #[command(alias = "sync")]
    Bootstrap,

    /// Run the Auth Proxy server.
    #[command(alias = "run")]
    Server,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;
    use super::Command;

    #[test]
    fn default_config_path() {
        let cli = Cli::try_parse_from(["authproxy", "server"]).unwrap();
        assert_eq!(cli.config, "authproxy.yaml");
        assert!(matches!(cli.command, Command::Server));
    }

    #[test]
    fn command_aliases() {
        let cli = Cli::try_parse_from(["authproxy", "-c", "test.yaml", "run"]).unwrap();
        assert_eq!(cli.config, "test.yaml");
        assert!(matches!(cli.command, Command::Server));
        let cli = Cli::try_parse_from(["authproxy", "sync"]).unwrap();
        assert!(matches!(cli.command, Command::Bootstrap));
    }

    #[test]
    fn command_required() {
        assert!(Cli::try_parse_from(["authproxy"]).is_err());
    }
}
