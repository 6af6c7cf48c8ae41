//! CLI command definitions.

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Start an environment and keep it running until Ctrl+C
    Up(UpArgs),

    /// List the services that can be started
    Services,

    /// Print the service settings resolved from TESTBED_* variables
    Settings,
}

#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    /// Services to start (comma separated); all when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Route service traffic through the fault-injection proxy
    #[arg(short, long)]
    pub proxied: bool,

    /// Address at which started containers are reached
    #[arg(long, default_value = "127.0.0.1")]
    pub internal_host: String,

    /// Environment identifier; generated when omitted
    #[arg(long)]
    pub id: Option<String>,

    /// Fault-injection proxy image
    #[arg(long)]
    pub proxy_image: Option<String>,

    /// Only start containers, do not provision per-environment resources
    #[arg(long)]
    pub no_provision: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_up_arguments() {
        let cli = TestCli::parse_from([
            "testbed",
            "up",
            "--services",
            "postgres,redis",
            "--proxied",
            "--id",
            "ci_42",
        ]);
        let Commands::Up(args) = cli.command else {
            panic!("expected up");
        };
        assert_eq!(args.services, vec!["postgres", "redis"]);
        assert!(args.proxied);
        assert_eq!(args.internal_host, "127.0.0.1");
        assert_eq!(args.id.as_deref(), Some("ci_42"));
        assert!(!args.no_provision);
    }
}
