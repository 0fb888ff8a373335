//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ironwall -- stateful packet filter decision engine.
///
/// Use `ironwall <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironwall", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironwall.toml configuration file.
    #[arg(short, long, default_value = "ironwall.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration.
    Config(ConfigArgs),

    /// Feed recorded frames through a fresh engine and report verdicts.
    Replay(ReplayArgs),
}

// ---- config ----

/// Manage ironwall configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file (and its policy file) and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, engine, policy).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- replay ----

/// Replay hex-encoded frames through the filter engine.
///
/// Each non-empty line holds one frame as hex, optionally preceded by an
/// arrival time in seconds (`12.000250 45000054...`). Lines starting with
/// `#` are comments.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Frame file to replay.
    pub file: PathBuf,

    /// Policy file overriding `engine.policy_path`.
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Gap between frames without an explicit arrival time, in microseconds.
    #[arg(long, default_value_t = 1_000)]
    pub gap_us: u64,

    /// Run an idle sweep whenever this many seconds of replay time pass (0 disables).
    #[arg(long, default_value_t = 10)]
    pub sweep_secs: u64,

    /// Print the verdict of every frame, not only the summary.
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["ironwall", "config", "validate"]).expect("should parse");
        assert_eq!(cli.config, PathBuf::from("ironwall.toml"));
        assert_eq!(cli.output, OutputFormat::Text);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Validate
            })
        ));
    }

    #[test]
    fn test_parse_config_show_section() {
        let cli = Cli::try_parse_from([
            "ironwall",
            "--config",
            "/etc/ironwall/ironwall.toml",
            "config",
            "show",
            "--section",
            "engine",
        ])
        .expect("should parse");
        assert_eq!(cli.config, PathBuf::from("/etc/ironwall/ironwall.toml"));
        match cli.command {
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show { section },
            }) => assert_eq!(section.as_deref(), Some("engine")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_replay_with_options() {
        let cli = Cli::try_parse_from([
            "ironwall",
            "replay",
            "frames.txt",
            "--policy",
            "policy.toml",
            "--gap-us",
            "250",
            "--sweep-secs",
            "0",
            "-v",
            "--output",
            "json",
        ])
        .expect("should parse");
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.file, PathBuf::from("frames.txt"));
                assert_eq!(args.policy, Some(PathBuf::from("policy.toml")));
                assert_eq!(args.gap_us, 250);
                assert_eq!(args.sweep_secs, 0);
                assert!(args.verbose);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_replay_defaults() {
        let cli = Cli::try_parse_from(["ironwall", "replay", "frames.txt"]).expect("should parse");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.gap_us, 1_000);
                assert_eq!(args.sweep_secs, 10);
                assert!(!args.verbose);
                assert!(args.policy.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_replay_requires_file() {
        assert!(Cli::try_parse_from(["ironwall", "replay"]).is_err());
    }
}
