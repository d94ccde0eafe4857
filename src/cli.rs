use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mpt")]
#[command(
    about = "Prepare multi-platform code generation runs and manage generator plugins",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project path
    #[arg(long, global = true, default_value = ".")]
    pub path: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
    /// Create the .multi-platform workspace and a default config
    Init,
    /// Prepare output directories for the target platforms
    Transform {
        /// Target platforms (e.g. android ios wechat-mp)
        #[arg(short, long, num_args = 1..)]
        platforms: Option<Vec<String>>,
    },
    /// Show enabled platforms and requirement document state
    Status,
    /// Record the files generated from a requirement document
    Record {
        /// Requirement document (name inside requirements/ or a path)
        document: Option<PathBuf>,
        /// Generated files, relative to the output directory
        outputs: Vec<String>,
    },
}

// Targets are optional so a missing one is reported by us with exit code 1.
#[derive(Subcommand, Debug, Clone)]
pub enum PluginCommand {
    /// List installed plugins
    List {
        /// Include disabled plugins
        #[arg(short, long)]
        all: bool,
    },
    /// Install a plugin from owner/repo or a local directory
    Install { source: Option<String> },
    /// Re-fetch a plugin from its recorded repository
    Update { name: Option<String> },
    /// Enable an installed plugin
    Enable { name: Option<String> },
    /// Disable an installed plugin
    Disable { name: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transform_platforms() {
        let cli = Cli::try_parse_from(["mpt", "transform", "-p", "android", "ios", "--path", "/p"])
            .unwrap();
        assert_eq!(cli.path, PathBuf::from("/p"));
        match cli.command {
            Commands::Transform { platforms } => {
                assert_eq!(platforms, Some(vec!["android".to_string(), "ios".to_string()]));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_plugin_commands() {
        let cli = Cli::try_parse_from(["mpt", "plugin", "list", "--all"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("."));
        assert!(matches!(
            cli.command,
            Commands::Plugin {
                command: PluginCommand::List { all: true }
            }
        ));

        let cli = Cli::try_parse_from(["mpt", "plugin", "install"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plugin {
                command: PluginCommand::Install { source: None }
            }
        ));
    }
}
