use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "akscli")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Create and update AKS managed clusters from typed parameters", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/akscli/config.toml)
    #[arg(long, global = true, env = "AKSCLI_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a new managed cluster and store it
    Create(ClusterArgs),

    /// Apply changes to a stored managed cluster
    Update(ClusterArgs),

    /// Show a stored managed cluster
    Show(ShowArgs),

    /// List stored managed clusters
    List,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Cluster Commands
// ============================================================================

#[derive(Args)]
pub struct ClusterArgs {
    /// Resource group of the cluster
    #[arg(short = 'g', long)]
    pub resource_group: String,

    /// Cluster name
    #[arg(short, long)]
    pub name: String,

    /// Parameters file (TOML, or JSON by .json extension)
    #[arg(short, long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Override a parameter, e.g. --set node_count=3 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub sets: Vec<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Do not wait for the operation to finish
    #[arg(long)]
    pub no_wait: bool,

    /// Print the resulting descriptor without storing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Resource group of the cluster
    #[arg(short = 'g', long)]
    pub resource_group: String,

    /// Cluster name
    #[arg(short, long)]
    pub name: String,

    /// Print the full descriptor as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::parse_from([
            "akscli", "-vv", "create", "-g", "rg", "-n", "aks", "--set", "node_count=3", "--set",
            "location=westus2", "--dry-run",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.resource_group, "rg");
        assert_eq!(args.sets, vec!["node_count=3", "location=westus2"]);
        assert!(args.dry_run);
        assert!(!args.yes);
    }
}
