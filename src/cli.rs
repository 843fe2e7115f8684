use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert the group list page into per-list JSON files, images and a manifest.
    Build(ConfigArgs),
    /// Build the Docsify Markdown site.
    Docsify(ConfigArgs),
    /// Validate the configuration and print it with defaults filled in.
    CheckConfig(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_defaults_to_project_file() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["touhou-group", "build"])?;
        let Command::Build(args) = cli.command else {
            anyhow::bail!("expected build");
        };
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let cli = Cli::try_parse_from(["touhou-group", "check-config", "--config", "x.yaml"])?;
        let Command::CheckConfig(args) = cli.command else {
            anyhow::bail!("expected check-config");
        };
        assert_eq!(args.config, PathBuf::from("x.yaml"));
        Ok(())
    }
}
