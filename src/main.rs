use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use touhou_group::cli::{Cli, Command};
use touhou_group::config::ConfigError;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        match err.downcast_ref::<ConfigError>() {
            Some(config_err) => tracing::error!("invalid configuration:\n{config_err}"),
            None => eprintln!("{err:#}"),
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    touhou_group::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Build(args) => touhou_group::build::run(args).await.context("build")?,
        Command::Docsify(args) => touhou_group::build::docsify(args)
            .await
            .context("docsify")?,
        Command::CheckConfig(args) => {
            touhou_group::build::check_config(args).context("check-config")?
        }
    }

    Ok(())
}
