use anyhow::Context as _;

use crate::cli::ConfigArgs;
use crate::config::{self, RemoteOptions};
use crate::formats::Info;

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let options = config::load(&args.config)?;
    build(&options).await?;
    Ok(())
}

pub async fn build(options: &RemoteOptions) -> anyhow::Result<Info> {
    let info = crate::convert::convert(&options.source)
        .await
        .context("convert")?;

    let client = crate::source::http_client(&options.source)?;
    let (info, report) = crate::store::store(info, options, &client)
        .await
        .context("store")?;

    if !report.failed.is_empty() {
        tracing::warn!(
            failed = report.failed.len(),
            "some images could not be downloaded; their groups point at missing files"
        );
    }
    tracing::info!(
        lists = info.lists.len(),
        images = report.written,
        out = %options.json_destination_dir.display(),
        "build finished"
    );
    Ok(info)
}

pub async fn docsify(args: ConfigArgs) -> anyhow::Result<()> {
    let options = config::load(&args.config)?;
    crate::docsify::run(&options).await?;
    Ok(())
}

pub fn check_config(args: ConfigArgs) -> anyhow::Result<()> {
    let options = config::load(&args.config)?;
    let yaml = serde_yaml::to_string(&options).context("serialize config")?;
    print!("{yaml}");
    Ok(())
}
