use std::path::Path;

use anyhow::Context as _;
use url::Url;

use crate::config::RemoteOptions;
use crate::formats::{ImageRef, Info, List};
use crate::images::{DownloadReport, download_all, url_extension};

pub async fn store(
    mut info: Info,
    options: &RemoteOptions,
    client: &reqwest::Client,
) -> anyhow::Result<(Info, DownloadReport)> {
    info.lists.retain(|list| {
        let excluded = options.is_excluded(&list.title);
        if excluded {
            tracing::info!(title = %list.title, "list excluded from output");
        }
        !excluded
    });

    let json_dir = &options.json_destination_dir;
    let image_dir = json_dir.join(&options.image_destination_rel_dir);
    reset_dir(json_dir).context("reset json destination dir")?;
    std::fs::create_dir_all(&image_dir)
        .with_context(|| format!("create image dir: {}", image_dir.display()))?;

    let mut images = Vec::new();
    for list in &mut info.lists {
        images.extend(localize_images(list, &options.image_destination_rel_dir));

        let path = json_dir.join(list_file_name(&list.title));
        let json = serde_json::to_vec(&*list).context("serialize list")?;
        std::fs::write(&path, json)
            .with_context(|| format!("write list: {}", path.display()))?;
        tracing::debug!(path = %path.display(), groups = list.count, "list written");
    }

    let report = download_all(
        client,
        images,
        json_dir,
        options.source.image_concurrency,
        &options.source.user_agent,
    )
    .await;

    write_manifest(&options.info_destination_file, &info)?;
    Ok((info, report))
}

pub fn localize_images(list: &mut List, rel_dir: &str) -> Vec<ImageRef> {
    let rel_dir = rel_dir.trim_matches('/');
    let mut images = Vec::new();

    for group in list
        .sections
        .iter_mut()
        .flat_map(|section| section.groups.iter_mut())
    {
        let Some(image) = group.image.take() else {
            continue;
        };
        let ext = Url::parse(&image)
            .ok()
            .and_then(|url| url_extension(&url).map(str::to_owned))
            .unwrap_or_default();
        let target = format!("./{rel_dir}/{}{ext}", group.id);
        images.push(ImageRef {
            from: image,
            to: target.clone(),
        });
        group.image = Some(target);
    }

    images
}

pub fn list_file_name(title: &str) -> String {
    let stem = title
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '\0' => '_',
            _ => ch,
        })
        .collect::<String>();
    format!("{stem}.json")
}

fn reset_dir(dir: &Path) -> anyhow::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("remove dir: {}", dir.display()));
        }
    }
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))
}

fn write_manifest(path: &Path, info: &Info) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create manifest dir: {}", parent.display()))?;
    }
    let json = serde_json::to_vec(info).context("serialize info")?;
    std::fs::write(path, json).with_context(|| format!("write info: {}", path.display()))?;
    tracing::info!(path = %path.display(), "info written");
    Ok(())
}
