use std::path::Path;

use anyhow::Context as _;
use reqwest::header::USER_AGENT;
use sha2::Digest as _;
use url::Url;

use crate::config::SourceOptions;
use crate::formats::ImageRef;

#[derive(Debug, Clone)]
pub struct ImagePolicy {
    base: Url,
    schemes: Vec<String>,
    domains: Vec<String>,
    extensions: Vec<String>,
}

impl ImagePolicy {
    pub fn new(base: Url, source: &SourceOptions) -> Self {
        Self {
            base,
            schemes: source.image_schemes.clone(),
            domains: source.image_domains.clone(),
            extensions: source
                .image_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_source(source: &SourceOptions) -> anyhow::Result<Self> {
        let base = Url::parse(&source.parse_api).context("parse source.parseApi")?;
        Ok(Self::new(base, source))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.base.join(href).ok()
    }

    pub fn admit(&self, src: &str) -> Option<Url> {
        let url = self.resolve(src)?;
        if !self.schemes.iter().any(|scheme| scheme == url.scheme()) {
            return None;
        }
        let host = url.host_str()?;
        if !self.domains.iter().any(|domain| domain == host) {
            return None;
        }
        let ext = url_extension(&url)?;
        if !self.extensions.contains(&ext.to_ascii_lowercase()) {
            return None;
        }
        Some(url)
    }
}

pub fn url_extension(url: &Url) -> Option<&str> {
    let name = url.path_segments()?.next_back()?;
    extension_of(name)
}

fn extension_of(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&name[dot..])
}

pub fn hashed_file_name(url: &Url) -> String {
    let digest = sha2::Sha256::digest(url.as_str().as_bytes());
    let ext = url_extension(url).unwrap_or_default();
    format!("{}{ext}", hex::encode(digest))
}

/// `./a/b` and `/a/b` both name `a/b` under the download root.
fn local_path(to: &str) -> &str {
    to.strip_prefix("./")
        .or_else(|| to.strip_prefix('/'))
        .unwrap_or(to)
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub written: usize,
    pub failed: Vec<(ImageRef, String)>,
}

pub async fn download_all(
    client: &reqwest::Client,
    images: Vec<ImageRef>,
    root: &Path,
    concurrency: usize,
    user_agent: &str,
) -> DownloadReport {
    let mut images = images;
    images.sort_by(|a, b| a.to.cmp(&b.to));
    // One writer per target path; the first reference wins.
    images.dedup_by(|a, b| a.to == b.to);

    let total = images.len();
    let concurrency = concurrency.max(1).min(total.max(1));
    tracing::info!(images = total, concurrency, "download images");

    let mut report = DownloadReport::default();
    let mut join_set = tokio::task::JoinSet::new();
    let mut pending = images.into_iter();
    let started_at = std::time::Instant::now();

    loop {
        while join_set.len() < concurrency {
            let Some(image) = pending.next() else {
                break;
            };
            let client = client.clone();
            let target = root.join(local_path(&image.to));
            let user_agent = user_agent.to_owned();
            join_set.spawn(async move {
                let result = download_one(&client, &image.from, &target, &user_agent).await;
                (image, result)
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        match joined {
            Ok((_, Ok(()))) => report.written += 1,
            Ok((image, Err(err))) => {
                tracing::warn!(from = %image.from, to = %image.to, error = %format!("{err:#}"), "image download failed; skipping");
                report.failed.push((image, format!("{err:#}")));
            }
            Err(err) => {
                tracing::warn!(?err, "image download task failed");
            }
        }
    }

    tracing::info!(
        written = report.written,
        failed = report.failed.len(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "images downloaded"
    );
    report
}

async fn download_one(
    client: &reqwest::Client,
    from: &str,
    target: &Path,
    user_agent: &str,
) -> anyhow::Result<()> {
    let bytes = client
        .get(from)
        .header(USER_AGENT, user_agent)
        .send()
        .await
        .with_context(|| format!("GET {from}"))?
        .error_for_status()
        .with_context(|| format!("GET {from}"))?
        .bytes()
        .await
        .with_context(|| format!("read image body: {from}"))?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create image dir: {}", parent.display()))?;
    }
    tokio::fs::write(target, &bytes)
        .await
        .with_context(|| format!("write image: {}", target.display()))?;
    tracing::debug!(from, to = %target.display(), bytes = bytes.len(), "image saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ImagePolicy {
        let source = SourceOptions {
            image_domains: vec!["upload.thbwiki.cc".to_owned()],
            ..SourceOptions::default()
        };
        let base = Url::parse("https://thwiki.cc/api.php?action=parse").expect("base url");
        ImagePolicy::new(base, &source)
    }

    #[test]
    fn allowed_host_and_extension_are_admitted() {
        let url = policy()
            .admit("https://upload.thbwiki.cc/a/ab/Logo.png")
            .expect("admitted");
        assert_eq!(url.as_str(), "https://upload.thbwiki.cc/a/ab/Logo.png");
    }

    #[test]
    fn protocol_relative_sources_resolve_against_base() {
        assert!(policy().admit("//upload.thbwiki.cc/a/ab/Logo.PNG").is_some());
    }

    #[test]
    fn disallowed_host_scheme_or_extension_is_rejected() {
        let policy = policy();
        assert!(policy.admit("https://evil.example/a.png").is_none());
        assert!(policy.admit("http://upload.thbwiki.cc/a.png").is_none());
        assert!(policy.admit("https://upload.thbwiki.cc/a.svg").is_none());
        assert!(policy.admit("https://upload.thbwiki.cc/noext").is_none());
        assert!(policy.admit("/images/a.png").is_none());
    }

    #[test]
    fn hashed_name_is_stable_and_keeps_extension() {
        let a = Url::parse("https://upload.thbwiki.cc/a/ab/Logo.png").expect("url");
        let b = Url::parse("https://upload.thbwiki.cc/a/ab/Other.png").expect("url");
        let name = hashed_file_name(&a);
        assert_eq!(name, hashed_file_name(&a));
        assert_ne!(name, hashed_file_name(&b));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 64 + ".png".len());
    }

    #[test]
    fn extension_ignores_dotfiles_and_query() {
        let url = Url::parse("https://h/x/.hidden").expect("url");
        assert_eq!(url_extension(&url), None);
        let url = Url::parse("https://h/x/a.b.jpeg?width=40").expect("url");
        assert_eq!(url_extension(&url), Some(".jpeg"));
    }

    #[test]
    fn local_path_keeps_hidden_directories() {
        assert_eq!(local_path("./.img/1.png"), ".img/1.png");
        assert_eq!(local_path("/images/a.png"), "images/a.png");
        assert_eq!(local_path("images/a.png"), "images/a.png");
    }
}
