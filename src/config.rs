use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "touhou-group.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RemoteOptions {
    pub info_destination_file: PathBuf,
    pub json_destination_dir: PathBuf,
    /// Relative to `json_destination_dir`.
    pub image_destination_rel_dir: String,
    /// Lists with one of these exact titles are left out of the written output.
    pub excluded_list_titles: Vec<String>,
    pub source: SourceOptions,
    pub docsify: DocsifyOptions,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            info_destination_file: PathBuf::from("public/info.json"),
            json_destination_dir: PathBuf::from("src/content/lists"),
            image_destination_rel_dir: "images".to_owned(),
            excluded_list_titles: Vec::new(),
            source: SourceOptions::default(),
            docsify: DocsifyOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SourceOptions {
    pub revision_api: String,
    pub parse_api: String,
    pub image_domains: Vec<String>,
    pub image_extensions: Vec<String>,
    pub image_schemes: Vec<String>,
    pub timeout_secs: u64,
    pub image_concurrency: usize,
    pub user_agent: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            revision_api: String::new(),
            parse_api: String::new(),
            image_domains: Vec::new(),
            image_extensions: [".jpg", ".jpeg", ".png", ".apng", ".gif", ".webp"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            image_schemes: vec!["https".to_owned()],
            timeout_secs: 30,
            image_concurrency: 8,
            user_agent: concat!("touhou-group/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DocsifyOptions {
    /// Parse API used by the Docsify build; falls back to `source.parseApi`.
    pub parse_api: Option<String>,
    pub site_root: PathBuf,
    pub site_name: String,
    pub repo: String,
    pub logo: String,
    pub theme_color: String,
    /// Shown in place of images whose source is not allow-listed.
    pub placeholder_image: String,
    pub static_dir: Option<PathBuf>,
    pub libs: Vec<PathBuf>,
    pub style_file: Option<PathBuf>,
    pub analytics_id: Option<String>,
}

impl Default for DocsifyOptions {
    fn default() -> Self {
        Self {
            parse_api: None,
            site_root: PathBuf::from("public"),
            site_name: "东方相关QQ群组列表".to_owned(),
            repo: "https://github.com/thwiki/touhou-group/".to_owned(),
            logo: "/logo.png".to_owned(),
            theme_color: "#f2b040".to_owned(),
            placeholder_image: "/logo.png".to_owned(),
            static_dir: None,
            libs: Vec::new(),
            style_file: None,
            analytics_id: None,
        }
    }
}

impl DocsifyOptions {
    pub fn parse_api<'a>(&'a self, source: &'a SourceOptions) -> &'a str {
        self.parse_api.as_deref().unwrap_or(&source.parse_api)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub path: String,
    pub message: String,
}

impl ConfigIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{}", format_issues(.issues))]
pub struct ConfigError {
    pub issues: Vec<ConfigIssue>,
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    let mut out = String::new();
    for (idx, issue) in issues.iter().enumerate() {
        if idx != 0 {
            out.push('\n');
        }
        let message = issue.message.trim_end_matches('.');
        let _ = write!(out, " {}  {message}.", issue.path);
    }
    out
}

pub fn parse(yaml: &str) -> Result<RemoteOptions, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(RemoteOptions::default());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|err| ConfigError {
        issues: vec![ConfigIssue::new("<root>", err.to_string())],
    })?;
    if value.is_null() {
        return Ok(RemoteOptions::default());
    }

    serde_yaml::from_value(value).map_err(|err| ConfigError {
        issues: vec![ConfigIssue::new("<root>", err.to_string())],
    })
}

pub fn load(path: &Path) -> anyhow::Result<RemoteOptions> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let options = parse(&yaml)?;
    options.validate()?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(options)
}

impl RemoteOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        if self.info_destination_file.as_os_str().is_empty() {
            issues.push(ConfigIssue::new("infoDestinationFile", "Required"));
        }
        if self.json_destination_dir.as_os_str().is_empty() {
            issues.push(ConfigIssue::new("jsonDestinationDir", "Required"));
        }
        if !is_plain_relative(Path::new(&self.image_destination_rel_dir)) {
            issues.push(ConfigIssue::new(
                "imageDestinationRelDir",
                "Must be a relative path without '..'",
            ));
        }

        check_http_url(&mut issues, "source.revisionApi", &self.source.revision_api);
        check_http_url(&mut issues, "source.parseApi", &self.source.parse_api);

        for (idx, domain) in self.source.image_domains.iter().enumerate() {
            if domain.trim().is_empty() || domain.contains('/') {
                issues.push(ConfigIssue::new(
                    format!("source.imageDomains.{idx}"),
                    "Must be a bare host name",
                ));
            }
        }
        for (idx, ext) in self.source.image_extensions.iter().enumerate() {
            if !ext.starts_with('.') || ext.len() < 2 {
                issues.push(ConfigIssue::new(
                    format!("source.imageExtensions.{idx}"),
                    "Must start with '.'",
                ));
            }
        }
        for (idx, scheme) in self.source.image_schemes.iter().enumerate() {
            if scheme != "http" && scheme != "https" {
                issues.push(ConfigIssue::new(
                    format!("source.imageSchemes.{idx}"),
                    "Must be 'http' or 'https'",
                ));
            }
        }
        if self.source.timeout_secs == 0 {
            issues.push(ConfigIssue::new(
                "source.timeoutSecs",
                "Number must be greater than 0",
            ));
        }
        if self.source.image_concurrency == 0 {
            issues.push(ConfigIssue::new(
                "source.imageConcurrency",
                "Number must be greater than 0",
            ));
        }

        if let Some(parse_api) = &self.docsify.parse_api {
            check_http_url(&mut issues, "docsify.parseApi", parse_api);
        }
        if self.docsify.site_root.as_os_str().is_empty() {
            issues.push(ConfigIssue::new("docsify.siteRoot", "Required"));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { issues })
        }
    }

    pub fn is_excluded(&self, list_title: &str) -> bool {
        self.excluded_list_titles
            .iter()
            .any(|title| title == list_title)
    }
}

fn check_http_url(issues: &mut Vec<ConfigIssue>, path: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => issues.push(ConfigIssue::new(path, "Invalid url")),
    }
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
