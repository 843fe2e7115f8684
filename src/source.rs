use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

use crate::config::SourceOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct RevisionResponse {
    pub query: RevisionQuery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevisionQuery {
    pub pages: Vec<RevisionPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevisionPage {
    pub pageid: u64,
    pub ns: i64,
    pub title: String,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Revision {
    pub revid: u64,
    #[serde(default)]
    pub parentid: Option<u64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevisionMeta {
    pub title: String,
    pub revid: u64,
    pub edited_at: DateTime<Utc>,
}

impl RevisionResponse {
    pub fn latest(&self) -> anyhow::Result<RevisionMeta> {
        let page = self
            .query
            .pages
            .first()
            .ok_or_else(|| anyhow::anyhow!("revision response has no pages"))?;
        let revision = page
            .revisions
            .first()
            .ok_or_else(|| anyhow::anyhow!("page has no revisions: {}", page.title))?;
        let edited_at = DateTime::parse_from_rfc3339(&revision.timestamp)
            .with_context(|| format!("parse revision timestamp: {}", revision.timestamp))?
            .with_timezone(&Utc);

        Ok(RevisionMeta {
            title: page.title.clone(),
            revid: revision.revid,
            edited_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParseEnvelope {
    Failed { error: ApiError },
    Parsed { parse: ParsedPage },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub info: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedPage {
    pub title: String,
    pub pageid: u64,
    #[serde(default)]
    pub revid: Option<u64>,
    #[serde(default)]
    pub text: Option<ParsedText>,
    #[serde(default)]
    pub limitreportdata: Vec<LimitReport>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParsedText {
    Plain(String),
    Wrapped {
        #[serde(rename = "*", default)]
        html: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitReport {
    pub name: String,
    #[serde(rename = "0", default)]
    pub value: Option<serde_json::Value>,
}

impl ParseEnvelope {
    /// Surfaces the error envelope as an error whose message is `info`.
    pub fn into_page(self) -> anyhow::Result<ParsedPage> {
        match self {
            ParseEnvelope::Parsed { parse } => Ok(parse),
            ParseEnvelope::Failed { error } => {
                tracing::debug!(code = %error.code, "parse api returned an error");
                Err(anyhow::anyhow!(error.info))
            }
        }
    }
}

impl ParsedPage {
    pub fn html(&self) -> anyhow::Result<&str> {
        match &self.text {
            Some(ParsedText::Plain(html)) => Ok(html),
            Some(ParsedText::Wrapped { html: Some(html) }) => Ok(html),
            _ => anyhow::bail!("parsed text not found"),
        }
    }

    pub fn cache_timestamp(&self) -> Option<DateTime<Utc>> {
        let report = self
            .limitreportdata
            .iter()
            .find(|report| report.name == "cachereport-timestamp")?;
        let raw = match report.value.as_ref()? {
            serde_json::Value::String(raw) => raw.clone(),
            serde_json::Value::Number(raw) => raw.to_string(),
            _ => return None,
        };
        NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

pub fn http_client(source: &SourceOptions) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(source.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
) -> anyhow::Result<T> {
    let response = client
        .get(url)
        .header(USER_AGENT, user_agent)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;

    let raw = response
        .text()
        .await
        .with_context(|| format!("read response body: {url}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parse response json: {url}"))
}

pub async fn fetch_revision(
    client: &reqwest::Client,
    source: &SourceOptions,
) -> anyhow::Result<RevisionMeta> {
    let response: RevisionResponse =
        get_json(client, &source.revision_api, &source.user_agent).await?;
    response.latest()
}

pub async fn fetch_parse(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
) -> anyhow::Result<ParsedPage> {
    let envelope: ParseEnvelope = get_json(client, url, user_agent).await?;
    envelope.into_page()
}
