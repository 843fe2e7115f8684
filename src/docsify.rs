use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::{DateTime, FixedOffset, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::Digest as _;
use url::Url;

use crate::config::{DocsifyOptions, RemoteOptions};
use crate::extract::{Block, classify, parser_output};
use crate::formats::{ImageRef, PageRecord, SiteInfo};
use crate::images::{ImagePolicy, download_all};
use crate::sanitize::{CellOptions, sanitize_cell};
use crate::source;

const PAGES_DIR: &str = "pages";
const IMAGES_DIR: &str = "images";
const LIB_DIR: &str = "lib";

static LI: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").expect("static selector"));
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("static selector"));

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: usize,
    pub title: String,
    pub count: usize,
    pub content: String,
    pub hash: String,
    pub md: String,
}

impl Page {
    fn set_content(&mut self, content: String) {
        self.hash = short_hash(&content);
        self.md = format!("{PAGES_DIR}/{}.{}.md", self.index, self.hash);
        self.content = content;
    }

    fn record(&self) -> PageRecord {
        PageRecord {
            index: self.index,
            title: self.title.clone(),
            count: self.count,
            md: self.md.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RenderedPages {
    pub pages: Vec<Page>,
    pub images: Vec<ImageRef>,
}

#[derive(Debug)]
struct PageDraft {
    title: String,
    content: String,
    count: usize,
}

impl PageDraft {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            content: String::new(),
            count: 0,
        }
    }
}

pub fn render_pages(root: ElementRef<'_>, site_name: &str, cells: &CellOptions<'_>) -> RenderedPages {
    let mut drafts = vec![PageDraft::new(site_name)];
    drafts[0].content.push_str(&format!("# {site_name}\n"));
    let mut images = Vec::new();

    for child in root.children().filter_map(ElementRef::wrap) {
        match classify(child) {
            Block::List(list) => {
                let Some(draft) = drafts.last_mut() else {
                    continue;
                };
                draft.content.push('\n');
                for item in list.select(&LI) {
                    let cell = sanitize_cell(item, cells);
                    draft.content.push_str(&format!("-  {}\n", cell.markdown));
                    images.extend(cell.images);
                }
                draft.content.push('\n');
            }
            Block::Table(table) => {
                let Some(draft) = drafts.last_mut() else {
                    continue;
                };
                let rows = table
                    .select(&TR)
                    .map(|row| {
                        row.select(&CELL)
                            .map(|cell| {
                                let cell = sanitize_cell(cell, cells);
                                images.extend(cell.images);
                                cell.markdown
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>();
                draft.count += rows.len().saturating_sub(1);
                draft.content.push('\n');
                draft.content.push_str(&markdown_table(&rows));
                draft.content.push('\n');
            }
            Block::Heading { level, text } => {
                if level == 1 {
                    drafts.push(PageDraft::new(&text));
                }
                if let Some(draft) = drafts.last_mut() {
                    let hashes = "#".repeat(usize::from(level));
                    draft.content.push_str(&format!("\n{hashes} {text}\n"));
                }
            }
            Block::Other => {}
        }
    }

    let pages = drafts
        .into_iter()
        .map(|draft| PageDraft {
            content: draft.content.trim().to_owned(),
            ..draft
        })
        .filter(|draft| !draft.content.is_empty())
        .enumerate()
        .map(|(index, draft)| {
            let hash = short_hash(&draft.content);
            Page {
                index,
                title: draft.title,
                count: draft.count,
                md: format!("{PAGES_DIR}/{index}.{hash}.md"),
                content: draft.content,
                hash,
            }
        })
        .collect();

    RenderedPages { pages, images }
}

pub fn markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (idx, row) in rows.iter().enumerate() {
        let mut line = String::from("|");
        for col in 0..width {
            let cell = row.get(col).map(String::as_str).unwrap_or_default();
            line.push(' ');
            line.push_str(&cell.trim().replace('|', "\\|"));
            line.push_str(" |");
        }
        lines.push(line);
        if idx == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

pub fn short_hash(content: &str) -> String {
    let digest = sha2::Sha256::digest(content.as_bytes());
    hex::encode(digest)[..8].to_owned()
}

pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

fn shanghai_time(at: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(8 * 3600).expect("static offset");
    at.with_timezone(&offset)
        .format("%Y年%-m月%-d日 %H:%M:%S (UTC+8)")
        .to_string()
}

pub fn render_home(home: &Page, pages: &[Page]) -> String {
    let mut out = format!("{}\n\n", home.content);
    for page in pages {
        out.push_str(&format!("- [{}](/{}) · {}\n", page.title, page.index, page.count));
    }
    out
}

pub fn render_sidebar(site_name: &str, pages: &[Page]) -> String {
    let mut out = format!("- [{site_name}](/)\n");
    for page in pages {
        out.push_str(&format!("- [{}](/{})\n", page.title, page.index));
    }
    out
}

pub fn render_footer(
    title: &str,
    page_url: &str,
    revid: u64,
    edit: DateTime<Utc>,
    build: DateTime<Utc>,
) -> String {
    format!(
        "---\n\n数据来源：[{title}]({page_url})（版本 {revid}） · 编辑时间：{} · 生成时间：{}\n",
        shanghai_time(edit),
        shanghai_time(build)
    )
}

pub fn render_404() -> String {
    "# 404\n\n页面不存在，[返回首页](/)。\n".to_owned()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocsifyConfig<'a> {
    name: &'a str,
    repo: &'a str,
    homepage: &'a str,
    logo: &'a str,
    theme_color: &'a str,
    alias: BTreeMap<String, String>,
    sub_max_level: u8,
    max_level: u8,
    router_mode: &'a str,
    not_found_page: &'a str,
    load_sidebar: bool,
    load_footer: &'a str,
    execute_script: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ga: Option<&'a str>,
}

pub fn aliases(sidebar: &str, pages: &[Page]) -> BTreeMap<String, String> {
    let mut alias = BTreeMap::new();
    alias.insert("/_sidebar.md".to_owned(), format!("/{sidebar}"));
    alias.insert("/.*/_sidebar.md".to_owned(), format!("/{sidebar}"));
    for page in pages {
        let target = format!("/{}", page.md);
        let encoded = encode_uri_component(&page.title);
        alias.insert(format!("/{}", page.index), target.clone());
        alias.insert(format!("/{}", page.title), target.clone());
        alias.insert(format!("/{}", encoded.to_uppercase()), target.clone());
        alias.insert(format!("/{}", encoded.to_lowercase()), target);
    }
    alias
}

pub struct IndexParts<'a> {
    pub homepage: &'a str,
    pub sidebar: &'a str,
    pub footer: &'a str,
    pub not_found: &'a str,
    pub pages: &'a [Page],
    pub style: &'a str,
}

pub fn render_index(options: &DocsifyOptions, parts: &IndexParts<'_>) -> anyhow::Result<String> {
    let config = DocsifyConfig {
        name: &options.site_name,
        repo: &options.repo,
        homepage: parts.homepage,
        logo: &options.logo,
        theme_color: &options.theme_color,
        alias: aliases(parts.sidebar, parts.pages),
        sub_max_level: 3,
        max_level: 2,
        router_mode: "history",
        not_found_page: parts.not_found,
        load_sidebar: true,
        load_footer: parts.footer,
        execute_script: false,
        ga: options.analytics_id.as_deref(),
    };
    let config_json = serde_json::to_string(&config).context("serialize docsify config")?;
    let script = format!(
        "window.$docsify = JSON.parse({});",
        serde_json::to_string(&config_json).context("quote docsify config")?
    )
    .replace("</", "<\\/");

    let mut scripts = vec![
        format!("<script src=\"/{LIB_DIR}/docsify.min.js\"></script>"),
        format!("<script src=\"/{LIB_DIR}/docsify-footer.js\"></script>"),
    ];
    if options.analytics_id.is_some() {
        scripts.push(format!("<script src=\"/{LIB_DIR}/ga.min.js\"></script>"));
    }

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="zh-Hans">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{name}</title>
<link rel="stylesheet" href="/{LIB_DIR}/vue.css">
<style>{style}</style>
</head>
<body>
<div id="app"></div>
<script>{script}</script>
{scripts}
</body>
</html>
"#,
        name = options.site_name.replace('<', "&lt;"),
        style = parts.style.replace("</", "<\\/"),
        scripts = scripts.join("\n"),
    ))
}

pub async fn run(options: &RemoteOptions) -> anyhow::Result<SiteInfo> {
    let build_date = Utc::now();
    let docsify = &options.docsify;
    let parse_api = docsify.parse_api(&options.source);
    let client = source::http_client(&options.source)?;

    tracing::info!(parse_api, "fetch source");
    let page = source::fetch_parse(&client, parse_api, &options.source.user_agent)
        .await
        .context("fetch parse")?;
    let html = page.html()?;
    let edit_date = page.cache_timestamp().unwrap_or_else(|| {
        tracing::warn!("no cachereport-timestamp in parse response; using build time as edit time");
        build_date
    });
    let revid = page.revid.unwrap_or(0);

    let base = Url::parse(parse_api).context("parse docsify parse api url")?;
    let policy = ImagePolicy::new(base.clone(), &options.source);
    let image_prefix = format!("/{IMAGES_DIR}");
    let cells = CellOptions {
        policy: &policy,
        placeholder_image: &docsify.placeholder_image,
        image_prefix: &image_prefix,
    };
    let mut rendered = {
        let document = Html::parse_document(html);
        let root = parser_output(&document)
            .ok_or_else(|| anyhow::anyhow!(".mw-parser-output not found"))?;
        render_pages(root, &docsify.site_name, &cells)
    };
    let style = match &docsify.style_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read style file: {}", path.display()))?,
        None => String::new(),
    };

    let (home, rest) = rendered
        .pages
        .split_first_mut()
        .ok_or_else(|| anyhow::anyhow!("no pages rendered"))?;
    let home_content = render_home(home, rest);
    home.set_content(home_content);
    let homepage = home.md.clone();
    let sidebar_content = render_sidebar(&docsify.site_name, rest);

    let site_root = &docsify.site_root;
    prepare_site_root(site_root, docsify).context("prepare site root")?;

    for page in &rendered.pages {
        write_file(&site_root.join(&page.md), &page.content)?;
    }
    let sidebar = write_hashed(site_root, "_sidebar", &sidebar_content)?;
    let page_url = format!(
        "{}/{}",
        base.origin().ascii_serialization(),
        encode_uri_component(&page.title)
    );
    let footer = write_hashed(
        site_root,
        "_footer",
        &render_footer(&page.title, &page_url, revid, edit_date, build_date),
    )?;
    let not_found = write_hashed(site_root, "_404", &render_404())?;

    let index_html = render_index(
        docsify,
        &IndexParts {
            homepage: &homepage,
            sidebar: &sidebar,
            footer: &footer,
            not_found: &not_found,
            pages: &rendered.pages,
            style: &style,
        },
    )?;
    write_file(&site_root.join("index.html"), &index_html)?;

    let report = download_all(
        &client,
        rendered.images,
        site_root,
        options.source.image_concurrency,
        &options.source.user_agent,
    )
    .await;
    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "some images could not be downloaded");
    }

    let info = SiteInfo {
        build: build_date.timestamp_millis(),
        edit: edit_date.timestamp_millis(),
        revid,
        title: page.title.clone(),
        pages: rendered.pages.iter().map(Page::record).collect(),
    };
    let info_path = site_root.join("info.json");
    let json = serde_json::to_vec(&info).context("serialize site info")?;
    std::fs::write(&info_path, json)
        .with_context(|| format!("write site info: {}", info_path.display()))?;
    tracing::info!(site_root = %site_root.display(), pages = info.pages.len(), "docsify site written");

    Ok(info)
}

fn prepare_site_root(site_root: &Path, docsify: &DocsifyOptions) -> anyhow::Result<()> {
    match std::fs::remove_dir_all(site_root) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("remove dir: {}", site_root.display()));
        }
    }
    std::fs::create_dir_all(site_root)
        .with_context(|| format!("create site root: {}", site_root.display()))?;

    if let Some(static_dir) = &docsify.static_dir {
        copy_dir_all(static_dir, site_root)
            .with_context(|| format!("copy static dir: {}", static_dir.display()))?;
    }

    for dir in [PAGES_DIR, LIB_DIR, IMAGES_DIR] {
        let path = site_root.join(dir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create dir: {}", path.display()))?;
    }

    for lib in &docsify.libs {
        let name = lib
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("lib path has no file name: {}", lib.display()))?;
        let target = site_root.join(LIB_DIR).join(name);
        std::fs::copy(lib, &target)
            .with_context(|| format!("copy lib {} -> {}", lib.display(), target.display()))?;
    }

    Ok(())
}

fn copy_dir_all(from: &Path, to: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(to).with_context(|| format!("create dir: {}", to.display()))?;
    for entry in
        std::fs::read_dir(from).with_context(|| format!("read dir: {}", from.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&path, &target)?;
        } else {
            std::fs::copy(&path, &target)
                .with_context(|| format!("copy {} -> {}", path.display(), target.display()))?;
        }
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("write: {}", path.display()))
}

fn write_hashed(site_root: &Path, stem: &str, contents: &str) -> anyhow::Result<String> {
    let name = format!("{stem}.{}.md", short_hash(contents));
    write_file(&site_root.join(&name), contents)?;
    Ok(name)
}
