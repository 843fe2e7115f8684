use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ammonia::{Builder, UrlRelative};
use scraper::{ElementRef, Node, Selector};

use crate::formats::ImageRef;
use crate::images::{ImagePolicy, hashed_file_name};

static IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("static selector"));

const URL_SCHEMES: &[&str] = &["http", "https"];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

static CLEANER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut builder = Builder::empty();
    builder
        .tags(HashSet::from(["b", "s", "i", "img", "br"]))
        .tag_attributes(HashMap::from([(
            "img",
            HashSet::from(["src", "alt", "title", "width", "height"]),
        )]))
        .url_schemes(URL_SCHEMES.iter().copied().collect())
        .url_relative(UrlRelative::PassThrough)
        .clean_content_tags(HashSet::from([
            "script", "style", "template", "noscript", "iframe", "object", "embed", "textarea",
            "title",
        ]))
        .link_rel(None)
        .strip_comments(true);
    builder
});

#[derive(Debug, Clone)]
pub struct CellOptions<'a> {
    pub policy: &'a ImagePolicy,
    /// Image used when a linked image is not allow-listed.
    pub placeholder_image: &'a str,
    /// Site path mirrored images are served from, e.g. `/images`.
    pub image_prefix: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sanitized {
    pub markdown: String,
    pub images: Vec<ImageRef>,
}

pub fn sanitize_cell(cell: ElementRef<'_>, options: &CellOptions<'_>) -> Sanitized {
    let mut rewriter = Rewriter {
        options,
        out: String::new(),
        images: Vec::new(),
    };
    rewriter.children(cell);
    let cleaned = CLEANER.clean(&rewriter.out).to_string();
    Sanitized {
        markdown: collapse_whitespace(&cleaned),
        images: rewriter.images,
    }
}

struct Rewriter<'o, 'a> {
    options: &'o CellOptions<'a>,
    out: String,
    images: Vec<ImageRef>,
}

impl Rewriter<'_, '_> {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => push_escaped(&mut self.out, text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        match name {
            "a" => match element.value().attr("href").and_then(|href| self.link_target(href)) {
                Some(href) => {
                    let markdown = self.anchor(element, &href);
                    push_escaped(&mut self.out, &markdown);
                }
                None => self.children(element),
            },
            "span" if element.value().classes().any(|class| class == "inside") => {
                self.out.push_str("<s>");
                self.children(element);
                self.out.push_str("</s>");
            }
            _ => {
                self.out.push('<');
                self.out.push_str(name);
                for (attr, value) in element.value().attrs() {
                    self.out.push(' ');
                    self.out.push_str(attr);
                    self.out.push_str("=\"");
                    push_escaped_attr(&mut self.out, value);
                    self.out.push('"');
                }
                self.out.push('>');
                if !VOID_TAGS.contains(&name) {
                    self.children(element);
                    self.out.push_str("</");
                    self.out.push_str(name);
                    self.out.push('>');
                }
            }
        }
    }

    fn link_target(&self, href: &str) -> Option<String> {
        let resolved = self.options.policy.resolve(href)?;
        if !URL_SCHEMES.contains(&resolved.scheme()) {
            return None;
        }
        Some(absolutize(href, self.options.policy))
    }

    fn anchor(&mut self, anchor: ElementRef<'_>, href: &str) -> String {
        let Some(img) = anchor
            .select(&IMG)
            .find(|img| img.value().attr("src").is_some())
        else {
            let text = escape_link_text(&anchor.text().collect::<String>());
            return format!("[{text}]({href})");
        };

        let src = img.value().attr("src").unwrap_or_default();
        match self.options.policy.admit(src) {
            Some(url) => {
                let to = format!(
                    "{}/{}",
                    self.options.image_prefix.trim_end_matches('/'),
                    hashed_file_name(&url)
                );
                let title = escape_link_text(img.value().attr("title").unwrap_or_default());
                let markdown = format!("[![{title}]({to})]({href})");
                self.images.push(ImageRef {
                    from: url.to_string(),
                    to,
                });
                markdown
            }
            None => format!("[![]({})]({href})", self.options.placeholder_image),
        }
    }
}

/// `/path` gets the wiki origin, `//host/path` the wiki scheme.
fn absolutize(href: &str, policy: &ImagePolicy) -> String {
    let base = policy.base();
    if href.starts_with("//") {
        format!("{}:{href}", base.scheme())
    } else if href.starts_with('/') {
        format!("{}{href}", base.origin().ascii_serialization())
    } else {
        href.to_owned()
    }
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn push_escaped_attr(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}
