use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::formats::{Group, List, Section};
use crate::images::ImagePolicy;
use crate::labels::labels_from_cells;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static PARSER_OUTPUT: LazyLock<Selector> = LazyLock::new(|| selector(".mw-parser-output"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));
static HEADLINE: LazyLock<Selector> = LazyLock::new(|| selector(".mw-headline"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));

pub fn parser_output(document: &Html) -> Option<ElementRef<'_>> {
    document.select(&PARSER_OUTPUT).next()
}

pub fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    parser_output(document).or_else(|| document.select(&BODY).next())
}

#[derive(Debug)]
pub enum Block<'a> {
    /// `level` is the heading number minus one, so `<h2>` is level 1.
    Heading { level: u8, text: String },
    Table(ElementRef<'a>),
    List(ElementRef<'a>),
    Other,
}

pub fn classify(element: ElementRef<'_>) -> Block<'_> {
    let name = element.value().name();
    match name {
        "table" => Block::Table(element),
        "ul" => Block::List(element),
        "div" if element.value().classes().any(|class| class == "mw-heading") => element
            .children()
            .filter_map(ElementRef::wrap)
            .find_map(heading)
            .unwrap_or(Block::Other),
        _ => heading(element).unwrap_or(Block::Other),
    }
}

fn heading<'a>(element: ElementRef<'a>) -> Option<Block<'a>> {
    let digits = element.value().name().strip_prefix('h')?;
    let number: u8 = match digits {
        "1" | "2" | "3" | "4" | "5" | "6" => digits.parse().ok()?,
        _ => return None,
    };
    Some(Block::Heading {
        level: number - 1,
        text: heading_text(element),
    })
}

pub fn heading_text(element: ElementRef<'_>) -> String {
    match element.select(&HEADLINE).next() {
        Some(headline) => text_of(headline),
        None => text_of(element),
    }
}

pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

#[derive(Debug)]
struct ListBuilder {
    title: String,
    sections: Vec<Section>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanTable {
    NoList,
    NoSection,
}

#[derive(Debug, Default)]
struct ExtractState {
    lists: Vec<List>,
    current: Option<ListBuilder>,
}

impl ExtractState {
    fn open_list(&mut self, title: String) {
        self.close_list();
        self.current = Some(ListBuilder {
            title,
            sections: Vec::new(),
        });
    }

    fn close_list(&mut self) {
        if let Some(list) = self.current.take() {
            self.lists.push(List {
                id: self.lists.len() as u32 + 1,
                title: list.title,
                count: 0,
                sections: list.sections,
            });
        }
    }

    /// Returns `false` when there is no open list to attach the section to.
    fn open_section(&mut self, depth: u8, text: String) -> bool {
        let Some(list) = self.current.as_mut() else {
            return false;
        };
        list.sections.push(Section {
            depth,
            slug: String::new(),
            text,
            groups: Vec::new(),
        });
        true
    }

    fn current_section(&mut self) -> Result<&mut Section, OrphanTable> {
        let list = self.current.as_mut().ok_or(OrphanTable::NoList)?;
        list.sections.last_mut().ok_or(OrphanTable::NoSection)
    }

    fn finish(mut self) -> Vec<List> {
        self.close_list();
        self.lists
    }
}

pub fn extract_lists(html: &str, policy: &ImagePolicy) -> Vec<List> {
    let document = Html::parse_document(html);
    match content_root(&document) {
        Some(root) => extract_from_root(root, policy),
        None => Vec::new(),
    }
}

pub fn extract_from_root(root: ElementRef<'_>, policy: &ImagePolicy) -> Vec<List> {
    let mut state = ExtractState::default();

    for child in root.children().filter_map(ElementRef::wrap) {
        match classify(child) {
            Block::Heading { level: 1, text } => state.open_list(text),
            Block::Heading {
                level: level @ (2 | 3),
                text,
            } => {
                if !state.open_section(level, text.clone()) {
                    tracing::debug!(%text, "heading before first list; ignored");
                }
            }
            Block::Heading { level, text } => {
                tracing::warn!(
                    level,
                    %text,
                    "unsupported heading level; following tables stay in the previous section"
                );
            }
            Block::Table(table) => match state.current_section() {
                Ok(section) => {
                    let depth = section.depth;
                    section.groups.extend(parse_table(table, depth, policy));
                }
                Err(orphan) => {
                    tracing::warn!(?orphan, "table without a preceding section; ignored");
                }
            },
            Block::List(_) | Block::Other => {}
        }
    }

    state.finish()
}

pub fn parse_table(table: ElementRef<'_>, depth: u8, policy: &ImagePolicy) -> Vec<Group> {
    table
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "tbody")
        .flat_map(|tbody| tbody.children().filter_map(ElementRef::wrap))
        .filter(|row| row.value().name() == "tr")
        .filter_map(|row| parse_row(row, depth, policy))
        .collect()
}

/// Cells read right to left: memo, name, id; anything before them holds labels.
/// Rows with fewer than three data cells (header rows included) yield `None`.
pub fn parse_row(row: ElementRef<'_>, depth: u8, policy: &ImagePolicy) -> Option<Group> {
    let cells = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| cell.value().name() == "td")
        .collect::<Vec<_>>();

    let (label_cells, fixed) = cells.split_at(cells.len().checked_sub(3)?);
    let [id_cell, name_cell, memo_cell] = fixed else {
        return None;
    };

    let label_texts = label_cells
        .iter()
        .map(|cell| text_of(*cell))
        .collect::<Vec<_>>();
    let (image, link) = image_and_link(*memo_cell, policy);

    Some(Group {
        depth,
        id: text_of(*id_cell),
        name: text_of(*name_cell),
        labels: labels_from_cells(label_texts.iter().map(String::as_str)),
        memo: text_of(*memo_cell),
        image,
        link,
    })
}

pub fn image_and_link(
    cell: ElementRef<'_>,
    policy: &ImagePolicy,
) -> (Option<String>, Option<String>) {
    let Some(img) = cell.select(&IMG).next() else {
        return (None, None);
    };
    let Some(image) = img
        .value()
        .attr("src")
        .and_then(|src| policy.admit(src))
    else {
        return (None, None);
    };

    let link = img
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|ancestor| ancestor.id() != cell.id())
        .find(|ancestor| ancestor.value().name() == "a")
        .and_then(|anchor| anchor.value().attr("href"))
        .and_then(|href| policy.resolve(href));

    (Some(image.to_string()), link.map(|link| link.to_string()))
}
