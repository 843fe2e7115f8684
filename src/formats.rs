use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub build: i64,
    pub edit: i64,
    pub revid: u64,
    pub title: String,
    pub lists: Vec<List>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List {
    /// 1-based discovery order.
    pub id: u32,
    pub title: String,
    /// Sum of `groups.len()` over all sections.
    pub count: usize,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub depth: u8,
    pub slug: String,
    pub text: String,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub depth: u8,
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub memo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    pub build: i64,
    pub edit: i64,
    pub revid: u64,
    pub title: String,
    pub pages: Vec<PageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub index: usize,
    pub title: String,
    pub count: usize,
    pub md: String,
}
