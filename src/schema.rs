use std::collections::HashSet;

use url::Url;

use crate::formats::{Group, Info, List};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: String, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

/// Why a group is rejected; `None` means the group is acceptable.
pub fn group_violation(group: &Group) -> Option<&'static str> {
    if group.id.is_empty() || !group.id.bytes().all(|b| b.is_ascii_digit()) {
        return Some("id must be numeric");
    }
    if group.name.is_empty() {
        return Some("name must not be empty");
    }
    if !is_valid_depth(group.depth) {
        return Some("depth must be 1, 2 or 3");
    }
    if group.image.as_deref().is_some_and(|image| !is_url(image)) {
        return Some("image must be a url");
    }
    if group.link.as_deref().is_some_and(|link| !is_url(link)) {
        return Some("link must be a url");
    }
    None
}

pub fn retain_valid_groups(list: &mut List) {
    let mut count = 0;
    for section in &mut list.sections {
        section.groups.retain(|group| match group_violation(group) {
            None => true,
            Some(reason) => {
                tracing::debug!(
                    list = %list.title,
                    section = %section.text,
                    id = %group.id,
                    name = %group.name,
                    reason,
                    "dropping invalid group"
                );
                false
            }
        });
        count += section.groups.len();
    }
    list.count = count;
}

/// Runs after [`retain_valid_groups`]; a group violation left here is structural.
pub fn validate_info(info: &Info) -> Result<(), SchemaError> {
    if info.build <= 0 {
        return Err(SchemaError::new("build".into(), "must be positive"));
    }
    if info.edit <= 0 {
        return Err(SchemaError::new("edit".into(), "must be positive"));
    }

    for (list_idx, list) in info.lists.iter().enumerate() {
        validate_list(list, &format!("lists[{list_idx}]"))?;
    }
    Ok(())
}

pub fn validate_list(list: &List, path: &str) -> Result<(), SchemaError> {
    if list.id == 0 {
        return Err(SchemaError::new(format!("{path}.id"), "must be 1-based"));
    }

    let mut slugs = HashSet::new();
    let mut count = 0;
    for (section_idx, section) in list.sections.iter().enumerate() {
        let section_path = format!("{path}.sections[{section_idx}]");
        if !is_valid_depth(section.depth) {
            return Err(SchemaError::new(
                format!("{section_path}.depth"),
                "must be 1, 2 or 3",
            ));
        }
        if !slugs.insert(section.slug.as_str()) {
            return Err(SchemaError::new(
                format!("{section_path}.slug"),
                format!("duplicate slug {:?}", section.slug),
            ));
        }
        for (group_idx, group) in section.groups.iter().enumerate() {
            if let Some(reason) = group_violation(group) {
                return Err(SchemaError::new(
                    format!("{section_path}.groups[{group_idx}]"),
                    reason,
                ));
            }
        }
        count += section.groups.len();
    }

    if list.count != count {
        return Err(SchemaError::new(
            format!("{path}.count"),
            format!("is {} but sections hold {count} groups", list.count),
        ));
    }
    Ok(())
}

fn is_valid_depth(depth: u8) -> bool {
    (1..=3).contains(&depth)
}

fn is_url(value: &str) -> bool {
    Url::parse(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Section;

    fn group(id: &str, name: &str) -> Group {
        Group {
            depth: 2,
            id: id.to_owned(),
            name: name.to_owned(),
            labels: Vec::new(),
            memo: String::new(),
            image: None,
            link: None,
        }
    }

    fn list(groups: Vec<Group>) -> List {
        List {
            id: 1,
            title: "综合".to_owned(),
            count: 0,
            sections: vec![Section {
                depth: 2,
                slug: "群组".to_owned(),
                text: "群组".to_owned(),
                groups,
            }],
        }
    }

    #[test]
    fn non_numeric_ids_and_empty_names_are_filtered() {
        let mut list = list(vec![
            group("abc", "Named"),
            group("", "Named"),
            group("12a", "Named"),
            group("456", ""),
            group("123", "Kept"),
        ]);
        retain_valid_groups(&mut list);

        let ids = list.sections[0]
            .groups
            .iter()
            .map(|group| group.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["123"]);
        assert_eq!(list.count, 1);
    }

    #[test]
    fn link_must_be_absolute_url() {
        let mut bad = group("1", "x");
        bad.link = Some("/wiki/Page".to_owned());
        assert_eq!(group_violation(&bad), Some("link must be a url"));

        let mut good = group("1", "x");
        good.link = Some("https://example.org/wiki/Page".to_owned());
        assert_eq!(group_violation(&good), None);
    }

    #[test]
    fn count_mismatch_is_structural() {
        let mut list = list(vec![group("1", "a"), group("2", "b")]);
        retain_valid_groups(&mut list);
        assert_eq!(validate_list(&list, "lists[0]"), Ok(()));

        list.count = 5;
        let err = validate_list(&list, "lists[0]").expect_err("count mismatch");
        assert_eq!(err.path, "lists[0].count");
    }

    #[test]
    fn duplicate_slugs_and_bad_depth_are_structural() {
        let mut list = list(vec![]);
        list.sections.push(list.sections[0].clone());
        let err = validate_list(&list, "lists[3]").expect_err("duplicate slug");
        assert_eq!(err.path, "lists[3].sections[1].slug");

        list.sections[1].slug = "群组-1".to_owned();
        list.sections[1].depth = 4;
        let err = validate_list(&list, "lists[3]").expect_err("bad depth");
        assert_eq!(err.path, "lists[3].sections[1].depth");
    }

    #[test]
    fn info_timestamps_must_be_positive() {
        let info = Info {
            build: 1,
            edit: 0,
            revid: 1,
            title: "t".to_owned(),
            lists: Vec::new(),
        };
        let err = validate_info(&info).expect_err("edit is zero");
        assert_eq!(err.to_string(), "edit: must be positive");
    }
}
