/// Placeholder the wiki uses for "no labels".
const NONE_TOKEN: &str = "-";

fn is_delimiter(ch: char) -> bool {
    matches!(ch, '：' | '、' | '，')
}

pub fn split_labels(cell: &str) -> Vec<String> {
    cell.split(is_delimiter)
        .map(|fragment| bracketed(fragment).unwrap_or(fragment).trim())
        .filter(|label| !label.is_empty() && *label != NONE_TOKEN)
        .map(str::to_owned)
        .collect()
}

pub fn labels_from_cells<'a>(cells: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    cells
        .into_iter()
        .flat_map(|cell| split_labels(cell.trim()))
        .collect()
}

fn bracketed(fragment: &str) -> Option<&str> {
    let rest = fragment.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let inner = &rest[..end];
    if inner.is_empty() || inner.contains('[') {
        return None;
    }
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_prefix_wins_over_commentary() {
        assert_eq!(split_labels("[标签1]说明、标签2"), vec!["标签1", "标签2"]);
    }

    #[test]
    fn placeholder_and_blanks_are_dropped() {
        assert!(split_labels("-").is_empty());
        assert!(split_labels("").is_empty());
        assert_eq!(split_labels("东方， - ，、幻想乡"), vec!["东方", "幻想乡"]);
    }

    #[test]
    fn every_delimiter_splits() {
        assert_eq!(split_labels("地区：上海、同人，绘画"), vec!["地区", "上海", "同人", "绘画"]);
    }

    #[test]
    fn malformed_brackets_are_kept_verbatim() {
        assert_eq!(split_labels("[]空"), vec!["[]空"]);
        assert_eq!(split_labels("[未闭合"), vec!["[未闭合"]);
        assert_eq!(split_labels(" [ 内 ] 外"), vec!["内"]);
    }

    #[test]
    fn cells_keep_left_to_right_order() {
        let labels = labels_from_cells([" 甲、乙 ", "-", "[丙]备注"]);
        assert_eq!(labels, vec!["甲", "乙", "丙"]);
    }
}
