use std::collections::HashMap;

/// GitHub-style heading slugger: lowercases, strips punctuation and symbols,
/// turns spaces into `-`, and suffixes repeats with `-1`, `-2`, ...
#[derive(Debug, Default)]
pub struct Slugger {
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slug(&mut self, text: &str) -> String {
        let original = slugify(text);
        let mut result = original.clone();

        while self.occurrences.contains_key(&result) {
            let count = self.occurrences.entry(original.clone()).or_insert(0);
            *count += 1;
            result = format!("{original}-{count}");
        }
        self.occurrences.insert(result.clone(), 0);

        result
    }
}

pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|ch| match ch {
            ' ' => Some('-'),
            '-' | '_' => Some(ch),
            _ if ch.is_alphanumeric() => Some(ch),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_keeps_cjk_and_drops_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("东方 Project（同人）"), "东方-project同人");
        assert_eq!(slugify("a_b-c"), "a_b-c");
    }

    #[test]
    fn duplicates_get_distinct_suffixes() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.slug("群组"), "群组");
        assert_eq!(slugger.slug("群组"), "群组-1");
        assert_eq!(slugger.slug("群组"), "群组-2");
    }

    #[test]
    fn suffix_does_not_collide_with_literal_heading() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.slug("foo-1"), "foo-1");
        assert_eq!(slugger.slug("foo"), "foo");
        assert_eq!(slugger.slug("foo"), "foo-2");
    }

    #[test]
    fn fresh_slugger_is_deterministic() {
        let run = || {
            let mut slugger = Slugger::new();
            ["A", "A", "B"].map(|text| slugger.slug(text))
        };
        assert_eq!(run(), run());
        assert_eq!(run(), ["a", "a-1", "b"]);
    }
}
