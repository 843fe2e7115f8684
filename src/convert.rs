use anyhow::Context as _;
use chrono::{DateTime, Utc};

use crate::config::SourceOptions;
use crate::extract::extract_lists;
use crate::formats::{Info, List};
use crate::images::ImagePolicy;
use crate::schema::{retain_valid_groups, validate_info};
use crate::slug::Slugger;
use crate::source::{self, RevisionMeta};

pub async fn convert(source: &SourceOptions) -> anyhow::Result<Info> {
    let build_date = Utc::now();
    let client = source::http_client(source)?;

    tracing::info!(revision_api = %source.revision_api, parse_api = %source.parse_api, "fetch source");
    let (revision, page) = tokio::try_join!(
        async {
            source::fetch_revision(&client, source)
                .await
                .context("fetch revision")
        },
        async {
            source::fetch_parse(&client, &source.parse_api, &source.user_agent)
                .await
                .context("fetch parse")
        },
    )?;
    let html = page.html()?;

    let policy = ImagePolicy::from_source(source)?;
    convert_html(html, &revision, build_date, &policy)
}

pub fn convert_html(
    html: &str,
    revision: &RevisionMeta,
    build_date: DateTime<Utc>,
    policy: &ImagePolicy,
) -> anyhow::Result<Info> {
    let mut lists = extract_lists(html, policy);
    finalize_lists(&mut lists);

    let info = Info {
        build: build_date.timestamp_millis(),
        edit: revision.edited_at.timestamp_millis(),
        revid: revision.revid,
        title: revision.title.clone(),
        lists,
    };
    validate_info(&info).context("validate converted data")?;

    tracing::info!(
        title = %info.title,
        revid = info.revid,
        lists = info.lists.len(),
        groups = info.lists.iter().map(|list| list.count).sum::<usize>(),
        "converted"
    );
    Ok(info)
}

pub fn finalize_lists(lists: &mut [List]) {
    for list in lists {
        let mut slugger = Slugger::new();
        for section in &mut list.sections {
            section.slug = slugger.slug(&section.text);
        }
        retain_valid_groups(list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    const PAGE: &str = r#"<div class="mw-parser-output">
<h2><span class="mw-headline">综合</span></h2>
<h3><span class="mw-headline">群组</span></h3>
<table>
  <tr><td>同人</td><td>123</td><td>Alpha</td><td>memo</td></tr>
  <tr><td>-</td><td>abc</td><td>Bad id</td><td></td></tr>
  <tr><td>-</td><td>456</td><td></td><td>no name</td></tr>
</table>
<h3><span class="mw-headline">群组</span></h3>
<table>
  <tr><td>-</td><td>789</td><td>Gamma</td><td></td></tr>
</table>
<h2><span class="mw-headline">地区</span></h2>
</div>"#;

    fn revision() -> RevisionMeta {
        RevisionMeta {
            title: "东方相关QQ群组列表".to_owned(),
            revid: 123_456,
            edited_at: DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
                .expect("timestamp")
                .with_timezone(&Utc),
        }
    }

    fn policy() -> ImagePolicy {
        ImagePolicy::new(
            Url::parse("https://thwiki.cc/api.php").expect("base url"),
            &SourceOptions::default(),
        )
    }

    #[test]
    fn counts_match_filtered_groups() -> anyhow::Result<()> {
        let info = convert_html(PAGE, &revision(), Utc::now(), &policy())?;

        let list = &info.lists[0];
        assert_eq!(list.count, 2);
        assert_eq!(
            list.count,
            list.sections.iter().map(|s| s.groups.len()).sum::<usize>()
        );
        let ids = list
            .sections
            .iter()
            .flat_map(|section| &section.groups)
            .map(|group| group.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["123", "789"]);

        assert_eq!(info.lists[1].count, 0);
        assert_eq!(info.revid, 123_456);
        assert_eq!(info.edit, 1_704_164_645_000);
        Ok(())
    }

    #[test]
    fn repeated_headings_get_distinct_slugs() -> anyhow::Result<()> {
        let info = convert_html(PAGE, &revision(), Utc::now(), &policy())?;
        let slugs = info.lists[0]
            .sections
            .iter()
            .map(|section| section.slug.as_str())
            .collect::<Vec<_>>();
        assert_eq!(slugs, vec!["群组", "群组-1"]);
        Ok(())
    }

    #[test]
    fn conversion_is_idempotent_apart_from_build_time() -> anyhow::Result<()> {
        let first = convert_html(PAGE, &revision(), Utc::now(), &policy())?;
        let mut second = convert_html(PAGE, &revision(), Utc::now(), &policy())?;
        second.build = first.build;

        assert_eq!(
            serde_json::to_string(&first)?,
            serde_json::to_string(&second)?
        );
        Ok(())
    }
}
