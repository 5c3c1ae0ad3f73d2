//! Line templates for GitHub announcements.
//!
//! Templates are plain strings with `{name}` placeholders. Unknown
//! placeholders are left as written so a typo shows up in the channel
//! instead of silently vanishing.

use serde::Deserialize;

/// One template per announcement kind. Each can be overridden on its own in
/// `[github.templates]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Templates {
    /// One pushed commit. Fields: `repo`, `repo_url`, `branch`, `author`,
    /// `message`, `url`, `id`, `short_id`.
    pub push: String,
    /// Summary replacing older commits of a long push. Fields: `repo`,
    /// `repo_url`, `author`, `skip_count`, `from_id`, `to_id`, plus
    /// `short_from_id` and `short_to_id`.
    pub push_skipped: String,
    /// An opened pull request. Fields: `author`, `title`, `url`.
    pub pr: String,
    /// An opened issue. Fields: `author`, `title`, `url`.
    pub issues: String,
    /// One edited wiki page. Fields: `author`, `page`, `action`, `url`,
    /// `sha`.
    pub wiki: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            push: "[{repo}] {author} pushed to {branch}: {message} {url}".into(),
            push_skipped: "[{repo}] {author} pushed {skip_count} more commits: \
                           {repo_url}/compare/{short_from_id}...{short_to_id}"
                .into(),
            pr: "{author} opened pull request: {title} {url}".into(),
            issues: "{author} opened issue: {title} {url}".into(),
            wiki: "{author} {action} wiki page {page}: {url}".into(),
        }
    }
}

/// Substitute `{name}` placeholders from `fields`.
pub fn render(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            fields
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
