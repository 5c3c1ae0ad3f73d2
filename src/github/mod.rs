//! GitHub webhook events and their chat rendering.
//!
//! Only the fields the announcements use are decoded. Missing fields decode
//! as empty, since GitHub omits some of them (a commit author's `username`
//! for one) depending on how the event was produced.

mod templates;

use serde::Deserialize;

use crate::error::PayloadError;

pub use templates::{Templates, render};

/// Most lines one event may produce.
pub const MAX_LINES: usize = 5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitAuthor {
    pub name: String,
    pub username: String,
}

impl CommitAuthor {
    fn display(&self) -> &str {
        if self.username.is_empty() {
            &self.name
        } else {
            &self.username
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Commit {
    pub id: String,
    pub url: String,
    pub message: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commits: Vec<Commit>,
    pub repository: Repository,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub html_url: String,
    pub title: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub html_url: String,
    pub title: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: Issue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WikiPage {
    pub page_name: String,
    pub action: String,
    pub sha: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GollumEvent {
    pub pages: Vec<WikiPage>,
    pub sender: User,
}

/// A webhook delivery the bot announces.
#[derive(Debug, Clone)]
pub enum Event {
    Push(PushEvent),
    Gollum(GollumEvent),
    PullRequest(PullRequestEvent),
    Issues(IssuesEvent),
}

impl Event {
    /// Decode the JSON payload of an `X-GitHub-Event: kind` delivery.
    ///
    /// Returns `Ok(None)` for event kinds the bot does not announce.
    pub fn parse(kind: &str, json: &[u8]) -> Result<Option<Event>, PayloadError> {
        let event = match kind {
            "push" => Event::Push(serde_json::from_slice(json)?),
            "gollum" => Event::Gollum(serde_json::from_slice(json)?),
            "pull_request" => Event::PullRequest(serde_json::from_slice(json)?),
            "issues" => Event::Issues(serde_json::from_slice(json)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Branch name from a ref: everything after the last `/`.
fn branch(git_ref: &str) -> &str {
    git_ref.rsplit('/').next().unwrap_or(git_ref)
}

/// First line of a commit message, trimmed.
fn first_line(message: &str) -> &str {
    message.trim().lines().next().unwrap_or_default().trim()
}

fn short(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}

/// Renders events into channel lines.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    templates: Templates,
}

impl Formatter {
    pub fn new(templates: Templates) -> Self {
        Self { templates }
    }

    /// Lines announcing `event`, in the order they should be sent. Never more
    /// than [`MAX_LINES`].
    pub fn lines(&self, event: &Event) -> Vec<String> {
        match event {
            Event::Push(push) => self.push(push),
            Event::Gollum(wiki) => self.wiki(wiki),
            Event::PullRequest(pr) if pr.action == "opened" => {
                let pr = &pr.pull_request;
                vec![render(
                    &self.templates.pr,
                    &[
                        ("author", pr.user.login.as_str()),
                        ("title", pr.title.as_str()),
                        ("url", pr.html_url.as_str()),
                    ],
                )]
            }
            Event::Issues(issues) if issues.action == "opened" => {
                let issue = &issues.issue;
                vec![render(
                    &self.templates.issues,
                    &[
                        ("author", issue.user.login.as_str()),
                        ("title", issue.title.as_str()),
                        ("url", issue.html_url.as_str()),
                    ],
                )]
            }
            Event::PullRequest(_) | Event::Issues(_) => Vec::new(),
        }
    }

    /// With more than [`MAX_LINES`] commits, everything up to and including
    /// the commit at `len - MAX_LINES` collapses into one summary line, and
    /// the rest are announced one by one.
    fn push(&self, push: &PushEvent) -> Vec<String> {
        let commits = &push.commits;
        let repo = push.repository.name.as_str();
        let repo_url = push.repository.url.as_str();
        let branch = branch(&push.git_ref);

        let needs_skip = commits.len() > MAX_LINES;
        let cut = commits.len().saturating_sub(MAX_LINES);
        let mut lines = Vec::with_capacity(commits.len().min(MAX_LINES));

        for (i, commit) in commits.iter().enumerate() {
            if needs_skip && i == cut {
                let skip_count = (commits.len() - (MAX_LINES - 1)).to_string();
                let from_id = commits.first().map_or("", |c| c.id.as_str());
                lines.push(render(
                    &self.templates.push_skipped,
                    &[
                        ("author", commit.author.display()),
                        ("from_id", from_id),
                        ("to_id", commit.id.as_str()),
                        ("short_from_id", short(from_id)),
                        ("short_to_id", short(&commit.id)),
                        ("skip_count", skip_count.as_str()),
                        ("repo", repo),
                        ("repo_url", repo_url),
                    ],
                ));
            } else if !needs_skip || i > cut {
                lines.push(render(
                    &self.templates.push,
                    &[
                        ("author", commit.author.display()),
                        ("url", commit.url.as_str()),
                        ("message", first_line(&commit.message)),
                        ("id", commit.id.as_str()),
                        ("short_id", short(&commit.id)),
                        ("repo", repo),
                        ("repo_url", repo_url),
                        ("branch", branch),
                    ],
                ));
            }
        }

        lines
    }

    /// One line per page, keeping only the last [`MAX_LINES`].
    fn wiki(&self, wiki: &GollumEvent) -> Vec<String> {
        let skip = wiki.pages.len().saturating_sub(MAX_LINES);
        wiki.pages
            .iter()
            .skip(skip)
            .map(|page| {
                render(
                    &self.templates.wiki,
                    &[
                        ("author", wiki.sender.login.as_str()),
                        ("page", page.page_name.as_str()),
                        ("url", page.html_url.as_str()),
                        ("action", page.action.as_str()),
                        ("sha", page.sha.as_str()),
                    ],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_of(n: usize) -> PushEvent {
        PushEvent {
            git_ref: "refs/heads/master".into(),
            commits: (0..n)
                .map(|i| Commit {
                    id: format!("{i:040}"),
                    url: format!("https://github.com/systemd/systemd/commit/{i}"),
                    message: format!("commit {i}\n\nlonger body"),
                    author: CommitAuthor {
                        name: "Some One".into(),
                        username: format!("dev{i}"),
                    },
                })
                .collect(),
            repository: Repository {
                name: "systemd".into(),
                url: "https://github.com/systemd/systemd".into(),
            },
        }
    }

    fn plain() -> Formatter {
        Formatter::new(Templates {
            push: "{branch} {short_id} {message} ({author})".into(),
            push_skipped: "skipped {skip_count} {short_from_id}..{short_to_id}".into(),
            ..Templates::default()
        })
    }

    #[test]
    fn test_small_push_announces_every_commit() {
        let lines = plain().lines(&Event::Push(push_of(3)));
        assert_eq!(
            lines,
            vec![
                "master 0000000 commit 0 (dev0)",
                "master 0000000 commit 1 (dev1)",
                "master 0000000 commit 2 (dev2)",
            ]
        );
    }

    #[test]
    fn test_exactly_max_lines_needs_no_summary() {
        let lines = plain().lines(&Event::Push(push_of(MAX_LINES)));
        assert_eq!(lines.len(), MAX_LINES);
        assert!(lines.iter().all(|l| !l.starts_with("skipped")));
    }

    #[test]
    fn test_long_push_collapses_oldest() {
        let lines = plain().lines(&Event::Push(push_of(7)));
        assert!(lines.len() <= MAX_LINES);

        let summaries: Vec<_> = lines.iter().filter(|l| l.starts_with("skipped")).collect();
        assert_eq!(summaries.len(), 1);

        // Commits 0..=2 are summarized, 3..=6 announced in order.
        assert_eq!(lines[0], "skipped 3 0000000..0000000");
        assert_eq!(
            &lines[1..],
            &[
                "master 0000000 commit 3 (dev3)",
                "master 0000000 commit 4 (dev4)",
                "master 0000000 commit 5 (dev5)",
                "master 0000000 commit 6 (dev6)",
            ]
        );
    }

    #[test]
    fn test_summary_names_first_and_cut_commit() {
        let formatter = Formatter::new(Templates {
            push_skipped: "{from_id}..{to_id} by {author}".into(),
            ..Templates::default()
        });
        let lines = formatter.lines(&Event::Push(push_of(9)));
        assert_eq!(lines[0], format!("{:040}..{:040} by dev4", 0, 4));
    }

    #[test]
    fn test_empty_push() {
        assert!(plain().lines(&Event::Push(push_of(0))).is_empty());
    }

    #[test]
    fn test_branch_and_first_line() {
        assert_eq!(branch("refs/heads/v250-stable"), "v250-stable");
        assert_eq!(branch("master"), "master");
        assert_eq!(first_line("  fix: thing  \r\n\nbody"), "fix: thing");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_author_falls_back_to_name() {
        let author = CommitAuthor {
            name: "Some One".into(),
            username: String::new(),
        };
        assert_eq!(author.display(), "Some One");
    }

    #[test]
    fn test_only_opened_pull_requests() {
        let json = br#"{"action":"opened","pull_request":{"html_url":"https://x/pull/1","title":"Add foo","user":{"login":"poettering"}}}"#;
        let event = Event::parse("pull_request", json).unwrap().unwrap();
        assert_eq!(
            Formatter::default().lines(&event),
            vec!["poettering opened pull request: Add foo https://x/pull/1"]
        );

        let json = br#"{"action":"closed","pull_request":{"title":"Add foo"}}"#;
        let event = Event::parse("pull_request", json).unwrap().unwrap();
        assert!(Formatter::default().lines(&event).is_empty());
    }

    #[test]
    fn test_only_opened_issues() {
        let json = br#"{"action":"opened","issue":{"html_url":"https://x/issues/2","title":"Boot hangs","user":{"login":"foo"}}}"#;
        let event = Event::parse("issues", json).unwrap().unwrap();
        assert_eq!(
            Formatter::default().lines(&event),
            vec!["foo opened issue: Boot hangs https://x/issues/2"]
        );

        let json = br#"{"action":"labeled","issue":{}}"#;
        let event = Event::parse("issues", json).unwrap().unwrap();
        assert!(Formatter::default().lines(&event).is_empty());
    }

    #[test]
    fn test_wiki_keeps_last_pages() {
        let pages: Vec<String> = (0..8)
            .map(|i| format!(r#"{{"page_name":"Page{i}","action":"edited","sha":"abc","html_url":"https://x/wiki/{i}"}}"#))
            .collect();
        let json = format!(r#"{{"pages":[{}],"sender":{{"login":"foo"}}}}"#, pages.join(","));
        let event = Event::parse("gollum", json.as_bytes()).unwrap().unwrap();

        let lines = Formatter::default().lines(&event);
        assert_eq!(lines.len(), MAX_LINES);
        assert_eq!(lines[0], "foo edited wiki page Page3: https://x/wiki/3");
        assert_eq!(lines[4], "foo edited wiki page Page7: https://x/wiki/7");
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        assert!(Event::parse("ping", b"{}").unwrap().is_none());
        assert!(Event::parse("star", b"not even json").unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            Event::parse("push", b"{\"commits\": 5}"),
            Err(PayloadError::Json(_))
        ));
    }
}
