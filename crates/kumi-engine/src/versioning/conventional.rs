//! Conventional-commit parsing.
//!
//! Recognizes `type(scope)!: description` on the first line of a message.
//! A `!` or a `BREAKING CHANGE:` / `BREAKING-CHANGE:` trailer in the body
//! marks the commit as breaking.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<type>feat|fix|docs|style|refactor|perf|test|chore|ci|build|revert)(?:\((?P<scope>[^)]+)\))?(?P<breaking>!)?: (?P<description>.+)$",
    )
    .expect("conventional commit pattern is valid")
});

/// How far a version moves. Ordered: `None < Patch < Minor < Major`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    #[default]
    None,
    Patch,
    Minor,
    Major,
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpType::None => write!(f, "none"),
            BumpType::Patch => write!(f, "patch"),
            BumpType::Minor => write!(f, "minor"),
            BumpType::Major => write!(f, "major"),
        }
    }
}

impl FromStr for BumpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BumpType::None),
            "patch" => Ok(BumpType::Patch),
            "minor" => Ok(BumpType::Minor),
            "major" => Ok(BumpType::Major),
            other => Err(format!("unknown bump type '{other}' (expected major, minor or patch)")),
        }
    }
}

/// A commit message in conventional form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCommit {
    pub sha: String,
    /// Lowercased type, e.g. `feat`.
    #[serde(rename = "type")]
    pub kind: String,
    pub scope: Option<String>,
    pub description: String,
    pub body: Option<String>,
    pub breaking: bool,
}

impl ParsedCommit {
    /// The bump this commit asks for on its own.
    pub fn bump(&self) -> BumpType {
        if self.breaking {
            return BumpType::Major;
        }
        match self.kind.as_str() {
            "feat" => BumpType::Minor,
            "fix" | "perf" | "revert" => BumpType::Patch,
            _ => BumpType::None,
        }
    }
}

/// Parse `message`; `None` if its first line is not a conventional header.
pub fn parse_commit_message(message: &str, sha: &str) -> Option<ParsedCommit> {
    let message = message.trim();
    let (header, rest) = message.split_once('\n').unwrap_or((message, ""));
    let caps = HEADER.captures(header.trim_end_matches('\r'))?;

    let body = rest.trim();
    let body = (!body.is_empty()).then(|| body.to_string());
    let breaking = caps.name("breaking").is_some()
        || body
            .as_deref()
            .is_some_and(|b| b.contains("BREAKING CHANGE:") || b.contains("BREAKING-CHANGE:"));

    Some(ParsedCommit {
        sha: sha.to_string(),
        kind: caps["type"].to_lowercase(),
        scope: caps.name("scope").map(|m| m.as_str().to_string()),
        description: caps["description"].to_string(),
        body,
        breaking,
    })
}

/// The largest bump requested by any commit; `None` for no commits.
pub fn determine_bump<'a, I>(commits: I) -> BumpType
where
    I: IntoIterator<Item = &'a ParsedCommit>,
{
    commits
        .into_iter()
        .map(ParsedCommit::bump)
        .max()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("feat: add widgets", "feat", None, false, BumpType::Minor)]
    #[case("fix(core): null deref", "fix", Some("core"), false, BumpType::Patch)]
    #[case("FEAT(api)!: drop v1", "feat", Some("api"), true, BumpType::Major)]
    #[case("perf: faster graph", "perf", None, false, BumpType::Patch)]
    #[case("revert: undo thing", "revert", None, false, BumpType::Patch)]
    #[case("docs: typo", "docs", None, false, BumpType::None)]
    #[case("chore(deps)!: bump python", "chore", Some("deps"), true, BumpType::Major)]
    fn test_parse(
        #[case] message: &str,
        #[case] kind: &str,
        #[case] scope: Option<&str>,
        #[case] breaking: bool,
        #[case] bump: BumpType,
    ) {
        let parsed = parse_commit_message(message, "abc123").expect("should parse");
        assert_eq!(parsed.kind, kind);
        assert_eq!(parsed.scope.as_deref(), scope);
        assert_eq!(parsed.breaking, breaking);
        assert_eq!(parsed.bump(), bump);
        assert_eq!(parsed.sha, "abc123");
    }

    #[rstest]
    #[case("Merge branch 'main'")]
    #[case("feat add widgets")]
    #[case("feature: not a type")]
    #[case("fix():  empty scope")]
    #[case("")]
    fn test_rejects_non_conventional(#[case] message: &str) {
        assert!(parse_commit_message(message, "").is_none());
    }

    #[rstest]
    #[case("BREAKING CHANGE: config format changed")]
    #[case("BREAKING-CHANGE: config format changed")]
    fn test_breaking_trailer_in_body(#[case] trailer: &str) {
        let message = format!("fix: parser\n\nDetails here.\n\n{trailer}\n");
        let parsed = parse_commit_message(&message, "").unwrap();
        assert!(parsed.breaking);
        assert_eq!(parsed.bump(), BumpType::Major);
        assert!(parsed.body.unwrap().contains("Details here."));
    }

    #[test]
    fn test_determine_bump_takes_max() {
        let commits: Vec<ParsedCommit> = ["docs: a", "fix: b", "feat: c", "chore: d"]
            .iter()
            .filter_map(|m| parse_commit_message(m, ""))
            .collect();
        assert_eq!(determine_bump(&commits), BumpType::Minor);
        assert_eq!(determine_bump(&[]), BumpType::None);
    }

    #[test]
    fn test_bump_ordering() {
        assert!(BumpType::None < BumpType::Patch);
        assert!(BumpType::Patch < BumpType::Minor);
        assert!(BumpType::Minor < BumpType::Major);
    }

    #[test]
    fn test_bump_from_str() {
        assert_eq!("Major".parse::<BumpType>(), Ok(BumpType::Major));
        assert!("huge".parse::<BumpType>().is_err());
    }
}
