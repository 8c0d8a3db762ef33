//! `--scope`: select packages by name or pattern.

use kumi_types::Package;

use super::glob::glob_match;

/// Split a comma-separated scope into its patterns, dropping blanks.
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// True if `name` matches any pattern. No patterns matches everything.
///
/// A pattern matches on the exact name, the name ignoring case, as a glob,
/// or as a glob once `-` and `_` are treated alike.
pub fn matches_scope(name: &str, patterns: &[String]) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| matches_pattern(name, p))
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    name == pattern
        || name.to_lowercase() == pattern.to_lowercase()
        || glob_match(pattern, name)
        || glob_match(&pattern.replace('-', "_"), &name.replace('-', "_"))
}

/// Keep packages matching `scope`, preserving order.
pub fn filter_by_scope<'a, I>(packages: I, scope: Option<&str>) -> Vec<&'a Package>
where
    I: IntoIterator<Item = &'a Package>,
{
    let patterns = scope.map(parse_scope).unwrap_or_default();
    packages
        .into_iter()
        .filter(|p| matches_scope(&p.name, &patterns))
        .collect()
}
