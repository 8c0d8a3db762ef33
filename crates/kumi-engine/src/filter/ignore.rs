//! `--ignore` and the workspace `ignore` list.

use kumi_types::Package;

use super::glob::glob_match;

/// True if any pattern matches the package's name, its name with `-` read
/// as `_`, or its directory path.
pub fn should_ignore(package: &Package, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let name = package.name.as_str();
    let underscored = name.replace('-', "_");
    let path = package.path.to_string_lossy();

    patterns.iter().any(|pattern| {
        glob_match(pattern, name)
            || glob_match(&pattern.replace('-', "_"), &underscored)
            || glob_match(pattern, &path)
    })
}

/// Drop packages matching any pattern, preserving order.
pub fn filter_by_ignore<'a, I>(packages: I, patterns: &[String]) -> Vec<&'a Package>
where
    I: IntoIterator<Item = &'a Package>,
{
    packages
        .into_iter()
        .filter(|p| !should_ignore(p, patterns))
        .collect()
}
