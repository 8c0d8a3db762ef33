//! Reading a member's `pyproject.toml`.

use std::path::Path;

use kumi_types::package::normalize_name;
use serde::Deserialize;

use super::WorkspaceError;

/// Manifest file expected in every member directory.
pub const MANIFEST_FILE: &str = "pyproject.toml";

/// The parts of a manifest the workspace cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Normalized package name.
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    /// Normalized names of every declared requirement, workspace or not,
    /// in declaration order.
    pub requirements: Vec<String>,
}

#[derive(Deserialize)]
struct PyProject {
    project: Option<ProjectTable>,
}

#[derive(Deserialize)]
struct ProjectTable {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Read the manifest in `dir`.
pub fn read_manifest(dir: &Path) -> Result<Manifest, WorkspaceError> {
    let path = dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).map_err(|source| WorkspaceError::Io {
        path: path.clone(),
        source,
    })?;
    parse_manifest(&content, &path)
}

/// Parse manifest text; `path` is only used in error messages.
pub fn parse_manifest(content: &str, path: &Path) -> Result<Manifest, WorkspaceError> {
    let invalid = |message: String| WorkspaceError::Manifest {
        path: path.to_path_buf(),
        message,
    };

    let parsed: PyProject = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
    let project = parsed
        .project
        .ok_or_else(|| invalid("missing [project] table".into()))?;
    let name = project
        .name
        .map(|n| normalize_name(&n))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("missing project.name".into()))?;
    let version = project
        .version
        .ok_or_else(|| invalid(format!("package '{name}' has no project.version")))?;

    let mut requirements: Vec<String> = Vec::new();
    for req in &project.dependencies {
        if let Some(dep) = requirement_name(req)
            && !requirements.contains(&dep)
        {
            requirements.push(dep);
        }
    }

    Ok(Manifest {
        name,
        version,
        description: project.description,
        requirements,
    })
}

/// Normalized distribution name of a requirement string such as
/// `"my-lib[extra]>=1.0; python_version>'3.8'"`. `None` if there is no name.
pub fn requirement_name(requirement: &str) -> Option<String> {
    let trimmed = requirement.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || "[(<>=!~;@".contains(c))
        .unwrap_or(trimmed.len());
    let name = normalize_name(&trimmed[..end]);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("requests", Some("requests"))]
    #[case("My_Lib>=1.0", Some("my-lib"))]
    #[case("core[extra]", Some("core"))]
    #[case("api ; python_version > '3.8'", Some("api"))]
    #[case("pkg @ https://example.com/pkg.whl", Some("pkg"))]
    #[case("zope.interface~=5.0", Some("zope-interface"))]
    #[case("lib(>=2)", Some("lib"))]
    #[case("lib!=1.2", Some("lib"))]
    #[case(">=1.0", None)]
    #[case("", None)]
    fn test_requirement_name(#[case] req: &str, #[case] expected: Option<&str>) {
        assert_eq!(requirement_name(req).as_deref(), expected);
    }

    #[test]
    fn test_parse_manifest() {
        let toml = r#"
[project]
name = "Api_Server"
version = "0.2.0"
description = "HTTP API"
dependencies = ["core>=0.1", "httpx", "core"]
"#;
        let manifest = parse_manifest(toml, Path::new("pyproject.toml")).unwrap();
        assert_eq!(manifest.name, "api-server");
        assert_eq!(manifest.version, "0.2.0");
        assert_eq!(manifest.description.as_deref(), Some("HTTP API"));
        assert_eq!(manifest.requirements, ["core", "httpx"]);
    }

    #[test]
    fn test_missing_version_is_error() {
        let toml = "[project]\nname = \"core\"\n";
        let err = parse_manifest(toml, Path::new("core/pyproject.toml")).unwrap_err();
        assert!(err.to_string().contains("project.version"), "{err}");
    }

    #[test]
    fn test_missing_project_table_is_error() {
        let err = parse_manifest("[tool.other]\nx = 1\n", Path::new("pyproject.toml")).unwrap_err();
        assert!(matches!(err, WorkspaceError::Manifest { .. }));
    }
}
