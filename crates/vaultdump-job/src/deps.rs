//! Startup check that external tools are installed.

use std::path::PathBuf;

use tracing::debug;

use crate::DependencyError;

/// Resolve every tool on `PATH` (or as a path, if it contains a separator).
///
/// Returns the resolved paths in input order, or the first missing tool.
pub fn validate_dependencies<I, S>(tools: I) -> Result<Vec<PathBuf>, DependencyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tools
        .into_iter()
        .map(|tool| {
            let tool = tool.as_ref();
            let resolved = which::which(tool).map_err(|source| DependencyError::Missing {
                tool: tool.to_string(),
                source,
            })?;
            debug!(tool, path = %resolved.display(), "resolved dependency");
            Ok(resolved)
        })
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_shell_is_found() {
        let resolved = validate_dependencies(["sh"]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].ends_with("sh"));
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let err = validate_dependencies(["sh", "vaultdump-definitely-missing"]).unwrap_err();
        match err {
            DependencyError::Missing { tool, .. } => {
                assert_eq!(tool, "vaultdump-definitely-missing")
            }
        }
    }

    #[test]
    fn test_absolute_path_to_executable() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-export");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolved = validate_dependencies([script.to_string_lossy()]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].ends_with("fake-export"));
    }

    #[test]
    fn test_non_executable_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("not-executable");
        std::fs::write(&script, "data").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(validate_dependencies([script.to_string_lossy()]).is_err());
    }
}
