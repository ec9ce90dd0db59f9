//! Path sandboxing for the offload virtual tools.
//!
//! Every `filename` a model supplies resolves to a path that must stay
//! inside the handler root. Two input shapes are accepted:
//!
//! - a workspace-relative path beginning with the spill folder name,
//!   e.g. `tool_output_folder/<session>/tool_….txt`
//! - a bare filename, joined with the current session's folder
//!
//! Rejection happens *before* any filesystem access: absolute paths,
//! parent-directory segments, and NUL bytes never reach the OS.

use std::path::{Component, Path, PathBuf};

use ax_domain::{Error, Result};

/// Reject NUL bytes in any model-supplied string (filenames, patterns,
/// queries). Everything else is the concern of the external matcher.
pub fn validate_no_nul(value: &str, what: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(Error::Sandbox(format!("{what} contains a NUL byte")));
    }
    Ok(())
}

/// Resolve a model-supplied filename to an absolute path under `root`.
pub fn resolve_spill_path(
    root: &Path,
    folder_name: &str,
    session_id: &str,
    filename: &str,
) -> Result<PathBuf> {
    validate_no_nul(filename, "filename")?;
    if filename.is_empty() {
        return Err(Error::InvalidArgument("filename is empty".into()));
    }

    let supplied = Path::new(filename);
    if supplied.is_absolute() {
        return Err(Error::Sandbox(format!(
            "absolute path not allowed: {filename}"
        )));
    }
    for component in supplied.components() {
        match component {
            Component::ParentDir => {
                return Err(Error::Sandbox(format!(
                    "path traversal not allowed: {filename}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::Sandbox(format!(
                    "absolute path not allowed: {filename}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    let has_separator = filename.contains('/') || filename.contains('\\');
    let resolved = if has_separator {
        // Full workspace-relative form: must begin with the spill folder.
        let stripped = supplied.strip_prefix(folder_name).map_err(|_| {
            Error::Sandbox(format!(
                "path must begin with '{folder_name}/': {filename}"
            ))
        })?;
        root.join(stripped)
    } else {
        // Bare filename: current session's folder.
        root.join(session_id).join(supplied)
    };

    // With absolute and parent-dir inputs rejected above the join cannot
    // escape, but the descendant property is what callers rely on.
    if !resolved.starts_with(root) {
        return Err(Error::Sandbox(format!(
            "resolved path escapes the sandbox: {filename}"
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/workspace/tool_output_folder";
    const FOLDER: &str = "tool_output_folder";
    const SESSION: &str = "sess42";

    fn resolve(filename: &str) -> Result<PathBuf> {
        resolve_spill_path(Path::new(ROOT), FOLDER, SESSION, filename)
    }

    #[test]
    fn bare_filename_joins_session_folder() {
        let path = resolve("tool_20260801_120000_fetch.txt").unwrap();
        assert_eq!(
            path,
            Path::new(ROOT).join(SESSION).join("tool_20260801_120000_fetch.txt")
        );
    }

    #[test]
    fn workspace_relative_path_resolves_under_root() {
        let path = resolve("tool_output_folder/other_session/tool_x.json").unwrap();
        assert_eq!(path, Path::new(ROOT).join("other_session/tool_x.json"));
    }

    #[test]
    fn relative_path_must_begin_with_folder_name() {
        let err = resolve("some_other_dir/tool_x.txt").unwrap_err();
        assert!(matches!(err, Error::Sandbox(_)));
    }

    #[test]
    fn parent_dir_segments_rejected() {
        for input in [
            "../etc/passwd",
            "tool_output_folder/../../../etc/passwd",
            "tool_output_folder/sess/..",
        ] {
            let err = resolve(input).unwrap_err();
            assert!(matches!(err, Error::Sandbox(_)), "{input}");
        }
    }

    #[test]
    fn absolute_path_rejected() {
        let err = resolve("/etc/passwd").unwrap_err();
        assert!(matches!(err, Error::Sandbox(_)));
    }

    #[test]
    fn nul_byte_rejected() {
        let err = resolve("file\0.txt").unwrap_err();
        assert!(matches!(err, Error::Sandbox(_)));
    }

    #[test]
    fn empty_filename_rejected() {
        let err = resolve("").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn resolved_path_is_descendant_of_root() {
        for input in [
            "a.txt",
            "tool_output_folder/s/a.txt",
            "tool_output_folder/s/deep/b.json",
        ] {
            let path = resolve(input).unwrap();
            assert!(path.starts_with(ROOT), "{input} resolved to {path:?}");
        }
    }

    #[test]
    fn nul_in_pattern_rejected() {
        assert!(validate_no_nul("pat\0tern", "pattern").is_err());
        assert!(validate_no_nul("pattern", "pattern").is_ok());
    }
}
