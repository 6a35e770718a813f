// ABOUTME: Secret env-file materialization for the pipeline workspace.
// ABOUTME: Copies the credential file into place and removes it again on drop.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("invalid secret file: line {line} is not KEY=VALUE")]
    InvalidLine { line: usize },

    #[error("invalid secret file: empty key on line {line}")]
    EmptyKey { line: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A secret env file materialized into the workspace for one pipeline run.
///
/// The file is copied from the centrally managed source path and removed
/// again when this guard drops, so the secret never outlives the run.
/// Variable values are held for container env injection but are never
/// logged; `Debug` shows only the path and a count.
pub struct SecretFile {
    path: PathBuf,
    vars: HashMap<String, String>,
}

impl SecretFile {
    /// Copy the secret file to `workspace/target` and parse its contents.
    pub fn materialize(
        source: &Path,
        workspace: &Path,
        target: &str,
    ) -> Result<Self, SecretError> {
        if !source.is_file() {
            return Err(SecretError::SourceMissing(source.to_path_buf()));
        }

        let content = std::fs::read_to_string(source)?;
        let vars = parse_env_file(&content)?;

        let path = workspace.join(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, &path)?;

        tracing::debug!(target = %path.display(), count = vars.len(), "materialized secret file");

        Ok(Self { path, vars })
    }

    /// Parsed KEY=VALUE pairs for container env injection.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SecretFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl fmt::Debug for SecretFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretFile")
            .field("path", &self.path)
            .field("vars", &format_args!("<{} redacted>", self.vars.len()))
            .finish()
    }
}

/// Parse newline-delimited KEY=VALUE pairs.
///
/// Blank lines and `#` comments are skipped. Values are taken verbatim
/// (no quoting rules); a non-empty line without `=` is an error.
fn parse_env_file(content: &str) -> Result<HashMap<String, String>, SecretError> {
    let mut vars = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = raw
            .split_once('=')
            .ok_or(SecretError::InvalidLine { line: idx + 1 })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(SecretError::EmptyKey { line: idx + 1 });
        }

        vars.insert(key.to_string(), value.trim_end_matches('\r').to_string());
    }

    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let vars = parse_env_file("API_KEY=abc\nDB_URL=postgres://db/app\n").unwrap();
        assert_eq!(vars.get("API_KEY"), Some(&"abc".to_string()));
        assert_eq!(vars.get("DB_URL"), Some(&"postgres://db/app".to_string()));
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let vars = parse_env_file("# creds\n\nTOKEN=t\n   \n# end\n").unwrap();
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn value_keeps_equals_signs() {
        let vars = parse_env_file("SIG=a=b=c").unwrap();
        assert_eq!(vars.get("SIG"), Some(&"a=b=c".to_string()));
    }

    #[test]
    fn line_without_equals_is_an_error() {
        let err = parse_env_file("API_KEY=ok\nbroken line\n").unwrap_err();
        assert!(matches!(err, SecretError::InvalidLine { line: 2 }));
    }

    #[test]
    fn empty_key_is_an_error() {
        let err = parse_env_file("=value").unwrap_err();
        assert!(matches!(err, SecretError::EmptyKey { line: 1 }));
    }

    #[test]
    fn debug_redacts_values() {
        let dir = std::env::temp_dir();
        let source = dir.join(format!("gantry-secret-test-{}", std::process::id()));
        std::fs::write(&source, "PASSWORD=hunter2\n").unwrap();

        let secret = SecretFile::materialize(&source, &dir, ".env-debug-test").unwrap();
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("hunter2"));

        drop(secret);
        assert!(!dir.join(".env-debug-test").exists());
        std::fs::remove_file(&source).unwrap();
    }
}
