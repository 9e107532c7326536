//! Symbol validation: each import statement is resolved in isolation
//! against the Python environment, without executing any diagram body.

use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::error::Result;

/// Result of one validation pass
#[derive(Debug, Clone)]
pub struct Validation {
    /// True iff no statement failed to resolve
    pub is_valid: bool,
    /// One sanitized message per failing statement, in statement order
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Symbol validator contract
#[async_trait]
pub trait Validator: Send + Sync {
    /// Check every non-empty statement of the import fragment for
    /// resolvability. Never executes the body fragment.
    async fn validate(&self, import_fragment: &str) -> Result<Validation>;
}

/// Validator that resolves each import statement in a Python subprocess
pub struct PythonValidator {
    python_bin: String,
}

impl PythonValidator {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }

    async fn check_statement(&self, statement: &str) -> Option<String> {
        let output = Command::new(&self.python_bin)
            .arg("-c")
            .arg(statement)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => None,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Some(sanitize_error(&stderr))
            }
            Err(e) => Some(sanitize_error(&format!(
                "failed to run interpreter: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl Validator for PythonValidator {
    async fn validate(&self, import_fragment: &str) -> Result<Validation> {
        let mut errors = Vec::new();
        for statement in import_fragment.lines() {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            if let Some(error) = self.check_statement(statement).await {
                tracing::debug!(statement, error, "import statement failed to resolve");
                errors.push(error);
            }
        }
        Ok(Validation::from_errors(errors))
    }
}

/// Parenthetical noise in interpreter messages, e.g. module search paths
static PAREN_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("valid regex"));

/// Reduce interpreter stderr to a single sanitized message: the last
/// non-empty line (the exception itself, below any traceback) with
/// parenthetical noise stripped.
pub fn sanitize_error(stderr: &str) -> String {
    let last_line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("");
    PAREN_NOISE.replace_all(last_line, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn python_available(bin: &str) -> bool {
        Command::new(bin)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_sanitize_strips_parentheticals() {
        let sanitized = sanitize_error("No module named 'diagrams' (did you mean: diagram?)");
        assert_eq!(sanitized, "No module named 'diagrams'");
    }

    #[test]
    fn test_sanitize_takes_last_traceback_line() {
        let stderr = "Traceback (most recent call last):\n  File \"<string>\", line 1, in <module>\nModuleNotFoundError: No module named 'nope'\n";
        let sanitized = sanitize_error(stderr);
        assert_eq!(sanitized, "ModuleNotFoundError: No module named 'nope'");
    }

    #[test]
    fn test_sanitize_empty_stderr() {
        assert_eq!(sanitize_error(""), "");
        assert_eq!(sanitize_error("\n\n"), "");
    }

    #[tokio::test]
    async fn test_resolvable_imports_yield_no_errors() {
        if !python_available("python3").await {
            eprintln!("python3 not available, skipping");
            return;
        }
        let validator = PythonValidator::new("python3");
        let validation = validator
            .validate("import os\n\nimport json\nfrom collections import OrderedDict")
            .await
            .unwrap();
        assert!(validation.is_valid);
        assert!(validation.errors.is_empty());
    }

    #[tokio::test]
    async fn test_failing_statements_yield_one_error_each_in_order() {
        if !python_available("python3").await {
            eprintln!("python3 not available, skipping");
            return;
        }
        let validator = PythonValidator::new("python3");
        let validation = validator
            .validate("import os\nimport missing_module_aaa\nimport json\nimport missing_module_bbb")
            .await
            .unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.errors.len(), 2);
        assert!(validation.errors[0].contains("missing_module_aaa"));
        assert!(validation.errors[1].contains("missing_module_bbb"));
    }

    #[tokio::test]
    async fn test_blank_fragment_is_valid() {
        let validator = PythonValidator::new("python3");
        let validation = validator.validate("\n  \n").await.unwrap();
        assert!(validation.is_valid);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_recorded_not_raised() {
        let validator = PythonValidator::new("definitely-not-a-python-binary");
        let validation = validator.validate("import os").await.unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.errors.len(), 1);
    }
}
