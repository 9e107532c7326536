//! Code execution: assembles the candidate fragments with injected context
//! values and runs the result as one Python unit.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tokio::process::Command;

/// Graphviz background colors the renderer may pick from.
/// https://graphviz.gitlab.io/doc/info/colors.html
const BACKGROUND_COLORS: &[&str] = &["gray89", "gray94", "whitesmoke"];

const GRAPH_MARGIN: &str = "-1.5, -2";

/// Outcome of one execution attempt. `error` and `image_location` are
/// mutually exclusive; `resolved_code` is always populated for audit.
#[derive(Debug, Clone)]
pub struct Execution {
    /// The fully assembled source that was executed
    pub resolved_code: String,
    /// Error message, absent iff execution succeeded
    pub error: Option<String>,
    /// Rendered image path, absent iff execution failed
    pub image_location: Option<PathBuf>,
}

/// Code executor contract. Infallible at the boundary: every failure mode
/// is captured inside the returned `Execution`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, import_fragment: &str, body_fragment: &str) -> Execution;
}

/// Executor that runs the assembled unit in a Python subprocess
pub struct PythonExecutor {
    python_bin: String,
    output_dir: PathBuf,
    timeout: Duration,
}

impl PythonExecutor {
    pub fn new(python_bin: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            python_bin: python_bin.into(),
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the per-attempt execution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Output path for one attempt, unique down to the microsecond so
    /// consecutive renders in a session never overwrite each other.
    fn output_path(&self) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y_%m_%d_%H_%M_%S_%6f");
        self.output_dir.join(format!("diagram_image_{}", stamp))
    }

    async fn run(&self, resolved_code: &str) -> Option<String> {
        let child = Command::new(&self.python_bin)
            .arg("-c")
            .arg(resolved_code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) if output.status.success() => None,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = crate::validate::sanitize_error(&stderr);
                if message.is_empty() {
                    Some(format!(
                        "execution exited with code {}",
                        output.status.code().unwrap_or(-1)
                    ))
                } else {
                    Some(message)
                }
            }
            Ok(Err(e)) => Some(format!("failed to run interpreter: {}", e)),
            Err(_) => Some(format!(
                "execution timed out after {} seconds",
                self.timeout.as_secs()
            )),
        }
    }
}

#[async_trait]
impl Executor for PythonExecutor {
    async fn execute(&self, import_fragment: &str, body_fragment: &str) -> Execution {
        let filename = self.output_path();
        let bgcolor = BACKGROUND_COLORS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or("gray89");
        let resolved_code = assemble(
            import_fragment,
            body_fragment,
            &filename.display().to_string(),
            bgcolor,
        );

        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            return Execution {
                resolved_code,
                error: Some(format!("failed to create output directory: {}", e)),
                image_location: None,
            };
        }

        match self.run(&resolved_code).await {
            None => {
                let image_location = filename.with_extension("png");
                tracing::debug!(image = %image_location.display(), "diagram rendered");
                Execution {
                    resolved_code,
                    error: None,
                    image_location: Some(image_location),
                }
            }
            Some(error) => {
                tracing::debug!(error, "diagram execution failed");
                Execution {
                    resolved_code,
                    error: Some(error),
                    image_location: None,
                }
            }
        }
    }
}

/// Assemble the executable unit: imports first, then the injected context
/// values the body references by name, then the body itself.
fn assemble(
    import_fragment: &str,
    body_fragment: &str,
    filename_value: &str,
    bgcolor: &str,
) -> String {
    // The path lands inside a double-quoted Python literal; backslashes and
    // quotes in it must be escaped or the assembled source won't parse.
    let filename_value = py_escape(filename_value);
    format!(
        r#"{import_fragment}
graph_attr_value = {{
    "bgcolor": "{bgcolor}",
    "margin": "{GRAPH_MARGIN}"
}}

filename_value = "{filename_value}"
{body_fragment}
"#
    )
}

fn py_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_assemble_orders_sections() {
        let code = assemble("import os", "print(filename_value)", "/tmp/out/diagram_image_x", "gray89");
        let import_pos = code.find("import os").unwrap();
        let attr_pos = code.find("graph_attr_value").unwrap();
        let filename_pos = code.find("filename_value = ").unwrap();
        let body_pos = code.find("print(filename_value)").unwrap();
        assert!(import_pos < attr_pos);
        assert!(attr_pos < filename_pos);
        assert!(filename_pos < body_pos);
        assert!(code.contains("\"bgcolor\": \"gray89\""));
        assert!(code.contains("\"margin\": \"-1.5, -2\""));
    }

    #[test]
    fn test_assemble_escapes_path_characters() {
        let code = assemble("import os", "pass", r#"C:\out\we"ird\diagram_image_x"#, "gray89");
        assert!(code.contains(r#"filename_value = "C:\\out\\we\"ird\\diagram_image_x""#));
    }

    #[tokio::test]
    async fn test_quoted_output_path_still_renders() {
        if !python_available().await {
            eprintln!("python3 not available, skipping");
            return;
        }
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join(r#"odd"name"#);
        std::fs::create_dir_all(&dir).unwrap();
        let executor = PythonExecutor::new("python3", &dir);
        let execution = executor
            .execute(
                "import os",
                "open(filename_value + \".png\", \"w\").write(\"png\")",
            )
            .await;
        assert!(execution.error.is_none(), "error: {:?}", execution.error);
        assert!(execution.image_location.unwrap().exists());
    }

    #[tokio::test]
    async fn test_output_paths_are_distinct_per_attempt() {
        let executor = PythonExecutor::new("python3", "/tmp/out");
        let first = executor.output_path();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = executor.output_path();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_successful_execution_sets_image_location_only() {
        if !python_available().await {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let executor = PythonExecutor::new("python3", dir.path());
        let execution = executor
            .execute(
                "import os",
                "open(filename_value + \".png\", \"w\").write(\"png\")",
            )
            .await;
        assert!(execution.error.is_none(), "error: {:?}", execution.error);
        let image = execution.image_location.expect("image location set");
        assert!(image.exists());
        assert!(image.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_broken_body_is_captured_not_raised() {
        if !python_available().await {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let executor = PythonExecutor::new("python3", dir.path());
        let execution = executor
            .execute("import os", "this is not valid python (")
            .await;
        assert!(execution.error.is_some());
        assert!(execution.image_location.is_none());
        assert!(execution.resolved_code.contains("this is not valid python ("));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_captured_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let executor = PythonExecutor::new("definitely-not-a-python-binary", dir.path());
        let execution = executor.execute("import os", "pass").await;
        assert!(execution.error.is_some());
        assert!(execution.image_location.is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_captured_not_raised() {
        if !python_available().await {
            eprintln!("python3 not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let executor = PythonExecutor::new("python3", dir.path())
            .with_timeout(Duration::from_millis(200));
        let execution = executor
            .execute("import time", "time.sleep(30)")
            .await;
        let error = execution.error.expect("timeout recorded as error");
        assert!(error.contains("timed out"));
        assert!(execution.image_location.is_none());
    }
}
