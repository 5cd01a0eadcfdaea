// Path: crates/forge/src/testing/tool.rs

//! Invocation of the external build tool that owns `node-<N>/up` and `node-<N>/down`.

use casperlabs_types::config::ExternalToolConfig;
use casperlabs_types::error::PairError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;

/// Captured output of a successful tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

pub fn up_target(node_index: u32) -> String {
    format!("node-{}/up", node_index)
}

pub fn down_target(node_index: u32) -> String {
    format!("node-{}/down", node_index)
}

impl ExternalTool {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &ExternalToolConfig, working_dir: &Path) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub async fn up(&self, node_index: u32) -> Result<ToolOutput, PairError> {
        self.run(&up_target(node_index)).await
    }

    pub async fn down(&self, node_index: u32) -> Result<ToolOutput, PairError> {
        self.run(&down_target(node_index)).await
    }

    /// Runs `program args... target` in the working directory. A non-zero exit is an error.
    pub async fn run(&self, target: &str) -> Result<ToolOutput, PairError> {
        tracing::info!(
            target: "forge::tool",
            program = %self.program,
            dir = %self.working_dir.display(),
            "Running target {}",
            target
        );
        let output = TokioCommand::new(&self.program)
            .args(&self.args)
            .arg(target)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PairError::ExternalTool {
                target: target.to_string(),
                code: None,
                stderr: format!("failed to spawn '{}': {}", self.program, e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::debug!(
            target: "forge::tool",
            make_target = target,
            %stdout,
            %stderr,
            "Tool finished"
        );

        if !output.status.success() {
            return Err(PairError::ExternalTool {
                target: target.to_string(),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_tool(script: &str) -> (tempfile::TempDir, ExternalTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake-make.sh"), script).unwrap();
        let tool = ExternalTool::new("sh", dir.path()).with_args(["fake-make.sh"]);
        (dir, tool)
    }

    #[test]
    fn targets_follow_node_index() {
        assert_eq!(up_target(3), "node-3/up");
        assert_eq!(down_target(3), "node-3/down");
    }

    #[tokio::test]
    async fn captures_stdout_and_passes_target() {
        let (_dir, tool) = fake_tool("echo \"target=$1\"; pwd >&2\n");
        let out = tool.up(7).await.unwrap();
        assert_eq!(out.stdout.trim(), "target=node-7/up");
        assert!(!out.stderr.trim().is_empty());
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error_with_stderr() {
        let (_dir, tool) = fake_tool("echo boom >&2; exit 3\n");
        let err = tool.down(1).await.unwrap_err();
        match err {
            PairError::ExternalTool {
                target,
                code,
                stderr,
            } => {
                assert_eq!(target, "node-1/down");
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExternalTool::new("definitely-not-a-real-make-binary", dir.path());
        let err = tool.up(0).await.unwrap_err();
        assert!(matches!(err, PairError::ExternalTool { code: None, .. }));
    }
}
