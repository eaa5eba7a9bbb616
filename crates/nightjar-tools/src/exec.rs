// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The exec tool: run a shell command in the workspace directory.

use nightjar_core::NightjarError;

use crate::Registry;

/// Combined stdout+stderr is truncated to this many bytes before being
/// returned to the model.
const MAX_OUTPUT_BYTES: usize = 20_000;

impl Registry {
    pub(crate) async fn exec(&self, command: &str) -> Result<String, NightjarError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(NightjarError::Tool("command is empty".into()));
        }

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_dir)
            .output();

        let output = match tokio::time::timeout(self.exec_timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(NightjarError::Tool(format!("exec failed: {e}")));
            }
            Err(_) => {
                return Err(NightjarError::Tool(format!(
                    "command timed out after {}s",
                    self.exec_timeout.as_secs()
                )));
            }
        };

        let mut combined = String::new();
        combined.push_str(&String::from_utf8_lossy(&output.stdout));
        if !output.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        if combined.len() > MAX_OUTPUT_BYTES {
            let mut end = MAX_OUTPUT_BYTES;
            while end > 0 && !combined.is_char_boundary(end) {
                end -= 1;
            }
            combined.truncate(end);
            combined.push_str("\n...(truncated)");
        }

        // Non-zero exit is information for the model, not a failure.
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&format!("(exit status {code})"));
        }
        if combined.is_empty() {
            combined = "(no output)".into();
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use crate::Registry;
    use std::time::Duration;

    #[tokio::test]
    async fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let out = r.exec("echo hello").await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn runs_in_workspace_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let r = Registry::new(dir.path());
        let out = r.exec("ls").await.unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_textually() {
        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        let out = r.exec("sh -c 'echo oops >&2; exit 3'").await.unwrap();
        assert!(out.contains("oops"));
        assert!(out.contains("(exit status 3)"));
    }

    #[tokio::test]
    async fn timeout_becomes_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = Registry::new(dir.path());
        r.exec_timeout = Duration::from_millis(100);
        let err = r.exec("sleep 5").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn empty_output_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let r = Registry::new(dir.path());
        assert_eq!(r.exec("true").await.unwrap(), "(no output)");
    }
}
