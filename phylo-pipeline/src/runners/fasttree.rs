// FastTree Runner
// Invokes the FastTree binary as a subprocess

use crate::config::ToolConfig;
use crate::error::ToolError;
use crate::runners::TreeBuilder;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Output captured from one tool invocation
#[derive(Debug, Default)]
struct ToolOutput {
    stdout: Vec<u8>,
    stderr: String,
    exit_code: Option<i32>,
    success: bool,
}

/// Tree builder backed by the FastTree executable
pub struct FastTree {
    config: ToolConfig,
}

impl FastTree {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Locate the executable: explicit paths must exist, bare names go through PATH
    pub fn resolve_program(&self) -> Result<PathBuf, ToolError> {
        let program = &self.config.program;
        let not_found = || ToolError::NotFound {
            program: program.clone(),
        };

        let path = Path::new(program);
        if path.components().count() > 1 {
            return if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(not_found())
            };
        }

        which::which(program).map_err(|_| not_found())
    }

    /// Arguments for one invocation
    fn arguments(&self, fasta: &Path, rate_matrix: Option<&Path>) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push("-quiet".to_string());
        args.push("-nopr".to_string());
        if let Some(matrix) = rate_matrix {
            args.push("-trans".to_string());
            args.push(matrix.display().to_string());
        }
        args.push(fasta.display().to_string());
        args
    }

    async fn invoke(&self, program: &Path, args: &[String]) -> Result<ToolOutput, ToolError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        // Read output streams concurrently so a full pipe cannot block the child
        let stdout_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(stream) = stdout.as_mut() {
                let _ = stream.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(stream) = stderr.as_mut() {
                let _ = stream.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = match self.config.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(ToolError::TimedOut {
                        program: self.config.program.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(|source| ToolError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;

        Ok(ToolOutput {
            stdout: stdout_handle.await.unwrap_or_default(),
            stderr: stderr_handle.await.unwrap_or_default(),
            exit_code: status.code(),
            success: status.success(),
        })
    }

    fn check(&self, output: ToolOutput) -> Result<Vec<u8>, ToolError> {
        if !output.success {
            return Err(ToolError::NonZeroExit {
                program: self.config.program.clone(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(ToolError::EmptyOutput {
                program: self.config.program.clone(),
            });
        }
        Ok(output.stdout)
    }
}

impl Default for FastTree {
    fn default() -> Self {
        Self::new(ToolConfig::default())
    }
}

#[async_trait::async_trait]
impl TreeBuilder for FastTree {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn build_tree(
        &self,
        fasta: &Path,
        rate_matrix: Option<&Path>,
    ) -> Result<Vec<u8>, ToolError> {
        let program = self.resolve_program()?;
        let args = self.arguments(fasta, rate_matrix);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .invoke(&program, &args)
                .await
                .and_then(|output| self.check(output));

            match result {
                Ok(tree) => return Ok(tree),
                Err(e) if attempt <= self.config.retries => {
                    tracing::warn!(
                        program = %self.config.program,
                        attempt,
                        error = %e,
                        "tree inference failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;

    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// Install an executable shell script standing in for FastTree.
    ///
    /// It prints a star tree over the FASTA headers, with the root labelled
    /// `gamma` under `-gamma`. A rate matrix file containing `bad` makes it
    /// exit with status 3.
    pub(crate) fn fake_fasttree(dir: &Path) -> PathBuf {
        let script = r#"#!/bin/sh
matrix=""
input=""
gamma=""
while [ $# -gt 0 ]; do
  case "$1" in
    -trans) matrix="$2"; shift 2 ;;
    -gamma) gamma="gamma"; shift ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
if [ -n "$matrix" ] && grep -q bad "$matrix"; then
  echo "cannot parse rate matrix" >&2
  exit 3
fi
names=$(grep '^>' "$input" | cut -c2- | paste -sd, -)
echo "($names)$gamma;"
"#;
        write_script(dir, "FastTree", script)
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn tool(program: &Path) -> FastTree {
        FastTree::new(ToolConfig {
            program: program.display().to_string(),
            ..ToolConfig::default()
        })
    }

    #[tokio::test]
    async fn test_build_tree() {
        let temp = tempfile::tempdir().unwrap();
        let program = fake_fasttree(temp.path());
        let fasta = temp.path().join("in.fasta");
        fs::write(&fasta, ">a\nMK\n>b\nMK\n").unwrap();

        let tree = tool(&program).build_tree(&fasta, None).await.unwrap();
        assert_eq!(tree, b"(a,b);\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let temp = tempfile::tempdir().unwrap();
        let program = fake_fasttree(temp.path());
        let fasta = temp.path().join("in.fasta");
        let matrix = temp.path().join("Q.txt");
        fs::write(&fasta, ">a\nMK\n").unwrap();
        fs::write(&matrix, "bad matrix\n").unwrap();

        let err = tool(&program)
            .build_tree(&fasta, Some(&matrix))
            .await
            .unwrap_err();
        match err {
            ToolError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "cannot parse rate matrix");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = tempfile::tempdir().unwrap();
        let fasta = temp.path().join("in.fasta");
        fs::write(&fasta, ">a\nMK\n").unwrap();

        let err = tool(&temp.path().join("no-such-tool"))
            .build_tree(&fasta, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));

        let err = FastTree::new(ToolConfig {
            program: "definitely-not-a-real-fasttree".to_string(),
            ..ToolConfig::default()
        })
        .build_tree(&fasta, None)
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_output_and_timeout() {
        let temp = tempfile::tempdir().unwrap();
        let fasta = temp.path().join("in.fasta");
        fs::write(&fasta, ">a\nMK\n").unwrap();

        let silent = write_script(temp.path(), "silent", "#!/bin/sh\nexit 0\n");
        let err = tool(&silent).build_tree(&fasta, None).await.unwrap_err();
        assert!(matches!(err, ToolError::EmptyOutput { .. }));

        let slow = write_script(temp.path(), "slow", "#!/bin/sh\nsleep 5\necho '(a);'\n");
        let err = FastTree::new(ToolConfig {
            program: slow.display().to_string(),
            timeout_secs: Some(1),
            ..ToolConfig::default()
        })
        .build_tree(&fasta, None)
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_retries() {
        let temp = tempfile::tempdir().unwrap();
        let fasta = temp.path().join("in.fasta");
        fs::write(&fasta, ">a\nMK\n").unwrap();

        // Fails on the first call, succeeds on the second
        let marker = temp.path().join("marker");
        let flaky = write_script(
            temp.path(),
            "flaky",
            &format!(
                "#!/bin/sh\nif [ ! -f '{m}' ]; then touch '{m}'; exit 1; fi\necho '(a);'\n",
                m = marker.display()
            ),
        );

        let err = tool(&flaky).build_tree(&fasta, None).await.unwrap_err();
        assert!(matches!(err, ToolError::NonZeroExit { .. }));

        fs::remove_file(&marker).unwrap();
        let tree = FastTree::new(ToolConfig {
            program: flaky.display().to_string(),
            retries: 1,
            ..ToolConfig::default()
        })
        .build_tree(&fasta, None)
        .await
        .unwrap();
        assert_eq!(tree, b"(a);\n");
    }

    #[test]
    fn test_arguments() {
        let fasttree = FastTree::new(ToolConfig {
            args: vec!["-lg".to_string()],
            ..ToolConfig::default()
        });
        let args = fasttree.arguments(Path::new("/tmp/x.fasta"), Some(Path::new("/m/Q.txt")));
        assert_eq!(
            args,
            vec!["-lg", "-quiet", "-nopr", "-trans", "/m/Q.txt", "/tmp/x.fasta"]
        );
    }
}
