//! Subprocess runner.

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::error::CommandError;

/// Runs external command-line tools as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    niceness: Option<i32>,
}

impl ProcessRunner {
    /// Creates a runner. `niceness` is added to each child's scheduling
    /// priority on unix and ignored elsewhere.
    pub fn new(niceness: Option<i32>) -> Self {
        Self { niceness }
    }

    /// Builds a command with stdio and priority already set up.
    ///
    /// Exposed for callers that need to stream stdin, such as worker launch.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.lower_priority(&mut cmd);
        cmd
    }

    #[cfg(unix)]
    fn lower_priority(&self, cmd: &mut Command) {
        if let Some(increment) = self.niceness {
            // SAFETY: nice(2) is async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(move || {
                    libc::nice(increment);
                    Ok(())
                });
            }
        }
    }

    #[cfg(not(unix))]
    fn lower_priority(&self, _cmd: &mut Command) {}

    /// Runs `program` with `args` to completion.
    ///
    /// Returns stdout followed by stderr, each trimmed. A non-zero exit is
    /// returned as [`CommandError::Failed`] carrying that same text.
    pub async fn run<I, S>(&self, program: impl AsRef<OsStr>, args: I) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let program_name = program.to_string_lossy().to_string();
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();

        let child = self
            .command(program)
            .args(&args)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        let pid = child.id().unwrap_or_default();
        info!("'{}' started with PID {}", program_name, pid);
        debug!("PID {}: {:?}", pid, args);

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CommandError::Wait {
                program: program_name.clone(),
                source,
            })?;

        let text = decode_output(&output.stdout, &output.stderr);

        if output.status.success() {
            debug!("PID {} done", pid);
            Ok(text)
        } else {
            let command = describe(&program_name, &args);
            error!("PID {} failed: {} output: {}", pid, command, text);
            Err(CommandError::Failed {
                command,
                code: output.status.code(),
                output: text,
            })
        }
    }
}

/// Joins trimmed stdout and stderr.
///
/// Strict UTF-8 when both decode; otherwise each stream is decoded lossily.
pub fn decode_output(stdout: &[u8], stderr: &[u8]) -> String {
    match (std::str::from_utf8(stdout), std::str::from_utf8(stderr)) {
        (Ok(out), Ok(err)) => format!("{}{}", out.trim(), err.trim()),
        _ => format!(
            "{}{}",
            String::from_utf8_lossy(stdout).trim(),
            String::from_utf8_lossy(stderr).trim()
        ),
    }
}

fn describe(program: &str, args: &[std::ffi::OsString]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| a.to_string_lossy().to_string()));
    format!("{:?}", parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_output_concatenates_trimmed() {
        assert_eq!(decode_output(b"  out\n", b"err \n"), "outerr");
    }

    #[test]
    fn test_decode_output_lossy_fallback() {
        let text = decode_output(&[0x66, 0xff, 0x6f], b"tail");
        assert!(text.starts_with('f'));
        assert!(text.ends_with("tail"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success_captures_both_streams() {
        let runner = ProcessRunner::new(Some(10));
        let out = runner
            .run("sh", ["-c", "echo hello; echo world 1>&2"])
            .await
            .unwrap();
        assert_eq!(out, "helloworld");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_nonzero_exit_is_failed() {
        let runner = ProcessRunner::default();
        let err = runner
            .run("sh", ["-c", "echo broken >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            CommandError::Failed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary_is_spawn_error() {
        let runner = ProcessRunner::default();
        let err = runner
            .run("definitely-not-a-real-binary-xyz", ["--version"])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
