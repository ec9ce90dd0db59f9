//! Child-process execution for the virtual tools.
//!
//! `rg` and `jq` run with a scrubbed environment: a fixed `PATH`, a
//! throwaway `HOME`, and nothing inherited from the agent process — no
//! credentials or tokens ever reach a child. Cancellation kills the
//! child via `kill_on_drop`.

use std::process::Stdio;

use tokio::process::Command;

use ax_domain::{CancelToken, Error, Result};

/// The only directories a child may resolve binaries from.
const MINIMAL_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

fn minimal_env() -> [(&'static str, &'static str); 6] {
    [
        ("PATH", MINIMAL_PATH),
        ("HOME", "/tmp"),
        ("USER", "agent"),
        ("SHELL", "/bin/sh"),
        ("LANG", "C.UTF-8"),
        ("LC_ALL", "C.UTF-8"),
    ]
}

#[derive(Debug)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args`, capturing stdout/stderr.
///
/// Spawn failure (missing binary) and non-zero exits are *not* conflated:
/// the former is an error here, the latter is reported through
/// `exit_code` for the caller to interpret (`rg` exits 1 on "no matches").
pub async fn run_captured(
    cancel: &CancelToken,
    program: &str,
    args: &[String],
) -> Result<CapturedOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(minimal_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        Error::Tool {
            tool: program.to_owned(),
            message: format!("failed to spawn: {e}"),
        }
    })?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        result = child.wait_with_output() => result?,
    };

    Ok(CapturedOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let cancel = CancelToken::new();
        let out = run_captured(&cancel, "sh", &["-c".into(), "echo hello".into()])
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let cancel = CancelToken::new();
        let out = run_captured(&cancel, "sh", &["-c".into(), "exit 3".into()])
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn missing_binary_is_a_tool_error() {
        let cancel = CancelToken::new();
        let err = run_captured(&cancel, "definitely-not-a-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }

    #[tokio::test]
    async fn environment_is_scrubbed() {
        std::env::set_var("AX_SECRET_PROBE", "leaked");
        let cancel = CancelToken::new();
        let out = run_captured(
            &cancel,
            "sh",
            &["-c".into(), "echo \"${AX_SECRET_PROBE:-clean}:$USER:$HOME\"".into()],
        )
        .await
        .unwrap();
        std::env::remove_var("AX_SECRET_PROBE");
        assert_eq!(out.stdout.trim(), "clean:agent:/tmp");
    }

    #[tokio::test]
    async fn pre_cancelled_token_kills_the_call() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_captured(&cancel, "sh", &["-c".into(), "sleep 5".into()])
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
