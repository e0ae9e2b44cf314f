use tokio::process::Command;

use dedaemon_core::ModuleError;

/// Run `program` to completion and return its stdout.
pub(crate) async fn run(program: &str, args: &[String]) -> Result<String, ModuleError> {
    tracing::debug!(program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ModuleError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ModuleError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = run("sh", &["-c".to_string(), "echo hello".to_string()])
            .await
            .expect("sh runs");
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run("sh", &["-c".to_string(), "echo oops >&2; exit 3".to_string()])
            .await
            .unwrap_err();
        match err {
            ModuleError::Command { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run("dedaemon-definitely-not-a-binary", &[]).await.unwrap_err();
        assert!(matches!(err, ModuleError::Spawn { .. }));
    }
}
