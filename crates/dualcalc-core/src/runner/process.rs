//! Out-of-process evaluation of definitions through a Python interpreter.
use crate::dialect::Dialect;
use crate::error::ExecutionError;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

const DIALECT: Dialect = Dialect::Definition;

/// Build the script handed to the interpreter. It prints the function's
/// return value as its only line of output.
///
/// - `def name(...)` is kept verbatim and `name(input)` is printed
/// - `lambda ...` is bound to `f`
/// - anything else is taken as an expression in `x`
pub(crate) fn wrap(source: &str, input: i64) -> String {
    let body = source.trim();
    if let Some(name) = defined_name(body) {
        format!("{}\nprint({}({}))\n", body, name, input)
    } else if body.starts_with("lambda") {
        format!("f = {}\nprint(f({}))\n", body, input)
    } else {
        format!("f = lambda x: ({})\nprint(f({}))\n", body, input)
    }
}

fn defined_name(body: &str) -> Option<&str> {
    let rest = body.strip_prefix("def ")?;
    let name = rest.split('(').next()?.trim();
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}

fn launch(interpreters: &[String], script: &str) -> Result<Child, ExecutionError> {
    let mut tried = Vec::new();
    for program in interpreters {
        let spawned = Command::new(program)
            .arg("-u")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => return Ok(child),
            Err(err) => {
                warn!(interpreter = %program, error = %err, "interpreter not launchable");
                tried.push(program.as_str());
            }
        }
    }
    Err(ExecutionError::ProcessLaunch {
        dialect: DIALECT,
        tried: tried.join(", "),
    })
}

/// The exception line of a traceback is its last non-empty line.
fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

async fn drain<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(err) = stream.read_to_end(&mut buf).await {
            debug!(error = %err, "interpreter stream read failed");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub(super) async fn run(
    interpreters: &[String],
    limit: Duration,
    source: &str,
    input: i64,
) -> Result<(f64, u64), ExecutionError> {
    let start = Instant::now();
    let script = wrap(source, input);
    let mut child = launch(interpreters, &script)?;

    // Both pipes are drained concurrently so a full stderr cannot stall stdout.
    let mut stdout = tokio::spawn(drain(child.stdout.take()));
    let mut stderr = tokio::spawn(drain(child.stderr.take()));

    let finished = timeout(limit, async {
        let status = child.wait().await;
        let out = (&mut stdout).await.unwrap_or_default();
        let err = (&mut stderr).await.unwrap_or_default();
        (status, out, err)
    })
    .await;

    let (status, out, err) = match finished {
        Ok(done) => done,
        Err(_) => {
            stdout.abort();
            stderr.abort();
            if let Err(err) = child.kill().await {
                debug!(error = %err, "interpreter already gone");
            }
            warn!(input, limit_ms = limit.as_millis() as u64, "interpreter killed after timeout");
            return Err(ExecutionError::Timeout {
                dialect: DIALECT,
                limit_ms: limit.as_millis() as u64,
            });
        }
    };

    let status = status.map_err(|e| ExecutionError::ProcessFailure {
        dialect: DIALECT,
        detail: e.to_string(),
    })?;
    let (out, err) = (out.trim(), err.trim());

    if !status.success() || !err.is_empty() {
        let detail = match last_line(err) {
            Some(line) => line.to_string(),
            None => format!("exited with code {}", status.code().unwrap_or(-1)),
        };
        return Err(ExecutionError::ProcessFailure {
            dialect: DIALECT,
            detail,
        });
    }

    let value = out.parse::<f64>().map_err(|_| ExecutionError::Coercion {
        dialect: DIALECT,
        raw: out.to_string(),
    })?;
    Ok((value, start.elapsed().as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn interpreters() -> Vec<String> {
        vec!["python3".to_string(), "python".to_string()]
    }

    fn python_available() -> bool {
        interpreters()
            .iter()
            .any(|p| std::process::Command::new(p).arg("--version").output().is_ok())
    }

    #[test]
    fn test_wrap_def() {
        let script = wrap("def square(x):\n    return x * x\n", 3);
        assert_eq!(script, "def square(x):\n    return x * x\nprint(square(3))\n");
    }

    #[test]
    fn test_wrap_lambda() {
        assert_eq!(wrap(" lambda x: x + 1 ", 2), "f = lambda x: x + 1\nprint(f(2))\n");
    }

    #[test]
    fn test_wrap_expression() {
        assert_eq!(wrap("x * 2", 5), "f = lambda x: (x * 2)\nprint(f(5))\n");
    }

    #[test]
    fn test_last_line() {
        let traceback = "Traceback (most recent call last):\n  File \"<string>\", line 3\n\
                         ValueError: bad\n\n";
        assert_eq!(last_line(traceback), Some("ValueError: bad"));
        assert_eq!(last_line(" \n\n"), None);
    }

    #[test]
    fn test_defined_name() {
        assert_eq!(defined_name("def f(x): return x"), Some("f"));
        assert_eq!(defined_name("def my_fn (x): pass"), Some("my_fn"));
        assert_eq!(defined_name("def (x)"), None);
        assert_eq!(defined_name("lambda x: x"), None);
    }

    #[tokio::test]
    async fn test_expression_evaluates() {
        if !python_available() {
            eprintln!("skipping: no python interpreter");
            return;
        }
        let (value, _) = run(&interpreters(), Duration::from_secs(5), "x + 1", 41)
            .await
            .unwrap();
        assert_eq!(value, 42.0);
    }

    #[tokio::test]
    async fn test_raise_is_a_process_failure() {
        if !python_available() {
            eprintln!("skipping: no python interpreter");
            return;
        }
        let source = "def f(x):\n    raise ValueError('bad')\n";
        let err = run(&interpreters(), Duration::from_secs(5), source, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProcessFailure);
        assert_eq!(err.to_string(), "Python error: ValueError: bad");
    }

    #[tokio::test]
    async fn test_silent_exit_reports_code() {
        if !python_available() {
            eprintln!("skipping: no python interpreter");
            return;
        }
        let source = "lambda x: __import__('os')._exit(3)";
        let err = run(&interpreters(), Duration::from_secs(5), source, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProcessFailure);
        assert_eq!(err.to_string(), "Python error: exited with code 3");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_interpreter() {
        let Some(available) = interpreters()
            .into_iter()
            .find(|p| std::process::Command::new(p).arg("--version").output().is_ok())
        else {
            eprintln!("skipping: no python interpreter");
            return;
        };
        let chain = vec!["no-such-python".to_string(), available];
        let (value, _) = run(&chain, Duration::from_secs(5), "x + 1", 41)
            .await
            .unwrap();
        assert_eq!(value, 42.0);
    }

    #[tokio::test]
    async fn test_non_numeric_output() {
        if !python_available() {
            eprintln!("skipping: no python interpreter");
            return;
        }
        let err = run(&interpreters(), Duration::from_secs(5), "lambda x: 'abc'", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Coercion);
    }

    #[tokio::test]
    async fn test_sleeper_is_killed() {
        if !python_available() {
            eprintln!("skipping: no python interpreter");
            return;
        }
        let started = Instant::now();
        let err = run(
            &interpreters(),
            Duration::from_millis(300),
            "lambda x: __import__('time').sleep(10) or x",
            1,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_no_interpreter() {
        let err = run(&["no-such-python".to_string()], Duration::from_secs(1), "x", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProcessLaunch);
        assert!(err.to_string().contains("no-such-python"));
    }
}
