//! In-process evaluation of function literals.
//!
//! Every call builds and discards its own [`Context`], so nothing a function
//! does can leak into the next call or into a concurrent one.
use crate::dialect::Dialect;
use crate::error::{CalcError, ExecutionError};
use boa_engine::{js_string, Context, JsValue, Source};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant as WallClock};
use tokio::sync::{oneshot, Semaphore};
use tokio::time::{timeout_at, Instant};
use tracing::warn;

const DIALECT: Dialect = Dialect::FunctionLiteral;

fn evaluation_error(message: impl Into<String>) -> ExecutionError {
    ExecutionError::Evaluation {
        dialect: DIALECT,
        message: message.into(),
    }
}

/// Admit the call into the bounded pool and wait for its worker until the
/// deadline. The permit belongs to the waiting caller, so the pool bounds
/// evaluations someone still waits on. A late worker is abandoned, not
/// stopped, and runs detached until it returns on its own.
pub(super) async fn run(
    pool: &Arc<Semaphore>,
    limit: Duration,
    source: &str,
    input: i64,
) -> Result<Result<(f64, u64), ExecutionError>, CalcError> {
    let timed_out = || ExecutionError::Timeout {
        dialect: DIALECT,
        limit_ms: limit.as_millis() as u64,
    };
    let deadline = Instant::now() + limit;

    let permit = match timeout_at(deadline, Arc::clone(pool).acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => {
            return Err(CalcError::PoolUnavailable(
                "literal evaluation pool is closed".to_string(),
            ))
        }
        Err(_) => return Ok(Err(timed_out())),
    };

    let (tx, rx) = oneshot::channel();
    let source = source.to_owned();
    thread::Builder::new()
        .name("literal-eval".to_string())
        .spawn(move || {
            let _ = tx.send(evaluate(&source, input));
        })
        .map_err(|e| {
            CalcError::PoolUnavailable(format!("cannot start evaluation worker: {}", e))
        })?;

    let finished = timeout_at(deadline, rx).await;
    drop(permit);

    match finished {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_)) => Ok(Err(evaluation_error(
            "evaluation worker exited without a result",
        ))),
        Err(_) => {
            warn!(input, limit_ms = limit.as_millis() as u64, "literal evaluation abandoned");
            Ok(Err(timed_out()))
        }
    }
}

/// Bind `source` as `__userFunc` in a fresh context and call it with `input`.
/// Elapsed time covers the call only.
pub(crate) fn evaluate(source: &str, input: i64) -> Result<(f64, u64), ExecutionError> {
    let mut context = Context::default();

    let declaration = format!("var __userFunc = {};", source);
    context
        .eval(Source::from_bytes(&declaration))
        .map_err(|e| evaluation_error(e.to_string()))?;

    let entry = context
        .global_object()
        .get(js_string!("__userFunc"), &mut context)
        .map_err(|e| evaluation_error(e.to_string()))?;
    let callable = entry
        .as_callable()
        .ok_or_else(|| evaluation_error("invocation error: __userFunc is not a function"))?;

    let start = WallClock::now();
    let result = callable
        .call(&JsValue::undefined(), &[JsValue::from(input as f64)], &mut context)
        .map_err(|e| evaluation_error(e.to_string()))?;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let value = coerce(&result, &mut context)?;
    Ok((value, elapsed_ms))
}

/// Numbers pass through; anything else is parsed from its string form.
fn coerce(value: &JsValue, context: &mut Context) -> Result<f64, ExecutionError> {
    if let Some(number) = value.as_number() {
        return Ok(number);
    }
    let text = value
        .to_string(context)
        .map_err(|e| evaluation_error(e.to_string()))?
        .to_std_string_escaped();
    text.trim().parse::<f64>().map_err(|_| ExecutionError::Coercion {
        dialect: DIALECT,
        raw: text,
    })
}
