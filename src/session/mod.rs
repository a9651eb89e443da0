use anyhow::Result;
use std::io::{self, BufRead, Write};

use crate::models::request::AnalyzeRequest;

/// Maximum line size for session input: 1 MB.
const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Run an NDJSON session over stdin/stdout.
pub fn run_session(handler: impl Fn(AnalyzeRequest) -> Result<serde_json::Value>) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), io::BufWriter::new(stdout.lock()), handler)
}

/// Read one request per line from `input` and write one response line per request.
///
/// Handler failures become `{"error": ...}` lines; the session keeps going.
pub fn serve(
    input: impl BufRead,
    mut out: impl Write,
    handler: impl Fn(AnalyzeRequest) -> Result<serde_json::Value>,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = if trimmed.len() > MAX_LINE_SIZE {
            error_value(
                "INVALID_REQUEST",
                format!(
                    "Input line exceeds maximum size ({} bytes > {MAX_LINE_SIZE} bytes)",
                    trimmed.len()
                ),
                None,
            )
        } else {
            match serde_json::from_str::<AnalyzeRequest>(trimmed) {
                Ok(req) => handler(req).unwrap_or_else(|e| error_from(&e)),
                Err(e) => error_value("INVALID_REQUEST", format!("Invalid JSON request: {e}"), None),
            }
        };

        serde_json::to_writer(&mut out, &response)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    Ok(())
}

/// `{"error": {"code", "message"[, "stage"]}}` for an `anyhow` error.
pub fn error_from(e: &anyhow::Error) -> serde_json::Value {
    match e.downcast_ref::<crate::error::AnalyzeError>() {
        Some(ae) => error_value(
            &ae.code.to_string(),
            ae.message.clone(),
            ae.stage.map(|s| s.to_string()),
        ),
        None => error_value("IO_ERROR", e.to_string(), None),
    }
}

fn error_value(code: &str, message: String, stage: Option<String>) -> serde_json::Value {
    let mut error = serde_json::json!({ "code": code, "message": message });
    if let Some(stage) = stage {
        error["stage"] = serde_json::Value::String(stage);
    }
    serde_json::json!({ "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnalyzeError, Stage};
    use crate::models::request::Command;
    use std::time::Duration;

    fn run(input: &str, handler: impl Fn(AnalyzeRequest) -> Result<serde_json::Value>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        serve(input.as_bytes(), &mut out, handler).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn one_response_per_request_line() {
        let input = "{\"command\":\"doctor\"}\n\n{\"command\":\"deps\",\"commit\":\"x\"}\n";
        let lines = run(input, |req| Ok(serde_json::json!({ "cmd": req.command })));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["cmd"], "doctor");
        assert_eq!(lines[1]["cmd"], "deps");
    }

    #[test]
    fn malformed_json_is_reported_inline() {
        let lines = run("{nope\n{\"command\":\"churn\"}\n", |_| Ok(serde_json::json!({})));
        assert_eq!(lines[0]["error"]["code"], "INVALID_REQUEST");
        assert!(lines[1].get("error").is_none());
    }

    #[test]
    fn handler_errors_keep_code_and_stage() {
        let lines = run("{\"command\":\"cochange\"}\n", |req| {
            assert_eq!(req.command, Command::Cochange);
            Err(AnalyzeError::timeout(Stage::Correlation, Duration::from_secs(30)).into())
        });
        assert_eq!(lines[0]["error"]["code"], "TIMEOUT");
        assert_eq!(lines[0]["error"]["stage"], "correlation");
    }

    #[test]
    fn foreign_errors_map_to_io_error() {
        let lines = run("{\"command\":\"doctor\"}\n", |_| Err(anyhow::anyhow!("disk on fire")));
        assert_eq!(lines[0]["error"]["code"], "IO_ERROR");
        assert_eq!(lines[0]["error"]["message"], "disk on fire");
    }
}
