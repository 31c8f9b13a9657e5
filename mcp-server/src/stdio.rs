//! Line-delimited JSON stdio loop over the tool dispatcher.
//!
//! Each input line is `{"tool": "...", "params": {...}}`; each output line
//! is the full response envelope. The MCP HTTP transport lives outside
//! this server; this loop is the reference surface for clients and tests.

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use orchestration_core::{
    error::OrchestrationError, guidance::HintInputs, protocol::ToolResponse, ToolDispatcher,
};

#[derive(Debug, Deserialize)]
struct ToolCallRequest {
    tool: String,
    #[serde(default)]
    params: Value,
}

/// Serve until stdin closes or ctrl-c. Returns the number of failed calls,
/// which the binary maps onto its exit code.
pub async fn serve(dispatcher: &ToolDispatcher) -> anyhow::Result<u64> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();
    let mut failures: u64 = 0;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, closing stdio loop");
                break;
            }
        };
        let Some(line) = line else {
            break; // EOF
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ToolCallRequest>(line) {
            Ok(request) => dispatcher.dispatch(&request.tool, request.params).await,
            Err(e) => malformed_request_response(&e.to_string()),
        };
        if !response.success {
            failures += 1;
        }

        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }

    Ok(failures)
}

/// Envelope for lines that are not even a tool call
fn malformed_request_response(detail: &str) -> ToolResponse {
    let error = OrchestrationError::InvalidParameters(vec![format!("request line: {detail}")]);
    let engine = orchestration_core::HintEngine::new(chrono::Duration::minutes(30), 6);
    let guidance = engine.guidance(&HintInputs {
        tool: "<request>",
        task: None,
        context: None,
        children: &[],
        alignments: &[],
        open_conflicts: &[],
        error: Some(&error),
        now: chrono::Utc::now(),
    });
    ToolResponse::failed(&error, guidance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_line_yields_uniform_envelope() {
        let response = malformed_request_response("expected value at line 1");
        assert!(!response.success);
        let error = response.error.expect("error payload");
        assert_eq!(
            error.code,
            orchestration_core::ErrorCode::InvalidParameters
        );
        assert!(!response.workflow_guidance.next_actions.is_empty());
    }

    #[test]
    fn test_request_decoding() {
        let request: ToolCallRequest =
            serde_json::from_str(r#"{"tool": "manage_task", "params": {"action": "list"}}"#)
                .unwrap();
        assert_eq!(request.tool, "manage_task");
        assert_eq!(request.params["action"], "list");
    }
}
