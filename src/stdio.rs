//! Line-delimited JSON tool server over stdin/stdout.
//!
//! Each request line is `{"tool": "...", "params": {...}}` (an optional
//! `"id"` is echoed back). Each response is one line:
//! `{"ok": true, "result": ...}` or `{"ok": false, "error": "..."}`.
//! `{"tool": "list_tools"}` returns every tool definition.

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::tools::ToolRegistry;

const LIST_TOOLS: &str = "list_tools";

#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Option<Value>,
}

fn with_id(mut response: Value, id: Option<Value>) -> Value {
    if let Some(id) = id {
        response["id"] = id;
    }
    response
}

/// Handle one request line and build its response.
pub async fn handle_line(registry: &ToolRegistry, line: &str) -> Value {
    let call: ToolCall = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(e) => return json!({ "ok": false, "error": format!("Malformed request: {e}") }),
    };

    if call.tool == LIST_TOOLS {
        let tools = registry.tool_definitions().await;
        return with_id(json!({ "ok": true, "result": { "tools": tools } }), call.id);
    }

    // Tools take an object; a missing params field means no arguments.
    let params = if call.params.is_null() {
        json!({})
    } else {
        call.params
    };
    let response = match registry.execute(&call.tool, params).await {
        Ok(output) => json!({ "ok": true, "result": output.result }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    };
    with_id(response, call.id)
}

/// Serve requests until EOF on `reader`.
pub async fn serve<R, W>(registry: &ToolRegistry, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(registry, line).await;
        let mut out = response.to_string();
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }
    tracing::info!("stdin closed, tool server stopping");
    Ok(())
}

/// Serve on the process's stdin and stdout.
pub async fn serve_stdio(registry: &ToolRegistry) -> std::io::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(registry, stdin, tokio::io::stdout()).await
}
