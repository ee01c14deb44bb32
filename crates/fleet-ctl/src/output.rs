use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use libfleet_ipc::ControlReply;
use serde::Serialize;

use crate::cli::Cli;
use crate::error::CtlError;

/// JSON response envelope
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub schema_version: u32,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonError>,
}

#[derive(Serialize)]
pub struct JsonError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<&'static str>,
}

/// Replies collected for one command
#[derive(Serialize)]
pub struct BroadcastResult {
    pub command: &'static str,
    pub timeout_ms: u64,
    pub replies: Vec<ControlReply>,
}

pub fn output_result(cli: &Cli, result: &BroadcastResult) -> Result<(), CtlError> {
    if cli.json {
        let response = JsonResponse {
            schema_version: 1,
            ok: true,
            data: Some(result),
            error: None,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if result.replies.is_empty() {
        println!("No replies within {}ms", result.timeout_ms);
    } else {
        println!("{}", render_replies(&result.replies));
    }
    Ok(())
}

pub fn output_error(cli: &Cli, err: &CtlError) {
    if cli.json {
        let response: JsonResponse<()> = JsonResponse {
            schema_version: 1,
            ok: false,
            data: None,
            error: Some(JsonError {
                code: err.error_code().to_string(),
                message: err.to_string(),
                suggestions: err.suggestions(),
            }),
        };
        match serde_json::to_string_pretty(&response) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("error: {}", err),
        }
    } else {
        eprintln!("error: {}", err);
        let suggestions = err.suggestions();
        if !suggestions.is_empty() {
            eprintln!();
            eprintln!("Suggestions:");
            for suggestion in suggestions {
                eprintln!("  - {}", suggestion);
            }
        }
    }
}

pub fn render_replies(replies: &[ControlReply]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Cluster", "Response"]);
    for reply in replies {
        table.add_row(vec![reply.author.as_str(), reply.response.as_str()]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replies() {
        let out = render_replies(&[
            ControlReply::new("12ms", "Alpha"),
            ControlReply::new("error: eval is disabled", "Beta"),
        ]);
        assert!(out.contains("Alpha"));
        assert!(out.contains("12ms"));
        assert!(out.contains("eval is disabled"));
    }

    #[test]
    fn test_json_envelope() {
        let result = BroadcastResult {
            command: "ping",
            timeout_ms: 3000,
            replies: vec![ControlReply::new("12ms", "Alpha")],
        };
        let response = JsonResponse {
            schema_version: 1,
            ok: true,
            data: Some(&result),
            error: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["data"]["replies"][0]["author"], "Alpha");
        assert!(value.get("error").is_none());
    }
}
