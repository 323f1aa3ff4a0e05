//! Result helpers for MCP tool responses

use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;

/// Pretty-printed JSON response from any serializable value
///
/// ```rust,ignore
/// json_success(&devices)
/// ```
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Plain text response
pub fn text_success(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Image response from base64 data, with an optional caption
pub fn image_success(
    base64_data: impl Into<String>,
    mime_type: impl Into<String>,
    caption: Option<String>,
) -> CallToolResult {
    let mut contents = vec![Content::image(base64_data.into(), mime_type.into())];
    if let Some(caption) = caption {
        contents.push(Content::text(caption));
    }
    CallToolResult::success(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Device {
        serial: String,
        state: String,
    }

    #[test]
    fn test_json_success() {
        let device = Device {
            serial: "emulator-5554".to_string(),
            state: "device".to_string(),
        };
        let result = json_success(&device).unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn test_text_success() {
        let result = text_success("Tapped at (10, 20)");
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn test_image_success_with_caption() {
        let result = image_success("aGVsbG8=", "image/png", Some("1080x1920".to_string()));
        assert_eq!(result.content.len(), 2);

        let bare = image_success("aGVsbG8=", "image/png", None);
        assert_eq!(bare.content.len(), 1);
    }
}
