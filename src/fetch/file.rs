//! Local file fetches.

use std::path::Path;

use serde_json::Value;

use crate::config::loader::strip_json_comments;
use crate::fetch::FetchError;

/// Extensions read and interpreted; anything else is streamed as-is.
const PARSED_EXTENSIONS: &[&str] = &["json", "jsonc", "har", "txt"];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Whether the file bypasses JSON interpretation and is sent as a file response.
pub fn is_streamed(path: &Path) -> bool {
    !PARSED_EXTENSIONS.contains(&extension(path).as_str())
}

/// Read and parse a local file by extension.
pub async fn read_file(path: &Path) -> Result<Value, FetchError> {
    let display = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FetchError::Io {
            path: display.clone(),
            source,
        })?;

    let parse = |text: &str| -> Result<Value, FetchError> {
        serde_json::from_str(text).map_err(|source| FetchError::Parse {
            path: display.clone(),
            source,
        })
    };

    match extension(path).as_str() {
        "json" | "har" => parse(&content),
        "jsonc" => parse(&strip_json_comments(&content)),
        "txt" => Ok(Value::String(content)),
        other => Err(FetchError::Invalid(format!("unsupported extension '{}'", other))),
    }
}
