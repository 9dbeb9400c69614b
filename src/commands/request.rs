use anyhow::{Context, Result};
use dbagent::Request;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read a JSON request from a file, or from stdin for `None` / `-`.
pub(crate) fn read_request(file: Option<PathBuf>) -> Result<Request> {
    let raw = match file.as_deref() {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request from {}", path.display()))?,
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read request from stdin")?;
            raw
        }
    };
    parse_request(&raw)
}

fn parse_request(raw: &str) -> Result<Request> {
    let request: Request = serde_json::from_str(raw).context("Invalid request document")?;
    tracing::trace!(op = request.name(), "Parsed request");
    Ok(request)
}
