pub mod classify;
pub mod json;
pub mod normalize;
pub mod structure;
pub mod timestamp;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// A payload as handed to the analyzer: free text or a list of records.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Text(String),
    Records(Vec<Value>),
}

impl RawInput {
    pub fn is_empty(&self) -> bool {
        match self {
            RawInput::Text(t) => t.trim().is_empty(),
            RawInput::Records(r) => r.is_empty(),
        }
    }

    /// Render as text. Records become `[ts] speaker: text` lines where they
    /// can be read as turns; other values are stringified.
    pub fn as_text(&self) -> String {
        match self {
            RawInput::Text(t) => t.clone(),
            RawInput::Records(records) => records
                .iter()
                .filter_map(record_as_line)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Combine several loaded files into one payload. All-record inputs stay
    /// records; anything else is joined as text.
    pub fn combine(inputs: Vec<RawInput>) -> RawInput {
        if inputs.len() == 1 {
            return inputs.into_iter().next().unwrap_or(RawInput::Text(String::new()));
        }
        if inputs.iter().all(|i| matches!(i, RawInput::Records(_))) {
            let mut all = Vec::new();
            for input in inputs {
                if let RawInput::Records(r) = input {
                    all.extend(r);
                }
            }
            return RawInput::Records(all);
        }
        let parts: Vec<String> = inputs
            .iter()
            .map(RawInput::as_text)
            .filter(|t| !t.trim().is_empty())
            .collect();
        RawInput::Text(parts.join("\n\n"))
    }
}

fn record_as_line(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => match normalize::normalize_record(v) {
            Some(t) => Some(match t.timestamp {
                Some(ts) => format!("[{ts}] {}: {}", t.speaker, t.text),
                None => format!("{}: {}", t.speaker, t.text),
            }),
            None => Some(v.to_string()),
        },
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Json,
    Yaml,
    Text,
}

impl Format {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "text" | "txt" => Some(Format::Text),
            _ => None,
        }
    }

    pub fn detect_from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Format::Json),
            Some("yaml" | "yml") => Some(Format::Yaml),
            Some("txt" | "text" | "md" | "eml" | "log") => Some(Format::Text),
            _ => None,
        }
    }

    /// Guess from content: `[`/`{` is JSON, `---` is YAML, anything else text.
    pub fn sniff(content: &str) -> Self {
        let trimmed = content.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            Format::Json
        } else if trimmed.starts_with("---") {
            Format::Yaml
        } else {
            Format::Text
        }
    }
}

/// Load one or more paths (files, directories, or glob patterns) into a single payload.
pub fn load_paths(paths: &[String], format_override: Option<Format>) -> Result<RawInput> {
    let mut inputs = Vec::new();

    for path_str in paths {
        let path = Path::new(path_str);
        if path.is_dir() {
            load_directory(path, format_override, &mut inputs)?;
        } else if path.is_file() {
            inputs.push(load_file(path, format_override)?);
        } else {
            // Try glob pattern
            let matches: Vec<_> = glob::glob(path_str)
                .with_context(|| format!("Invalid path or glob pattern: {path_str}"))?
                .filter_map(|r| r.ok())
                .collect();

            if matches.is_empty() {
                bail!("No files found matching: {path_str}");
            }

            for entry in matches {
                if entry.is_file() {
                    inputs.push(load_file(&entry, format_override)?);
                }
            }
        }
    }

    if inputs.is_empty() {
        bail!("No readable input files found");
    }
    Ok(RawInput::combine(inputs))
}

/// Load a payload from stdin.
pub fn load_stdin(format_override: Option<Format>) -> Result<RawInput> {
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read from stdin")?;

    if content.trim().is_empty() {
        bail!("Empty input from stdin");
    }

    let format = format_override.unwrap_or_else(|| Format::sniff(&content));
    parse_content(&content, format).context("Failed to parse stdin")
}

fn load_directory(dir: &Path, format_override: Option<Format>, out: &mut Vec<RawInput>) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            load_directory(&path, format_override, out)?;
        } else if path.is_file() {
            // Only process known extensions unless format is overridden
            if format_override.is_some() || Format::detect_from_extension(&path).is_some() {
                out.push(load_file(&path, format_override)?);
            }
        }
    }

    Ok(())
}

fn load_file(path: &Path, format_override: Option<Format>) -> Result<RawInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read: {}", path.display()))?;

    let format = format_override
        .or_else(|| Format::detect_from_extension(path))
        .unwrap_or_else(|| Format::sniff(&content));

    let input = parse_content(&content, format)
        .with_context(|| format!("Failed to parse: {}", path.display()))?;
    info!("Loaded {} ({:?})", path.display(), format);
    Ok(input)
}

pub fn parse_content(content: &str, format: Format) -> Result<RawInput> {
    match format {
        Format::Json => json::parse_json(content),
        Format::Yaml => json::parse_yaml(content),
        Format::Text => Ok(RawInput::Text(content.to_string())),
    }
}
