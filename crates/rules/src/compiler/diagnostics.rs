//! Translation of rustc's JSON diagnostics into [`Diagnostic`]s.

use std::path::Path;

use serde::Deserialize;

use crate::error::Diagnostic;

#[derive(Debug, Deserialize)]
struct CompilerMessage {
    #[serde(rename = "$message_type", default)]
    message_type: Option<String>,
    message: String,
    level: String,
    #[serde(default)]
    spans: Vec<CompilerSpan>,
}

#[derive(Debug, Deserialize)]
struct CompilerSpan {
    file_name: String,
    line_start: u32,
    #[serde(default)]
    is_primary: bool,
}

/// Error-level diagnostics from `stderr`, in emission order.
///
/// Lines are positioned against `source_file` (the rule's own file name);
/// an error whose spans never touch it gets line 0. Warnings, notes and the
/// trailing "aborting due to" summary are dropped.
pub(crate) fn parse(stderr: &str, source_file: &str) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<CompilerMessage>(line).ok())
        .filter(|m| m.message_type.as_deref().map_or(true, |t| t == "diagnostic"))
        .filter(|m| m.level.starts_with("error"))
        .filter(|m| !m.message.starts_with("aborting due to"))
        .map(|m| Diagnostic {
            line: source_line(&m.spans, source_file),
            message: m.message,
        })
        .collect()
}

fn source_line(spans: &[CompilerSpan], source_file: &str) -> u32 {
    spans
        .iter()
        .filter(|span| {
            Path::new(&span.file_name)
                .file_name()
                .is_some_and(|name| name == source_file)
        })
        .min_by_key(|span| (!span.is_primary, span.line_start))
        .map(|span| span.line_start)
        .unwrap_or(0)
}

/// Plain-text stderr for when the compiler failed without any JSON error.
pub(crate) fn fallback(stderr: &str, status: &str) -> Diagnostic {
    let text: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('{'))
        .take(5)
        .collect();
    let message = if text.is_empty() {
        format!("compiler exited with {status}")
    } else {
        text.join(" | ")
    };
    Diagnostic { line: 0, message }
}
