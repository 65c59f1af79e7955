//! Rendering of command results as text or JSON

use std::fmt::Display;

use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Writes command results to stdout in the selected format
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Prints a one-line status, wrapped as `{"status": "ok", ...}` in JSON mode
    pub fn status(&self, message: &str) {
        if self.is_json() {
            println!("{}", serde_json::json!({ "status": "ok", "message": message }));
        } else {
            println!("{}", message);
        }
    }

    /// Prints a serializable value
    ///
    /// Text mode falls back to pretty JSON; commands with a text rendering
    /// check [`Output::is_json`] first.
    pub fn data<T: Serialize>(&self, value: &T) {
        let rendered = if self.is_json() {
            serde_json::to_string(value)
        } else {
            serde_json::to_string_pretty(value)
        };
        match rendered {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("failed to render output: {}", e),
        }
    }

    /// Prints tab-separated columns (text only)
    pub fn row<S: AsRef<str>>(&self, columns: &[S]) {
        if !self.is_json() {
            let cells: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
            println!("{}", cells.join("\t"));
        }
    }

    /// Prints a free-form line (text only)
    pub fn line(&self, text: impl Display) {
        if !self.is_json() {
            println!("{}", text);
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
