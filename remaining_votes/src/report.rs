//! Rendering a [`Summary`] for the terminal.

use crate::summary::Summary;

/// Placeholder shown while the tallies resolve.
pub const LOADING: &str = "Loading votes...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
/// Output format of a summary.
pub enum Format {
    /// `N left (M total)`
    #[default]
    Text,
    /// A JSON object with every field of the summary.
    Json,
}

/// Render `summary` in `format`.
///
/// # Errors
///
/// Function will return an error if JSON serialization fails.
pub fn render(summary: &Summary, format: Format) -> Result<String, serde_json::Error> {
    match format {
        Format::Text => Ok(summary.to_string()),
        Format::Json => serde_json::to_string(summary),
    }
}
