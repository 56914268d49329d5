//! Pluggable HTML → `output_format` conversion.

use crate::config::OutputFormat;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("markdown conversion failed: {0}")]
    MarkdownConversionFailed(String),
    #[error("json encoding failed: {0}")]
    JsonEncodingFailed(String),
}

impl ExtractionError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::ExtractionError
    }
}

/// Converts raw page HTML into the requested output representation. Kept a
/// narrow, synchronous, pluggable seam rather than depending on any one
/// content-extraction strategy.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str, format: OutputFormat) -> Result<String, ExtractionError>;
}

/// Strip-tags/collapse-whitespace default, with markdown routed through
/// [`crate::content_saver::markdown_converter`] and JSON as a single
/// `{"content": ...}` envelope. Sufficient to exercise and test the
/// orchestration without a full readability pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractor;

impl ContentExtractor for DefaultExtractor {
    fn extract(&self, html: &str, format: OutputFormat) -> Result<String, ExtractionError> {
        match format {
            OutputFormat::Html => Ok(html.to_string()),
            OutputFormat::RawText => Ok(strip_tags_and_collapse(html)),
            OutputFormat::Markdown => {
                let options = crate::content_saver::markdown_converter::ConversionOptions::default();
                crate::content_saver::markdown_converter::convert_html_to_markdown_sync(html, &options)
                    .map_err(|e| ExtractionError::MarkdownConversionFailed(e.to_string()))
            }
            OutputFormat::Json => {
                let text = strip_tags_and_collapse(html);
                serde_json::to_string(&serde_json::json!({ "content": text }))
                    .map_err(|e| ExtractionError::JsonEncodingFailed(e.to_string()))
            }
        }
    }
}

fn strip_tags_and_collapse(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_text_strips_tags_and_collapses_whitespace() {
        let html = "<html>\n<body>  <p>Hello   <b>world</b></p>\n</body></html>";
        let extracted = DefaultExtractor.extract(html, OutputFormat::RawText).unwrap();
        assert_eq!(extracted, "Hello world");
    }

    #[test]
    fn html_format_passes_through_unchanged() {
        let html = "<p>x</p>";
        assert_eq!(DefaultExtractor.extract(html, OutputFormat::Html).unwrap(), html);
    }

    #[test]
    fn json_format_wraps_stripped_text() {
        let html = "<p>Hello</p>";
        let extracted = DefaultExtractor.extract(html, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&extracted).unwrap();
        assert_eq!(parsed["content"], "Hello");
    }

    #[test]
    fn markdown_format_converts_basic_structure() {
        let html = "<h1>Title</h1><p>Body text</p>";
        let extracted = DefaultExtractor.extract(html, OutputFormat::Markdown).unwrap();
        assert!(extracted.contains("Title"));
        assert!(extracted.contains("Body text"));
    }
}
