//! HTML-to-Markdown conversion used by the post-processing step.

pub mod markdown_converter;

pub use markdown_converter::{convert_html_to_markdown, convert_html_to_markdown_sync, ConversionOptions, MarkdownConverter};
