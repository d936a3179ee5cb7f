//! Raw-document parsing boundary
//!
//! Parsing libraries are external collaborators: the pipeline only depends on
//! the `bytes -> pages` contract. [`PlainTextParser`] is the required minimal
//! implementation; richer formats (PDF, slide decks, OCR-backed scans) plug
//! in as additional [`DocumentParser`] capabilities at configuration time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document contains no readable content")]
    EmptyDocument,

    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Format hint supplied alongside the raw bytes (usually from the filename)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
    Slides,
}

impl DocumentFormat {
    /// Guess the format from a filename extension
    pub fn from_filename(filename: &str) -> Self {
        match filename.rsplit('.').next().map(|e| e.to_lowercase()) {
            Some(ext) if ext == "md" || ext == "markdown" => Self::Markdown,
            Some(ext) if ext == "pdf" => Self::Pdf,
            Some(ext) if ext == "ppt" || ext == "pptx" => Self::Slides,
            _ => Self::PlainText,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PlainText => "plain text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::Slides => "slides",
        };
        write!(f, "{}", name)
    }
}

/// A single parsed page: the unit the chunker consumes
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// 1-based page or slide index
    pub index: usize,
    pub text: String,
    pub images: Vec<Vec<u8>>,
}

/// Capability interface for turning raw bytes into pages
pub trait DocumentParser: Send + Sync {
    /// Whether this parser can handle the given format
    fn supports(&self, format: DocumentFormat) -> bool;

    /// Parse raw bytes into an ordered sequence of pages
    fn parse(&self, bytes: &[u8], format: DocumentFormat)
        -> std::result::Result<Vec<ParsedPage>, ParseError>;
}

/// Minimal required parser: UTF-8 text with form-feed page breaks
///
/// Markdown input additionally treats `---` horizontal rules as slide
/// separators, which matches how exported slide notes usually arrive.
pub struct PlainTextParser;

impl PlainTextParser {
    fn split_pages(text: &str, format: DocumentFormat) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n");

        if normalized.contains('\u{0c}') {
            return normalized.split('\u{0c}').map(|s| s.to_string()).collect();
        }

        if format == DocumentFormat::Markdown {
            let mut pages = Vec::new();
            let mut current = String::new();
            for line in normalized.lines() {
                if line.trim() == "---" {
                    pages.push(std::mem::take(&mut current));
                } else {
                    current.push_str(line);
                    current.push('\n');
                }
            }
            pages.push(current);
            return pages;
        }

        vec![normalized]
    }
}

impl DocumentParser for PlainTextParser {
    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::PlainText | DocumentFormat::Markdown)
    }

    fn parse(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> std::result::Result<Vec<ParsedPage>, ParseError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ParseError::Malformed(format!("invalid UTF-8: {}", e)))?;

        if text.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }

        let pages = Self::split_pages(text, format)
            .into_iter()
            .enumerate()
            .map(|(i, page_text)| ParsedPage {
                index: i + 1,
                text: page_text,
                images: Vec::new(),
            })
            .collect();

        Ok(pages)
    }
}

/// Ordered collection of parser capabilities
///
/// The first parser that supports the requested format wins; an unmatched
/// format is a reportable error, not a panic.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with just the required minimal parser
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PlainTextParser));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn DocumentParser>) {
        self.parsers.push(parser);
    }

    pub fn parse(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> std::result::Result<Vec<ParsedPage>, ParseError> {
        let parser = self
            .parsers
            .iter()
            .find(|p| p.supports(format))
            .ok_or_else(|| ParseError::UnsupportedFormat(format.to_string()))?;

        parser.parse(bytes, format)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_single_page() {
        let parser = PlainTextParser;
        let pages = parser
            .parse(b"Hello world. This is a note.", DocumentFormat::PlainText)
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 1);
        assert!(pages[0].text.contains("Hello world"));
    }

    #[test]
    fn test_form_feed_page_breaks() {
        let parser = PlainTextParser;
        let input = "Page one text.\u{0c}Page two text.\u{0c}Page three text.";
        let pages = parser
            .parse(input.as_bytes(), DocumentFormat::PlainText)
            .unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].index, 2);
        assert!(pages[2].text.contains("three"));
    }

    #[test]
    fn test_markdown_rule_breaks() {
        let parser = PlainTextParser;
        let input = "# Slide one\ncontent\n---\n# Slide two\nmore content\n";
        let pages = parser
            .parse(input.as_bytes(), DocumentFormat::Markdown)
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert!(pages[0].text.contains("Slide one"));
        assert!(pages[1].text.contains("Slide two"));
    }

    #[test]
    fn test_empty_document_rejected() {
        let parser = PlainTextParser;
        let result = parser.parse(b"   \n  ", DocumentFormat::PlainText);
        assert!(matches!(result, Err(ParseError::EmptyDocument)));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let parser = PlainTextParser;
        let result = parser.parse(&[0xff, 0xfe, 0x00], DocumentFormat::PlainText);
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_registry_unsupported_format() {
        let registry = ParserRegistry::with_defaults();
        let result = registry.parse(b"%PDF-1.4", DocumentFormat::Pdf);
        assert!(matches!(result, Err(ParseError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_format_from_filename() {
        assert_eq!(
            DocumentFormat::from_filename("lecture.pdf"),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_filename("slides.pptx"),
            DocumentFormat::Slides
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.md"),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.txt"),
            DocumentFormat::PlainText
        );
    }
}
