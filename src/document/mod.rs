//! Document model and ingestion-side processing
//!
//! A parsed document is an ordered sequence of pages (or slides); the chunker
//! turns pages into bounded, topic-tagged chunks that become the unit of
//! retrieval. Raw-format parsing sits behind the [`DocumentParser`] capability
//! so richer formats can be plugged in without touching the pipeline.

mod chunker;
mod parser;
mod topics;

pub use chunker::Chunker;
pub use parser::{DocumentFormat, DocumentParser, ParseError, ParsedPage, ParserRegistry, PlainTextParser};
pub use topics::TopicExtractor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A single page or slide of a parsed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page or slide number
    pub number: usize,
    /// Extracted text (may be empty for image-only pages)
    pub text: String,
    /// Embedded images, carried through as opaque bytes
    #[serde(skip)]
    pub images: Vec<Vec<u8>>,
}

/// An uploaded document owned by a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub pages: Vec<Page>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Build a document from parser output
    pub fn from_pages(filename: impl Into<String>, pages: Vec<ParsedPage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            pages: pages
                .into_iter()
                .map(|p| Page {
                    number: p.index,
                    text: p.text,
                    images: p.images,
                })
                .collect(),
            uploaded_at: Utc::now(),
        }
    }

    /// Total number of pages, including ones without extractable text
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A chunk produced by the chunker, not yet assigned a storage id
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub document_id: Uuid,
    pub content: String,
    /// First page number the chunk content came from
    pub page_number: usize,
    /// Topic tags derived once at creation time
    pub topics: Vec<String>,
    /// Number of embedded images on the contributing pages
    pub image_count: usize,
}

/// A stored, immutable chunk, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: Uuid,
    pub content: String,
    pub page_number: usize,
    pub topics: Vec<String>,
    pub image_count: usize,
}

impl Chunk {
    /// Case-insensitive topic membership test used by retrieval filters
    pub fn matches_topic(&self, topic: &str) -> bool {
        let needle = topic.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.topics
            .iter()
            .any(|t| t.to_lowercase().contains(&needle) || needle.contains(&t.to_lowercase()))
    }
}

/// Optional OCR capability used to enrich image-bearing pages
///
/// The minimal required behavior is "no OCR"; failures degrade gracefully to
/// text-only chunks.
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image: &[u8]) -> std::result::Result<String, OcrError>;
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR backend unavailable")]
    Unavailable,

    #[error("OCR failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_pages() {
        let pages = vec![
            ParsedPage {
                index: 1,
                text: "First slide".to_string(),
                images: vec![],
            },
            ParsedPage {
                index: 2,
                text: "Second slide".to_string(),
                images: vec![],
            },
        ];

        let doc = Document::from_pages("deck.txt", pages);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.filename, "deck.txt");
    }

    #[test]
    fn test_chunk_topic_matching() {
        let chunk = Chunk {
            id: 1,
            document_id: Uuid::new_v4(),
            content: String::new(),
            page_number: 1,
            topics: vec!["neural networks".to_string(), "training".to_string()],
            image_count: 0,
        };

        assert!(chunk.matches_topic("Neural Networks"));
        assert!(chunk.matches_topic("networks"));
        assert!(chunk.matches_topic("training"));
        assert!(!chunk.matches_topic("chemistry"));
    }
}
