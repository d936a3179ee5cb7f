//! Document chunking
//!
//! Splits page text at sentence and paragraph boundaries, then greedily merges
//! adjacent segments toward a target window. A chunk never breaks inside a
//! sentence unless a single sentence alone exceeds the hard size cap, in which
//! case it is split at a word boundary.

use crate::config::ChunkingConfig;
use crate::document::{ChunkDraft, Document, TopicExtractor};
use ahash::AHashMap;

/// Splits documents into bounded, topic-tagged chunks
pub struct Chunker {
    config: ChunkingConfig,
    topics: TopicExtractor,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        let topics = TopicExtractor::new(config.topics_per_chunk);
        Self { config, topics }
    }

    /// Chunk a parsed document
    ///
    /// Pages without extractable text contribute nothing; text-bearing pages
    /// are fully preserved, so a trailing undersized chunk is still emitted.
    pub fn chunk(&self, document: &Document) -> Vec<ChunkDraft> {
        let image_counts: AHashMap<usize, usize> = document
            .pages
            .iter()
            .map(|p| (p.number, p.images.len()))
            .collect();

        let mut segments: Vec<(usize, String)> = Vec::new();
        for page in &document.pages {
            for sentence in split_sentences(&page.text) {
                segments.push((page.number, sentence));
            }
        }

        let mut builder = ChunkBuilder::new(document, &self.topics, &image_counts);

        for (page, sentence) in segments {
            let tokens = token_count(&sentence);

            if tokens > self.config.max_tokens {
                builder.flush();
                for piece in hard_split(&sentence, self.config.max_tokens) {
                    builder.push(page, &piece, token_count(&piece));
                    builder.flush();
                }
                continue;
            }

            if builder.tokens + tokens > self.config.max_tokens
                && builder.tokens >= self.config.min_tokens
            {
                builder.flush();
            }

            builder.push(page, &sentence, tokens);

            if builder.tokens >= self.config.target_tokens {
                builder.flush();
            }
        }

        builder.flush();
        builder.into_drafts()
    }
}

struct ChunkBuilder<'a> {
    document_id: uuid::Uuid,
    topics: &'a TopicExtractor,
    image_counts: &'a AHashMap<usize, usize>,
    content: String,
    tokens: usize,
    first_page: Option<usize>,
    pages: Vec<usize>,
    drafts: Vec<ChunkDraft>,
}

impl<'a> ChunkBuilder<'a> {
    fn new(
        document: &Document,
        topics: &'a TopicExtractor,
        image_counts: &'a AHashMap<usize, usize>,
    ) -> Self {
        Self {
            document_id: document.id,
            topics,
            image_counts,
            content: String::new(),
            tokens: 0,
            first_page: None,
            pages: Vec::new(),
            drafts: Vec::new(),
        }
    }

    fn push(&mut self, page: usize, sentence: &str, tokens: usize) {
        if !self.content.is_empty() {
            self.content.push(' ');
        }
        self.content.push_str(sentence);
        self.tokens += tokens;
        self.first_page.get_or_insert(page);
        if self.pages.last() != Some(&page) {
            self.pages.push(page);
        }
    }

    fn flush(&mut self) {
        if self.content.is_empty() {
            return;
        }

        let content = std::mem::take(&mut self.content);
        let image_count = self
            .pages
            .iter()
            .map(|p| self.image_counts.get(p).copied().unwrap_or(0))
            .sum();

        self.drafts.push(ChunkDraft {
            document_id: self.document_id,
            topics: self.topics.extract(&content),
            // Spanning chunks record the first contributing page
            page_number: self.first_page.unwrap_or(1),
            content,
            image_count,
        });

        self.tokens = 0;
        self.first_page = None;
        self.pages.clear();
    }

    fn into_drafts(self) -> Vec<ChunkDraft> {
        self.drafts
    }
}

/// Approximate token count (whitespace-delimited words)
fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split text into sentences, treating blank lines as hard boundaries
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for paragraph in text.split("\n\n") {
        let mut current = String::new();
        let mut chars = paragraph.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') {
                let at_boundary = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
                if at_boundary {
                    let trimmed = current.trim();
                    if !trimmed.is_empty() {
                        sentences.push(trimmed.to_string());
                    }
                    current.clear();
                }
            }
        }

        let trimmed = current.trim();
        if !trimmed.is_empty() {
            sentences.push(trimmed.to_string());
        }
    }

    sentences
}

/// Split an oversized sentence at word boundaries
fn hard_split(sentence: &str, max_tokens: usize) -> Vec<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    words
        .chunks(max_tokens.max(1))
        .map(|piece| piece.join(" "))
        .collect()
}
