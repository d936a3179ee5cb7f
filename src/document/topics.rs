//! Lightweight topic extraction
//!
//! Frequency-weighted keyword and noun-phrase heuristic, independent of any
//! embedding model. Capitalized multi-word runs ("Gradient Descent") count
//! double so headline terms outrank filler vocabulary.

use ahash::AHashMap;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "because", "been", "before", "being", "below",
    "between", "both", "cannot", "could", "describe", "design", "different", "does", "doing",
    "down", "during", "each", "every", "example", "figure", "first", "from", "further", "have",
    "having", "here", "image", "include", "into", "itself", "just", "made", "many", "more", "most",
    "much", "must", "note", "only", "other", "over", "page", "really", "same", "section", "should",
    "slide", "some", "somewhat", "such", "table", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "under", "until", "using", "very", "well", "were",
    "what", "when", "where", "which", "while", "will", "with", "within", "would", "your",
];

/// Extracts topic tags from chunk or document text
#[derive(Debug, Clone)]
pub struct TopicExtractor {
    topic_count: usize,
}

impl TopicExtractor {
    pub fn new(topic_count: usize) -> Self {
        Self { topic_count }
    }

    /// Extract the top topic tags from a span of text
    ///
    /// Ties are broken alphabetically so repeated runs over the same text
    /// produce identical tags.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut counts: AHashMap<String, usize> = AHashMap::new();

        for word in text.split_whitespace() {
            let cleaned = Self::clean_word(word);
            if Self::is_candidate(&cleaned) {
                *counts.entry(cleaned).or_insert(0) += 1;
            }
        }

        // Capitalized runs are likely noun phrases; weight them double
        for phrase in Self::capitalized_phrases(text) {
            *counts.entry(phrase).or_insert(0) += 2;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        ranked
            .into_iter()
            .take(self.topic_count)
            .map(|(topic, _)| topic)
            .collect()
    }

    /// Merge per-chunk topic lists into document-level aggregate topics
    ///
    /// Earlier positions in each list carry more weight.
    pub fn aggregate(&self, topic_lists: &[Vec<String>]) -> Vec<String> {
        let mut counts: AHashMap<String, usize> = AHashMap::new();

        for topics in topic_lists {
            for (rank, topic) in topics.iter().enumerate() {
                let weight = topics.len().saturating_sub(rank);
                *counts.entry(topic.clone()).or_insert(0) += weight;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        ranked
            .into_iter()
            .take(self.topic_count * 2)
            .map(|(topic, _)| topic)
            .collect()
    }

    fn clean_word(word: &str) -> String {
        word.trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
    }

    fn is_candidate(word: &str) -> bool {
        word.len() > 4
            && word.chars().any(|c| c.is_alphabetic())
            && !STOPWORDS.contains(&word)
    }

    /// Collect runs of 2+ capitalized words as candidate noun phrases
    fn capitalized_phrases(text: &str) -> Vec<String> {
        let mut phrases = Vec::new();
        let mut run: Vec<String> = Vec::new();

        for word in text.split_whitespace() {
            let stripped = word.trim_matches(|c: char| !c.is_alphanumeric());
            let is_capitalized = stripped
                .chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false)
                && stripped.len() > 2;

            if is_capitalized {
                run.push(stripped.to_lowercase());
            } else {
                if run.len() >= 2 {
                    phrases.push(run.join(" "));
                }
                run.clear();
            }
        }
        if run.len() >= 2 {
            phrases.push(run.join(" "));
        }

        phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_ranking() {
        let extractor = TopicExtractor::new(3);
        let text = "Backpropagation computes gradients. Backpropagation updates weights. \
                    Gradients flow backwards through layers. Backpropagation again.";

        let topics = extractor.extract(text);
        assert!(!topics.is_empty());
        assert_eq!(topics[0], "backpropagation");
    }

    #[test]
    fn test_stopwords_filtered() {
        let extractor = TopicExtractor::new(5);
        let topics = extractor.extract("these those which where through about");
        assert!(topics.is_empty());
    }

    #[test]
    fn test_capitalized_phrase_boost() {
        let extractor = TopicExtractor::new(2);
        let text = "Gradient Descent minimizes loss. optimizer optimizer optimizer.";

        let topics = extractor.extract(text);
        assert!(topics.contains(&"gradient descent".to_string()));
    }

    #[test]
    fn test_deterministic_ordering() {
        let extractor = TopicExtractor::new(4);
        let text = "alpha-term beta-term gamma-term delta-term";

        let first = extractor.extract(text);
        let second = extractor.extract(text);
        assert_eq!(first, second);
    }

    #[test]
    fn test_aggregate_prefers_common_topics() {
        let extractor = TopicExtractor::new(3);
        let lists = vec![
            vec!["networks".to_string(), "training".to_string()],
            vec!["networks".to_string(), "layers".to_string()],
            vec!["networks".to_string()],
        ];

        let aggregate = extractor.aggregate(&lists);
        assert_eq!(aggregate[0], "networks");
    }

    #[test]
    fn test_empty_text() {
        let extractor = TopicExtractor::new(5);
        assert!(extractor.extract("").is_empty());
    }
}
