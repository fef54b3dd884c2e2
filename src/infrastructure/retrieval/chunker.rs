//! Sentence-based chunking of resource text

use unicode_segmentation::UnicodeSegmentation;

/// Groups consecutive sentences into chunks of at most `max_chars` bytes.
///
/// A single sentence longer than the limit becomes its own chunk.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    max_chars: usize,
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new(500)
    }
}

impl SentenceChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn chunk(&self, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in content.unicode_sentences() {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }

            if !current.is_empty() && current.len() + 1 + sentence.len() > self.max_chars {
                chunks.push(std::mem::take(&mut current));
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content() {
        assert!(SentenceChunker::default().chunk("   ").is_empty());
    }

    #[test]
    fn test_short_content_is_one_chunk() {
        let chunks = SentenceChunker::default().chunk("One sentence. Another one.");
        assert_eq!(chunks, vec!["One sentence. Another one."]);
    }

    #[test]
    fn test_groups_sentences_up_to_limit() {
        let chunker = SentenceChunker::new(30);
        let chunks = chunker.chunk("The house is owned. The car is leased. The boat is sold.");

        assert_eq!(
            chunks,
            vec![
                "The house is owned.",
                "The car is leased.",
                "The boat is sold."
            ]
        );
        assert!(chunks.iter().all(|c| c.len() <= 30));
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let chunker = SentenceChunker::new(5);
        let chunks = chunker.chunk("This sentence is long.");
        assert_eq!(chunks, vec!["This sentence is long."]);
    }
}
