use crate::database::ScoredChunk;
use log::warn;

/// Default cap on the estimated tokens of retrieved context in a prompt
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 6000;

const TOPIC_TEMPLATE: &str = "Tell me how to curb weeds in my {topic}";

/// A rendered prompt and what went into its context section
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    /// Retrieved chunks included in the context
    pub chunks_used: usize,
    /// Retrieved chunks left out to stay within the budget
    pub chunks_dropped: usize,
    /// Estimated tokens of the included context
    pub context_tokens: usize,
    /// Whether the top chunk was cut short to fit the budget on its own
    pub truncated: bool,
}

/// Render the question-answering prompt for retrieved chunks.
///
/// Chunks keep their retrieval order and are joined by a blank line. Chunks
/// are taken from the front while the estimated context size stays within
/// `max_context_tokens`; the first chunk that does not fit and everything
/// after it is left out. A top chunk larger than the whole budget is cut down
/// to it rather than dropped, so the context is never empty when something
/// was retrieved.
pub fn assemble(chunks: &[ScoredChunk], question: &str, max_context_tokens: usize) -> Prompt {
    let mut context_tokens = 0;
    let mut used = Vec::new();
    let mut truncated = false;

    for scored in chunks {
        let tokens = scored.chunk.token_count;
        if context_tokens + tokens > max_context_tokens {
            if used.is_empty() {
                let (text, kept) = truncate_to_tokens(&scored.chunk.text, max_context_tokens);
                warn!(
                    "Top chunk has ~{} tokens, cut to {} to fit the context budget",
                    tokens, kept
                );
                context_tokens = kept;
                used.push(text);
                truncated = true;
            }
            break;
        }
        context_tokens += tokens;
        used.push(scored.chunk.text.as_str());
    }

    let chunks_dropped = chunks.len() - used.len();
    if chunks_dropped > 0 {
        warn!(
            "Context budget of {} tokens reached, dropped {} of {} retrieved chunks",
            max_context_tokens,
            chunks_dropped,
            chunks.len()
        );
    }

    let text = render(&used.join("\n\n"), question);

    Prompt {
        text,
        chunks_used: used.len(),
        chunks_dropped,
        context_tokens,
        truncated,
    }
}

/// Longest prefix of `text` whose estimated token count fits `max_tokens`,
/// counted the same way as `estimate_token_count`
fn truncate_to_tokens(text: &str, max_tokens: usize) -> (&str, usize) {
    let mut tokens = 0;
    let mut end = 0;
    let mut in_word = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
            continue;
        }
        let cost = usize::from(!in_word) + usize::from(c.is_ascii_punctuation());
        if tokens + cost > max_tokens {
            break;
        }
        tokens += cost;
        in_word = true;
        end = i + c.len_utf8();
    }

    (&text[..end], tokens)
}

fn render(context: &str, question: &str) -> String {
    format!(
        "
Human: You are an AI assistant, that provides answers to questions by using fact based and statistical information when possible.
Use the following pieces of information to provide a concise answer to the question enclosed in <question> tags.
If you don't know the answer, just say that you don't know, don't try to make up an answer.
<context>
{context}
</context>

<question>
{question}
</question>

The response should be specific and use statistics or numbers when possible.

Assistant:"
    )
}

/// Render the retrieval-free gardening prompt
pub fn topic_prompt(topic: &str) -> String {
    TOPIC_TEMPLATE.replace("{topic}", topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{estimate_token_count, TextChunk};

    fn scored(index: usize, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: TextChunk {
                text: text.to_string(),
                token_count: estimate_token_count(text),
                document_id: "catalog".to_string(),
                page: None,
                chunk_index: index,
                start_position: 0,
            },
            score: 1.0 - index as f32 * 0.1,
        }
    }

    #[test]
    fn test_assemble_renders_context_and_question() {
        let chunks = vec![scored(0, "Calculus II"), scored(1, "Linear Algebra II")];
        let prompt = assemble(&chunks, "What math courses are available?", 100);

        assert!(prompt
            .text
            .contains("<context>\nCalculus II\n\nLinear Algebra II\n</context>"));
        assert!(prompt
            .text
            .contains("<question>\nWhat math courses are available?\n</question>"));
        assert!(prompt.text.trim_end().ends_with("Assistant:"));
        assert_eq!(prompt.chunks_used, 2);
        assert_eq!(prompt.chunks_dropped, 0);
    }

    #[test]
    fn test_assemble_keeps_retrieval_order_and_duplicates() {
        let chunks = vec![scored(2, "second"), scored(0, "first"), scored(2, "second")];
        let prompt = assemble(&chunks, "q", 100);
        assert!(prompt.text.contains("second\n\nfirst\n\nsecond"));
    }

    #[test]
    fn test_assemble_drops_chunks_past_budget() {
        // two words each
        let chunks = vec![
            scored(0, "alpha beta"),
            scored(1, "gamma delta"),
            scored(2, "x"),
        ];
        let prompt = assemble(&chunks, "q", 3);

        assert_eq!(prompt.chunks_used, 1);
        assert_eq!(prompt.chunks_dropped, 2);
        assert_eq!(prompt.context_tokens, 2);
        assert!(!prompt.truncated);
        assert!(prompt.text.contains("<context>\nalpha beta\n</context>"));
        assert!(!prompt.text.contains("x\n</context>"));
    }

    #[test]
    fn test_oversized_top_chunk_is_cut_to_budget() {
        let text = "Math courses: Calculus II, Linear Algebra II, Differential Equations.";
        let chunks = vec![scored(0, text), scored(1, "Art courses: Ceramics.")];
        let prompt = assemble(&chunks, "What math courses are available?", 10);

        assert_eq!(prompt.chunks_used, 1);
        assert_eq!(prompt.chunks_dropped, 1);
        assert!(prompt.truncated);
        assert!(prompt.context_tokens <= 10);
        assert!(prompt.text.contains("<context>\nMath courses: Calculus II"));
        assert!(!prompt.text.contains("Differential"));
        assert!(!prompt.text.contains("Ceramics"));
    }

    #[test]
    fn test_truncate_matches_token_estimate() {
        let text = "Math courses: Calculus II, Linear Algebra II.";
        for budget in 0..=estimate_token_count(text) {
            let (prefix, tokens) = truncate_to_tokens(text, budget);
            assert_eq!(estimate_token_count(prefix), tokens);
            assert!(tokens <= budget);
            assert!(text.starts_with(prefix));
        }
        assert_eq!(truncate_to_tokens(text, 100).0, text);
    }

    #[test]
    fn test_assemble_without_chunks() {
        let prompt = assemble(&[], "q", 10);
        assert!(prompt.text.contains("<context>\n\n</context>"));
        assert_eq!(prompt.chunks_used, 0);
    }

    #[test]
    fn test_topic_prompt() {
        assert_eq!(topic_prompt("lawn"), "Tell me how to curb weeds in my lawn");
    }
}
