//! Answer synthesis over retrieved chunks.
//!
//! All retrieved texts are stuffed into a single question-answering prompt
//! and sent to the configured [`LlmProvider`] in one call.

use std::fmt;

use tracing::{debug, info};

use crate::document::QueryMatch;
use crate::error::{RagError, Result};
use crate::llm::{LlmProvider, ProviderRequest};

/// Rendering of [`Answer::NoRelevantContext`].
pub const NO_CONTEXT_ANSWER: &str = "No relevant context found.";

/// Default upper bound on the context placed in the prompt, in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Result of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Text produced by the generative provider.
    Generated(String),
    /// Retrieval found nothing to ground an answer on; the provider was not called.
    NoRelevantContext,
}

impl Answer {
    /// Text shown to the user.
    pub fn text(&self) -> &str {
        match self {
            Answer::Generated(text) => text,
            Answer::NoRelevantContext => NO_CONTEXT_ANSWER,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Prompt and sampling settings for answer generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesizer {
    /// Cap on context characters; `None` sends every match.
    pub max_context_chars: Option<usize>,
    /// Sampling temperature passed to the provider.
    pub temperature: f32,
    /// Completion token budget passed to the provider.
    pub max_tokens: usize,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self {
            max_context_chars: Some(DEFAULT_MAX_CONTEXT_CHARS),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

impl Synthesizer {
    /// Answers `question` from `matches`, in match order.
    pub fn synthesize<L: LlmProvider + ?Sized>(
        &self,
        llm: &L,
        question: &str,
        matches: &[QueryMatch],
    ) -> Result<Answer> {
        let context = build_context(matches, self.max_context_chars);
        if context.is_empty() {
            info!(matches = matches.len(), "no relevant context; skipping generation");
            return Ok(Answer::NoRelevantContext);
        }
        let prompt = render_prompt(&context, question);
        debug!(
            context_chars = context.chars().count(),
            prompt_chars = prompt.chars().count(),
            "sending prompt"
        );
        let completion = llm.answer(&ProviderRequest {
            prompt: &prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })?;
        let completion = completion.trim();
        if completion.is_empty() {
            return Err(RagError::InvalidResponse {
                provider: "llm",
                detail: "empty completion".to_string(),
            });
        }
        info!(answer_chars = completion.chars().count(), "answer generated");
        Ok(Answer::Generated(completion.to_string()))
    }
}

/// Joins match texts with single spaces, honouring the character cap.
///
/// Once the cap is reached later matches are dropped whole; only a first
/// match that alone exceeds the cap is truncated.
pub fn build_context(matches: &[QueryMatch], max_chars: Option<usize>) -> String {
    let limit = max_chars.unwrap_or(usize::MAX);
    let mut context = String::new();
    let mut used = 0usize;
    for text in matches
        .iter()
        .filter_map(QueryMatch::text)
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        let len = text.chars().count();
        if context.is_empty() {
            if len > limit {
                context.extend(text.chars().take(limit));
                break;
            }
            context.push_str(text);
            used = len;
            continue;
        }
        if used + 1 + len > limit {
            break;
        }
        context.push(' ');
        context.push_str(text);
        used += 1 + len;
    }
    context
}

fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n\n{context}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedLlm {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for ScriptedLlm {
        fn answer(&self, request: &ProviderRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn hit(id: &str, text: Option<&str>) -> QueryMatch {
        let metadata = match text {
            Some(text) => json!({ "text": text }).as_object().cloned().unwrap(),
            None => Default::default(),
        };
        QueryMatch {
            id: id.into(),
            score: 0.5,
            values: None,
            metadata,
        }
    }

    #[test]
    fn no_matches_skip_the_provider() {
        let llm = ScriptedLlm::new("unused");
        let answer = Synthesizer::default().synthesize(&llm, "q?", &[]).unwrap();
        assert_eq!(answer, Answer::NoRelevantContext);
        assert_eq!(answer.to_string(), NO_CONTEXT_ANSWER);
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn matches_without_text_count_as_no_context() {
        let llm = ScriptedLlm::new("unused");
        let answer = Synthesizer::default()
            .synthesize(&llm, "q?", &[hit("a", None)])
            .unwrap();
        assert_eq!(answer, Answer::NoRelevantContext);
    }

    #[test]
    fn prompt_stuffs_context_in_match_order() {
        let llm = ScriptedLlm::new("  Paris.  ");
        let matches = [hit("a", Some("France's capital")), hit("b", Some("is Paris"))];
        let answer = Synthesizer::default()
            .synthesize(&llm, "What is the capital?", &matches)
            .unwrap();
        assert_eq!(answer, Answer::Generated("Paris.".into()));
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("\n\nFrance's capital is Paris\n\n"));
        assert!(prompts[0].ends_with("Question: What is the capital?\nHelpful Answer:"));
    }

    #[test]
    fn empty_completion_is_invalid() {
        let llm = ScriptedLlm::new("   ");
        let err = Synthesizer::default()
            .synthesize(&llm, "q?", &[hit("a", Some("ctx"))])
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidResponse { .. }));
    }

    #[test]
    fn context_cap_drops_whole_matches() {
        let matches = [
            hit("a", Some("aaaa")),
            hit("b", Some("bbbb")),
            hit("c", Some("cc")),
        ];
        assert_eq!(build_context(&matches, Some(9)), "aaaa bbbb");
        assert_eq!(build_context(&matches, Some(8)), "aaaa");
        assert_eq!(build_context(&matches, None), "aaaa bbbb cc");
    }

    #[test]
    fn oversized_first_match_is_truncated() {
        let matches = [hit("a", Some("ééééééé")), hit("b", Some("x"))];
        assert_eq!(build_context(&matches, Some(3)), "ééé");
    }
}
