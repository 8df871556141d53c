//! Prompt context assembly.

use tracing::warn;

use crate::document::RankedPassage;

const SEPARATOR: &str = "\n\n";

/// Joins ranked passages into the numbered context block sent to the model.
///
/// Passages are labelled `Document 1`, `Document 2`, ... in input order.
/// With a `max_chars` cap, whole passages are appended until the next one
/// would overflow the cap; passages are never cut in the middle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextAssembler {
    max_chars: Option<usize>,
}

impl ContextAssembler {
    /// An assembler with no size cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// An assembler that keeps the context within `max_chars` characters.
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self { max_chars: Some(max_chars) }
    }

    pub fn max_chars(&self) -> Option<usize> {
        self.max_chars
    }

    pub fn assemble(&self, passages: &[RankedPassage]) -> String {
        let mut context = String::new();
        let mut used = 0usize;

        for (i, passage) in passages.iter().enumerate() {
            let block = format!("Document {}:\n{}", i + 1, passage.body);
            let cost = block.chars().count() + if i == 0 { 0 } else { SEPARATOR.len() };

            if let Some(cap) = self.max_chars {
                if used + cost > cap {
                    warn!(included = i, dropped = passages.len() - i, cap, "context cap reached");
                    break;
                }
            }

            if i > 0 {
                context.push_str(SEPARATOR);
            }
            context.push_str(&block);
            used += cost;
        }
        context
    }
}

/// Assemble passages with no size cap.
pub fn assemble(passages: &[RankedPassage]) -> String {
    ContextAssembler::new().assemble(passages)
}

/// Wrap an assembled context and the user's question into the final prompt.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Based on the following ordinance documents, please answer the question.\n\n\
         Documents:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}
