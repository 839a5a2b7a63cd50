//! Reasoning extraction — separating `<think>…</think>` segments from the
//! visible answer.
//!
//! Several hosted reasoning models (DeepSeek-R1 distills on Groq, Together,
//! SambaNova, …) inline their chain of thought in the content field instead of
//! a dedicated JSON field.

const THINK_START: &str = "<think>";
const THINK_END: &str = "</think>";

/// Whether the content carries any think tag.
pub fn contains_think_tags(content: &str) -> bool {
    content.contains(THINK_START) || content.contains(THINK_END)
}

/// Split content into `(answer, reasoning)`.
///
/// Every `<think>` block is removed from the answer and collected into the
/// reasoning channel. An unterminated block swallows the rest of the text. A
/// `</think>` ahead of any `<think>` (opening tag dropped by the host) marks
/// everything before it as reasoning. Content without tags is returned unchanged.
pub fn split_think_tags(content: &str) -> (String, Option<String>) {
    if !contains_think_tags(content) {
        return (content.to_string(), None);
    }

    let mut answer = String::new();
    let mut thoughts: Vec<&str> = Vec::new();
    let mut remaining = content;

    if let Some(end) = remaining.find(THINK_END) {
        let opens_first = remaining.find(THINK_START).is_some_and(|start| start < end);
        if !opens_first {
            thoughts.push(remaining[..end].trim());
            remaining = &remaining[end + THINK_END.len()..];
        }
    }

    while let Some(start) = remaining.find(THINK_START) {
        answer.push_str(&remaining[..start]);
        let inner_start = start + THINK_START.len();
        match remaining[inner_start..].find(THINK_END) {
            Some(end) => {
                thoughts.push(remaining[inner_start..inner_start + end].trim());
                remaining = &remaining[inner_start + end + THINK_END.len()..];
            }
            None => {
                thoughts.push(remaining[inner_start..].trim());
                remaining = "";
            }
        }
    }
    answer.push_str(remaining);

    let reasoning: Vec<&str> = thoughts.into_iter().filter(|t| !t.is_empty()).collect();
    let reasoning = if reasoning.is_empty() {
        None
    } else {
        Some(reasoning.join("\n\n"))
    };

    (answer.trim().to_string(), reasoning)
}

/// Combine an explicit reasoning field with inline reasoning, explicit first.
pub fn merge_reasoning(explicit: Option<String>, inline: Option<String>) -> Option<String> {
    let explicit = explicit.filter(|r| !r.trim().is_empty());
    match (explicit, inline) {
        (Some(a), Some(b)) => Some(format!("{a}\n\n{b}")),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_tags_passthrough() {
        let (answer, reasoning) = split_think_tags("  plain answer ");
        assert_eq!(answer, "  plain answer ");
        assert!(reasoning.is_none());
    }

    #[test]
    fn test_leading_block() {
        let (answer, reasoning) =
            split_think_tags("<think>\nThe user wants a summary.\n</think>\n\nHere it is.");
        assert_eq!(answer, "Here it is.");
        assert_eq!(reasoning.as_deref(), Some("The user wants a summary."));
    }

    #[test]
    fn test_multiple_blocks() {
        let (answer, reasoning) = split_think_tags("A <think>one</think>B<think>two</think> C");
        assert_eq!(answer, "A B C");
        assert_eq!(reasoning.as_deref(), Some("one\n\ntwo"));
    }

    #[test]
    fn test_unterminated_block() {
        let (answer, reasoning) = split_think_tags("Intro <think>still thinking");
        assert_eq!(answer, "Intro");
        assert_eq!(reasoning.as_deref(), Some("still thinking"));
    }

    #[test]
    fn test_orphan_closing_tag() {
        let (answer, reasoning) = split_think_tags("weighing options</think>Final.");
        assert_eq!(answer, "Final.");
        assert_eq!(reasoning.as_deref(), Some("weighing options"));
    }

    #[test]
    fn test_orphan_closing_tag_before_later_block() {
        let (answer, reasoning) = split_think_tags("a</think>b<think>c</think>d");
        assert_eq!(answer, "bd");
        assert_eq!(reasoning.as_deref(), Some("a\n\nc"));
    }

    #[test]
    fn test_empty_block_yields_no_reasoning() {
        let (answer, reasoning) = split_think_tags("<think>  </think>Answer");
        assert_eq!(answer, "Answer");
        assert!(reasoning.is_none());
    }

    #[test]
    fn test_merge_reasoning() {
        assert_eq!(
            merge_reasoning(Some("field".into()), Some("inline".into())).as_deref(),
            Some("field\n\ninline")
        );
        assert_eq!(merge_reasoning(Some(" ".into()), None), None);
        assert_eq!(merge_reasoning(None, Some("x".into())).as_deref(), Some("x"));
    }
}
