//! LLM prompts for grading, rewriting, and answer generation.

use crate::types::retrieval::FusedItem;

/// Longest slice of one item's content placed into a prompt.
const MAX_ITEM_CHARS: usize = 1200;

/// Prompt for grading retrieved context against the question.
pub const GRADE_CONTEXT_PROMPT: &str = r#"Grade how well the retrieved context answers the question.

Question: {query}

Retrieved context:
{context}

Score from 0.0 (irrelevant or missing) to 1.0 (fully answers the question).
Judge relevance and coverage only, not writing quality.

Output JSON:
{
    "score": 0.0,
    "justification": "one sentence"
}"#;

/// Prompt for reformulating a query after a weak retrieval round.
pub const REWRITE_QUERY_PROMPT: &str = r#"Rewrite this search query so retrieval finds better context.

Original question: {original}
Current query: {query}
{prior_turn_section}
Why the last round was weak: {justification}

Keep the same intent. Name entities explicitly instead of using pronouns.
Output only the rewritten query on a single line."#;

/// Prompt for answering from the final context.
pub const ANSWER_PROMPT: &str = r#"Answer the question using only the context below.

Question: {query}

Context:
{context}

If the context does not contain the answer, say so plainly.
Cite items by their bracketed number, e.g. [1]."#;

/// Render fused items as numbered context blocks.
pub fn format_context(items: &[FusedItem]) -> String {
    if items.is_empty() {
        return "(no context retrieved)".to_string();
    }

    items
        .iter()
        .enumerate()
        .map(|(i, fused)| {
            let content: String = fused.item.content.chars().take(MAX_ITEM_CHARS).collect();
            format!(
                "[{}] ({}) {}\n{}",
                i + 1,
                fused.item.origin,
                fused.item.id,
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format the grading prompt.
pub fn format_grade_prompt(query: &str, items: &[FusedItem]) -> String {
    render(
        GRADE_CONTEXT_PROMPT,
        &[("query", query), ("context", &format_context(items))],
    )
}

/// Format the rewrite prompt.
pub fn format_rewrite_prompt(
    original: &str,
    query: &str,
    prior_turn: Option<&str>,
    justification: &str,
) -> String {
    let prior_turn_section = match prior_turn {
        Some(turn) if !turn.trim().is_empty() => format!("Previous turn: {}\n", turn.trim()),
        _ => String::new(),
    };

    render(
        REWRITE_QUERY_PROMPT,
        &[
            ("original", original),
            ("query", query),
            ("prior_turn_section", &prior_turn_section),
            ("justification", justification),
        ],
    )
}

/// Format the answer prompt.
pub fn format_answer_prompt(query: &str, items: &[FusedItem]) -> String {
    render(
        ANSWER_PROMPT,
        &[("query", query), ("context", &format_context(items))],
    )
}

/// Fill `{name}` placeholders in one pass over the template.
///
/// Substituted text is never scanned again, so braces inside queries or
/// retrieved content come through verbatim.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let placeholder = values
            .iter()
            .find(|(key, _)| tail.starts_with(key) && tail[key.len()..].starts_with('}'));
        match placeholder {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::retrieval::{Origin, SearchHit};

    fn fused(id: &str, content: &str) -> FusedItem {
        FusedItem {
            item: SearchHit::new(id, content, 0.5).into_item(Origin::Graph),
            fused_score: 0.01,
            origins: vec![Origin::Graph],
            rerank_score: None,
        }
    }

    #[test]
    fn test_format_context_numbers_items() {
        let text = format_context(&[fused("a", "first"), fused("b", "second")]);
        assert!(text.starts_with("[1] (graph) a\nfirst"));
        assert!(text.contains("[2] (graph) b\nsecond"));
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "(no context retrieved)");
    }

    #[test]
    fn test_long_content_is_truncated() {
        let long = "x".repeat(MAX_ITEM_CHARS * 2);
        let text = format_context(&[fused("a", &long)]);
        assert!(text.len() < MAX_ITEM_CHARS + 32);
    }

    #[test]
    fn test_format_rewrite_prompt_with_prior_turn() {
        let prompt = format_rewrite_prompt(
            "what about their revenue?",
            "their revenue",
            Some("Tell me about Disney"),
            "context covered a different company",
        );
        assert!(prompt.contains("Previous turn: Tell me about Disney"));
        assert!(prompt.contains("different company"));
    }

    #[test]
    fn test_format_rewrite_prompt_without_prior_turn() {
        let prompt = format_rewrite_prompt("q", "q", None, "thin");
        assert!(!prompt.contains("Previous turn"));
    }

    #[test]
    fn test_format_grade_prompt() {
        let prompt = format_grade_prompt("What is an SLA?", &[fused("doc-1", "An SLA is")]);
        assert!(prompt.contains("Question: What is an SLA?"));
        assert!(prompt.contains("doc-1"));
    }

    #[test]
    fn test_placeholders_in_user_text_are_not_expanded() {
        let prompt = format_grade_prompt(
            "why is {context} literal?",
            &[fused("doc-1", "mentions {query} in braces")],
        );
        assert!(prompt.contains("Question: why is {context} literal?"));
        assert!(prompt.contains("mentions {query} in braces"));
        assert_eq!(prompt.matches("[1] (graph) doc-1").count(), 1);

        let prompt = format_answer_prompt("what does {query} mean?", &[]);
        assert!(prompt.contains("Question: what does {query} mean?"));
        assert!(prompt.contains("(no context retrieved)"));
    }

    #[test]
    fn test_json_braces_in_template_survive() {
        let prompt = format_grade_prompt("q", &[]);
        assert!(prompt.contains("\"score\": 0.0"));
        assert!(prompt.trim_end().ends_with('}'));
    }
}
