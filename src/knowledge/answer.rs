//! Prompt and formatting rules for grounded answers.

/// Reply used when retrieval finds nothing, without calling the model.
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find any relevant information in the database.";

const SOURCE_PREVIEW_CHARS: usize = 100;

/// Tutor prompt restricting the model to the retrieved context.
pub(crate) fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert teacher. Answer the user's question strictly based on the context provided below.\n\
         If the answer is not in the context, say \"I don't know based on this document.\"\n\n\
         <context>\n{context}\n</context>\n\n\
         Question: {question}"
    )
}

/// First hundred characters of a chunk followed by an ellipsis.
pub(crate) fn source_preview(text: &str) -> String {
    let preview: String = text.chars().take(SOURCE_PREVIEW_CHARS).collect();
    format!("{preview}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = build_answer_prompt("At what temperature?", "Water boils at 100°C.");
        assert!(prompt.contains("<context>\nWater boils at 100°C.\n</context>"));
        assert!(prompt.ends_with("Question: At what temperature?"));
        assert!(prompt.contains("I don't know based on this document."));
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let long = "é".repeat(150);
        let preview = source_preview(&long);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
        assert_eq!(source_preview("short"), "short...");
    }
}
