//! Grounding prompt assembly.

/// Answer returned, and requested from the model, when the context does not cover a question.
pub const REFUSAL: &str = "I don't know based on the provided information.";

const INSTRUCTION: &str = "You are a helpful chatbot assistant. Use ONLY the provided context to \
answer the question. If the answer is not in the context, say \"I don't know based on the \
provided information.\"";

/// Build the prompt sent to the generation model.
///
/// Each context is trimmed, prefixed with `- `, and separated from the next by a blank line.
pub fn build_rag_prompt<S: AsRef<str>>(contexts: &[S], question: &str) -> String {
    let context_text = contexts
        .iter()
        .map(|context| format!("- {}", context.as_ref().trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{INSTRUCTION}\n\nContext:\n{context_text}\n\nQuestion: {question}\n\nAnswer:")
}
