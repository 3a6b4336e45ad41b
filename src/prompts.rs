//! Prompt templates for the things a user can ask about a page.

/// Prepend a context block when one is given; otherwise the prompt is sent
/// verbatim.
pub fn frame_prompt(prompt: &str, context: &str) -> String {
    if context.is_empty() {
        prompt.to_string()
    } else {
        format!("Context: {context}\n\nQuestion: {prompt}")
    }
}

/// Summary of a whole page.
pub fn summarize_page(title: &str, content: &str) -> String {
    format!(
        "Please provide a concise summary of the following webpage content in 3-5 bullet points:\n\n\
         Title: {title}\n\nContent: {content}"
    )
}

pub fn summarize_selection(text: &str) -> String {
    format!("Please provide a brief, clear summary of the following text:\n\n\"{text}\"")
}

pub fn explain_selection(text: &str) -> String {
    format!("Please explain the following text in simple terms:\n\n\"{text}\"")
}

pub fn ask_about_selection(text: &str, question: &str) -> String {
    format!("Based on this text: \"{text}\"\n\nQuestion: {question}")
}
