//! Generation failure messages
//!
//! Failures are classified by substring of the error text, first match wins.
//! The user-facing strings are fixed; unmatched failures echo the raw text.

/// (substring, reply) pairs in match order
const CLASSIFICATIONS: &[(&str, &str)] = &[
    (
        "Model not properly loaded",
        "⚠️ Model Loading Error: The AI model is not properly loaded. Please try reloading the model or check if the model files are valid.",
    ),
    (
        "No model loaded",
        "⚠️ No Model Loaded: Please select and load an AI model first before starting a conversation.",
    ),
    (
        "Invalid conversation format",
        "⚠️ Conversation Error: There was an issue with the conversation format. Please try again.",
    ),
];

/// Assistant reply shown in place of a failed generation
pub fn classify_generation_error(message: &str) -> String {
    CLASSIFICATIONS
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, reply)| reply.to_string())
        .unwrap_or_else(|| format!("⚠️ Error: {}", message))
}
