//! Prompt construction for language-model synthesizers.

use doctalk_rag::RetrievalMode;

use crate::session::Turn;
use crate::synthesizer::{ContextPassage, SynthesisRequest};

/// History text used when the session has no turns yet.
pub const EMPTY_HISTORY: &str = "No previous conversation.";

/// Render passages as `FILE:` / `CONTENT:` blocks separated by blank lines.
pub fn format_context(context: &[ContextPassage]) -> String {
    context
        .iter()
        .map(|passage| format!("FILE: {}\nCONTENT: {}\n---", passage.source_id, passage.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render the last `window` turns as alternating `User:` / `Assistant:` lines.
pub fn format_history(history: &[Turn], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    let recent = &history[start..];
    if recent.is_empty() {
        return EMPTY_HISTORY.to_string();
    }
    recent
        .iter()
        .flat_map(|turn| {
            [format!("User: {}", turn.user_text), format!("Assistant: {}", turn.assistant_text)]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full prompt for `request`.
///
/// History is taken as given; the caller has already applied its window.
pub fn build_prompt(request: &SynthesisRequest<'_>) -> String {
    let context = format_context(request.context);
    let history = format_history(request.history, request.history.len());
    match request.mode {
        RetrievalMode::Summary => summary_prompt(request.query, &context, &history),
        RetrievalMode::Question => question_prompt(request.query, &context, &history),
    }
}

fn summary_prompt(query: &str, context: &str, history: &str) -> String {
    format!(
        "You are DocTalk AI, a helpful document assistant. The user is asking for a summary of the uploaded documents.

DOCUMENT CONTEXT (from all uploaded files):
{context}

CONVERSATION HISTORY:
{history}

USER REQUEST: {query}

INSTRUCTIONS FOR SUMMARIZATION:
- Provide a comprehensive summary covering ALL uploaded documents
- Organize by file/document if multiple files are present
- Include key information, main topics, and important details from each document
- Structure the summary clearly with headings or sections for each file
- Mention specific file names when discussing content from each document
- Provide an overall conclusion that ties together insights from all documents
- Be thorough but concise

FORMAT:
# Summary of Uploaded Documents

## [Filename 1]
- Key points and main content

## [Filename 2]
- Key points and main content

## Overall Summary
- Combined insights and conclusions

COMPREHENSIVE SUMMARY:"
    )
}

fn question_prompt(query: &str, context: &str, history: &str) -> String {
    format!(
        "You are DocTalk AI, a helpful document assistant. Answer the user's question based on the provided document context from multiple uploaded files.

DOCUMENT CONTEXT (from multiple files):
{context}

CONVERSATION HISTORY:
{history}

USER QUESTION: {query}

INSTRUCTIONS:
- Analyze which file(s) contain relevant information for the question
- Answer using information from the most relevant file(s)
- ALWAYS mention the specific file name(s) in your response
- Use citations like \"According to [filename]...\" or \"Based on [filename]...\"
- If information comes from multiple files, clearly distinguish which part comes from which file
- If the answer isn't in any of the uploaded documents, say \"I don't have information about that in the uploaded documents\"
- Keep responses conversational but always cite your sources clearly

ANSWER (with clear file citations):"
    )
}
