//! System prompts sent with every page image.
//!
//! Callers can override these via [`crate::config::BatchConfig::system_prompt`];
//! the constants here are used only when no override is provided.

/// Default prompt: the page as a person would read it aloud, no markup.
pub const PLAIN_TEXT_PROMPT: &str =
    "Return the plain text representation of this document as if you were reading it naturally.";

/// Markdown extraction with short descriptions of drawings and diagrams.
pub const MARKDOWN_PROMPT: &str = r#"Extract all visible text and meaningful labels from the image into clean Markdown.
Preserve structure by grouping textual information into logical sections (e.g., project details, notes, labels).
If the image contains diagrams, arrows, airflow lines, equipment, or seating layouts, describe them concisely in Markdown as bullet points or short paragraphs.
Maintain clear separation between textual metadata and diagram descriptions.
If location is relevant (e.g., 'top-right corner', 'inside dome'), include it briefly.
Do not include any preambles, explanations, code fences, or adornments.
Only return direct Markdown content."#;

/// Narrative prose suited to entity extraction and retrieval pipelines.
pub const GRAPH_PROSE_PROMPT: &str = r#"Extract all visible text and meaningful labels from the image as plain, structured prose suitable for ingestion into a knowledge graph or RAG system.
Convert textual content into coherent, semantically rich sentences grouped by logical themes (e.g., project details, annotations, equipment list, spatial layout).
Preserve contextual relationships by explicitly stating connections between entities.
Describe diagrams, arrows, flow paths, equipment placements, seating arrangements, or architectural features as factual, spatially aware statements.
Include positional context only when it contributes to semantic meaning.
Avoid markdown formatting, bullet points, or section headers; use natural transitions to separate ideas.
Output fluent, concise, graph-friendly narrative text optimized for entity extraction, relationship mapping, and retrieval-augmented generation."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_forbid_wrappers() {
        assert!(MARKDOWN_PROMPT.contains("code fences"));
        assert!(GRAPH_PROSE_PROMPT.contains("Avoid markdown"));
        assert!(!PLAIN_TEXT_PROMPT.is_empty());
    }
}
