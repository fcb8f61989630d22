//! Note content processing.
//!
//! This module handles the text-level operations on notes:
//! - Wiki-link extraction and resolution (`[[Title]]`)
//! - Markdown preview rendering with resolved links
//! - Local substring search
//! - Small text helpers used by the views

use std::ops::Range;

use once_cell::sync::Lazy;
use pulldown_cmark::Parser;
use regex::{Captures, Regex};

use crate::models::Note;

// ============================================================================
// Wiki-Link Extraction
// ============================================================================

static WIKI_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("wiki-link pattern compiles"));

/// One `[[...]]` occurrence in note content.
#[derive(Debug, Clone, PartialEq)]
pub struct WikiLink<'a> {
    /// Text between the brackets, as written.
    pub text: String,
    /// Byte range of the whole token including brackets.
    pub span: Range<usize>,
    /// The note the text resolves to, if any.
    pub note: Option<&'a Note>,
}

impl WikiLink<'_> {
    pub fn is_resolved(&self) -> bool {
        self.note.is_some()
    }
}

/// Case-insensitive exact title match; the first note in collection order wins.
pub fn resolve_title<'a>(title: &str, notes: &'a [Note]) -> Option<&'a Note> {
    let wanted = title.to_lowercase();
    notes.iter().find(|n| n.title.to_lowercase() == wanted)
}

/// All wiki-links in `content`, in order of appearance, non-overlapping.
pub fn find_note_links<'a>(content: &str, notes: &'a [Note]) -> Vec<WikiLink<'a>> {
    WIKI_LINK
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let text = caps.get(1)?.as_str().to_string();
            let note = resolve_title(&text, notes);
            Some(WikiLink {
                text,
                span: whole.range(),
                note,
            })
        })
        .collect()
}

/// Link texts only, without resolution.
pub fn extract_link_titles(content: &str) -> Vec<&str> {
    WIKI_LINK
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Cheap check used for the graph header's "with links" count.
pub fn has_link_syntax(content: &str) -> bool {
    content.contains("[[")
}

// ============================================================================
// Preview Rendering
// ============================================================================

pub fn note_anchor(note: &Note) -> String {
    format!("#note-{}", note.id)
}

/// Rewrite wiki-links as markdown: resolved links point at the note's anchor,
/// unresolved ones are left as their plain text.
pub fn process_wiki_links(content: &str, notes: &[Note]) -> String {
    WIKI_LINK
        .replace_all(content, |caps: &Captures| {
            let text = &caps[1];
            match resolve_title(text, notes) {
                Some(note) => format!("[{}]({})", text, note_anchor(note)),
                None => text.to_string(),
            }
        })
        .into_owned()
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn render_markdown(content: &str) -> String {
    let parser = Parser::new(content);
    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    // Raw HTML in markdown must not survive into the preview
    ammonia::clean(&html_output)
}

/// Editor preview: wiki-links resolved against `notes`, then rendered.
pub fn render_preview(content: &str, notes: &[Note]) -> String {
    render_markdown(&process_wiki_links(content, notes))
}

// ============================================================================
// Local Search
// ============================================================================

/// Notes whose title or content contains `query`, case-insensitively, in
/// collection order. A blank query matches nothing; otherwise surrounding
/// whitespace is part of the match.
pub fn local_matches(notes: &[Note], query: &str) -> Vec<Note> {
    use rayon::prelude::*;

    if query.trim().is_empty() {
        return Vec::new();
    }
    let query_lower = query.to_lowercase();

    notes
        .par_iter()
        .filter(|note| {
            note.title.to_lowercase().contains(&query_lower)
                || note.content.to_lowercase().contains(&query_lower)
        })
        .cloned()
        .collect()
}

// ============================================================================
// Text Helpers
// ============================================================================

/// At most `max` characters, with `...` appended when something was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

pub fn char_count(s: &str) -> usize {
    s.chars().count()
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityId;

    fn note(id: i64, title: &str, content: &str) -> Note {
        Note {
            id: EntityId::Int(id),
            title: title.to_string(),
            content: content.to_string(),
            is_starred: false,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_find_links_in_order() {
        let notes = vec![note(1, "Rust", ""), note(2, "Cargo", "")];
        let links = find_note_links("see [[cargo]] and [[RUST]] and [[Go]]", &notes);
        let texts: Vec<_> = links.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["cargo", "RUST", "Go"]);
        assert_eq!(links[0].note.map(|n| n.id.clone()), Some(EntityId::Int(2)));
        assert_eq!(links[1].note.map(|n| n.id.clone()), Some(EntityId::Int(1)));
        assert!(!links[2].is_resolved());
        assert_eq!(links[0].span, 4..13);
    }

    #[test]
    fn test_duplicate_titles_resolve_to_first() {
        let notes = vec![note(1, "Ideas", "a"), note(2, "ideas", "b")];
        let links = find_note_links("[[IDEAS]]", &notes);
        assert_eq!(links[0].note.unwrap().id, EntityId::Int(1));
    }

    #[test]
    fn test_resolution_is_exact_not_prefix() {
        let notes = vec![note(1, "Rust Book", "")];
        assert!(resolve_title("Rust", &notes).is_none());
        assert!(resolve_title(" rust book", &notes).is_none());
    }

    #[test]
    fn test_link_pattern_edges() {
        assert!(extract_link_titles("[[]] and [[ a ]]").contains(&" a "));
        assert_eq!(extract_link_titles("[[a]]]] [[b"), vec!["a"]);
        assert!(extract_link_titles("no links here").is_empty());
        assert!(has_link_syntax("open [[ only"));
    }

    #[test]
    fn test_process_wiki_links() {
        let notes = vec![note(5, "Target", "")];
        assert_eq!(
            process_wiki_links("go to [[target]] or [[Missing]]", &notes),
            "go to [target](#note-5) or Missing"
        );
    }

    #[test]
    fn test_render_preview_sanitizes() {
        let notes = vec![note(5, "Target", "")];
        let html = render_preview("**hi** [[Target]] <script>alert(1)</script>", &notes);
        assert!(html.contains("<strong>hi</strong>"));
        assert!(html.contains("href=\"#note-5\""));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_local_matches_title_or_content() {
        let notes = vec![
            note(1, "Apple Pie", "recipe"),
            note(2, "Fruit", "apple trees"),
            note(3, "Bread", "flour"),
        ];
        let hits = local_matches(&notes, "APPLE");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, EntityId::Int(1));
        assert!(local_matches(&notes, "   ").is_empty());
    }

    #[test]
    fn test_local_matches_keep_surrounding_whitespace() {
        let notes = vec![note(1, "Apple", ""), note(2, "Apple pie", "")];
        let hits = local_matches(&notes, "apple ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, EntityId::Int(2));
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(truncate_chars("A very long title here", 15), "A very long tit...");
        assert_eq!(truncate_chars("short", 15), "short");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(word_count("  one two\nthree "), 3);
        assert_eq!(char_count("héllo"), 5);
        assert_eq!(html_escape("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }
}
