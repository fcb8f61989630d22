//! Note search ranking.
//!
//! Backend full-text results are merged with a local substring scan,
//! deduplicated by note id and ordered so that title matches come first,
//! newest first within each group. When the backend is unavailable the
//! local results are ranked the same way.

use std::collections::HashSet;
use std::ops::Range;

use regex::{Regex, RegexBuilder};

use crate::backend::NoteBackend;
use crate::debounce::Debounce;
use crate::error::Result;
use crate::models::Note;
use crate::notes::local_matches;

pub const PREVIEW_CONTEXT_CHARS: usize = 50;
pub const PREVIEW_HEAD_CHARS: usize = 100;

// ============================================================================
// Ranking
// ============================================================================

fn title_matches(note: &Note, query_lower: &str) -> bool {
    note.title.to_lowercase().contains(query_lower)
}

/// Backend results first, then local-only hits, each note id once.
pub fn merge_results(backend: Vec<Note>, local: Vec<Note>) -> Vec<Note> {
    let mut seen: HashSet<_> = backend.iter().map(|n| n.id.clone()).collect();
    let mut merged = backend;
    for note in local {
        if seen.insert(note.id.clone()) {
            merged.push(note);
        }
    }
    merged
}

/// Stable sort: title matches before content-only matches, then most
/// recently updated first. Notes without a timestamp sort last.
pub fn rank(results: &mut [Note], query: &str) {
    let query_lower = query.to_lowercase();
    results.sort_by(|a, b| {
        let a_title = title_matches(a, &query_lower);
        let b_title = title_matches(b, &query_lower);
        b_title
            .cmp(&a_title)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

/// Combine a backend outcome with the local collection.
pub fn rank_results(query: &str, notes: &[Note], backend: Result<Vec<Note>>) -> Vec<Note> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let local = local_matches(notes, query);
    let mut results = match backend {
        Ok(remote) => merge_results(remote, local),
        Err(e) => {
            tracing::warn!(error = %e, "backend search failed, using local results");
            local
        }
    };
    rank(&mut results, query);
    results
}

/// Run a search against `backend`, degrading to local results on failure.
pub async fn search<B>(backend: &B, query: &str, notes: &[Note]) -> Vec<Note>
where
    B: NoteBackend + ?Sized,
{
    if query.trim().is_empty() {
        return Vec::new();
    }
    let remote = backend.search_notes(query.trim()).await;
    rank_results(query, notes, remote)
}

// ============================================================================
// Result Navigation
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub notes: Vec<Note>,
    cursor: usize,
}

impl SearchResults {
    pub fn new(query: impl Into<String>, notes: Vec<Note>) -> Self {
        Self {
            query: query.into(),
            notes,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.notes.len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn current(&self) -> Option<&Note> {
        self.notes.get(self.cursor)
    }
}

// ============================================================================
// Search-as-you-type
// ============================================================================

/// Identifies one search run; results for an older ticket are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    generation: u64,
    pub query: String,
}

/// Query input with a debounce in front of the backend.
#[derive(Debug)]
pub struct SearchSession {
    query: String,
    generation: u64,
    debounce: Debounce,
    results: SearchResults,
}

impl SearchSession {
    pub fn new(debounce: Debounce) -> Self {
        Self {
            query: String::new(),
            generation: 0,
            debounce,
            results: SearchResults::default(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &SearchResults {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut SearchResults {
        &mut self.results
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// The query changed; a blank query clears results right away.
    pub fn input(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.generation += 1;
        if self.query.trim().is_empty() {
            self.debounce.cancel();
            self.results = SearchResults::new(self.query.clone(), Vec::new());
        } else {
            self.debounce.touch();
        }
    }

    /// Wait for the input to go idle and hand out a ticket for the query.
    pub async fn ready(&mut self) -> SearchTicket {
        self.debounce.fired().await;
        SearchTicket {
            generation: self.generation,
            query: self.query.clone(),
        }
    }

    /// Store results unless the query moved on since `ticket` was issued.
    pub fn apply(&mut self, ticket: SearchTicket, notes: Vec<Note>) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(query = %ticket.query, "discarding stale search results");
            return false;
        }
        self.results = SearchResults::new(ticket.query, notes);
        true
    }

    /// Debounce, search, apply.
    pub async fn run<B>(&mut self, backend: &B, notes: &[Note]) -> &SearchResults
    where
        B: NoteBackend + ?Sized,
    {
        let ticket = self.ready().await;
        let found = search(backend, &ticket.query, notes).await;
        self.apply(ticket, found);
        &self.results
    }
}

// ============================================================================
// Previews and Highlighting
// ============================================================================

fn query_regex(query: &str) -> Option<Regex> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Byte ranges of case-insensitive, non-overlapping occurrences of `query`.
pub fn highlight_ranges(text: &str, query: &str) -> Vec<Range<usize>> {
    match query_regex(query) {
        Some(re) => re.find_iter(text).map(|m| m.range()).collect(),
        None => Vec::new(),
    }
}

/// Wrap every occurrence of `query` in `open`/`close`.
pub fn highlight(text: &str, query: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for range in highlight_ranges(text, query) {
        out.push_str(&text[last..range.start]);
        out.push_str(open);
        out.push_str(&text[range.clone()]);
        out.push_str(close);
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let from = indices.by_ref().nth(start).unwrap_or(text.len());
    let to = if end > start {
        indices.nth(end - start - 1).unwrap_or(text.len())
    } else {
        from
    };
    &text[from..to]
}

/// A window of content around the first hit, or the head of the content.
pub fn content_preview(content: &str, query: &str) -> String {
    if content.is_empty() {
        return "No content...".to_string();
    }
    let total = content.chars().count();
    let hit = query_regex(query).and_then(|re| re.find(content));

    let Some(hit) = hit else {
        let head = char_slice(content, 0, PREVIEW_HEAD_CHARS);
        return if total > PREVIEW_HEAD_CHARS {
            format!("{}...", head)
        } else {
            head.to_string()
        };
    };

    let hit_start = char_offset(content, hit.start());
    let hit_len = hit.as_str().chars().count();
    let start = hit_start.saturating_sub(PREVIEW_CONTEXT_CHARS);
    let end = (hit_start + hit_len + PREVIEW_CONTEXT_CHARS).min(total);

    let mut preview = String::new();
    if start > 0 {
        preview.push_str("...");
    }
    preview.push_str(char_slice(content, start, end));
    if end < total {
        preview.push_str("...");
    }
    preview
}
