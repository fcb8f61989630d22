//! Link graph building and the interactive graph view.
//!
//! This module derives the note graph from `[[Title]]` references and hosts
//! the state a graph panel needs: the running layout, the zoom/pan
//! transform, node selection and drag gestures.

use std::collections::HashMap;

use crate::layout::{ForceLayout, ForceParams, LayoutState, Point, ViewTransform, ZOOM_STEP};
use crate::models::{GraphEdge, GraphNode, GraphStats, Note, NoteGraph, NoteId};
use crate::notes::{char_count, extract_link_titles, has_link_syntax, truncate_chars};

pub const MIN_NODE_SIZE: f32 = 10.0;
pub const MAX_NODE_SIZE: f32 = 30.0;
const CHARS_PER_SIZE_UNIT: f32 = 50.0;

pub const LABEL_MAX_CHARS: usize = 15;
pub const INFO_PREVIEW_CHARS: usize = 100;

// ============================================================================
// Graph Building
// ============================================================================

/// Sorted node ids and sorted (source, target) pairs: what the layout
/// depends on, ignoring sizes and labels.
fn structure(graph: &NoteGraph) -> (Vec<&NoteId>, Vec<(&NoteId, &NoteId)>) {
    let mut ids: Vec<&NoteId> = graph.nodes.iter().map(|n| &n.id).collect();
    ids.sort();
    let mut links: Vec<(&NoteId, &NoteId)> = graph.edges.iter().map(|e| (&e.source, &e.target)).collect();
    links.sort();
    (ids, links)
}

/// Visual radius for a note of `content_len` characters.
pub fn node_size(content_len: usize) -> f32 {
    (content_len as f32 / CHARS_PER_SIZE_UNIT).clamp(MIN_NODE_SIZE, MAX_NODE_SIZE)
}

/// One node per note; one edge per resolved link occurrence. Repeated links
/// between the same pair are kept as separate edges.
pub fn build_note_graph(notes: &[Note]) -> NoteGraph {
    // First note wins when titles collide
    let mut by_title: HashMap<String, usize> = HashMap::new();
    for (i, note) in notes.iter().enumerate() {
        by_title.entry(note.title.to_lowercase()).or_insert(i);
    }

    let mut edges = Vec::new();
    let mut degree = vec![0usize; notes.len()];
    for (i, note) in notes.iter().enumerate() {
        for title in extract_link_titles(&note.content) {
            let Some(&j) = by_title.get(&title.to_lowercase()) else {
                continue;
            };
            degree[i] += 1;
            if j != i {
                degree[j] += 1;
            }
            edges.push(GraphEdge {
                source: note.id.clone(),
                target: notes[j].id.clone(),
                weight: 1,
            });
        }
    }

    let nodes: Vec<GraphNode> = notes
        .iter()
        .zip(degree)
        .map(|(note, link_count)| {
            let content_len = char_count(&note.content);
            GraphNode {
                id: note.id.clone(),
                title: note.title.clone(),
                size: node_size(content_len),
                link_count,
                is_starred: note.is_starred,
                content_len,
            }
        })
        .collect();

    let stats = compute_stats(notes, &nodes, &edges);
    NoteGraph { nodes, edges, stats }
}

fn compute_stats(notes: &[Note], nodes: &[GraphNode], edges: &[GraphEdge]) -> GraphStats {
    let total_nodes = nodes.len();
    let orphan_count = nodes.iter().filter(|n| n.link_count == 0).count();
    let max_degree = nodes.iter().map(|n| n.link_count).max().unwrap_or(0);
    let total_degree: usize = nodes.iter().map(|n| n.link_count).sum();
    let avg_degree = if total_nodes > 0 {
        total_degree as f64 / total_nodes as f64
    } else {
        0.0
    };

    GraphStats {
        total_nodes,
        total_edges: edges.len(),
        orphan_count,
        linked_notes: notes.iter().filter(|n| has_link_syntax(&n.content)).count(),
        max_degree,
        avg_degree,
    }
}

/// Node label: the title cut to [`LABEL_MAX_CHARS`].
pub fn node_label(title: &str) -> String {
    truncate_chars(title, LABEL_MAX_CHARS)
}

// ============================================================================
// Graph View
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSprite {
    pub id: NoteId,
    pub label: String,
    /// Screen coordinates.
    pub at: Point,
    pub radius: f64,
    pub stroke_width: f32,
    pub is_starred: bool,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeLine {
    pub from: Point,
    pub to: Point,
}

/// Everything a renderer needs for one frame, in screen space.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphFrame {
    Empty,
    Ready {
        nodes: Vec<NodeSprite>,
        edges: Vec<EdgeLine>,
        zoom_percent: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphHeader {
    pub note_count: usize,
    pub linked_count: usize,
}

/// Details panel for the selected node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: NoteId,
    pub title: String,
    pub preview: String,
    pub connections: usize,
    pub chars: usize,
}

type SelectCallback = Box<dyn FnMut(&Note) + Send>;

pub struct GraphView {
    notes: Vec<Note>,
    graph: NoteGraph,
    layout: ForceLayout,
    state: Option<LayoutState>,
    viewport: Viewport,
    transform: ViewTransform,
    selected: Option<NoteId>,
    dragging: Option<NoteId>,
    on_select: Option<SelectCallback>,
}

impl Default for GraphView {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl GraphView {
    pub fn new(viewport: Viewport) -> Self {
        Self::with_params(viewport, ForceParams::default())
    }

    pub fn with_params(viewport: Viewport, params: ForceParams) -> Self {
        Self {
            notes: Vec::new(),
            graph: NoteGraph::default(),
            layout: ForceLayout::new(params),
            state: None,
            viewport,
            transform: ViewTransform::IDENTITY,
            selected: None,
            dragging: None,
            on_select: None,
        }
    }

    /// Host callback invoked with the clicked note.
    pub fn on_select(&mut self, callback: impl FnMut(&Note) + Send + 'static) {
        self.on_select = Some(Box::new(callback));
    }

    pub fn graph(&self) -> &NoteGraph {
        &self.graph
    }

    pub fn layout_state(&self) -> Option<&LayoutState> {
        self.state.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.state.as_ref().map(LayoutState::is_running).unwrap_or(false)
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn selected(&self) -> Option<&NoteId> {
        self.selected.as_ref()
    }

    pub fn header(&self) -> GraphHeader {
        GraphHeader {
            note_count: self.graph.stats.total_nodes,
            linked_count: self.graph.stats.linked_notes,
        }
    }

    /// Re-derive the graph from `notes`. The layout restarts only when the
    /// node set or the link multiset changed; other edits (content length,
    /// titles, stars) only refresh body radii in place.
    pub fn update(&mut self, notes: &[Note]) {
        self.notes = notes.to_vec();
        let graph = build_note_graph(notes);
        let changed = structure(&graph) != structure(&self.graph);
        self.graph = graph;

        if self.selected.as_ref().is_some_and(|id| self.graph.node(id).is_none()) {
            self.selected = None;
        }
        if changed || (self.state.is_none() && !self.graph.is_empty()) {
            self.relayout();
        } else if let Some(current) = self.state.take() {
            self.state = Some(current.refresh(&self.graph, &self.layout.params));
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if viewport != self.viewport {
            self.viewport = viewport;
            self.relayout();
        }
    }

    fn relayout(&mut self) {
        if self.graph.is_empty() {
            self.state = None;
            self.dragging = None;
            return;
        }
        let center = self.viewport.center();
        let next = match self.state {
            Some(ref current) => current.rebuild(&self.graph, center, &self.layout.params),
            None => LayoutState::from_graph(&self.graph, center, &self.layout.params),
        };
        tracing::debug!(
            nodes = self.graph.nodes.len(),
            edges = self.graph.edges.len(),
            "graph layout restarted"
        );
        self.state = Some(next);
    }

    /// Advance the simulation; returns whether it is still running.
    pub fn tick(&mut self, dt: f64) -> bool {
        match self.state.take() {
            Some(state) if state.is_running() => {
                let next = self.layout.step(&state, dt);
                let running = next.is_running();
                self.state = Some(next);
                running
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    pub fn settle(&mut self, max_ticks: usize) {
        if let Some(next) = self.state.as_ref().map(|s| self.layout.settle(s, max_ticks)) {
            self.state = Some(next);
        }
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    fn node_at(&self, screen: Point) -> Option<NoteId> {
        let state = self.state.as_ref()?;
        let world = self.transform.invert(screen);
        let padding = self.layout.params.collide_padding;
        state
            .hit_test(world, |b| b.radius - padding)
            .map(|b| b.id.clone())
    }

    /// Select the node under `screen` and hand its note to the host.
    pub fn click(&mut self, screen: Point) -> Option<Note> {
        let id = self.node_at(screen)?;
        let note = self.notes.iter().find(|n| n.id == id)?.clone();
        self.selected = Some(id);
        if let Some(callback) = self.on_select.as_mut() {
            callback(&note);
        }
        Some(note)
    }

    /// Selection driven by the host (e.g. the sidebar).
    pub fn set_selected(&mut self, id: Option<NoteId>) {
        self.selected = id.filter(|id| self.graph.node(id).is_some());
    }

    pub fn stroke_width(&self, id: &NoteId) -> f32 {
        if self.selected.as_ref() == Some(id) {
            3.0
        } else {
            1.0
        }
    }

    pub fn selected_info(&self) -> Option<NodeInfo> {
        let id = self.selected.as_ref()?;
        let node = self.graph.node(id)?;
        let note = self.notes.iter().find(|n| &n.id == id)?;
        Some(NodeInfo {
            id: id.clone(),
            title: note.display_title().to_string(),
            preview: truncate_chars(&note.content, INFO_PREVIEW_CHARS),
            connections: node.link_count,
            chars: node.content_len,
        })
    }

    // ------------------------------------------------------------------------
    // Zoom and pan
    // ------------------------------------------------------------------------

    pub fn zoom_in(&mut self) {
        self.transform = self.transform.scale_by(ZOOM_STEP, self.viewport.center());
    }

    pub fn zoom_out(&mut self) {
        self.transform = self.transform.scale_by(1.0 / ZOOM_STEP, self.viewport.center());
    }

    /// Wheel zoom about the cursor.
    pub fn zoom_at(&mut self, factor: f64, anchor: Point) {
        self.transform = self.transform.scale_by(factor, anchor);
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.transform = self.transform.translate_by(dx, dy);
    }

    pub fn reset_view(&mut self) {
        self.transform = ViewTransform::IDENTITY;
    }

    /// Unit zoom with the layout's centroid in the middle of the viewport.
    pub fn center_view(&mut self) {
        let focus = self
            .state
            .as_ref()
            .and_then(LayoutState::centroid)
            .unwrap_or_else(|| self.viewport.center());
        self.transform = ViewTransform::centered_on(focus, self.viewport.center());
    }

    pub fn zoom_percent(&self) -> u32 {
        self.transform.zoom_percent()
    }

    // ------------------------------------------------------------------------
    // Drag
    // ------------------------------------------------------------------------

    pub fn drag_start(&mut self, screen: Point) -> bool {
        let Some(id) = self.node_at(screen) else {
            return false;
        };
        let params = self.layout.params;
        let started = self
            .state
            .as_mut()
            .map(|s| s.drag_start(&id, &params))
            .unwrap_or(false);
        if started {
            self.dragging = Some(id);
        }
        started
    }

    pub fn drag_move(&mut self, screen: Point) {
        let world = self.transform.invert(screen);
        if let (Some(id), Some(state)) = (self.dragging.as_ref(), self.state.as_mut()) {
            state.drag_to(id, world);
        }
    }

    pub fn drag_end(&mut self) {
        if let (Some(id), Some(state)) = (self.dragging.take(), self.state.as_mut()) {
            state.drag_end(&id);
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    pub fn frame(&self) -> GraphFrame {
        let Some(ref state) = self.state else {
            return GraphFrame::Empty;
        };
        let positions: HashMap<&NoteId, Point> = state
            .bodies
            .iter()
            .map(|b| (&b.id, self.transform.apply(b.position())))
            .collect();

        let edges = self
            .graph
            .edges
            .iter()
            .filter_map(|e| {
                Some(EdgeLine {
                    from: *positions.get(&e.source)?,
                    to: *positions.get(&e.target)?,
                })
            })
            .collect();

        let nodes = self
            .graph
            .nodes
            .iter()
            .filter_map(|n| {
                let at = *positions.get(&n.id)?;
                let is_selected = self.selected.as_ref() == Some(&n.id);
                Some(NodeSprite {
                    id: n.id.clone(),
                    label: node_label(&n.title),
                    at,
                    radius: n.size as f64 * self.transform.k,
                    stroke_width: self.stroke_width(&n.id),
                    is_starred: n.is_starred,
                    is_selected,
                })
            })
            .collect();

        GraphFrame::Ready {
            nodes,
            edges,
            zoom_percent: self.zoom_percent(),
        }
    }
}
