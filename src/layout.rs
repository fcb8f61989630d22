//! Force-directed layout for the note graph.
//!
//! The simulation is a pure step function: [`ForceLayout::step`] takes a
//! [`LayoutState`] and returns the next one. A host drives it from its render
//! loop while [`LayoutState::is_running`] holds. Each tick applies, in order:
//!
//! 1. link springs toward a rest length,
//! 2. pairwise many-body repulsion,
//! 3. a centering shift of the whole layout,
//! 4. collision separation of node circles,
//!
//! then integrates velocities with decay. Pinned bodies (drag gestures) hold
//! their position. Zoom and pan live in [`ViewTransform`] and never touch
//! simulation coordinates.

use std::collections::HashMap;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{GraphEdge, GraphNode, NoteGraph, NoteId};

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceParams {
    /// Many-body coefficient; negative repels.
    pub charge_strength: f64,
    pub link_distance: f64,
    pub link_strength: f64,
    /// Added to a node's visual size to get its collision radius.
    pub collide_padding: f64,
    pub collide_strength: f64,
    /// Fraction of velocity lost per tick.
    pub velocity_decay: f64,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    /// Charge distances are floored at this to avoid blow-ups.
    pub distance_min: f64,
    /// Alpha target held while a node is being dragged.
    pub drag_alpha_target: f64,
}

impl Default for ForceParams {
    fn default() -> Self {
        let alpha_min: f64 = 0.001;
        Self {
            charge_strength: -300.0,
            link_distance: 100.0,
            link_strength: 0.5,
            collide_padding: 5.0,
            collide_strength: 1.0,
            velocity_decay: 0.4,
            alpha_min,
            // Cools from 1 to alpha_min in ~300 ticks
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            distance_min: 1.0,
            drag_alpha_target: 0.3,
        }
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: NoteId,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Collision radius.
    pub radius: f64,
    /// Set while the body is pinned by a drag.
    pub fixed: Option<Point>,
}

impl Body {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spring {
    pub source: usize,
    pub target: usize,
}

#[derive(Debug, Clone)]
pub struct LayoutState {
    pub bodies: Vec<Body>,
    pub springs: Vec<Spring>,
    pub alpha: f64,
    pub alpha_target: f64,
    pub center: Point,
    running: bool,
    rng: StdRng,
}

const INITIAL_RADIUS: f64 = 10.0;
const JIGGLE_SEED: u64 = 0x6b61_6972_6f;

/// Spiral placement for body `i` so new nodes never start stacked.
fn phyllotaxis(i: usize, center: Point) -> Point {
    let angle = PI * (3.0 - 5f64.sqrt());
    let radius = INITIAL_RADIUS * (0.5 + i as f64).sqrt();
    let theta = i as f64 * angle;
    Point::new(center.x + radius * theta.cos(), center.y + radius * theta.sin())
}

fn springs_for(edges: &[GraphEdge], index: &HashMap<&NoteId, usize>) -> Vec<Spring> {
    edges
        .iter()
        .filter_map(|e| {
            let source = *index.get(&e.source)?;
            let target = *index.get(&e.target)?;
            // A self-link exerts no force
            (source != target).then_some(Spring { source, target })
        })
        .collect()
}

impl LayoutState {
    pub fn new(nodes: &[GraphNode], edges: &[GraphEdge], center: Point, params: &ForceParams) -> Self {
        let bodies = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let p = phyllotaxis(i, center);
                Body {
                    id: node.id.clone(),
                    x: p.x,
                    y: p.y,
                    vx: 0.0,
                    vy: 0.0,
                    radius: node.size as f64 + params.collide_padding,
                    fixed: None,
                }
            })
            .collect::<Vec<_>>();
        let index: HashMap<&NoteId, usize> = nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect();
        let springs = springs_for(edges, &index);
        Self {
            bodies,
            springs,
            alpha: 1.0,
            alpha_target: 0.0,
            center,
            running: true,
            rng: StdRng::seed_from_u64(JIGGLE_SEED),
        }
    }

    pub fn from_graph(graph: &NoteGraph, center: Point, params: &ForceParams) -> Self {
        Self::new(&graph.nodes, &graph.edges, center, params)
    }

    /// New layout for a changed graph. Bodies whose id survives keep their
    /// position and velocity; the simulation is reheated.
    pub fn rebuild(&self, graph: &NoteGraph, center: Point, params: &ForceParams) -> Self {
        let mut next = Self::from_graph(graph, center, params);
        let previous: HashMap<&NoteId, &Body> = self.bodies.iter().map(|b| (&b.id, b)).collect();
        for body in next.bodies.iter_mut() {
            if let Some(old) = previous.get(&body.id) {
                body.x = old.x;
                body.y = old.y;
                body.vx = old.vx;
                body.vy = old.vy;
                body.fixed = old.fixed;
            }
        }
        next.alpha_target = self.alpha_target;
        next.rng = self.rng.clone();
        next
    }

    /// Same graph structure with new sizes or a new node order. Positions and
    /// the current alpha carry over, so a settled layout stays settled.
    pub fn refresh(&self, graph: &NoteGraph, params: &ForceParams) -> Self {
        let mut next = self.rebuild(graph, self.center, params);
        next.alpha = self.alpha;
        next.running = self.running;
        next
    }

    /// True until alpha cools below the minimum.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Keep ticking without resetting alpha.
    pub fn restart(&mut self) {
        self.running = true;
    }

    pub fn reheat(&mut self) {
        self.alpha = 1.0;
        self.running = true;
    }

    pub fn index_of(&self, id: &NoteId) -> Option<usize> {
        self.bodies.iter().position(|b| &b.id == id)
    }

    pub fn body(&self, id: &NoteId) -> Option<&Body> {
        self.bodies.iter().find(|b| &b.id == id)
    }

    pub fn position(&self, id: &NoteId) -> Option<Point> {
        self.body(id).map(Body::position)
    }

    /// Topmost body whose circle contains `p` (later bodies draw on top).
    pub fn hit_test(&self, p: Point, radius_of: impl Fn(&Body) -> f64) -> Option<&Body> {
        self.bodies
            .iter()
            .rev()
            .find(|b| b.position().distance(&p) <= radius_of(*b))
    }

    pub fn centroid(&self) -> Option<Point> {
        if self.bodies.is_empty() {
            return None;
        }
        let n = self.bodies.len() as f64;
        let (sx, sy) = self
            .bodies
            .iter()
            .fold((0.0, 0.0), |(sx, sy), b| (sx + b.x, sy + b.y));
        Some(Point::new(sx / n, sy / n))
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies
            .iter()
            .map(|b| b.vx * b.vx + b.vy * b.vy)
            .sum::<f64>()
            * 0.5
    }

    // ------------------------------------------------------------------------
    // Drag gestures
    // ------------------------------------------------------------------------

    /// Pin `id` where it is and warm the simulation while the gesture lasts.
    pub fn drag_start(&mut self, id: &NoteId, params: &ForceParams) -> bool {
        let Some(i) = self.index_of(id) else {
            return false;
        };
        let body = &mut self.bodies[i];
        body.fixed = Some(body.position());
        self.alpha_target = params.drag_alpha_target;
        self.restart();
        true
    }

    pub fn drag_to(&mut self, id: &NoteId, p: Point) -> bool {
        match self.index_of(id) {
            Some(i) => {
                self.bodies[i].fixed = Some(p);
                true
            }
            None => false,
        }
    }

    /// Release the pin; the body rejoins the dynamic system.
    pub fn drag_end(&mut self, id: &NoteId) -> bool {
        self.alpha_target = 0.0;
        match self.index_of(id) {
            Some(i) => {
                self.bodies[i].fixed = None;
                true
            }
            None => false,
        }
    }

    fn jiggle(&mut self) -> f64 {
        (self.rng.gen::<f64>() - 0.5) * 1e-6
    }
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ForceLayout {
    pub params: ForceParams,
}

impl ForceLayout {
    pub fn new(params: ForceParams) -> Self {
        Self { params }
    }

    /// One tick scaled by `dt` (1.0 is a nominal animation frame).
    pub fn step(&self, state: &LayoutState, dt: f64) -> LayoutState {
        let mut next = state.clone();
        if next.bodies.is_empty() || dt <= 0.0 {
            next.running = false;
            return next;
        }

        let decay = 1.0 - (1.0 - self.params.alpha_decay).powf(dt);
        next.alpha += (next.alpha_target - next.alpha) * decay;
        let alpha = next.alpha * dt;

        self.apply_links(&mut next, alpha);
        self.apply_charge(&mut next, alpha);
        apply_center(&mut next);
        self.apply_collide(&mut next);

        let keep = (1.0 - self.params.velocity_decay).powf(dt);
        for body in next.bodies.iter_mut() {
            match body.fixed {
                Some(p) => {
                    body.x = p.x;
                    body.y = p.y;
                    body.vx = 0.0;
                    body.vy = 0.0;
                }
                None => {
                    body.vx *= keep;
                    body.vy *= keep;
                    body.x += body.vx * dt;
                    body.y += body.vy * dt;
                }
            }
        }

        next.running = next.alpha >= self.params.alpha_min;
        next
    }

    /// Step until the simulation cools or `max_ticks` is reached.
    pub fn settle(&self, state: &LayoutState, max_ticks: usize) -> LayoutState {
        let mut current = state.clone();
        for _ in 0..max_ticks {
            if !current.is_running() {
                break;
            }
            current = self.step(&current, 1.0);
        }
        current
    }

    fn apply_links(&self, state: &mut LayoutState, alpha: f64) {
        let mut count = vec![0usize; state.bodies.len()];
        for s in &state.springs {
            count[s.source] += 1;
            count[s.target] += 1;
        }

        let springs = state.springs.clone();
        for s in springs {
            let (src, tgt) = (&state.bodies[s.source], &state.bodies[s.target]);
            let mut x = tgt.x + tgt.vx - src.x - src.vx;
            let mut y = tgt.y + tgt.vy - src.y - src.vy;
            if x == 0.0 {
                x = state.jiggle();
            }
            if y == 0.0 {
                y = state.jiggle();
            }
            let len = (x * x + y * y).sqrt();
            let l = (len - self.params.link_distance) / len * alpha * self.params.link_strength;
            x *= l;
            y *= l;

            let bias = count[s.source] as f64 / (count[s.source] + count[s.target]) as f64;
            let target = &mut state.bodies[s.target];
            target.vx -= x * bias;
            target.vy -= y * bias;
            let source = &mut state.bodies[s.source];
            source.vx += x * (1.0 - bias);
            source.vy += y * (1.0 - bias);
        }
    }

    fn apply_charge(&self, state: &mut LayoutState, alpha: f64) {
        let n = state.bodies.len();
        let min2 = self.params.distance_min * self.params.distance_min;
        let positions: Vec<Point> = state.bodies.iter().map(Body::position).collect();
        let mut deltas = vec![(0.0f64, 0.0f64); n];

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut x = positions[j].x - positions[i].x;
                let mut y = positions[j].y - positions[i].y;
                if x == 0.0 {
                    x = state.jiggle();
                }
                if y == 0.0 {
                    y = state.jiggle();
                }
                let mut l = x * x + y * y;
                if l < min2 {
                    l = (min2 * l).sqrt();
                }
                let w = self.params.charge_strength * alpha / l;
                deltas[i].0 += x * w;
                deltas[i].1 += y * w;
            }
        }

        for (body, (dx, dy)) in state.bodies.iter_mut().zip(deltas) {
            body.vx += dx;
            body.vy += dy;
        }
    }

    fn apply_collide(&self, state: &mut LayoutState) {
        let n = state.bodies.len();
        for i in 0..n {
            let (xi, yi, ri) = {
                let b = &state.bodies[i];
                (b.x + b.vx, b.y + b.vy, b.radius)
            };
            let ri2 = ri * ri;
            for j in (i + 1)..n {
                let (xj, yj, rj) = {
                    let b = &state.bodies[j];
                    (b.x + b.vx, b.y + b.vy, b.radius)
                };
                let r = ri + rj;
                let mut x = xi - xj;
                let mut y = yi - yj;
                let mut l = x * x + y * y;
                if l >= r * r {
                    continue;
                }
                if x == 0.0 {
                    x = state.jiggle();
                    l += x * x;
                }
                if y == 0.0 {
                    y = state.jiggle();
                    l += y * y;
                }
                let dist = l.sqrt();
                let push = (r - dist) / dist * self.params.collide_strength;
                x *= push;
                y *= push;

                let rj2 = rj * rj;
                let share = rj2 / (ri2 + rj2);
                state.bodies[i].vx += x * share;
                state.bodies[i].vy += y * share;
                state.bodies[j].vx -= x * (1.0 - share);
                state.bodies[j].vy -= y * (1.0 - share);
            }
        }
    }
}

/// Translate every body so the mean position sits on the center.
fn apply_center(state: &mut LayoutState) {
    if let Some(mean) = state.centroid() {
        let dx = mean.x - state.center.x;
        let dy = mean.y - state.center.y;
        for body in state.bodies.iter_mut() {
            body.x -= dx;
            body.y -= dy;
        }
    }
}

// ============================================================================
// View Transform
// ============================================================================

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 4.0;
pub const ZOOM_STEP: f64 = 1.5;

/// Screen = translate + k * simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub k: f64,
    pub x: f64,
    pub y: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ViewTransform {
    pub const IDENTITY: ViewTransform = ViewTransform { k: 1.0, x: 0.0, y: 0.0 };

    pub fn apply(&self, p: Point) -> Point {
        Point::new(self.x + self.k * p.x, self.y + self.k * p.y)
    }

    pub fn invert(&self, screen: Point) -> Point {
        Point::new((screen.x - self.x) / self.k, (screen.y - self.y) / self.k)
    }

    /// Scale by `factor`, clamped, keeping the simulation point under
    /// `anchor` fixed on screen.
    pub fn scale_by(&self, factor: f64, anchor: Point) -> Self {
        let k = (self.k * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let world = self.invert(anchor);
        Self {
            k,
            x: anchor.x - k * world.x,
            y: anchor.y - k * world.y,
        }
    }

    pub fn translate_by(&self, dx: f64, dy: f64) -> Self {
        Self {
            k: self.k,
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Unit scale with `focus` drawn at `screen`.
    pub fn centered_on(focus: Point, screen: Point) -> Self {
        Self {
            k: 1.0,
            x: screen.x - focus.x,
            y: screen.y - focus.y,
        }
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.k * 100.0).round() as u32
    }
}

#[cfg(test)]
#[path = "layout_test.rs"]
mod tests;
