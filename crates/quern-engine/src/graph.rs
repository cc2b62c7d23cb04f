//! In-flight dependency graph with cycle rejection
//!
//! Tracks the origin → destination edges of every outstanding request.
//! Edges are reference-counted runtime state, added before a child is
//! dispatched and removed after it resolves, so the graph always
//! over-approximates the live dependency relation. An edge that would close
//! a cycle is rejected and the graph left untouched.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::{EngineError, Result};
use crate::fingerprint::Fingerprint;

/// Cheap, owned rendering of a key for cycle diagnostics.
///
/// The graph never holds key objects themselves; only fingerprints and
/// these handles survive across suspension points.
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub name: String,
    pub rendering: String,
}

impl KeyHandle {
    pub fn new(name: impl Into<String>, rendering: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rendering: rendering.into(),
        }
    }
}

#[derive(Default)]
struct GraphState {
    /// Known edges, origin → destinations.
    edges: HashMap<Fingerprint, HashSet<Fingerprint>>,
    /// Outstanding request count per edge.
    active: HashMap<(Fingerprint, Fingerprint), usize>,
    /// Renderings for diagnostics.
    known: HashMap<Fingerprint, KeyHandle>,
}

/// Tracks active dependency edges between in-flight keys.
#[derive(Default)]
pub struct KeyDependencyGraph {
    state: Mutex<GraphState>,
}

impl KeyDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outstanding `origin → dest` request.
    ///
    /// Re-adding a known edge only bumps its reference count. A new edge is
    /// first checked for reachability from `dest` back to `origin`; if a
    /// path exists the call fails with the offending key renderings and the
    /// graph is left exactly as it was.
    pub fn add_edge(
        &self,
        origin: Fingerprint,
        origin_handle: KeyHandle,
        dest: Fingerprint,
        dest_handle: KeyHandle,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.known.entry(origin).or_insert(origin_handle);
        state.known.entry(dest).or_insert(dest_handle);

        *state.active.entry((origin, dest)).or_insert(0) += 1;
        if state
            .edges
            .get(&origin)
            .map(|targets| targets.contains(&dest))
            .unwrap_or(false)
        {
            return Ok(());
        }

        if let Some(path) = find_path(&state.edges, dest, origin) {
            // Roll the count back; a rejected edge leaves no trace.
            let remaining = state
                .active
                .get_mut(&(origin, dest))
                .map(|count| {
                    *count -= 1;
                    *count
                })
                .unwrap_or(0);
            if remaining == 0 {
                state.active.remove(&(origin, dest));
            }
            let mut rendered = Vec::with_capacity(path.len() + 1);
            rendered.push(render(&state.known, origin));
            rendered.extend(path.iter().map(|fp| render(&state.known, *fp)));
            return Err(EngineError::CycleDetected(rendered));
        }

        state.edges.entry(origin).or_default().insert(dest);
        Ok(())
    }

    /// Release one outstanding request along `origin → dest`. The edge
    /// disappears when its count reaches zero.
    pub fn remove_edge(&self, origin: Fingerprint, dest: Fingerprint) {
        let mut state = self.state.lock();
        let remaining = state.active.get_mut(&(origin, dest)).map(|count| {
            *count = count.saturating_sub(1);
            *count
        });
        match remaining {
            None => {
                log::warn!("remove_edge on unknown edge {:?} -> {:?}", origin, dest);
            }
            Some(0) => {
                state.active.remove(&(origin, dest));
                if let Some(targets) = state.edges.get_mut(&origin) {
                    targets.remove(&dest);
                    if targets.is_empty() {
                        state.edges.remove(&origin);
                    }
                }
            }
            Some(_) => {}
        }
    }

    /// Total outstanding requests across all edges.
    pub fn active_edge_count(&self) -> usize {
        self.state.lock().active.values().sum()
    }
}

fn render(known: &HashMap<Fingerprint, KeyHandle>, fp: Fingerprint) -> String {
    known
        .get(&fp)
        .map(|handle| handle.rendering.clone())
        .unwrap_or_else(|| fp.to_string())
}

/// Iterative DFS from `from` to `to`; returns the first path found.
///
/// Detection only: the path is not necessarily the shortest cycle. The
/// explicit stack interleaves a sentinel after each expanded node so the
/// current-path trail pops exactly when that node's subtree is exhausted.
fn find_path(
    edges: &HashMap<Fingerprint, HashSet<Fingerprint>>,
    from: Fingerprint,
    to: Fingerprint,
) -> Option<Vec<Fingerprint>> {
    let mut stack: Vec<Option<Fingerprint>> = vec![Some(from)];
    let mut trail: Vec<Fingerprint> = Vec::new();
    let mut visited: HashSet<Fingerprint> = HashSet::new();

    while let Some(entry) = stack.pop() {
        let Some(node) = entry else {
            trail.pop();
            continue;
        };
        if !visited.insert(node) {
            continue;
        }
        trail.push(node);
        if node == to {
            return Some(trail);
        }
        stack.push(None);
        if let Some(targets) = edges.get(&node) {
            for next in targets {
                if !visited.contains(next) {
                    stack.push(Some(*next));
                }
            }
        }
    }
    None
}
