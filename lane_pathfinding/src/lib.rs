//! Generic graph search over sparse strategic maps.
//!
//! `Node`: node identifiers (e.g. SystemId).
//! `Ctx`: context passed to cost callbacks (e.g. the game state plus the
//! faction doing the traveling), so edge costs can depend on who moves.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::hash::Hash;

/// A searchable graph with context-dependent edge costs.
pub trait Graph<Node, Ctx> {
    /// Neighbors of a node, in a deterministic order.
    fn neighbors(&self, node: Node, context: &Ctx) -> Vec<Node>;

    /// Cost to traverse the edge `from → to`. Return `None` if the edge is
    /// impassable for this context (e.g. a restricted lane and a crippled
    /// traveler).
    fn cost(&self, from: Node, to: Node, context: &Ctx) -> Option<u32>;

    /// Admissible estimate of the remaining cost from `from` to `target`.
    fn heuristic(&self, from: Node, target: Node, context: &Ctx) -> u32;
}

/// Shortest path from `start` to `goal`, as `(nodes, total_cost)`.
///
/// The returned path includes both endpoints. Returns `None` when the goal
/// is unreachable under the given context.
pub fn find_path<Node, Ctx, G>(
    graph: &G,
    start: Node,
    goal: Node,
    context: &Ctx,
) -> Option<(Vec<Node>, u32)>
where
    Node: Copy + Eq + Hash + Ord,
    G: Graph<Node, Ctx>,
{
    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<Node, Node> = HashMap::new();
    let mut g_score: HashMap<Node, u32> = HashMap::new();
    let mut closed_set: HashSet<Node> = HashSet::new();

    g_score.insert(start, 0);
    open_set.push(QueueEntry {
        node: start,
        priority: graph.heuristic(start, goal, context),
    });

    while let Some(QueueEntry { node: current, .. }) = open_set.pop() {
        // Skip if already expanded with a better path
        if !closed_set.insert(current) {
            continue;
        }

        if current == goal {
            let mut path = vec![current];
            let mut curr = current;
            while let Some(&prev) = came_from.get(&curr) {
                path.push(prev);
                curr = prev;
            }
            path.reverse();
            return Some((path, g_score[&goal]));
        }

        let current_g = g_score[&current];

        for neighbor in graph.neighbors(current, context) {
            if closed_set.contains(&neighbor) {
                continue;
            }
            let Some(edge_cost) = graph.cost(current, neighbor, context) else {
                continue;
            };
            let tentative_g = current_g.saturating_add(edge_cost);

            if tentative_g < *g_score.get(&neighbor).unwrap_or(&u32::MAX) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative_g);
                open_set.push(QueueEntry {
                    node: neighbor,
                    priority: tentative_g + graph.heuristic(neighbor, goal, context),
                });
            }
        }
    }

    None
}

/// All nodes reachable from `start` within `budget` total cost, with their
/// cheapest costs. Includes `start` at cost 0.
///
/// Bounded Dijkstra; used for per-turn movement ranges and "jumps from
/// source" distance checks.
pub fn reachable_within<Node, Ctx, G>(
    graph: &G,
    start: Node,
    budget: u32,
    context: &Ctx,
) -> HashMap<Node, u32>
where
    Node: Copy + Eq + Hash + Ord,
    G: Graph<Node, Ctx>,
{
    let mut best: HashMap<Node, u32> = HashMap::new();
    let mut open_set = BinaryHeap::new();

    best.insert(start, 0);
    open_set.push(QueueEntry {
        node: start,
        priority: 0,
    });

    while let Some(QueueEntry {
        node: current,
        priority: cost,
    }) = open_set.pop()
    {
        if cost > *best.get(&current).unwrap_or(&u32::MAX) {
            continue; // Stale queue entry
        }

        for neighbor in graph.neighbors(current, context) {
            let Some(edge_cost) = graph.cost(current, neighbor, context) else {
                continue;
            };
            let total = cost.saturating_add(edge_cost);
            if total > budget {
                continue;
            }
            if total < *best.get(&neighbor).unwrap_or(&u32::MAX) {
                best.insert(neighbor, total);
                open_set.push(QueueEntry {
                    node: neighbor,
                    priority: total,
                });
            }
        }
    }

    best
}

/// Priority-queue entry. Min-heap on priority, ties broken by node order so
/// searches are deterministic regardless of insertion order.
#[derive(Copy, Clone, Eq, PartialEq)]
struct QueueEntry<Node> {
    node: Node,
    priority: u32,
}

impl<Node: Eq + Ord> Ord for QueueEntry<Node> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior on BinaryHeap
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl<Node: Eq + Ord> PartialOrd for QueueEntry<Node> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
