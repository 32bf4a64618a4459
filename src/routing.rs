//! Shortest paths over the road network.

use crate::network::RoadNetwork;
use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    cost: f64,
    node: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute the shortest path from `start` to `end` by road weight.
///
/// The returned sequence starts at the first hop and ends at `end`; `start`
/// itself is not included. It is empty when `start == end`, when `end` is
/// unreachable, or when either node is outside the network.
pub fn find_path(network: &RoadNetwork, start: usize, end: usize) -> Vec<usize> {
    let n_nodes = network.node_count();
    if start >= n_nodes {
        log::warn!("invalid start node {start} (network has {n_nodes} nodes)");
        return Vec::new();
    }
    if end >= n_nodes {
        log::warn!("invalid end node {end} (network has {n_nodes} nodes)");
        return Vec::new();
    }
    if start == end {
        return Vec::new();
    }

    let mut dist = vec![f64::INFINITY; n_nodes];
    let mut came_from: Vec<Option<usize>> = vec![None; n_nodes];
    let mut frontier = BinaryHeap::new();

    dist[start] = 0.0;
    frontier.push(Reverse(Frontier {
        cost: 0.0,
        node: start,
    }));

    while let Some(Reverse(Frontier { cost, node })) = frontier.pop() {
        if node == end {
            break;
        }
        // Stale entry.
        if cost > dist[node] {
            continue;
        }
        for (next, weight) in network.neighbors(node) {
            let new_cost = cost + weight;
            if new_cost < dist[next] {
                dist[next] = new_cost;
                came_from[next] = Some(node);
                frontier.push(Reverse(Frontier {
                    cost: new_cost,
                    node: next,
                }));
            }
        }
    }

    if came_from[end].is_none() {
        return Vec::new();
    }

    let mut path = vec![end];
    let mut node = end;
    while let Some(prev) = came_from[node] {
        if prev == start {
            break;
        }
        path.push(prev);
        node = prev;
    }
    path.reverse();
    path
}

/// Memo of shortest paths keyed by `(origin, destination)`.
///
/// Entries are never evicted: the network is static, so a cached path stays
/// valid for the whole run, and the cache grows with the number of distinct
/// trips taken.
#[derive(Debug, Default)]
pub struct PathCache {
    paths: HashMap<(usize, usize), Vec<usize>>,
    hits: usize,
    misses: usize,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of the path from `origin` to `destination`, computing
    /// and storing it on first request.
    pub fn get_or_compute(
        &mut self,
        network: &RoadNetwork,
        origin: usize,
        destination: usize,
    ) -> Vec<usize> {
        if let Some(path) = self.paths.get(&(origin, destination)) {
            self.hits += 1;
            return path.clone();
        }
        self.misses += 1;
        let path = find_path(network, origin, destination);
        self.paths.insert((origin, destination), path.clone());
        path
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
