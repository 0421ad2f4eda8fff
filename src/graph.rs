//! Directed graphs over dense vertex indices, with Kosaraju's strongly
//! connected components and a deterministic topological sort.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DirectedGraph {
    successors: Vec<BTreeSet<usize>>,
}

impl DirectedGraph {
    pub(crate) fn new(vertices: usize) -> Self {
        Self {
            successors: vec![BTreeSet::new(); vertices],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.successors.len()
    }

    /// Adds `from -> to`. Parallel edges collapse into one.
    pub(crate) fn add_edge(&mut self, from: usize, to: usize) {
        assert!(to < self.len(), "edge target {to} is not a vertex");
        self.successors[from].insert(to);
    }

    pub(crate) fn successors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.successors[vertex].iter().copied()
    }

    /// The same graph with every edge reversed.
    pub(crate) fn transpose(&self) -> Self {
        let mut transposed = Self::new(self.len());
        for (from, successors) in self.successors.iter().enumerate() {
            for &to in successors {
                transposed.add_edge(to, from);
            }
        }
        transposed
    }

    /// Strongly connected components, sources first: when an edge leads from
    /// one component to another, the first one comes earlier in the list.
    pub(crate) fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.len()];
        let mut order = Vec::with_capacity(self.len());
        for vertex in 0..self.len() {
            self.finish_order(&mut visited, &mut order, vertex);
        }

        let transposed = self.transpose();
        let mut assigned = vec![false; self.len()];
        let mut components = Vec::new();
        for &vertex in order.iter().rev() {
            if !assigned[vertex] {
                let mut component = Vec::new();
                transposed.collect_component(&mut assigned, &mut component, vertex);
                component.sort_unstable();
                components.push(component);
            }
        }
        components
    }

    // First Kosaraju pass: post-order of a depth-first walk.
    fn finish_order(&self, visited: &mut [bool], order: &mut Vec<usize>, root: usize) {
        if visited[root] {
            return;
        }
        visited[root] = true;
        let mut stack = vec![(root, self.successors(root))];
        while let Some((vertex, successors)) = stack.last_mut() {
            match successors.find(|successor| !visited[*successor]) {
                Some(successor) => {
                    visited[successor] = true;
                    stack.push((successor, self.successors(successor)));
                }
                None => {
                    order.push(*vertex);
                    stack.pop();
                }
            }
        }
    }

    // Second Kosaraju pass, run on the transposed graph.
    fn collect_component(&self, assigned: &mut [bool], component: &mut Vec<usize>, root: usize) {
        if assigned[root] {
            return;
        }
        assigned[root] = true;
        let mut stack = vec![root];
        while let Some(vertex) = stack.pop() {
            component.push(vertex);
            for successor in self.successors(vertex) {
                if !assigned[successor] {
                    assigned[successor] = true;
                    stack.push(successor);
                }
            }
        }
    }

    /// One vertex per component, with an edge wherever this graph
    /// has an edge between two different components.
    pub(crate) fn condensation(&self, components: &[Vec<usize>]) -> Self {
        let mut component_of = vec![0; self.len()];
        for (index, component) in components.iter().enumerate() {
            for &vertex in component {
                component_of[vertex] = index;
            }
        }

        let mut condensed = Self::new(components.len());
        for (from, successors) in self.successors.iter().enumerate() {
            for &to in successors {
                if component_of[from] != component_of[to] {
                    condensed.add_edge(component_of[from], component_of[to]);
                }
            }
        }
        condensed
    }

    /// Kahn's algorithm, always releasing the smallest ready vertex first.
    ///
    /// Vertices on a cycle never become ready and are left out, so the result
    /// covers every vertex only when the graph is acyclic.
    pub(crate) fn topological_order(&self) -> Vec<usize> {
        let mut in_degree = vec![0_usize; self.len()];
        for successors in &self.successors {
            for &to in successors {
                in_degree[to] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(vertex, _)| Reverse(vertex))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(vertex)) = ready.pop() {
            order.push(vertex);
            for successor in self.successors(vertex) {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    ready.push(Reverse(successor));
                }
            }
        }
        order
    }
}
