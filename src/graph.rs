// src/graph.rs

//! Dependency graph for install ordering
//!
//! Nodes are formulas; a `build` dependency is an ordering edge (the
//! dependency installs first), a `runtime` dependency is only a presence
//! requirement. Every node carries a declaration index, the order in which a
//! breadth-first walk from the target first meets it, and Kahn's algorithm
//! always takes the ready node with the lowest index so repeated runs produce
//! the same order.
//!
//! # Example
//!
//! ```ignore
//! use formulary::graph::DependencyGraph;
//!
//! let graph = DependencyGraph::from_closure(&resolution.target, &resolution.formulas)?;
//! let order = graph.install_order()?;
//! // dependencies first, target last
//! ```

use crate::error::{Error, Result};
use crate::formula::{Dependency, DependencyKind, Formula};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A directed graph of formula dependencies
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Display names, indexed by declaration order
    names: Vec<String>,
    /// Lowercased name -> node index
    index: HashMap<String, usize>,
    /// Nodes that have been added as formulas (not just referenced)
    defined: HashSet<usize>,
    /// Outgoing edges: node -> its dependencies, in declared order
    edges: Vec<Vec<(usize, DependencyKind)>>,
    /// Reverse build edges: node -> formulas that must wait for it
    reverse_build: Vec<Vec<usize>>,
    /// The formula the graph was built for, installed last
    target: Option<usize>,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a target from its resolved closure
    ///
    /// `formulas` is keyed by lowercased name. Any dependency that does not
    /// resolve fails with `MissingDependency`.
    pub fn from_closure(target: &Formula, formulas: &HashMap<String, Arc<Formula>>) -> Result<Self> {
        let mut graph = Self::new();
        let mut queue: VecDeque<&Formula> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();

        seen.insert(target.key());
        queue.push_back(target);

        while let Some(formula) = queue.pop_front() {
            graph.add_formula(&formula.name, &formula.dependencies);

            for dep in &formula.dependencies {
                let key = dep.name.to_lowercase();
                if !seen.insert(key.clone()) {
                    continue;
                }
                let resolved = formulas.get(&key).ok_or_else(|| Error::MissingDependency {
                    name: dep.name.clone(),
                    required_by: formula.name.clone(),
                })?;
                queue.push_back(resolved);
            }
        }

        graph.target = Some(0);
        Ok(graph)
    }

    /// Add a formula with its dependencies
    ///
    /// Dependencies not yet in the graph are added as referenced nodes; adding
    /// the same formula twice merges its dependencies.
    pub fn add_formula(&mut self, name: &str, dependencies: &[Dependency]) {
        let node = self.node(name);
        // The formula's own spelling wins over how dependents referred to it
        self.names[node] = name.to_string();
        self.defined.insert(node);

        for dep in dependencies {
            let target = self.node(&dep.name);
            if let Some(existing) = self.edges[node].iter_mut().find(|(t, _)| *t == target) {
                if dep.kind == DependencyKind::Build && existing.1 != DependencyKind::Build {
                    existing.1 = DependencyKind::Build;
                    self.reverse_build[target].push(node);
                }
                continue;
            }

            self.edges[node].push((target, dep.kind));
            if dep.kind == DependencyKind::Build {
                self.reverse_build[target].push(node);
            }
        }
    }

    fn node(&mut self, name: &str) -> usize {
        let key = name.to_lowercase();
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(key, i);
        self.edges.push(Vec::new());
        self.reverse_build.push(Vec::new());
        i
    }

    /// Name of the target, if the graph was built from a closure
    pub fn target(&self) -> Option<&str> {
        self.target.map(|i| self.names[i].as_str())
    }

    /// Number of formulas in the graph
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check if a formula exists in the graph
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Referenced names that were never added as formulas
    pub fn undefined(&self) -> Vec<&str> {
        (0..self.names.len())
            .filter(|i| !self.defined.contains(i))
            .map(|i| self.names[i].as_str())
            .collect()
    }

    /// Direct dependencies of a formula, in declared order
    pub fn dependencies(&self, name: &str) -> Vec<(&str, DependencyKind)> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| {
                self.edges[i]
                    .iter()
                    .map(|&(t, kind)| (self.names[t].as_str(), kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Formulas whose install must wait for this one
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| {
                self.reverse_build[i]
                    .iter()
                    .map(|&d| self.names[d].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `(dependent, dependency)` pairs that must be present after install
    pub fn runtime_requirements(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (node, deps) in self.edges.iter().enumerate() {
            for &(target, kind) in deps {
                if kind == DependencyKind::Runtime {
                    out.push((self.names[node].as_str(), self.names[target].as_str()));
                }
            }
        }
        out
    }

    /// Compute the install order using Kahn's algorithm
    ///
    /// Every build dependency precedes its dependent; formulas with no
    /// ordering constraint between them keep declaration order. The target,
    /// when known, is always last. Fails with
    /// `CyclicDependency` if any dependency edge (build or runtime) forms a
    /// cycle, and with `MissingDependency` if a referenced formula was never
    /// added.
    pub fn install_order(&self) -> Result<Vec<String>> {
        if let Some(&missing) = self.undefined().first() {
            let required_by = (0..self.names.len())
                .find(|&i| {
                    self.edges[i]
                        .iter()
                        .any(|&(t, _)| self.names[t].eq_ignore_ascii_case(missing))
                })
                .map(|i| self.names[i].clone())
                .unwrap_or_default();
            return Err(Error::MissingDependency {
                name: missing.to_string(),
                required_by,
            });
        }

        if let Some(cycle) = self.find_cycles().into_iter().next() {
            return Err(Error::CyclicDependency { cycle });
        }

        let mut in_degrees: Vec<usize> = self
            .edges
            .iter()
            .map(|deps| {
                deps.iter()
                    .filter(|(_, kind)| *kind == DependencyKind::Build)
                    .count()
            })
            .collect();

        // Ready nodes ordered by declaration index
        let mut ready: BTreeSet<usize> = in_degrees
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut result = Vec::with_capacity(self.names.len());
        while let Some(node) = ready.pop_first() {
            result.push(self.names[node].clone());

            for &dependent in &self.reverse_build[node] {
                let deg = &mut in_degrees[dependent];
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    ready.insert(dependent);
                }
            }
        }

        // Nothing can build-depend on the target without a cycle
        if let Some(target) = self.target
            && let Some(pos) = result.iter().position(|n| *n == self.names[target])
        {
            let name = result.remove(pos);
            result.push(name);
        }

        if result.len() != self.names.len() {
            // Only reachable if find_cycles missed a cycle
            let remaining: Vec<String> = self
                .names
                .iter()
                .filter(|n| !result.contains(n))
                .cloned()
                .collect();
            return Err(Error::CyclicDependency { cycle: remaining });
        }

        Ok(result)
    }

    /// Find cycles over all dependency edges
    ///
    /// Each cycle is returned closed, e.g. `["a", "b", "a"]`.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = vec![false; self.names.len()];
        let mut on_stack = vec![false; self.names.len()];
        let mut path = Vec::new();

        for start in 0..self.names.len() {
            if !visited[start] {
                self.find_cycles_dfs(start, &mut visited, &mut on_stack, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn find_cycles_dfs(
        &self,
        node: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        path: &mut Vec<usize>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited[node] = true;
        on_stack[node] = true;
        path.push(node);

        for &(dep, _) in &self.edges[node] {
            if !visited[dep] {
                self.find_cycles_dfs(dep, visited, on_stack, path, cycles);
            } else if on_stack[dep]
                && let Some(start) = path.iter().position(|&x| x == dep)
            {
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&i| self.names[i].clone()).collect();
                cycle.push(self.names[dep].clone());
                cycles.push(cycle);
            }
        }

        path.pop();
        on_stack[node] = false;
    }

    /// All formulas a given formula transitively depends on
    pub fn transitive_dependencies(&self, name: &str) -> HashSet<String> {
        let mut deps = HashSet::new();
        let Some(&start) = self.index.get(&name.to_lowercase()) else {
            return deps;
        };

        let mut queue: VecDeque<usize> = self.edges[start].iter().map(|&(t, _)| t).collect();
        while let Some(dep) = queue.pop_front() {
            if deps.insert(self.names[dep].clone()) {
                queue.extend(self.edges[dep].iter().map(|&(t, _)| t));
            }
        }

        deps.remove(&self.names[start]);
        deps
    }
}
