//! Call graph over the functions of a description.
//!
//! Each function body is scanned for call sites; every site is resolved to
//! zero or more entry ids, first through the type checker and then by name
//! with an arity filter. The result is held in a petgraph `DiGraph` whose
//! edges point from caller to callee.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use super::callsites::{extract_call_sites, ArgumentKind, CallSite};
use crate::models::{ApiDescription, ApiEntry, FunctionEntry, ParameterKind};
use crate::typing::TypeChecker;

/// A call site with the entries it may reach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedCall {
    pub site: CallSite,
    pub targets: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CallGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    calls: IndexMap<String, Vec<ResolvedCall>>,
}

impl CallGraph {
    /// Scan every function with source text and resolve its call sites.
    pub fn build(description: &ApiDescription, checker: Option<&dyn TypeChecker>) -> Self {
        let mut graph = CallGraph::default();
        for func in description.functions() {
            graph.node(&func.base.id);
            if func.base.src.is_empty() {
                continue;
            }
            let sites = match extract_call_sites(&func.base.src) {
                Ok(sites) => sites,
                Err(e) => {
                    tracing::warn!(entry = %func.base.id, error = %e, "Failed to parse function source");
                    continue;
                }
            };
            tracing::debug!(entry = %func.base.id, sites = sites.len(), "Visited call sites");

            let mut resolved = Vec::with_capacity(sites.len());
            for site in sites {
                let targets = resolve_site(description, checker, func, &site);
                for target in &targets {
                    graph.add_edge(&func.base.id, target);
                }
                resolved.push(ResolvedCall { site, targets });
            }
            graph.calls.insert(func.base.id.clone(), resolved);
        }
        graph
    }

    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.nodes.insert(id.to_string(), idx);
        idx
    }

    fn add_edge(&mut self, caller: &str, callee: &str) {
        let a = self.node(caller);
        let b = self.node(callee);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Resolved call sites of a function, in source order.
    pub fn calls(&self, caller: &str) -> &[ResolvedCall] {
        self.calls.get(caller).map(Vec::as_slice).unwrap_or_default()
    }

    /// Functions that have call sites recorded.
    pub fn callers_with_calls(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        // petgraph yields neighbors newest first.
        ids.reverse();
        ids
    }

    pub fn callees(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    pub fn callers(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Write `callees` into every function, then recompute `callers`.
    pub fn apply(&self, description: &mut ApiDescription) {
        for entry in description.entries_mut() {
            if let ApiEntry::Function(func) = entry {
                func.callees = self
                    .callees(&func.base.id)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
            }
        }
        description.calc_callers();
    }
}

fn resolve_site(
    description: &ApiDescription,
    checker: Option<&dyn TypeChecker>,
    caller: &FunctionEntry,
    site: &CallSite,
) -> Vec<String> {
    let Some(name) = site.target.as_deref() else {
        return Vec::new();
    };

    if let Some(target) = checker.and_then(|c| c.target_of(caller, site)) {
        return vec![constructor_of(description, target)];
    }

    let mut candidates = Vec::new();
    for entry in description.by_name(name) {
        match entry {
            ApiEntry::Class(_) => {
                let init = constructor_of(description, entry.id().to_string());
                match description.get(&init).and_then(ApiEntry::as_function) {
                    Some(func) if !accepts(func, site) => {}
                    _ => candidates.push(init),
                }
            }
            ApiEntry::Function(func) if accepts(func, site) => {
                candidates.push(func.base.id.clone());
            }
            _ => {}
        }
    }
    candidates.into_iter().collect::<IndexSet<_>>().into_iter().collect()
}

/// Rewrite a class target to its constructor.
fn constructor_of(description: &ApiDescription, target: String) -> String {
    match description.get(&target) {
        Some(ApiEntry::Class(cls)) => match description.resolve_class_member(cls, "__init__") {
            Some(init) if description.contains(init.id()) => init.id().to_string(),
            _ => format!("{}.__init__", target),
        },
        _ => target,
    }
}

/// Whether `func` can accept the arguments of `site`.
pub fn accepts(func: &FunctionEntry, site: &CallSite) -> bool {
    let offset = usize::from(func.is_bound());
    let positionals = func.positionals().count();
    let var_positional = func.var_positional().is_some();
    let var_keyword = func.var_keyword().is_some();

    let mut passed: Vec<&str> = Vec::new();
    let mut index = offset;
    for arg in &site.arguments {
        match arg.kind {
            ArgumentKind::Positional => {
                if index >= positionals && !var_positional {
                    return false;
                }
                if let Some(p) = func.positionals().nth(index) {
                    passed.push(&p.name);
                }
                index += 1;
            }
            ArgumentKind::Keyword => {
                let Some(name) = arg.name.as_deref() else {
                    continue;
                };
                let known = func
                    .parameter(name)
                    .is_some_and(|p| p.is_keyword() && p.kind != ParameterKind::VarKeywordCandidate);
                if !known && !var_keyword {
                    return false;
                }
                passed.push(name);
            }
            ArgumentKind::Splat | ArgumentKind::KeywordSplat => return true,
        }
    }

    let positional_missing = func
        .positionals()
        .skip(offset)
        .any(|p| !p.optional && !passed.contains(&p.name.as_str()));
    if positional_missing {
        return false;
    }
    func.parameters
        .iter()
        .filter(|p| p.kind == ParameterKind::Keyword && !p.optional)
        .all(|p| passed.contains(&p.name.as_str()))
}
