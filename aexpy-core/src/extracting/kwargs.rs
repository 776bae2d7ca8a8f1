//! Keyword arguments accepted through `**kwargs`.
//!
//! Two sources of evidence: direct lookups of literal keys on the variadic
//! keyword parameter inside the body, and forwarding `f(**kwargs)` to a
//! callee whose keyword parameters then become reachable from the caller.

use std::collections::BTreeSet;

use super::callgraph::CallGraph;
use super::source::{get_node_text, parse_function, string_literal, walk_tree};
use crate::error::Result;
use crate::models::{ApiDescription, ApiEntry, FunctionEntry, FunctionFlag, Parameter, ParameterKind};

const LOOKUP_METHODS: &[&str] = &["get", "pop", "setdefault"];

/// Literal keys read from `kw_name` in a function body: `kw["x"]`,
/// `kw.get("x", ...)`, `kw.pop("x", ...)`, `kw.setdefault("x", ...)`.
pub fn kwargs_keys(src: &str, kw_name: &str) -> Result<BTreeSet<String>> {
    let (source, tree) = parse_function(src)?;
    let mut keys = BTreeSet::new();
    walk_tree(tree.root_node(), &mut |node| match node.kind() {
        "subscript" => {
            let value = node.child_by_field_name("value");
            let key = node.child_by_field_name("subscript");
            if let (Some(value), Some(key)) = (value, key) {
                if value.kind() == "identifier" && get_node_text(&value, &source) == kw_name {
                    if let Some(key) = string_literal(&key, &source) {
                        keys.insert(key);
                    }
                }
            }
        }
        "call" => {
            let Some(function) = node.child_by_field_name("function") else {
                return;
            };
            if function.kind() != "attribute" {
                return;
            }
            let object = function.child_by_field_name("object");
            let method = function.child_by_field_name("attribute");
            let (Some(object), Some(method)) = (object, method) else {
                return;
            };
            if object.kind() != "identifier"
                || get_node_text(&object, &source) != kw_name
                || !LOOKUP_METHODS.contains(&get_node_text(&method, &source))
            {
                return;
            }
            let first = node
                .child_by_field_name("arguments")
                .and_then(|args| args.named_child(0));
            if let Some(key) = first.and_then(|k| string_literal(&k, &source)) {
                keys.insert(key);
            }
        }
        _ => {}
    });
    Ok(keys)
}

/// Insert a candidate before the variadic keyword parameter, keeping the
/// canonical parameter order.
pub fn insert_candidate(func: &mut FunctionEntry, candidate: Parameter) {
    let position = func
        .parameters
        .iter()
        .position(|p| p.kind == ParameterKind::VarKeyword)
        .unwrap_or(func.parameters.len());
    func.parameters.insert(position, candidate);
}

fn candidate(name: &str, source: &str) -> Parameter {
    Parameter {
        optional: true,
        source: source.to_string(),
        ..Parameter::new(ParameterKind::VarKeywordCandidate, name)
    }
}

/// Add `VarKeywordCandidate` parameters to every function taking `**kwargs`.
/// Returns the number of candidates added.
pub fn enrich_kwargs(description: &mut ApiDescription, graph: &CallGraph) -> usize {
    let mut added = 0;

    // Direct key lookups.
    let mut direct: Vec<(String, String)> = Vec::new();
    for func in description.functions() {
        let Some(kw) = func.var_keyword() else {
            continue;
        };
        if func.base.src.is_empty() {
            continue;
        }
        match kwargs_keys(&func.base.src, &kw.name) {
            Ok(keys) => {
                for key in keys {
                    if func.parameter(&key).is_none() {
                        direct.push((func.base.id.clone(), key));
                    }
                }
            }
            Err(e) => tracing::warn!(entry = %func.base.id, error = %e, "Failed to parse function source"),
        }
    }
    for (id, key) in direct {
        if let Some(func) = description.get_mut(&id).and_then(ApiEntry::as_function_mut) {
            let param = candidate(&key, &id);
            insert_candidate(func, param);
            added += 1;
        }
    }

    // Forwarding through the call graph, until a full pass adds nothing.
    loop {
        let mut imports: Vec<(String, Parameter)> = Vec::new();
        for caller_id in graph.callers_with_calls() {
            let Some(caller) = description.get(caller_id).and_then(ApiEntry::as_function) else {
                continue;
            };
            let Some(kw) = caller.var_keyword() else {
                continue;
            };
            for call in graph.calls(caller_id) {
                if !call.site.forwards_kwargs(&kw.name) {
                    continue;
                }
                let supplied: Vec<&str> = call.site.keywords().collect();
                for target in &call.targets {
                    let Some(callee) = description.get(target).and_then(ApiEntry::as_function) else {
                        continue;
                    };
                    let skip = usize::from(callee.is_bound()) + call.site.positional_count();
                    let positional_filled: Vec<&str> = callee
                        .positionals()
                        .take(skip)
                        .map(|p| p.name.as_str())
                        .collect();
                    for param in callee.keywords() {
                        let name = param.name.as_str();
                        if supplied.contains(&name)
                            || positional_filled.contains(&name)
                            || caller.parameter(name).is_some()
                            || imports.iter().any(|(id, p)| id == caller_id && p.name == name)
                        {
                            continue;
                        }
                        let source = if param.source.is_empty() {
                            callee.base.id.as_str()
                        } else {
                            param.source.as_str()
                        };
                        let mut imported = candidate(name, source);
                        imported.annotation = param.annotation.clone();
                        imported.r#type = param.r#type.clone();
                        imports.push((caller_id.to_string(), imported));
                    }
                }
            }
        }

        if imports.is_empty() {
            break;
        }
        for (id, param) in imports {
            if let Some(func) = description.get_mut(&id).and_then(ApiEntry::as_function_mut) {
                tracing::debug!(entry = %id, parameter = %param.name, source = %param.source, "Imported forwarded keyword");
                func.set_flag(FunctionFlag::TransmitKwargs);
                insert_candidate(func, param);
                added += 1;
            }
        }
    }
    added
}
