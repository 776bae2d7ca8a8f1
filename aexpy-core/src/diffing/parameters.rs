//! Signature changes: parameters paired between two versions of a function.

use std::collections::HashSet;

use serde_json::json;

use super::{is_function, Constraint, DiffContext};
use crate::error::Result;
use crate::models::{ApiEntry, DiffEntry, FunctionEntry, Parameter, ParameterKind};

/// Parameter pairs of the same function in two versions.
pub type ParameterPair<'a> = (Option<&'a Parameter>, Option<&'a Parameter>);

/// Pair the parameters of `a` (old) and `b` (new).
///
/// 1. positional-only parameters by position;
/// 2. old positional-or-keyword parameters that are gone or no longer
///    positional, against nothing;
/// 3. keyword-accepting parameters by name, old side first;
/// 4. the variadic positional parameters;
/// 5. the variadic keyword parameters.
///
/// A `(old name, new name)` combination is yielded once.
pub fn match_parameters<'a>(a: &'a FunctionEntry, b: &'a FunctionEntry) -> Vec<ParameterPair<'a>> {
    let mut pairs: Vec<ParameterPair<'a>> = Vec::new();

    let old_onlys: Vec<&Parameter> = a.positional_onlys().collect();
    let new_onlys: Vec<&Parameter> = b.positional_onlys().collect();
    for (x, y) in zip_longest(&old_onlys, &new_onlys) {
        if x.is_none() && y.is_some_and(|y| y.is_keyword()) {
            continue;
        }
        pairs.push((x, y));
    }

    for x in a.positionals().filter(|p| p.is_keyword()) {
        match b.parameter(&x.name) {
            Some(y) if y.is_positional() => {}
            _ => pairs.push((Some(x), None)),
        }
    }

    for x in a.keywords() {
        pairs.push((Some(x), b.keywords().find(|y| y.name == x.name)));
    }
    for y in b.keywords() {
        if !a.keywords().any(|x| x.name == y.name) {
            pairs.push((None, Some(y)));
        }
    }

    let (x, y) = (a.var_positional(), b.var_positional());
    if x.is_some() || y.is_some() {
        pairs.push((x, y));
    }
    let (x, y) = (a.var_keyword(), b.var_keyword());
    if x.is_some() || y.is_some() {
        pairs.push((x, y));
    }

    let mut seen: HashSet<(Option<&str>, Option<&str>)> = HashSet::new();
    pairs.retain(|(x, y)| seen.insert((x.map(|p| p.name.as_str()), y.map(|p| p.name.as_str()))));
    pairs
}

/// Items paired by position, padding the shorter side with `None`.
fn zip_longest<'a, T>(a: &[&'a T], b: &[&'a T]) -> Vec<(Option<&'a T>, Option<&'a T>)> {
    (0..a.len().max(b.len()))
        .map(|i| (a.get(i).copied(), b.get(i).copied()))
        .collect()
}

type ParameterCheck = fn(Option<&Parameter>, Option<&Parameter>, &FunctionEntry, &FunctionEntry) -> Option<DiffEntry>;

/// Run a per-pair check over matched parameters and record the parameter
/// names in `data.old`/`data.new`.
fn for_parameters(
    old: Option<&ApiEntry>,
    new: Option<&ApiEntry>,
    check: ParameterCheck,
) -> Vec<DiffEntry> {
    let (Some(a), Some(b)) = (old.and_then(ApiEntry::as_function), new.and_then(ApiEntry::as_function)) else {
        return Vec::new();
    };
    match_parameters(a, b)
        .into_iter()
        .filter_map(|(x, y)| {
            check(x, y, a, b).map(|entry| {
                entry.with_data(json!({
                    "old": x.map(|p| p.name.as_str()).unwrap_or_default(),
                    "new": y.map(|p| p.name.as_str()).unwrap_or_default(),
                }))
            })
        })
        .collect()
}

fn source_suffix(param: &Parameter, owner: &FunctionEntry) -> String {
    if !param.source.is_empty() && param.source != owner.base.id {
        format!(" (from {})", param.source)
    } else {
        String::new()
    }
}

/// Kind tag for an added or removed parameter; plain parameters keep the
/// constraint's own kind.
fn variadic_kind(verb: &str, kind: ParameterKind) -> Option<String> {
    match kind {
        ParameterKind::VarPositional | ParameterKind::VarKeyword | ParameterKind::VarKeywordCandidate => {
            Some(format!("{}{}", verb, kind.as_str()))
        }
        _ => None,
    }
}

fn add_parameter(x: Option<&Parameter>, y: Option<&Parameter>, a: &FunctionEntry, b: &FunctionEntry) -> Option<DiffEntry> {
    let (None, Some(y)) = (x, y) else {
        return None;
    };
    let mut entry = DiffEntry::new(format!(
        "Add {} parameter ({}): {}{}.",
        y.kind.as_str(),
        a.base.id,
        y.name,
        source_suffix(y, b)
    ));
    entry.kind = variadic_kind("Add", y.kind).unwrap_or_default();
    Some(entry)
}

fn remove_parameter(x: Option<&Parameter>, y: Option<&Parameter>, a: &FunctionEntry, _: &FunctionEntry) -> Option<DiffEntry> {
    let (Some(x), None) = (x, y) else {
        return None;
    };
    let mut entry = DiffEntry::new(format!(
        "Remove {} parameter ({}): {}{}.",
        x.kind.as_str(),
        a.base.id,
        x.name,
        source_suffix(x, a)
    ));
    entry.kind = variadic_kind("Remove", x.kind).unwrap_or_default();
    Some(entry)
}

fn change_optional(x: Option<&Parameter>, y: Option<&Parameter>, a: &FunctionEntry, _: &FunctionEntry) -> Option<DiffEntry> {
    let (Some(x), Some(y)) = (x, y) else {
        return None;
    };
    if x.optional == y.optional || x.name != y.name {
        return None;
    }
    Some(
        DiffEntry::new(format!(
            "Switch parameter optional ({}): {}: {} -> {}.",
            a.base.id, x.name, x.optional, y.optional
        ))
        .with_data(json!({ "oldoptional": x.optional, "newoptional": y.optional })),
    )
}

fn change_default(x: Option<&Parameter>, y: Option<&Parameter>, a: &FunctionEntry, _: &FunctionEntry) -> Option<DiffEntry> {
    let (Some(x), Some(y)) = (x, y) else {
        return None;
    };
    if !(x.optional && y.optional) || x.default == y.default || x.name != y.name {
        return None;
    }
    Some(
        DiffEntry::new(format!(
            "Change parameter default ({}): {}: {} -> {}.",
            a.base.id,
            x.name,
            x.default.as_deref().unwrap_or("None"),
            y.default.as_deref().unwrap_or("None")
        ))
        .with_data(json!({ "olddefault": x.default, "newdefault": y.default })),
    )
}

fn add_parameters(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    Ok(for_parameters(old, new, add_parameter))
}

fn remove_parameters(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    Ok(for_parameters(old, new, remove_parameter))
}

fn change_optionals(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    Ok(for_parameters(old, new, change_optional))
}

fn change_defaults(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    Ok(for_parameters(old, new, change_default))
}

/// Positional index shifts of names present on both sides.
fn move_parameters(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(a), Some(b)) = (old.and_then(ApiEntry::as_function), new.and_then(ApiEntry::as_function)) else {
        return Ok(Vec::new());
    };
    let mut entries = Vec::new();
    for (i, param) in a.positionals().enumerate() {
        let Some(j) = b.position(&param.name) else {
            continue;
        };
        if i != j {
            entries.push(
                DiffEntry::new(format!(
                    "Move parameter ({}): {}: {} -> {}.",
                    a.base.id,
                    param.name,
                    i + 1,
                    j + 1
                ))
                .with_data(json!({ "name": param.name, "oldindex": i, "newindex": j })),
            );
        }
    }
    Ok(entries)
}

pub fn constraints() -> Vec<Constraint> {
    vec![
        Constraint::both("AddParameter", is_function, add_parameters),
        Constraint::both("RemoveParameter", is_function, remove_parameters),
        Constraint::both("ChangeParameterOptional", is_function, change_optionals),
        Constraint::both("ChangeParameterDefault", is_function, change_defaults),
        Constraint::both("MoveParameter", is_function, move_parameters),
    ]
}
