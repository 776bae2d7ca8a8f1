//! Breaking rank per change kind.
//!
//! Ranks come from a fixed table keyed by [`DiffEntry::kind`]; a handful of
//! kinds are refined afterwards (functions inside classes become methods,
//! instance attributes get their own kind, aliases to externals are split
//! out). Kinds missing from the table stay `Unknown`.

use crate::models::{is_private_segment, ApiDescription, ApiDifference, ApiEntry, BreakingRank, DiffEntry, ItemScope};

/// Ranks every entry of a difference against the two descriptions it was
/// computed from.
pub struct Evaluator<'a> {
    old: &'a ApiDescription,
    new: &'a ApiDescription,
}

impl<'a> Evaluator<'a> {
    pub fn new(old: &'a ApiDescription, new: &'a ApiDescription) -> Self {
        Self { old, new }
    }

    pub fn evaluate(&self, difference: &mut ApiDifference) {
        for entry in difference.entries.values_mut() {
            evaluate_entry(entry, self.old, self.new);
            tracing::debug!(kind = %entry.kind, rank = %entry.rank, "Evaluated {}", entry.message);
        }
        let (level, _) = difference.evaluate();
        tracing::info!(entries = difference.entries.len(), level = %level, "Evaluated difference");
    }
}

/// Target is missing from `description` or only known as an external.
fn points_outside(description: &ApiDescription, target: Option<&str>) -> bool {
    target
        .and_then(|t| description.get(t))
        .map_or(true, ApiEntry::is_external)
}

fn private_or(entry: &DiffEntry, rank: BreakingRank) -> BreakingRank {
    if entry.is_private_only() {
        BreakingRank::Low
    } else {
        rank
    }
}

/// Rank the kind the entry was emitted with.
fn rank_of(entry: &DiffEntry) -> BreakingRank {
    use BreakingRank::*;

    match entry.kind.as_str() {
        "AddModule" | "AddClass" | "AddFunction" | "AddAttribute" | "AddAlias" | "AddExternal"
        | "AddVarPositional" | "AddVarKeyword" | "AddVarKeywordCandidate" => Compatible,

        "RemoveModule" | "RemoveClass" | "RemoveFunction" | "RemoveAttribute" | "RemoveExternal" => {
            private_or(entry, High)
        }
        "RemoveAlias" => {
            let name_private = entry.data_str("name").is_some_and(is_private_segment);
            if name_private {
                Low
            } else {
                private_or(entry, High)
            }
        }

        "AddBaseClass"
        | "RemoveBaseClass"
        | "ImplementAbstractBaseClass"
        | "DeimplementAbstractBaseClass"
        | "ChangeMethodResolutionOrder"
        | "ChangeAlias" => Medium,

        "ChangeParameterDefault" => Low,
        "MoveParameter" => private_or(entry, High),
        "ChangeParameterOptional" => match entry.data_bool("newoptional") {
            Some(true) => Compatible,
            _ => High,
        },
        "AddParameter" => {
            let optional = entry
                .new
                .as_ref()
                .and_then(ApiEntry::as_function)
                .zip(entry.data_str("new"))
                .and_then(|(f, name)| f.parameter(name))
                .map(|p| p.optional);
            match optional {
                Some(true) => Compatible,
                _ => High,
            }
        }
        "RemoveParameter" | "RemoveVarPositional" | "RemoveVarKeyword" => High,

        "ChangeAttributeType" | "ChangeReturnType" | "ChangeParameterType" => private_or(entry, Medium),
        "RemoveVarKeywordCandidate" => Medium,

        other => {
            tracing::trace!(kind = other, "No rank rule");
            Unknown
        }
    }
}

/// Owner id and name of a snapshot, for refined messages.
fn owner_and_name(entry: &ApiEntry) -> (&str, &str) {
    match entry.id().rsplit_once('.') {
        Some((owner, _)) => (owner, entry.name()),
        None => ("", entry.name()),
    }
}

fn refine(entry: &mut DiffEntry, old: &ApiDescription, new: &ApiDescription) {
    let refined = match entry.kind.as_str() {
        "AddFunction" | "RemoveFunction" => {
            let (verb, snapshot) = if entry.kind == "AddFunction" {
                ("Add", entry.new.as_ref())
            } else {
                ("Remove", entry.old.as_ref())
            };
            snapshot.filter(|e| e.base().scope != ItemScope::Static).map(|e| {
                let (owner, name) = owner_and_name(e);
                (format!("{}Method", verb), format!("{} method ({}): {}.", verb, owner, name))
            })
        }
        "AddAttribute" | "RemoveAttribute" => {
            let (verb, snapshot) = if entry.kind == "AddAttribute" {
                ("Add", entry.new.as_ref())
            } else {
                ("Remove", entry.old.as_ref())
            };
            snapshot.filter(|e| e.base().scope == ItemScope::Instance).map(|e| {
                let (owner, name) = owner_and_name(e);
                (
                    format!("{}InstanceAttribute", verb),
                    format!("{} instance attribute ({}): {}.", verb, owner, name),
                )
            })
        }
        _ => None,
    };
    if let Some((kind, message)) = refined {
        entry.kind = kind;
        entry.message = message;
        return;
    }

    match entry.kind.as_str() {
        "AddAlias" if points_outside(new, entry.data_str("target")) => {
            entry.kind = "AddExternalAlias".to_string();
        }
        "RemoveAlias" if points_outside(old, entry.data_str("target")) => {
            entry.kind = "RemoveExternalAlias".to_string();
            entry.rank = BreakingRank::Low;
        }
        _ => {}
    }
}

/// Assign the rank of one entry, then refine its kind.
pub fn evaluate_entry(entry: &mut DiffEntry, old: &ApiDescription, new: &ApiDescription) {
    entry.rank = rank_of(entry);
    refine(entry, old, new);
}
