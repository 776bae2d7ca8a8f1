//! Member aliases of modules and classes, and module export lists.

use serde_json::json;

use super::{is_collection, Constraint, DiffContext};
use crate::error::Result;
use crate::models::{ApiEntry, DiffEntry, ModuleEntry};

fn alias_entry(verb: &str, id: &str, name: &str, target: &str) -> DiffEntry {
    DiffEntry::new(format!("{} alias ({}): {} => {}", verb, id, name, target))
        .with_data(json!({ "name": name, "target": target }))
}

fn modules<'a>(a: &'a ApiEntry, b: &'a ApiEntry) -> Option<(&'a ModuleEntry, &'a ModuleEntry)> {
    Some((a.as_module()?, b.as_module()?))
}

/// Names that moved into (`entering = true`) or out of the export list
/// while the module kept the member, with the member's current target.
fn export_changes<'a>(a: &'a ModuleEntry, b: &'a ModuleEntry, entering: bool) -> Vec<(&'a str, &'a str)> {
    let (Some(old_slots), Some(new_slots)) = (&a.slots, &b.slots) else {
        return Vec::new();
    };
    let (from, to) = if entering {
        (new_slots, old_slots)
    } else {
        (old_slots, new_slots)
    };
    from.iter()
        .filter(|name| !to.contains(name) && a.members.contains_key(name.as_str()))
        .filter_map(|name| Some((name.as_str(), b.members.get(name.as_str())?.as_str())))
        .collect()
}

fn add_alias(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(a), Some(b)) = (old, new) else {
        return Ok(Vec::new());
    };
    let Some(old_members) = a.members() else {
        return Ok(Vec::new());
    };
    let mut entries: Vec<DiffEntry> = b
        .alias_members()
        .into_iter()
        .filter(|(name, _)| !old_members.contains_key(*name))
        .map(|(name, target)| alias_entry("Add", a.id(), name, target))
        .collect();
    if let Some((ma, mb)) = modules(a, b) {
        for (name, target) in export_changes(ma, mb, true) {
            entries.push(alias_entry("Add", a.id(), name, target));
        }
    }
    Ok(entries)
}

/// A removed alias that still resolves (say, through an inherited member)
/// is not reported.
fn remove_alias(old: Option<&ApiEntry>, new: Option<&ApiEntry>, context: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(a), Some(b)) = (old, new) else {
        return Ok(Vec::new());
    };
    let Some(new_members) = b.members() else {
        return Ok(Vec::new());
    };
    let mut entries: Vec<DiffEntry> = a
        .alias_members()
        .iter()
        .filter(|(name, _)| !new_members.contains_key(**name))
        .filter(|(name, _)| context.new.resolve_name(&format!("{}.{}", a.id(), name)).is_none())
        .map(|(name, target)| alias_entry("Remove", a.id(), name, target))
        .collect();
    if let Some((ma, mb)) = modules(a, b) {
        for (name, target) in export_changes(ma, mb, false) {
            entries.push(alias_entry("Remove", a.id(), name, target));
        }
    }
    Ok(entries)
}

fn change_alias(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(old_members), Some(new_members)) = (old.and_then(ApiEntry::members), new.and_then(ApiEntry::members)) else {
        return Ok(Vec::new());
    };
    let id = old.map(ApiEntry::id).unwrap_or_default();
    Ok(old_members
        .iter()
        .filter_map(|(name, before)| {
            let after = new_members.get(name)?;
            (after != before).then(|| {
                DiffEntry::new(format!("Change alias ({}): {}: {} => {}", id, name, before, after))
                    .with_data(json!({ "name": name, "old": before, "new": after }))
            })
        })
        .collect())
}

pub fn constraints() -> Vec<Constraint> {
    vec![
        Constraint::both("AddAlias", is_collection, add_alias),
        Constraint::both("RemoveAlias", is_collection, remove_alias),
        Constraint::both("ChangeAlias", is_collection, change_alias),
    ]
}
