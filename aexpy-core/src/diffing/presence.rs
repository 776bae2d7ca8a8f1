//! Added and removed entries.

use super::{is_attribute, is_class, is_function, is_module, is_special, CheckFn, Constraint, DiffContext};
use crate::error::Result;
use crate::models::{ApiEntry, DiffEntry};

/// Reported only when the parent exists on both sides; a new or removed
/// parent already accounts for its children.
fn add(old: Option<&ApiEntry>, new: Option<&ApiEntry>, context: &DiffContext) -> Result<Vec<DiffEntry>> {
    match (old, new) {
        (None, Some(b)) if context.old.contains(b.parent()) && context.new.contains(b.parent()) => {
            Ok(vec![DiffEntry::new(format!(
                "Add {} ({}): {}.",
                b.kind_name(),
                b.parent(),
                b.name()
            ))])
        }
        _ => Ok(Vec::new()),
    }
}

fn remove(old: Option<&ApiEntry>, new: Option<&ApiEntry>, context: &DiffContext) -> Result<Vec<DiffEntry>> {
    match (old, new) {
        (Some(a), None) if context.old.contains(a.parent()) && context.new.contains(a.parent()) => {
            Ok(vec![DiffEntry::new(format!(
                "Remove {} ({}): {}.",
                a.kind_name(),
                a.parent(),
                a.name()
            ))])
        }
        _ => Ok(Vec::new()),
    }
}

fn add_external(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    match (old, new) {
        (None, Some(b)) if b.is_external() => Ok(vec![DiffEntry::new(format!("Add external: {}.", b.id()))]),
        _ => Ok(Vec::new()),
    }
}

fn remove_external(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    match (old, new) {
        (Some(a), None) if a.is_external() => Ok(vec![DiffEntry::new(format!("Remove external: {}.", a.id()))]),
        _ => Ok(Vec::new()),
    }
}

pub fn constraints() -> Vec<Constraint> {
    let pairs: [(&'static str, &'static str, fn(&ApiEntry) -> bool); 4] = [
        ("AddModule", "RemoveModule", is_module),
        ("AddClass", "RemoveClass", is_class),
        ("AddFunction", "RemoveFunction", is_function),
        ("AddAttribute", "RemoveAttribute", is_attribute),
    ];
    let mut constraints = Vec::new();
    for (added, removed, accepts) in pairs {
        constraints.push(Constraint::either(added, accepts, add as CheckFn));
        constraints.push(Constraint::either(removed, accepts, remove as CheckFn));
    }
    constraints.push(Constraint::either("AddExternal", is_special, add_external));
    constraints.push(Constraint::either("RemoveExternal", is_special, remove_external));
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffing::{DiffOptions, Differ};
    use crate::models::{ApiDescription, AttributeEntry, Distribution, ModuleEntry, SpecialEntry};

    fn description(entries: Vec<ApiEntry>) -> ApiDescription {
        ApiDescription::from_entries(Distribution::default(), entries).unwrap()
    }

    #[test]
    fn test_add_attribute_requires_parent_on_both_sides() {
        let old = description(vec![ModuleEntry::new("m").into()]);
        let new = description(vec![
            ModuleEntry::new("m").into(),
            AttributeEntry::new("m.x").into(),
            ModuleEntry::new("m.sub").into(),
            AttributeEntry::new("m.sub.y").into(),
        ]);
        let entries = Differ::default().diff_entries(&old, &new, &DiffOptions::default());
        let messages: Vec<_> = entries.values().map(|e| (e.kind.as_str(), e.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![("AddAttribute", "Add attribute (m): x."), ("AddModule", "Add module (m): sub.")]
        );
    }

    #[test]
    fn test_externals() {
        let old = description(vec![ModuleEntry::new("m").into(), SpecialEntry::external("os.path").into()]);
        let new = description(vec![ModuleEntry::new("m").into(), SpecialEntry::external("json.loads").into()]);
        let entries = Differ::default().diff_entries(&old, &new, &DiffOptions::default());
        let messages: Vec<_> = entries.values().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Remove external: os.path.", "Add external: json.loads."]);
    }
}
