//! Class structure: bases, abstract base classes, method resolution order.

use serde_json::json;

use super::{is_class, Constraint, DiffContext};
use crate::error::Result;
use crate::models::{ApiEntry, ClassEntry, DiffEntry, OBJECT_CLASS_ID};

fn classes<'a>(old: Option<&'a ApiEntry>, new: Option<&'a ApiEntry>) -> Option<(&'a ClassEntry, &'a ClassEntry)> {
    Some((old?.as_class()?, new?.as_class()?))
}

fn add_base_class(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let Some((a, b)) = classes(old, new) else {
        return Ok(Vec::new());
    };
    Ok(b.bases
        .iter()
        .filter(|name| *name != OBJECT_CLASS_ID && !a.bases.contains(name) && !a.mros.contains(name))
        .map(|name| {
            DiffEntry::new(format!("Add base class ({}): {}", a.base.id, name)).with_data(json!({ "name": name }))
        })
        .collect())
}

fn remove_base_class(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let Some((a, b)) = classes(old, new) else {
        return Ok(Vec::new());
    };
    Ok(a.bases
        .iter()
        .filter(|name| *name != OBJECT_CLASS_ID && !b.bases.contains(name) && !b.mros.contains(name))
        .map(|name| {
            DiffEntry::new(format!("Remove base class ({}): {}", a.base.id, name)).with_data(json!({ "name": name }))
        })
        .collect())
}

fn implement_abc(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let Some((a, b)) = classes(old, new) else {
        return Ok(Vec::new());
    };
    Ok(b.abcs
        .iter()
        .filter(|name| !a.abcs.contains(name))
        .map(|name| {
            DiffEntry::new(format!("Implement abstract base class ({}): {}", a.base.id, name))
                .with_data(json!({ "name": name }))
        })
        .collect())
}

fn deimplement_abc(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let Some((a, b)) = classes(old, new) else {
        return Ok(Vec::new());
    };
    Ok(a.abcs
        .iter()
        .filter(|name| !b.abcs.contains(name))
        .map(|name| {
            DiffEntry::new(format!("Deimplement abstract base class ({}): {}", a.base.id, name))
                .with_data(json!({ "name": name }))
        })
        .collect())
}

/// MRO without the class itself and the root object class.
fn ancestors(cls: &ClassEntry) -> Vec<&str> {
    cls.mros
        .iter()
        .map(String::as_str)
        .filter(|m| *m != cls.base.id && *m != OBJECT_CLASS_ID)
        .collect()
}

/// Any deviation of the old ancestor order that is not a pure extension.
fn change_mro(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let Some((a, b)) = classes(old, new) else {
        return Ok(Vec::new());
    };
    let sa = ancestors(a);
    let sb = ancestors(b);
    if sb.starts_with(&sa) {
        return Ok(Vec::new());
    }
    Ok(vec![DiffEntry::new(format!(
        "Change method resolution order ({}): {} -> {}",
        a.base.id,
        sa.join(", "),
        sb.join(", ")
    ))
    .with_data(json!({ "oldmro": a.mros, "newmro": b.mros }))])
}

pub fn constraints() -> Vec<Constraint> {
    vec![
        Constraint::both("AddBaseClass", is_class, add_base_class),
        Constraint::both("RemoveBaseClass", is_class, remove_base_class),
        Constraint::both("ImplementAbstractBaseClass", is_class, implement_abc),
        Constraint::both("DeimplementAbstractBaseClass", is_class, deimplement_abc),
        Constraint::both("ChangeMethodResolutionOrder", is_class, change_mro),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffing::DiffOptions;
    use crate::models::{ApiDescription, Distribution};

    fn class(bases: &[&str], mros: &[&str], abcs: &[&str]) -> ApiEntry {
        let mut c = ClassEntry::new("m.C");
        c.bases = bases.iter().map(|s| s.to_string()).collect();
        c.mros = std::iter::once("m.C").chain(mros.iter().copied()).map(String::from).collect();
        c.abcs = abcs.iter().map(|s| s.to_string()).collect();
        c.into()
    }

    fn run(old: &ApiEntry, new: &ApiEntry) -> Vec<DiffEntry> {
        let desc = ApiDescription::new(Distribution::default());
        let options = DiffOptions::default();
        let context = DiffContext { old: &desc, new: &desc, options: &options };
        constraints()
            .iter()
            .flat_map(|c| c.apply(Some(old), Some(new), &context).unwrap())
            .collect()
    }

    #[test]
    fn test_remove_base_class() {
        let old = class(&["m.A", "m.B"], &["m.A", "m.B", OBJECT_CLASS_ID], &[]);
        let new = class(&["m.A"], &["m.A", OBJECT_CLASS_ID], &[]);
        let entries = run(&old, &new);
        let kinds: Vec<_> = entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["RemoveBaseClass", "ChangeMethodResolutionOrder"]);
        assert_eq!(entries[0].data_str("name"), Some("m.B"));
        assert_eq!(entries[0].message, "Remove base class (m.C): m.B");
    }

    #[test]
    fn test_base_still_in_mro_is_not_removed() {
        // B moved up the hierarchy: now inherited through A.
        let old = class(&["m.A", "m.B"], &["m.A", "m.B"], &[]);
        let new = class(&["m.A"], &["m.A", "m.B"], &[]);
        assert!(run(&old, &new).is_empty());
    }

    #[test]
    fn test_object_base_is_ignored() {
        let old = class(&[], &[OBJECT_CLASS_ID], &[]);
        let new = class(&[OBJECT_CLASS_ID], &[OBJECT_CLASS_ID], &[]);
        assert!(run(&old, &new).is_empty());
    }

    #[test]
    fn test_mro_extension_is_not_a_change() {
        let old = class(&["m.A"], &["m.A"], &[]);
        let new = class(&["m.A"], &["m.A", "m.Mixin"], &[]);
        let entries = run(&old, &new);
        assert!(entries.iter().all(|e| e.kind != "ChangeMethodResolutionOrder"));
    }

    #[test]
    fn test_abstract_base_classes() {
        let old = class(&[], &[], &["collections.abc.Sized"]);
        let new = class(&[], &[], &["collections.abc.Iterable"]);
        let entries = run(&old, &new);
        let kinds: Vec<_> = entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["ImplementAbstractBaseClass", "DeimplementAbstractBaseClass"]);
        assert_eq!(entries[0].data_str("name"), Some("collections.abc.Iterable"));
    }
}
