//! Type changes of attributes, return values and parameters.

use serde_json::json;

use super::{is_attribute, is_function, Constraint, DiffContext};
use crate::error::Result;
use crate::models::{ApiEntry, DiffEntry, TypeInfo};

/// Whether a change between two resolved types is reported.
///
/// An inferred `Any` without a written annotation says nothing about the
/// API, so a side like that hides the change.
fn type_changed(a: &TypeInfo, a_annotation: &str, b: &TypeInfo, b_annotation: &str) -> bool {
    if a.id == b.id {
        return false;
    }
    if a.is_any() && a_annotation.is_empty() {
        return false;
    }
    !(b.is_any() && b_annotation.is_empty())
}

fn change_attribute_type(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(a), Some(b)) = (old.and_then(ApiEntry::as_attribute), new.and_then(ApiEntry::as_attribute)) else {
        return Ok(Vec::new());
    };
    let (Some(ta), Some(tb)) = (&a.r#type, &b.r#type) else {
        return Ok(Vec::new());
    };
    if !type_changed(ta, &a.annotation, tb, &b.annotation) {
        return Ok(Vec::new());
    }
    Ok(vec![DiffEntry::new(format!(
        "Change attribute type ({}): {} => {}",
        a.base.id, ta.id, tb.id
    ))
    .with_data(json!({ "oldtype": ta.id, "newtype": tb.id }))])
}

fn change_return_type(old: Option<&ApiEntry>, new: Option<&ApiEntry>, context: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(a), Some(b)) = (old.and_then(ApiEntry::as_function), new.and_then(ApiEntry::as_function)) else {
        return Ok(Vec::new());
    };
    let (Some(ta), Some(tb)) = (&a.return_type, &b.return_type) else {
        return Ok(Vec::new());
    };
    let changed = if context.options.any_suppresses_return_type {
        type_changed(ta, &a.return_annotation, tb, &b.return_annotation)
    } else {
        ta.id != tb.id
    };
    if !changed {
        return Ok(Vec::new());
    }
    Ok(vec![DiffEntry::new(format!(
        "Change return type ({}): {} => {}",
        a.base.id, ta.id, tb.id
    ))
    .with_data(json!({ "oldtype": ta.id, "newtype": tb.id }))])
}

fn change_parameter_type(old: Option<&ApiEntry>, new: Option<&ApiEntry>, _: &DiffContext) -> Result<Vec<DiffEntry>> {
    let (Some(a), Some(b)) = (old.and_then(ApiEntry::as_function), new.and_then(ApiEntry::as_function)) else {
        return Ok(Vec::new());
    };
    let mut entries = Vec::new();
    for (x, y) in super::match_parameters(a, b) {
        let (Some(x), Some(y)) = (x, y) else {
            continue;
        };
        if x.name != y.name {
            continue;
        }
        let (Some(tx), Some(ty)) = (&x.r#type, &y.r#type) else {
            continue;
        };
        if !type_changed(tx, &x.annotation, ty, &y.annotation) {
            continue;
        }
        entries.push(
            DiffEntry::new(format!(
                "Change parameter type ({}): {}: {} => {}",
                a.base.id, x.name, tx.id, ty.id
            ))
            .with_data(json!({ "oldtype": tx.id, "newtype": ty.id, "old": x.name, "new": y.name })),
        );
    }
    Ok(entries)
}

pub fn constraints() -> Vec<Constraint> {
    vec![
        Constraint::both("ChangeAttributeType", is_attribute, change_attribute_type),
        Constraint::both("ChangeReturnType", is_function, change_return_type),
        Constraint::both("ChangeParameterType", is_function, change_parameter_type),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffing::DiffOptions;
    use crate::models::{
        ApiDescription, AttributeEntry, Distribution, FunctionEntry, Parameter, ParameterKind, TypeType,
    };

    fn int() -> TypeInfo {
        TypeInfo::new(TypeType::class("builtins.int"), "int")
    }

    fn str_() -> TypeInfo {
        TypeInfo::new(TypeType::class("builtins.str"), "str")
    }

    fn any() -> TypeInfo {
        TypeInfo::new(TypeType::Any, "")
    }

    fn run(old: ApiEntry, new: ApiEntry, options: &DiffOptions) -> Vec<DiffEntry> {
        let desc = ApiDescription::new(Distribution::default());
        let context = DiffContext { old: &desc, new: &desc, options };
        constraints()
            .iter()
            .flat_map(|c| c.apply(Some(&old), Some(&new), &context).unwrap())
            .collect()
    }

    fn attribute(ty: TypeInfo, annotation: &str) -> ApiEntry {
        let mut attr = AttributeEntry::new("m.x");
        attr.r#type = Some(ty);
        attr.annotation = annotation.to_string();
        attr.into()
    }

    #[test]
    fn test_attribute_type_change() {
        let entries = run(attribute(int(), "int"), attribute(str_(), "str"), &DiffOptions::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "ChangeAttributeType");
        assert_eq!(entries[0].message, "Change attribute type (m.x): builtins.int => builtins.str");
        assert_eq!(entries[0].data_str("newtype"), Some("builtins.str"));
    }

    #[test]
    fn test_inferred_any_is_suppressed() {
        assert!(run(attribute(int(), "int"), attribute(any(), ""), &DiffOptions::default()).is_empty());
        // A written `Any` is a real change.
        let entries = run(attribute(int(), "int"), attribute(any(), "Any"), &DiffOptions::default());
        assert_eq!(entries.len(), 1);
    }

    fn returning(ty: TypeInfo, annotation: &str) -> ApiEntry {
        let mut f = FunctionEntry::new("m.f");
        f.return_type = Some(ty);
        f.return_annotation = annotation.to_string();
        f.into()
    }

    #[test]
    fn test_return_type_knob() {
        let old = returning(int(), "int");
        let new = returning(any(), "");
        assert!(run(old.clone(), new.clone(), &DiffOptions::default()).is_empty());

        let options = DiffOptions {
            any_suppresses_return_type: false,
            ..Default::default()
        };
        let entries = run(old, new, &options);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "ChangeReturnType");
    }

    #[test]
    fn test_parameter_type_change() {
        let param = |ty: TypeInfo, annotation: &str| {
            let mut p = Parameter::new(ParameterKind::PositionalOrKeyword, "a");
            p.r#type = Some(ty);
            p.annotation = annotation.to_string();
            p
        };
        let mut a = FunctionEntry::new("m.f");
        a.parameters = vec![param(int(), "int")];
        let mut b = FunctionEntry::new("m.f");
        b.parameters = vec![param(str_(), "str")];
        let entries = run(a.into(), b.into(), &DiffOptions::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Change parameter type (m.f): a: builtins.int => builtins.str");
        assert_eq!(entries[0].data_str("old"), Some("a"));
    }
}
