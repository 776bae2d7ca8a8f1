//! Type-inference bridge.
//!
//! The rest of the crate only sees [`TypeType`]: a [`TypeChecker`] answers
//! three questions (the type of an entry, the members of a class, the target
//! of a call) and [`enrich_types`] writes the answers into a description.

use indexmap::IndexMap;

use crate::extracting::callsites::CallSite;
use crate::models::{
    ApiDescription, ApiEntry, AttributeEntry, ClassEntry, FunctionEntry, ItemScope, Parameter,
    TypeInfo, TypeType,
};

pub mod annotation;
pub mod checker;
pub mod mypy;

pub use annotation::{parse_annotation, type_of_default};
pub use checker::SourceTypeChecker;
pub use mypy::MypyTypeChecker;

/// A class member as the checker sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberSymbol {
    pub name: String,
    pub annotation: String,
    pub r#type: TypeType,
    /// Declared only through an annotation, not present at runtime.
    pub implicit: bool,
}

/// Narrow façade over a static type checker.
///
/// Implementations never fail: anything they cannot answer is `None` (or an
/// empty map) and the reason is logged.
pub trait TypeChecker {
    /// Type of an attribute, or return type of a function.
    fn type_of(&self, entry: &ApiEntry) -> Option<TypeType>;

    fn parameter_type(&self, func: &FunctionEntry, param: &Parameter) -> Option<TypeType>;

    fn members_of(&self, cls: &ClassEntry) -> IndexMap<String, MemberSymbol>;

    /// Statically dispatched target of a call made inside `caller`.
    fn target_of(&self, caller: &FunctionEntry, site: &CallSite) -> Option<String>;
}

#[derive(Default)]
struct TypeUpdates {
    attributes: Vec<(String, TypeInfo)>,
    returns: Vec<(String, TypeInfo)>,
    parameters: Vec<(String, usize, TypeInfo)>,
    implicit: Vec<(String, MemberSymbol)>,
}

/// Attach structured types to every attribute, return value and parameter,
/// and materialize annotated-only class members as instance attributes.
///
/// Answers are collected over the whole description first and written
/// afterwards, so every query sees the description as extracted.
pub fn enrich_types(description: &mut ApiDescription, checker: &dyn TypeChecker) -> usize {
    let updates = collect_updates(description, checker);

    let mut count = 0;
    for (id, info) in updates.attributes {
        if let Some(ApiEntry::Attribute(attr)) = description.get_mut(&id) {
            attr.r#type = Some(info);
            count += 1;
        }
    }
    for (id, info) in updates.returns {
        if let Some(func) = description.get_mut(&id).and_then(ApiEntry::as_function_mut) {
            func.return_type = Some(info);
            count += 1;
        }
    }
    for (id, index, info) in updates.parameters {
        if let Some(func) = description.get_mut(&id).and_then(ApiEntry::as_function_mut) {
            if let Some(param) = func.parameters.get_mut(index) {
                param.r#type = Some(info);
                count += 1;
            }
        }
    }
    for (class_id, member) in updates.implicit {
        let id = format!("{}.{}", class_id, member.name);
        if description.contains(&id) {
            continue;
        }
        let (location, private) = match description.get(&class_id) {
            Some(cls) => (cls.base().location.clone(), cls.is_private()),
            None => continue,
        };
        let mut attr = AttributeEntry::new(&id);
        attr.base.scope = ItemScope::Instance;
        attr.base.location = location;
        attr.base.private = private || crate::models::is_private_segment(&member.name);
        attr.annotation = member.annotation.clone();
        attr.r#type = Some(TypeInfo::new(member.r#type, member.annotation));
        if description.add_entry(attr.into()).is_ok() {
            if let Some(ApiEntry::Class(cls)) = description.get_mut(&class_id) {
                cls.members.insert(member.name, id.clone());
            }
            tracing::debug!(entry = %id, "Detected annotated instance attribute");
            count += 1;
        }
    }
    count
}

fn collect_updates(description: &ApiDescription, checker: &dyn TypeChecker) -> TypeUpdates {
    let mut updates = TypeUpdates::default();
    for entry in description.entries().values() {
        match entry {
            ApiEntry::Attribute(attr) => {
                if let Some(ty) = checker.type_of(entry) {
                    updates
                        .attributes
                        .push((attr.base.id.clone(), TypeInfo::new(ty, attr.annotation.clone())));
                }
            }
            ApiEntry::Function(func) => {
                if let Some(ty) = checker.type_of(entry) {
                    updates.returns.push((
                        func.base.id.clone(),
                        TypeInfo::new(ty, func.return_annotation.clone()),
                    ));
                }
                for (index, param) in func.parameters.iter().enumerate() {
                    if let Some(ty) = checker.parameter_type(func, param) {
                        updates.parameters.push((
                            func.base.id.clone(),
                            index,
                            TypeInfo::new(ty, param.annotation.clone()),
                        ));
                    }
                }
            }
            ApiEntry::Class(cls) => {
                for (_, member) in checker.members_of(cls) {
                    if member.implicit {
                        updates.implicit.push((cls.base.id.clone(), member));
                    }
                }
            }
            _ => {}
        }
    }
    updates
}
