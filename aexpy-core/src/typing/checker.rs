//! Type checker driven by annotations and the extracted symbol table.
//!
//! Names in annotations are resolved through the member map of the module the
//! entry was defined in, which the inspector filled from the module's runtime
//! namespace (imports included). Calls are dispatched on the static type of
//! their receiver: `self`/`cls`, `super()`, annotated parameters, module-level
//! names.

use indexmap::IndexMap;

use super::annotation::{parse_annotation, type_of_default, unwrap_class_repr};
use super::{MemberSymbol, TypeChecker};
use crate::extracting::callsites::CallSite;
use crate::models::{
    ApiDescription, ApiEntry, ClassEntry, ClassFlag, FunctionEntry, ItemScope, ModuleEntry,
    Parameter, ParameterKind, TypeType,
};

const TYPE_VARIABLE_TYPES: &[&str] = &["TypeVar", "ParamSpec", "TypeVarTuple"];

/// Checker over a snapshot of an [`ApiDescription`].
#[derive(Debug, Clone)]
pub struct SourceTypeChecker {
    description: ApiDescription,
}

impl SourceTypeChecker {
    pub fn new(description: &ApiDescription) -> Self {
        Self {
            description: description.clone(),
        }
    }

    /// Module an entry was defined in.
    fn module_of(&self, entry_id: &str, location_module: &str) -> Option<&ModuleEntry> {
        if !location_module.is_empty() {
            if let Some(module) = self.description.get(location_module).and_then(ApiEntry::as_module) {
                return Some(module);
            }
        }
        let mut current = entry_id;
        while let Some((parent, _)) = current.rsplit_once('.') {
            if let Some(module) = self.description.get(parent).and_then(ApiEntry::as_module) {
                return Some(module);
            }
            current = parent;
        }
        None
    }

    fn module_for(&self, entry: &ApiEntry) -> Option<&ModuleEntry> {
        let location = entry
            .base()
            .location
            .as_ref()
            .map(|l| l.module.as_str())
            .unwrap_or_default();
        self.module_of(entry.id(), location)
    }

    /// Resolve a name written inside `module` to a type.
    fn resolve_in(&self, module: Option<&ModuleEntry>, name: &str) -> Option<TypeType> {
        let target = self.resolve_symbol(module, name)?;
        match self.description.get(&target) {
            Some(ApiEntry::Class(cls)) => Some(TypeType::class(cls.base.id.clone())),
            Some(ApiEntry::Attribute(attr)) => {
                let raw = unwrap_class_repr(&attr.raw_type)
                    .rsplit('.')
                    .next()
                    .unwrap_or_default();
                if TYPE_VARIABLE_TYPES.contains(&raw) {
                    Some(TypeType::Any)
                } else {
                    None
                }
            }
            Some(ApiEntry::Special(_)) | None => Some(TypeType::class(target)),
            _ => None,
        }
    }

    /// Resolve a possibly dotted local name to an entry id.
    fn resolve_symbol(&self, module: Option<&ModuleEntry>, name: &str) -> Option<String> {
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        let base = module
            .and_then(|m| m.members.get(head).cloned())
            .or_else(|| self.description.contains(head).then(|| head.to_string()))?;
        let Some(rest) = rest else {
            return Some(base);
        };
        let full = format!("{}.{}", base, rest);
        match self.description.resolve_name(&full) {
            Some(entry) => Some(entry.id().to_string()),
            None if !self.description.contains(&base) => Some(full),
            None => None,
        }
    }

    fn parse_in(&self, entry: &ApiEntry, annotation: &str) -> TypeType {
        let module = self.module_for(entry);
        parse_annotation(annotation, &|name| self.resolve_in(module, name))
    }

    /// Class that owns a method, if the method is defined on one.
    fn owner_class(&self, func: &FunctionEntry) -> Option<&ClassEntry> {
        self.description
            .get(&func.base.parent)
            .and_then(ApiEntry::as_class)
    }

    fn dispatch(&self, cls: &ClassEntry, name: &str) -> Option<String> {
        self.description
            .resolve_class_member(cls, name)
            .map(|e| e.id().to_string())
            .filter(|id| self.description.contains(id))
    }

    fn dispatch_super(&self, cls: &ClassEntry, name: &str) -> Option<String> {
        cls.mros.iter().skip(1).find_map(|base| {
            let base = self.description.get(base)?.as_class()?;
            let target = base.members.get(name)?;
            self.description.contains(target).then(|| target.clone())
        })
    }
}

impl TypeChecker for SourceTypeChecker {
    fn type_of(&self, entry: &ApiEntry) -> Option<TypeType> {
        match entry {
            ApiEntry::Attribute(attr) => {
                if !attr.annotation.is_empty() {
                    Some(self.parse_in(entry, &attr.annotation))
                } else if !attr.raw_type.is_empty() {
                    Some(self.parse_in(entry, &attr.raw_type))
                } else {
                    Some(TypeType::Any)
                }
            }
            ApiEntry::Function(func) => Some(self.parse_in(entry, &func.return_annotation)),
            _ => None,
        }
    }

    fn parameter_type(&self, func: &FunctionEntry, param: &Parameter) -> Option<TypeType> {
        if !param.annotation.is_empty() {
            let module = self.module_of(
                &func.base.id,
                func.base
                    .location
                    .as_ref()
                    .map(|l| l.module.as_str())
                    .unwrap_or_default(),
            );
            return Some(parse_annotation(&param.annotation, &|name| {
                self.resolve_in(module, name)
            }));
        }
        match param.kind {
            ParameterKind::VarPositional | ParameterKind::VarKeyword => Some(TypeType::Any),
            _ => Some(
                param
                    .default
                    .as_deref()
                    .and_then(type_of_default)
                    .unwrap_or(TypeType::Any),
            ),
        }
    }

    fn members_of(&self, cls: &ClassEntry) -> IndexMap<String, MemberSymbol> {
        let entry = ApiEntry::Class(cls.clone());
        let mut members = IndexMap::new();
        for (name, annotation) in &cls.annotations {
            let ty = self.parse_in(&entry, annotation);
            // ClassVar annotations describe class attributes, not instance state.
            let class_var = annotation.contains("ClassVar");
            members.insert(
                name.clone(),
                MemberSymbol {
                    name: name.clone(),
                    annotation: annotation.clone(),
                    r#type: ty,
                    implicit: !cls.members.contains_key(name) && !class_var,
                },
            );
        }
        if cls.has_flag(ClassFlag::Dataclass) {
            for (name, target) in &cls.members {
                if members.contains_key(name) {
                    continue;
                }
                if let Some(ApiEntry::Attribute(attr)) = self.description.get(target) {
                    members.insert(
                        name.clone(),
                        MemberSymbol {
                            name: name.clone(),
                            annotation: attr.annotation.clone(),
                            r#type: self.type_of(&ApiEntry::Attribute(attr.clone())).unwrap_or(TypeType::Any),
                            implicit: false,
                        },
                    );
                }
            }
        }
        members
    }

    fn target_of(&self, caller: &FunctionEntry, site: &CallSite) -> Option<String> {
        let name = site.target.as_deref()?;
        let entry = ApiEntry::Function(caller.clone());
        let module = self.module_for(&entry);

        let Some(receiver) = site.receiver() else {
            let target = self.resolve_symbol(module, name)?;
            return match self.description.get(&target)? {
                ApiEntry::Function(_) | ApiEntry::Class(_) => Some(target),
                _ => None,
            };
        };

        let first = caller.parameters.first().map(|p| p.name.as_str());
        if let Some(cls) = self.owner_class(caller) {
            if receiver == "super()" {
                return self.dispatch_super(cls, name);
            }
            if caller.base.scope != ItemScope::Static && Some(receiver) == first {
                return self.dispatch(cls, name);
            }
        }

        if let Some(param) = caller.parameter(receiver) {
            if let TypeType::Class { id } = self.parse_in(&entry, &param.annotation) {
                let cls = self.description.get(&id)?.as_class()?;
                return self.dispatch(cls, name);
            }
            return None;
        }

        let target = self.resolve_symbol(module, receiver)?;
        match self.description.get(&target)? {
            ApiEntry::Module(m) => m
                .members
                .get(name)
                .filter(|t| {
                    matches!(
                        self.description.get(t),
                        Some(ApiEntry::Function(_)) | Some(ApiEntry::Class(_))
                    )
                })
                .cloned(),
            ApiEntry::Class(cls) => self.dispatch(cls, name),
            _ => None,
        }
    }
}
