//! API entries: the typed records that make up an [`ApiDescription`](super::ApiDescription).
//!
//! Entries reference each other only through dotted string ids, never through
//! pointers, which keeps the model acyclic and trivially serializable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::typing::TypeInfo;

/// Marker printed by the inspector before the JSON payload on stdout.
pub const TRANSFER_BEGIN: &str = "AEXPY_TRANSFER_BEGIN";

/// Parent id of entries owned by other packages.
pub const EXTERNAL_ENTRYID: &str = "$external$";

/// Whether a single dotted segment is private (`_x`, but not `__x__`).
pub fn is_private_segment(segment: &str) -> bool {
    segment.starts_with('_') && !(segment.starts_with("__") && segment.ends_with("__"))
}

/// Whether any segment of a dotted name is private.
pub fn is_private_name(name: &str) -> bool {
    name.split('.').any(is_private_segment)
}

/// Whether an id points inside a function body (unreachable from outside).
pub fn is_local(id: &str) -> bool {
    id.split('.').any(|s| s == "<locals>")
}

/// Split `a.b.c` into (`a.b`, `c`). Root names have an empty parent.
pub fn split_id(id: &str) -> (&str, &str) {
    match id.rsplit_once('.') {
        Some((parent, name)) => (parent, name),
        None => ("", id),
    }
}

/// Source location of an entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub file: String,
    pub line: i64,
    pub module: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            file: String::new(),
            line: -1,
            module: String::new(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.module)
    }
}

/// How an item is bound to its owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemScope {
    #[default]
    Static,
    Class,
    Instance,
}

/// Fields common to every entry variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryBase {
    pub name: String,
    pub id: String,
    pub alias: Vec<String>,
    pub docs: String,
    pub comments: String,
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub private: bool,
    pub parent: String,
    pub scope: ItemScope,
    pub data: Map<String, Value>,
}

impl EntryBase {
    /// Base for `id`, with `name` and `parent` derived from the dotted path.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let (parent, name) = split_id(&id);
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            id,
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialKind {
    #[default]
    Unknown,
    Empty,
    External,
}

/// Placeholder for references that could not be resolved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialEntry {
    #[serde(flatten)]
    pub base: EntryBase,
    pub kind: SpecialKind,
}

impl SpecialEntry {
    /// External placeholder for an id owned by another package.
    pub fn external(id: impl Into<String>) -> Self {
        let mut base = EntryBase::new(id);
        base.parent = EXTERNAL_ENTRYID.to_string();
        Self {
            base,
            kind: SpecialKind::External,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleEntry {
    #[serde(flatten)]
    pub base: EntryBase,
    pub members: IndexMap<String, String>,
    pub annotations: IndexMap<String, String>,
    /// Explicit export list (`__all__`), when the module declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<String>>,
}

impl ModuleEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: EntryBase::new(id),
            ..Default::default()
        }
    }

    /// Whether `name` is exported, following the export list when present.
    pub fn exports(&self, name: &str) -> bool {
        match &self.slots {
            Some(slots) => slots.iter().any(|s| s == name),
            None => !is_private_segment(name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassFlag {
    Abstract,
    Final,
    Generic,
    Dataclass,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassEntry {
    #[serde(flatten)]
    pub base: EntryBase,
    pub members: IndexMap<String, String>,
    pub annotations: IndexMap<String, String>,
    pub bases: Vec<String>,
    pub abcs: Vec<String>,
    pub mros: Vec<String>,
    /// `__slots__` restriction, when the class declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<String>>,
    pub flags: Vec<ClassFlag>,
}

impl ClassEntry {
    pub fn new(id: impl Into<String>) -> Self {
        let base = EntryBase::new(id);
        Self {
            mros: vec![base.id.clone()],
            base,
            ..Default::default()
        }
    }

    pub fn has_flag(&self, flag: ClassFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterKind {
    Positional,
    #[default]
    PositionalOrKeyword,
    VarPositional,
    Keyword,
    VarKeyword,
    VarKeywordCandidate,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Positional => "Positional",
            ParameterKind::PositionalOrKeyword => "PositionalOrKeyword",
            ParameterKind::VarPositional => "VarPositional",
            ParameterKind::Keyword => "Keyword",
            ParameterKind::VarKeyword => "VarKeyword",
            ParameterKind::VarKeywordCandidate => "VarKeywordCandidate",
        }
    }

    /// Position in the canonical signature order. Candidates sort with keywords.
    pub fn order(&self) -> u8 {
        match self {
            ParameterKind::Positional => 0,
            ParameterKind::PositionalOrKeyword => 1,
            ParameterKind::VarPositional => 2,
            ParameterKind::Keyword | ParameterKind::VarKeywordCandidate => 3,
            ParameterKind::VarKeyword => 4,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    pub kind: ParameterKind,
    pub name: String,
    pub annotation: String,
    /// `None` means a computed default that cannot be rendered.
    pub default: Option<String>,
    pub optional: bool,
    /// Id of the function that owns the parameter.
    pub source: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<TypeInfo>,
}

impl Parameter {
    pub fn new(kind: ParameterKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style default value; marks the parameter optional.
    pub fn with_default(mut self, default: Option<&str>) -> Self {
        self.optional = true;
        self.default = default.map(str::to_string);
        self
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::Keyword
                | ParameterKind::PositionalOrKeyword
                | ParameterKind::VarKeywordCandidate
        )
    }

    pub fn is_positional(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::Positional | ParameterKind::PositionalOrKeyword
        )
    }

    pub fn is_var(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::VarPositional | ParameterKind::VarKeyword
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionFlag {
    Abstract,
    Final,
    Generic,
    Override,
    Async,
    TransmitKwargs,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FunctionEntry {
    #[serde(flatten)]
    pub base: EntryBase,
    pub return_annotation: String,
    pub parameters: Vec<Parameter>,
    pub annotations: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeInfo>,
    pub callers: Vec<String>,
    pub callees: Vec<String>,
    pub flags: Vec<FunctionFlag>,
}

impl FunctionEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: EntryBase::new(id),
            ..Default::default()
        }
    }

    pub fn has_flag(&self, flag: FunctionFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn set_flag(&mut self, flag: FunctionFlag) {
        if !self.has_flag(flag) {
            self.flags.push(flag);
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn positional_onlys(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::Positional)
    }

    pub fn positionals(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_positional())
    }

    pub fn keywords(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_keyword())
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::VarKeywordCandidate)
    }

    pub fn var_positional(&self) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.kind == ParameterKind::VarPositional)
    }

    pub fn var_keyword(&self) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.kind == ParameterKind::VarKeyword)
    }

    /// Index of a parameter among the positional ones.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positionals().position(|p| p.name == name)
    }

    /// Whether the function is bound to an instance or class (first parameter implicit).
    pub fn is_bound(&self) -> bool {
        self.base.scope != ItemScope::Static
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttributeEntry {
    #[serde(flatten)]
    pub base: EntryBase,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<TypeInfo>,
    pub raw_type: String,
    pub annotation: String,
    pub property: bool,
}

impl AttributeEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: EntryBase::new(id),
            ..Default::default()
        }
    }
}

/// A single named element of the API, tagged by `form`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form")]
pub enum ApiEntry {
    #[serde(rename = "module")]
    Module(ModuleEntry),
    #[serde(rename = "class")]
    Class(ClassEntry),
    #[serde(rename = "func")]
    Function(FunctionEntry),
    #[serde(rename = "attr")]
    Attribute(AttributeEntry),
    #[serde(rename = "special")]
    Special(SpecialEntry),
}

impl ApiEntry {
    pub fn base(&self) -> &EntryBase {
        match self {
            ApiEntry::Module(e) => &e.base,
            ApiEntry::Class(e) => &e.base,
            ApiEntry::Function(e) => &e.base,
            ApiEntry::Attribute(e) => &e.base,
            ApiEntry::Special(e) => &e.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut EntryBase {
        match self {
            ApiEntry::Module(e) => &mut e.base,
            ApiEntry::Class(e) => &mut e.base,
            ApiEntry::Function(e) => &mut e.base,
            ApiEntry::Attribute(e) => &mut e.base,
            ApiEntry::Special(e) => &mut e.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn parent(&self) -> &str {
        &self.base().parent
    }

    pub fn is_private(&self) -> bool {
        self.base().private
    }

    /// Serialized discriminator.
    pub fn form(&self) -> &'static str {
        match self {
            ApiEntry::Module(_) => "module",
            ApiEntry::Class(_) => "class",
            ApiEntry::Function(_) => "func",
            ApiEntry::Attribute(_) => "attr",
            ApiEntry::Special(_) => "special",
        }
    }

    /// Human readable variant name used in change messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ApiEntry::Module(_) => "module",
            ApiEntry::Class(_) => "class",
            ApiEntry::Function(_) => "function",
            ApiEntry::Attribute(_) => "attribute",
            ApiEntry::Special(_) => "special",
        }
    }

    pub fn same_form(&self, other: &ApiEntry) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Member map of collection entries (modules and classes).
    pub fn members(&self) -> Option<&IndexMap<String, String>> {
        match self {
            ApiEntry::Module(e) => Some(&e.members),
            ApiEntry::Class(e) => Some(&e.members),
            _ => None,
        }
    }

    pub fn members_mut(&mut self) -> Option<&mut IndexMap<String, String>> {
        match self {
            ApiEntry::Module(e) => Some(&mut e.members),
            ApiEntry::Class(e) => Some(&mut e.members),
            _ => None,
        }
    }

    /// Members whose target is not `self.id + "." + name`.
    pub fn alias_members(&self) -> IndexMap<&str, &str> {
        let id = self.id();
        self.members()
            .map(|members| {
                members
                    .iter()
                    .filter(|(name, target)| {
                        target.as_str() != format!("{}.{}", id, name).as_str()
                    })
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_collection(&self) -> bool {
        self.members().is_some()
    }

    pub fn as_module(&self) -> Option<&ModuleEntry> {
        match self {
            ApiEntry::Module(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassEntry> {
        match self {
            ApiEntry::Class(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionEntry> {
        match self {
            ApiEntry::Function(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionEntry> {
        match self {
            ApiEntry::Function(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeEntry> {
        match self {
            ApiEntry::Attribute(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_special(&self) -> Option<&SpecialEntry> {
        match self {
            ApiEntry::Special(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ApiEntry::Special(s) if s.kind == SpecialKind::External)
    }
}

impl From<ModuleEntry> for ApiEntry {
    fn from(e: ModuleEntry) -> Self {
        ApiEntry::Module(e)
    }
}

impl From<ClassEntry> for ApiEntry {
    fn from(e: ClassEntry) -> Self {
        ApiEntry::Class(e)
    }
}

impl From<FunctionEntry> for ApiEntry {
    fn from(e: FunctionEntry) -> Self {
        ApiEntry::Function(e)
    }
}

impl From<AttributeEntry> for ApiEntry {
    fn from(e: AttributeEntry) -> Self {
        ApiEntry::Attribute(e)
    }
}

impl From<SpecialEntry> for ApiEntry {
    fn from(e: SpecialEntry) -> Self {
        ApiEntry::Special(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_names() {
        assert!(is_private_segment("_x"));
        assert!(!is_private_segment("__init__"));
        assert!(!is_private_segment("x"));
        assert!(is_private_name("pkg._impl.f"));
        assert!(!is_private_name("pkg.impl.__call__"));
    }

    #[test]
    fn test_is_local() {
        assert!(is_local("pkg.f.<locals>.g"));
        assert!(!is_local("pkg.f.g"));
    }

    #[test]
    fn test_entry_base_derives_name_and_parent() {
        let base = EntryBase::new("pkg.mod.Class");
        assert_eq!(base.name, "Class");
        assert_eq!(base.parent, "pkg.mod");

        let root = EntryBase::new("pkg");
        assert_eq!(root.name, "pkg");
        assert_eq!(root.parent, "");
    }

    #[test]
    fn test_entry_form_tags() {
        let entry: ApiEntry = FunctionEntry::new("pkg.f").into();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["form"], "func");
        assert_eq!(json["id"], "pkg.f");
        assert_eq!(json["returnAnnotation"], "");

        let back: ApiEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_entry_deserializes_with_missing_fields() {
        let entry: ApiEntry =
            serde_json::from_str(r#"{"form": "attr", "id": "pkg.x", "rawType": "int"}"#).unwrap();
        let attr = entry.as_attribute().unwrap();
        assert_eq!(attr.raw_type, "int");
        assert_eq!(attr.base.scope, ItemScope::Static);
    }

    #[test]
    fn test_alias_members() {
        let mut module = ModuleEntry::new("pkg");
        module.members.insert("sub".into(), "pkg.sub".into());
        module.members.insert("f".into(), "pkg._impl.f".into());
        let entry = ApiEntry::Module(module);

        let aliases = entry.alias_members();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases.get("f"), Some(&"pkg._impl.f"));
    }

    #[test]
    fn test_module_exports() {
        let mut module = ModuleEntry::new("pkg");
        assert!(module.exports("f"));
        assert!(!module.exports("_f"));

        module.slots = Some(vec!["g".into()]);
        assert!(!module.exports("f"));
        assert!(module.exports("g"));
    }

    #[test]
    fn test_parameter_categories() {
        let p = Parameter::new(ParameterKind::PositionalOrKeyword, "a");
        assert!(p.is_keyword() && p.is_positional() && !p.is_var());

        let c = Parameter::new(ParameterKind::VarKeywordCandidate, "b");
        assert!(c.is_keyword() && !c.is_positional());

        let v = Parameter::new(ParameterKind::VarKeyword, "kw");
        assert!(v.is_var() && !v.is_keyword());
    }

    #[test]
    fn test_function_positions() {
        let mut f = FunctionEntry::new("pkg.h");
        f.parameters = vec![
            Parameter::new(ParameterKind::Positional, "a"),
            Parameter::new(ParameterKind::PositionalOrKeyword, "b"),
            Parameter::new(ParameterKind::Keyword, "c"),
        ];
        assert_eq!(f.position("b"), Some(1));
        assert_eq!(f.position("c"), None);
        assert_eq!(f.keywords().count(), 2);
    }
}
