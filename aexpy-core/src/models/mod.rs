//! Pipeline products: Distribution → ApiDescription → ApiDifference → Report.
//!
//! Every product carries a [`ProductInfo`] header (`creation`, `duration`,
//! `producer`, `state`) flattened into its JSON object, so any stage output
//! can be traced back to the producer that wrote it.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};

pub mod description;
pub mod difference;
pub mod typing;

pub use description::*;
pub use difference::*;
pub use typing::*;

/// Identifies one released version of a project.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    pub project: String,
    pub version: String,
}

impl Default for Release {
    fn default() -> Self {
        Self {
            project: "unknown".to_string(),
            version: "unknown".to_string(),
        }
    }
}

impl Release {
    pub fn new(project: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.project, self.version)
    }
}

impl std::str::FromStr for Release {
    type Err = Error;

    /// Parse `project@version`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((project, version)) if !project.is_empty() && !version.is_empty() => {
                Ok(Release::new(project, version))
            }
            _ => Err(Error::InvalidInput(format!(
                "release '{}' is not in project@version form",
                s
            ))),
        }
    }
}

/// An (old, new) pair of releases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleasePair {
    pub old: Release,
    pub new: Release,
}

impl std::fmt::Display for ReleasePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.old.project == self.new.project {
            write!(
                f,
                "{}@{}:{}",
                self.old.project, self.old.version, self.new.version
            )
        } else {
            write!(f, "{}:{}", self.old, self.new)
        }
    }
}

/// Lifecycle state of a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProduceState {
    #[default]
    Pending,
    Success,
    Failure,
}

impl ProduceState {
    pub fn icon(&self) -> &'static str {
        match self {
            ProduceState::Pending => "⌛",
            ProduceState::Success => "✅",
            ProduceState::Failure => "❌",
        }
    }
}

impl Serialize for ProduceState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            ProduceState::Pending => 0,
            ProduceState::Success => 1,
            ProduceState::Failure => 2,
        })
    }
}

impl<'de> Deserialize<'de> for ProduceState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(ProduceState::Pending),
            1 => Ok(ProduceState::Success),
            2 => Ok(ProduceState::Failure),
            other => Err(serde::de::Error::custom(format!(
                "invalid produce state {}",
                other
            ))),
        }
    }
}

/// Provenance header shared by all products.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInfo {
    pub creation: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds.
    pub duration: f64,
    pub producer: String,
    pub state: ProduceState,
}

/// Common behaviour of pipeline products.
pub trait Product: Serialize + for<'de> Deserialize<'de> {
    fn info(&self) -> &ProductInfo;
    fn info_mut(&mut self) -> &mut ProductInfo;

    /// Short name of the product (release or release pair).
    fn title(&self) -> String;

    /// Product-specific overview lines, appended after the header.
    fn details(&self) -> String {
        String::new()
    }

    fn overview(&self) -> String {
        let info = self.info();
        let creation = info
            .creation
            .map(|c| c.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} {} (by {}):\n  ⏰ {} ⏱ {}s{}",
            info.state.icon(),
            self.title(),
            info.producer,
            creation,
            info.duration,
            self.details()
        )
    }
}

/// An unpacked release of a package, the input of extraction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Distribution {
    #[serde(flatten)]
    pub info: ProductInfo,
    pub release: Release,
    pub wheel_file: Option<PathBuf>,
    pub root_path: Option<PathBuf>,
    pub pyversion: String,
    pub top_modules: Vec<String>,
    #[serde(alias = "requirements")]
    pub dependencies: Vec<String>,
    pub file_count: u64,
    pub file_size: u64,
    pub loc_count: u64,
    pub metadata: Vec<(String, String)>,
    pub description: String,
}

impl Distribution {
    pub fn new(release: Release) -> Self {
        Self {
            release,
            ..Default::default()
        }
    }
}

impl Product for Distribution {
    fn info(&self) -> &ProductInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ProductInfo {
        &mut self.info
    }

    fn title(&self) -> String {
        self.release.to_string()
    }

    fn details(&self) -> String {
        format!(
            "\n  📦 {}\n  📁 {} ({} files, {} bytes, {} LOC)\n  🔖 {}\n  📚 {}",
            display_path(&self.wheel_file),
            display_path(&self.root_path),
            self.file_count,
            self.file_size,
            self.loc_count,
            self.pyversion,
            self.top_modules.join(", ")
        )
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Synthetic constructor returned for classes that inherit `object.__init__`.
static OBJECT_INIT: Lazy<ApiEntry> = Lazy::new(|| {
    let mut init = FunctionEntry::new("object.__init__");
    init.base.scope = ItemScope::Instance;
    init.parameters = vec![Parameter::new(ParameterKind::PositionalOrKeyword, "self")];
    ApiEntry::Function(init)
});

/// Lazily built secondary indices over the entries map.
#[derive(Clone, Debug, Default)]
struct DescriptionIndex {
    names: HashMap<String, Vec<String>>,
    modules: Vec<String>,
    classes: Vec<String>,
    functions: Vec<String>,
    attributes: Vec<String>,
}

/// The complete API surface of one distribution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiDescription {
    #[serde(flatten)]
    pub info: ProductInfo,
    pub distribution: Distribution,
    entries: IndexMap<String, ApiEntry>,
    #[serde(skip)]
    index: OnceCell<DescriptionIndex>,
}

impl PartialEq for ApiDescription {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
            && self.distribution == other.distribution
            && self.entries == other.entries
    }
}

impl ApiDescription {
    pub fn new(distribution: Distribution) -> Self {
        Self {
            distribution,
            ..Default::default()
        }
    }

    /// Build a description from entries, rejecting duplicate ids.
    pub fn from_entries(
        distribution: Distribution,
        entries: impl IntoIterator<Item = ApiEntry>,
    ) -> Result<Self> {
        let mut description = Self::new(distribution);
        for entry in entries {
            description.add_entry(entry)?;
        }
        Ok(description)
    }

    pub fn entries(&self) -> &IndexMap<String, ApiEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ApiEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Mutable access to one entry. Invalidates cached projections.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ApiEntry> {
        self.clear_cache();
        self.entries.get_mut(id)
    }

    /// Mutable iteration over entries. Invalidates cached projections.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ApiEntry> {
        self.clear_cache();
        self.entries.values_mut()
    }

    pub fn add_entry(&mut self, entry: ApiEntry) -> Result<()> {
        if self.entries.contains_key(entry.id()) {
            return Err(Error::InvalidInput(format!(
                "duplicate entry id {}",
                entry.id()
            )));
        }
        self.clear_cache();
        self.entries.insert(entry.id().to_string(), entry);
        Ok(())
    }

    pub fn clear_cache(&mut self) {
        self.index = OnceCell::new();
    }

    fn index(&self) -> &DescriptionIndex {
        self.index.get_or_init(|| {
            let mut index = DescriptionIndex::default();
            for (id, entry) in &self.entries {
                index
                    .names
                    .entry(entry.name().to_string())
                    .or_default()
                    .push(id.clone());
                match entry {
                    ApiEntry::Module(_) => index.modules.push(id.clone()),
                    ApiEntry::Class(_) => index.classes.push(id.clone()),
                    ApiEntry::Function(_) => index.functions.push(id.clone()),
                    ApiEntry::Attribute(_) => index.attributes.push(id.clone()),
                    ApiEntry::Special(_) => {}
                }
            }
            index
        })
    }

    /// Entries whose final name segment is `name`, in insertion order.
    pub fn by_name(&self, name: &str) -> Vec<&ApiEntry> {
        self.index()
            .names
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.index()
            .modules
            .iter()
            .filter_map(|id| self.entries.get(id).and_then(ApiEntry::as_module))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.index()
            .classes
            .iter()
            .filter_map(|id| self.entries.get(id).and_then(ApiEntry::as_class))
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.index()
            .functions
            .iter()
            .filter_map(|id| self.entries.get(id).and_then(ApiEntry::as_function))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeEntry> {
        self.index()
            .attributes
            .iter()
            .filter_map(|id| self.entries.get(id).and_then(ApiEntry::as_attribute))
    }

    /// Resolve a dotted name through member maps and class MROs.
    pub fn resolve_name(&self, name: &str) -> Option<&ApiEntry> {
        if let Some(entry) = self.entries.get(name) {
            return Some(entry);
        }
        let (parent, member) = name.rsplit_once('.')?;
        if parent.is_empty() || member.is_empty() {
            return None;
        }
        match self.resolve_name(parent)? {
            ApiEntry::Class(cls) => self.resolve_class_member(cls, member),
            ApiEntry::Module(module) => module
                .members
                .get(member)
                .and_then(|target| self.entries.get(target)),
            _ => None,
        }
    }

    /// Look a member up along the MRO of `cls`.
    ///
    /// Every class has an accessible constructor: when no class on the MRO
    /// defines `__init__`, a synthetic `object.__init__(self)` is returned.
    pub fn resolve_class_member(&self, cls: &ClassEntry, name: &str) -> Option<&ApiEntry> {
        let found = cls.mros.iter().find_map(|mro| {
            let base = self.entries.get(mro)?.as_class()?;
            let target = base.members.get(name)?;
            self.entries.get(target)
        });
        match found {
            Some(entry) => Some(entry),
            None if name == "__init__" => Some(&OBJECT_INIT),
            None => None,
        }
    }

    /// Recompute `callers` from every function's `callees`.
    pub fn calc_callers(&mut self) {
        let mut callers: IndexMap<String, Vec<String>> = IndexMap::new();
        for func in self.entries.values().filter_map(ApiEntry::as_function) {
            for callee in &func.callees {
                if !self.entries.contains_key(callee) {
                    continue;
                }
                let list = callers.entry(callee.clone()).or_default();
                if !list.contains(&func.base.id) {
                    list.push(func.base.id.clone());
                }
            }
        }
        for entry in self.entries.values_mut() {
            if let ApiEntry::Function(func) = entry {
                func.callers = callers.shift_remove(&func.base.id).unwrap_or_default();
            }
        }
        self.clear_cache();
    }
}

impl Product for ApiDescription {
    fn info(&self) -> &ProductInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ProductInfo {
        &mut self.info
    }

    fn title(&self) -> String {
        self.distribution.release.to_string()
    }

    fn details(&self) -> String {
        format!(
            "\n  💠 {} entries\n    Modules: {}\n    Classes: {}\n    Functions: {}\n    Attributes: {}",
            self.entries.len(),
            self.modules().count(),
            self.classes().count(),
            self.functions().count(),
            self.attributes().count()
        )
    }
}

/// Change records between two descriptions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiDifference {
    #[serde(flatten)]
    pub info: ProductInfo,
    pub old: Distribution,
    pub new: Distribution,
    pub entries: IndexMap<String, DiffEntry>,
}

impl ApiDifference {
    pub fn new(old: Distribution, new: Distribution) -> Self {
        Self {
            old,
            new,
            ..Default::default()
        }
    }

    pub fn pair(&self) -> ReleasePair {
        ReleasePair {
            old: self.old.release.clone(),
            new: self.new.release.clone(),
        }
    }

    /// Overall severity plus per-rank counts.
    ///
    /// The level is the highest non-Unknown rank present, or Compatible when
    /// there is none.
    pub fn evaluate(&self) -> (BreakingRank, IndexMap<BreakingRank, usize>) {
        let mut counts = IndexMap::new();
        for rank in BreakingRank::DESCENDING {
            let n = self.entries.values().filter(|e| e.rank == rank).count();
            if n > 0 {
                counts.insert(rank, n);
            }
        }
        let level = counts
            .keys()
            .copied()
            .find(|r| *r != BreakingRank::Unknown)
            .unwrap_or(BreakingRank::Compatible);
        (level, counts)
    }

    pub fn rank(&self, rank: BreakingRank) -> Vec<&DiffEntry> {
        self.entries.values().filter(|e| e.rank == rank).collect()
    }

    /// Entries at or above `rank`. Unknown entries are never included.
    pub fn breaking(&self, rank: BreakingRank) -> Vec<&DiffEntry> {
        self.entries
            .values()
            .filter(|e| e.rank != BreakingRank::Unknown && e.rank >= rank)
            .collect()
    }

    /// Distinct kinds in first-seen order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = Vec::new();
        for entry in self.entries.values() {
            if !kinds.contains(&entry.kind.as_str()) {
                kinds.push(&entry.kind);
            }
        }
        kinds
    }

    pub fn kind(&self, name: &str) -> Vec<&DiffEntry> {
        self.entries.values().filter(|e| e.kind == name).collect()
    }

    pub fn verified(&self) -> Vec<&DiffEntry> {
        self.entries
            .values()
            .filter(|e| e.verify.state == VerifyState::Pass)
            .collect()
    }
}

/// Icon for a breaking rank in reports and overviews.
pub fn rank_icon(rank: BreakingRank) -> &'static str {
    match rank {
        BreakingRank::Compatible => "🟢",
        BreakingRank::Low => "🟡",
        BreakingRank::Medium => "🟠",
        BreakingRank::High => "🔴",
        BreakingRank::Unknown => "❔",
    }
}

/// Icon for an overall severity level.
pub fn level_icon(rank: BreakingRank) -> &'static str {
    match rank {
        BreakingRank::Compatible => "✅",
        BreakingRank::Low => "❓",
        BreakingRank::Medium => "❗",
        BreakingRank::High => "❌",
        BreakingRank::Unknown => "❔",
    }
}

impl Product for ApiDifference {
    fn info(&self) -> &ProductInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ProductInfo {
        &mut self.info
    }

    fn title(&self) -> String {
        self.pair().to_string()
    }

    fn details(&self) -> String {
        let (level, counts) = self.evaluate();
        let kinds = self.kinds();
        let mut out = format!("\n  💠 {} entries\n  🆔 {} kinds", self.entries.len(), kinds.len());
        for kind in &kinds {
            out.push_str(&format!("\n    {}: {}", kind, self.kind(kind).len()));
        }
        out.push_str(&format!("\n  {} {}", level_icon(level), level));
        for (rank, n) in &counts {
            out.push_str(&format!("\n    {} {}", rank_icon(*rank), n));
        }
        out
    }
}

/// Rendered text report for a difference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    #[serde(flatten)]
    pub info: ProductInfo,
    pub old: Distribution,
    pub new: Distribution,
    pub content: String,
}

impl Product for Report {
    fn info(&self) -> &ProductInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ProductInfo {
        &mut self.info
    }

    fn title(&self) -> String {
        ReleasePair {
            old: self.old.release.clone(),
            new: self.new.release.clone(),
        }
        .to_string()
    }
}

/// Any persisted product, discriminated by its top-level keys.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyProduct {
    Distribution(Distribution),
    Description(Box<ApiDescription>),
    Difference(Box<ApiDifference>),
    Report(Report),
}

impl AnyProduct {
    /// `release` → Distribution, `distribution` → ApiDescription,
    /// `entries` → ApiDifference, anything else → Report.
    pub fn from_value(value: Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidInput("product is not a JSON object".into()))?;
        if object.contains_key("release") {
            Ok(AnyProduct::Distribution(serde_json::from_value(value)?))
        } else if object.contains_key("distribution") {
            Ok(AnyProduct::Description(Box::new(serde_json::from_value(value)?)))
        } else if object.contains_key("entries") {
            Ok(AnyProduct::Difference(Box::new(serde_json::from_value(value)?)))
        } else {
            Ok(AnyProduct::Report(serde_json::from_value(value)?))
        }
    }

    pub fn info(&self) -> &ProductInfo {
        match self {
            AnyProduct::Distribution(p) => p.info(),
            AnyProduct::Description(p) => p.info(),
            AnyProduct::Difference(p) => p.info(),
            AnyProduct::Report(p) => p.info(),
        }
    }

    pub fn overview(&self) -> String {
        match self {
            AnyProduct::Distribution(p) => p.overview(),
            AnyProduct::Description(p) => p.overview(),
            AnyProduct::Difference(p) => p.overview(),
            AnyProduct::Report(p) => p.overview(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_description() -> ApiDescription {
        let mut module = ModuleEntry::new("pkg");
        module.members.insert("Base".into(), "pkg.Base".into());
        module.members.insert("Child".into(), "pkg.Child".into());
        module.members.insert("helper".into(), "pkg._impl.helper".into());

        let mut base = ClassEntry::new("pkg.Base");
        base.mros = vec!["pkg.Base".into(), OBJECT_CLASS_ID.into()];
        base.members.insert("run".into(), "pkg.Base.run".into());

        let mut child = ClassEntry::new("pkg.Child");
        child.mros = vec!["pkg.Child".into(), "pkg.Base".into(), OBJECT_CLASS_ID.into()];
        child.bases = vec!["pkg.Base".into()];

        let impl_module = ModuleEntry::new("pkg._impl");
        let helper = FunctionEntry::new("pkg._impl.helper");
        let run = FunctionEntry::new("pkg.Base.run");

        ApiDescription::from_entries(
            Distribution::default(),
            vec![
                module.into(),
                base.into(),
                child.into(),
                impl_module.into(),
                helper.into(),
                run.into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_release_parse_and_display() {
        let release: Release = "demo@1.0".parse().unwrap();
        assert_eq!(release, Release::new("demo", "1.0"));
        assert_eq!(release.to_string(), "demo@1.0");
        assert!("demo".parse::<Release>().is_err());

        let pair = ReleasePair {
            old: release.clone(),
            new: Release::new("demo", "2.0"),
        };
        assert_eq!(pair.to_string(), "demo@1.0:2.0");
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut description = sample_description();
        let err = description.add_entry(FunctionEntry::new("pkg.Base.run").into());
        assert!(err.is_err());
    }

    #[test]
    fn test_resolve_name_through_mro() {
        let description = sample_description();
        let resolved = description.resolve_name("pkg.Child.run").unwrap();
        assert_eq!(resolved.id(), "pkg.Base.run");
    }

    #[test]
    fn test_resolve_name_through_module_alias() {
        let description = sample_description();
        let resolved = description.resolve_name("pkg.helper").unwrap();
        assert_eq!(resolved.id(), "pkg._impl.helper");
        assert!(description.resolve_name("pkg.missing").is_none());
    }

    #[test]
    fn test_resolve_synthetic_constructor() {
        let description = sample_description();
        let init = description.resolve_name("pkg.Child.__init__").unwrap();
        let init = init.as_function().unwrap();
        assert_eq!(init.base.id, "object.__init__");
        assert_eq!(init.base.scope, ItemScope::Instance);
        assert_eq!(init.parameters.len(), 1);
    }

    #[test]
    fn test_projections_refresh_after_mutation() {
        let mut description = sample_description();
        assert_eq!(description.classes().count(), 2);
        assert_eq!(description.by_name("run").len(), 1);

        description
            .add_entry(FunctionEntry::new("pkg.Child.run").into())
            .unwrap();
        assert_eq!(description.by_name("run").len(), 2);
        assert_eq!(description.functions().count(), 3);
    }

    #[test]
    fn test_calc_callers() {
        let mut description = sample_description();
        if let Some(ApiEntry::Function(f)) = description.get_mut("pkg.Base.run") {
            f.callees = vec!["pkg._impl.helper".into(), "os.path.join".into()];
        }
        description.calc_callers();
        let helper = description.get("pkg._impl.helper").unwrap().as_function().unwrap();
        assert_eq!(helper.callers, vec!["pkg.Base.run".to_string()]);
    }

    #[test]
    fn test_evaluate_ignores_unknown_for_level() {
        let mut diff = ApiDifference::default();
        let mut a = DiffEntry::new("a");
        a.id = "a".into();
        a.rank = BreakingRank::Unknown;
        diff.entries.insert(a.id.clone(), a);

        let (level, counts) = diff.evaluate();
        assert_eq!(level, BreakingRank::Compatible);
        assert_eq!(counts.get(&BreakingRank::Unknown), Some(&1));
        assert!(diff.breaking(BreakingRank::Unknown).is_empty());

        let mut b = DiffEntry::new("b");
        b.id = "b".into();
        b.rank = BreakingRank::Low;
        diff.entries.insert(b.id.clone(), b);
        assert_eq!(diff.evaluate().0, BreakingRank::Low);
    }

    #[test]
    fn test_any_product_discrimination() {
        let dist = serde_json::to_value(Distribution::default()).unwrap();
        assert!(matches!(
            AnyProduct::from_value(dist).unwrap(),
            AnyProduct::Distribution(_)
        ));

        let description = serde_json::to_value(sample_description()).unwrap();
        assert!(matches!(
            AnyProduct::from_value(description).unwrap(),
            AnyProduct::Description(_)
        ));

        let diff = json!({"old": {}, "new": {}, "entries": {}});
        assert!(matches!(
            AnyProduct::from_value(diff).unwrap(),
            AnyProduct::Difference(_)
        ));

        let report = json!({"content": "x"});
        assert!(matches!(
            AnyProduct::from_value(report).unwrap(),
            AnyProduct::Report(_)
        ));
    }

    #[test]
    fn test_description_round_trip() {
        let description = sample_description();
        let text = serde_json::to_string(&description).unwrap();
        let back: ApiDescription = serde_json::from_str(&text).unwrap();
        assert_eq!(back, description);
        assert_eq!(
            back.entries().keys().collect::<Vec<_>>(),
            description.entries().keys().collect::<Vec<_>>()
        );
    }
}
