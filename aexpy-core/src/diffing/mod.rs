//! Constraint-based differ: two ApiDescriptions → ApiDifference.
//!
//! A [`Constraint`] inspects one pair of entries (either side may be absent)
//! and emits [`DiffEntry`] records. The [`Differ`] walks the old description,
//! then the entries that only exist in the new one, and feeds every pair
//! through its constraints in registration order.
//!
//! # Example
//!
//! ```ignore
//! let differ = Differ::default();
//! let entries = differ.diff_entries(&old, &new, &DiffOptions::default());
//! for entry in entries.values() {
//!     println!("{}: {}", entry.kind, entry.message);
//! }
//! ```

pub mod aliases;
pub mod classes;
pub mod evaluator;
pub mod parameters;
pub mod presence;
pub mod types;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::Result;
use crate::models::{is_local, ApiDescription, ApiDifference, ApiEntry, DiffEntry};
use crate::produce::{ensure_success, produce, ProduceContext};
use crate::verifying::{Verifier, VerifyOptions};

pub use evaluator::{evaluate_entry, Evaluator};
pub use parameters::match_parameters;

/// Options of the diff stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// An inferred `Any` return type without a written annotation hides
    /// return type changes.
    pub any_suppresses_return_type: bool,
    /// Run the trigger verifier on breaking entries.
    pub verify: Option<VerifyOptions>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            any_suppresses_return_type: true,
            verify: None,
        }
    }
}

/// Descriptions and options visible to every constraint.
pub struct DiffContext<'a> {
    pub old: &'a ApiDescription,
    pub new: &'a ApiDescription,
    pub options: &'a DiffOptions,
}

/// Checker signature: `(old entry, new entry, context) → entries`.
pub type CheckFn = fn(Option<&ApiEntry>, Option<&ApiEntry>, &DiffContext) -> Result<Vec<DiffEntry>>;

/// A named checker limited to one entry variant.
#[derive(Clone)]
pub struct Constraint {
    pub kind: &'static str,
    accepts: fn(&ApiEntry) -> bool,
    /// Run when either side matches (add/remove); otherwise both must match.
    either: bool,
    check: CheckFn,
}

impl Constraint {
    /// Constraint applied only when both sides are present and accepted.
    pub fn both(kind: &'static str, accepts: fn(&ApiEntry) -> bool, check: CheckFn) -> Self {
        Self {
            kind,
            accepts,
            either: false,
            check,
        }
    }

    /// Constraint applied when at least one side is accepted; the other side
    /// is dropped unless it is accepted as well.
    pub fn either(kind: &'static str, accepts: fn(&ApiEntry) -> bool, check: CheckFn) -> Self {
        Self {
            kind,
            accepts,
            either: true,
            check,
        }
    }

    /// Run the checker, then stamp kind and snapshots on every emitted entry.
    ///
    /// Entries that already carry a kind keep it.
    pub fn apply(
        &self,
        old: Option<&ApiEntry>,
        new: Option<&ApiEntry>,
        context: &DiffContext,
    ) -> Result<Vec<DiffEntry>> {
        let old = old.filter(|e| (self.accepts)(e));
        let new = new.filter(|e| (self.accepts)(e));
        let run = if self.either {
            old.is_some() || new.is_some()
        } else {
            old.is_some() && new.is_some()
        };
        if !run {
            return Ok(Vec::new());
        }
        let mut entries = (self.check)(old, new, context)?;
        for entry in &mut entries {
            if entry.kind.is_empty() {
                entry.kind = self.kind.to_string();
            }
            entry.old = old.cloned();
            entry.new = new.cloned();
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind)
            .field("either", &self.either)
            .finish()
    }
}

pub fn is_module(entry: &ApiEntry) -> bool {
    matches!(entry, ApiEntry::Module(_))
}

pub fn is_class(entry: &ApiEntry) -> bool {
    matches!(entry, ApiEntry::Class(_))
}

pub fn is_function(entry: &ApiEntry) -> bool {
    matches!(entry, ApiEntry::Function(_))
}

pub fn is_attribute(entry: &ApiEntry) -> bool {
    matches!(entry, ApiEntry::Attribute(_))
}

pub fn is_special(entry: &ApiEntry) -> bool {
    matches!(entry, ApiEntry::Special(_))
}

pub fn is_collection(entry: &ApiEntry) -> bool {
    entry.is_collection()
}

/// Stable id of a diff entry: xxh3 of `"{rank} {kind} {message}"`.
pub fn hash_entry(entry: &DiffEntry) -> String {
    let key = format!("{} {} {}", entry.rank.value(), entry.kind, entry.message);
    format!("{:016x}", xxh3_64(key.as_bytes()))
}

#[derive(Debug)]
pub struct Differ {
    constraints: Vec<Constraint>,
}

impl Default for Differ {
    fn default() -> Self {
        let mut constraints = Vec::new();
        constraints.extend(presence::constraints());
        constraints.extend(classes::constraints());
        constraints.extend(parameters::constraints());
        constraints.extend(types::constraints());
        constraints.extend(aliases::constraints());
        Self::new(constraints)
    }
}

impl Differ {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Compare every entry pair and collect the emitted changes, keyed by id.
    pub fn diff_entries(
        &self,
        old: &ApiDescription,
        new: &ApiDescription,
        options: &DiffOptions,
    ) -> IndexMap<String, DiffEntry> {
        let context = DiffContext { old, new, options };
        let mut result: IndexMap<String, DiffEntry> = IndexMap::new();

        for entry in old.entries().values() {
            if is_local(entry.id()) {
                continue;
            }
            let counterpart = new.get(entry.id());
            if counterpart.is_some_and(|e| is_local(e.id())) {
                continue;
            }
            for item in self.process(Some(entry), counterpart, &context) {
                insert_unique(&mut result, item);
            }
        }

        for entry in new.entries().values() {
            if is_local(entry.id()) || old.contains(entry.id()) {
                continue;
            }
            for item in self.process(None, Some(entry), &context) {
                insert_unique(&mut result, item);
            }
        }

        tracing::info!(entries = result.len(), "Diffed descriptions");
        result
    }

    fn process(
        &self,
        old: Option<&ApiEntry>,
        new: Option<&ApiEntry>,
        context: &DiffContext,
    ) -> Vec<DiffEntry> {
        let (old, new) = resolve_counterpart(old, new, context);
        tracing::trace!(old = ?old.map(ApiEntry::id), new = ?new.map(ApiEntry::id), "Diff pair");

        let mut items = Vec::new();
        for constraint in &self.constraints {
            match constraint.apply(old, new, context) {
                Ok(entries) => items.extend(entries),
                Err(e) => tracing::error!(
                    kind = constraint.kind,
                    old = ?old.map(ApiEntry::id),
                    new = ?new.map(ApiEntry::id),
                    error = %e,
                    "Constraint failed"
                ),
            }
        }
        for item in &mut items {
            if item.id.is_empty() {
                item.id = hash_entry(item);
            }
        }
        items
    }

    /// Diff two extracted descriptions, evaluate ranks and optionally verify.
    pub fn diff(
        &self,
        old: &ApiDescription,
        new: &ApiDescription,
        options: &DiffOptions,
    ) -> ProduceContext<ApiDifference> {
        let product = ApiDifference::new(old.distribution.clone(), new.distribution.clone());
        produce(product, |context| {
            ensure_success(old, "old description")?;
            ensure_success(new, "new description")?;

            context.using("differ", |difference| {
                difference.entries = self.diff_entries(old, new, options);
                Ok(())
            })?;
            context.using("evaluator", |difference| {
                Evaluator::new(old, new).evaluate(difference);
                Ok(())
            })?;
            if let Some(verify) = &options.verify {
                context.try_using("verifier", |difference| {
                    Verifier::new(verify.clone()).verify(difference, old)
                });
            }
            Ok(())
        })
    }
}

/// Pair an entry that vanished on one side with what the same dotted name
/// resolves to there (an inherited method, a re-exported member), when the
/// resolved entry has the same variant.
fn resolve_counterpart<'a>(
    old: Option<&'a ApiEntry>,
    new: Option<&'a ApiEntry>,
    context: &DiffContext<'a>,
) -> (Option<&'a ApiEntry>, Option<&'a ApiEntry>) {
    match (old, new) {
        (None, Some(b)) => {
            let a = context.old.resolve_name(b.id()).filter(|a| a.same_form(b));
            (a, Some(b))
        }
        (Some(a), None) => {
            let b = context.new.resolve_name(a.id()).filter(|b| b.same_form(a));
            (Some(a), b)
        }
        pair => pair,
    }
}

fn insert_unique(result: &mut IndexMap<String, DiffEntry>, mut item: DiffEntry) {
    if result.contains_key(&item.id) {
        tracing::warn!(id = %item.id, message = %item.message, "Duplicated diff entry id");
        item.id = format!("{}-{}", item.id, uuid::Uuid::new_v4().simple());
    }
    result.insert(item.id.clone(), item);
}

/// Diff with the default constraint set.
pub fn diff(
    old: &ApiDescription,
    new: &ApiDescription,
    options: &DiffOptions,
) -> ProduceContext<ApiDifference> {
    Differ::default().diff(old, new, options)
}
