//! Alias resolution and privacy marking.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexSet;

use crate::models::{is_private_name, split_id, ApiDescription, ApiEntry, SpecialEntry, EXTERNAL_ENTRYID};

/// Compute `alias` for every entry: every other dotted name through which it
/// is reachable via collection member maps.
///
/// An entry in progress that is reached again is treated as a self-alias,
/// which breaks cycles. The result never contains the entry's own id.
pub fn resolve_aliases(description: &mut ApiDescription) {
    // target id -> [(collection id, member name)]
    let mut referrers: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for entry in description.entries().values() {
        if let Some(members) = entry.members() {
            for (name, target) in members {
                referrers
                    .entry(target.as_str())
                    .or_default()
                    .push((entry.id(), name.as_str()));
            }
        }
    }

    let mut resolver = AliasResolver {
        referrers: &referrers,
        done: HashMap::new(),
        working: HashSet::new(),
    };
    let ids: Vec<&str> = description.entries().keys().map(String::as_str).collect();
    let mut aliases: Vec<(String, Vec<String>)> = Vec::with_capacity(ids.len());
    for id in ids {
        let names = resolver.resolve(id);
        aliases.push((
            id.to_string(),
            names.iter().filter(|n| n.as_str() != id).cloned().collect(),
        ));
    }

    for (id, alias) in aliases {
        if let Some(entry) = description.get_mut(&id) {
            entry.base_mut().alias = alias;
        }
    }
}

struct AliasResolver<'a> {
    referrers: &'a HashMap<&'a str, Vec<(&'a str, &'a str)>>,
    done: HashMap<String, BTreeSet<String>>,
    working: HashSet<String>,
}

impl AliasResolver<'_> {
    fn resolve(&mut self, id: &str) -> BTreeSet<String> {
        if let Some(names) = self.done.get(id) {
            return names.clone();
        }
        let mut names = BTreeSet::new();
        names.insert(id.to_string());
        self.working.insert(id.to_string());

        let prefix = format!("{}.", id);
        let referrers = self.referrers.get(id).cloned().unwrap_or_default();
        let mut parents: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for (collection, name) in referrers {
            // Submodules and nested classes do not alias their parents.
            if collection.starts_with(&prefix) {
                continue;
            }
            if !parents.contains_key(collection) {
                let parent_names = if self.working.contains(collection) {
                    BTreeSet::from([collection.to_string()])
                } else {
                    self.resolve(collection)
                };
                parents.insert(collection, parent_names);
            }
            if let Some(parent_names) = parents.get(collection) {
                for parent in parent_names {
                    names.insert(format!("{}.{}", parent, name));
                }
            }
        }

        self.working.remove(id);
        self.done.insert(id.to_string(), names.clone());
        names
    }
}

/// Whether a dotted name is private: it has a `_x` segment, or its containing
/// module declares an export list that does not include it.
pub fn is_private_path(description: &ApiDescription, name: &str) -> bool {
    if is_private_name(name) {
        return true;
    }
    let (parent, member) = split_id(name);
    match description.get(parent) {
        Some(ApiEntry::Module(module)) => module.slots.is_some() && !module.exports(member),
        _ => false,
    }
}

/// Set `private` on every entry: private iff every name in `{id, *alias}`
/// is private.
pub fn mark_private(description: &mut ApiDescription) {
    let flags: Vec<(String, bool)> = description
        .entries()
        .values()
        .map(|entry| {
            let base = entry.base();
            let private = std::iter::once(&base.id)
                .chain(base.alias.iter())
                .all(|name| is_private_path(description, name));
            (base.id.clone(), private)
        })
        .collect();
    for (id, private) in flags {
        if let Some(entry) = description.get_mut(&id) {
            entry.base_mut().private = private;
        }
    }
}

/// Add one External placeholder per member target that is not an entry.
pub fn materialize_externals(description: &mut ApiDescription) -> usize {
    let mut missing: Vec<String> = Vec::new();
    for entry in description.entries().values() {
        if let Some(members) = entry.members() {
            for target in members.values() {
                if target != EXTERNAL_ENTRYID
                    && !description.contains(target)
                    && !missing.contains(target)
                {
                    missing.push(target.clone());
                }
            }
        }
    }
    let count = missing.len();
    for id in missing {
        if let Err(e) = description.add_entry(SpecialEntry::external(id).into()) {
            tracing::warn!(error = %e, "Failed to add external entry");
        }
    }
    count
}

/// Point dangling `parent` fields at the nearest existing ancestor, or at the
/// root when none exists.
pub fn repair_parents(description: &mut ApiDescription) {
    let fixes: Vec<(String, String)> = description
        .entries()
        .values()
        .filter(|e| {
            let parent = e.parent();
            !parent.is_empty() && parent != EXTERNAL_ENTRYID && !description.contains(parent)
        })
        .map(|e| {
            let mut current = e.parent();
            let repaired = loop {
                match current.rsplit_once('.') {
                    Some((up, _)) if description.contains(up) => break up.to_string(),
                    Some((up, _)) => current = up,
                    None => break String::new(),
                }
            };
            (e.id().to_string(), repaired)
        })
        .collect();
    for (id, parent) in fixes {
        tracing::debug!(entry = %id, parent = %parent, "Repaired dangling parent");
        if let Some(entry) = description.get_mut(&id) {
            entry.base_mut().parent = parent;
        }
    }
}

/// Make every class's MRO start with the class itself and list each class
/// once.
pub fn normalize_mros(description: &mut ApiDescription) {
    let fixes: Vec<(String, Vec<String>)> = description
        .classes()
        .filter_map(|cls| {
            let mros: IndexSet<&String> = std::iter::once(&cls.base.id)
                .chain(cls.mros.iter())
                .collect();
            (mros.len() != cls.mros.len() || cls.mros.first() != Some(&cls.base.id))
                .then(|| (cls.base.id.clone(), mros.into_iter().cloned().collect()))
        })
        .collect();
    for (id, mros) in fixes {
        tracing::debug!(entry = %id, "Normalized method resolution order");
        if let Some(ApiEntry::Class(cls)) = description.get_mut(&id) {
            cls.mros = mros;
        }
    }
}
