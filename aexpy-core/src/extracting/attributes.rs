//! Instance-attribute detection from method bodies.

use std::collections::BTreeSet;

use tree_sitter::Node;

use super::source::{get_node_text, parse_function, top_function, walk_tree};
use crate::models::{ApiDescription, ApiEntry, AttributeEntry, ItemScope};

/// Names assigned through `receiver.<name>` anywhere in a function source.
///
/// Plain, annotated, augmented and walrus assignments count, including
/// tuple and list unpacking targets.
pub fn assigned_attributes(src: &str, receiver: &str) -> crate::error::Result<BTreeSet<String>> {
    let (source, tree) = parse_function(src)?;
    let mut names = BTreeSet::new();
    let root = match top_function(&tree) {
        Some(func) => func,
        None => tree.root_node(),
    };
    walk_tree(root, &mut |node| {
        let target = match node.kind() {
            "assignment" | "augmented_assignment" => node.child_by_field_name("left"),
            "named_expression" => node.child_by_field_name("name"),
            _ => None,
        };
        if let Some(target) = target {
            collect_targets(&target, &source, receiver, &mut names);
        }
    });
    Ok(names)
}

fn collect_targets(node: &Node, source: &str, receiver: &str, names: &mut BTreeSet<String>) {
    match node.kind() {
        "attribute" => {
            let object = node.child_by_field_name("object");
            let attribute = node.child_by_field_name("attribute");
            if let (Some(object), Some(attribute)) = (object, attribute) {
                if object.kind() == "identifier" && get_node_text(&object, source) == receiver {
                    names.insert(get_node_text(&attribute, source).to_string());
                }
            }
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
        | "parenthesized_expression" | "list_splat_pattern" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_targets(&child, source, receiver, names);
            }
        }
        _ => {}
    }
}

/// Add an Instance-scope attribute for every `self.x = ...` found in the
/// methods of classes without `__slots__`. Returns the number of attributes added.
pub fn enrich_instance_attributes(description: &mut ApiDescription) -> usize {
    let mut found: Vec<(String, String)> = Vec::new();

    for cls in description.classes() {
        if cls.slots.is_some() {
            continue;
        }
        for target in cls.members.values() {
            let Some(func) = description.get(target).and_then(ApiEntry::as_function) else {
                continue;
            };
            if func.base.src.is_empty() || func.base.scope != ItemScope::Instance {
                continue;
            }
            let Some(receiver) = func.positionals().next().map(|p| p.name.clone()) else {
                continue;
            };
            match assigned_attributes(&func.base.src, &receiver) {
                Ok(names) => {
                    for name in names {
                        if !cls.members.contains_key(&name) {
                            found.push((cls.base.id.clone(), name));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(entry = %func.base.id, error = %e, "Failed to parse method source");
                }
            }
        }
    }

    let mut added = 0;
    for (class_id, name) in found {
        let id = format!("{}.{}", class_id, name);
        let (location, class_private) = match description.get(&class_id) {
            Some(cls) => (cls.base().location.clone(), cls.is_private()),
            None => continue,
        };
        if !description.contains(&id) {
            let mut attr = AttributeEntry::new(&id);
            attr.base.scope = ItemScope::Instance;
            attr.base.location = location;
            attr.base.private = class_private || crate::models::is_private_segment(&name);
            if description.add_entry(attr.into()).is_err() {
                continue;
            }
            tracing::debug!(entry = %id, "Detected instance attribute");
            added += 1;
        }
        if let Some(ApiEntry::Class(cls)) = description.get_mut(&class_id) {
            cls.members.entry(name).or_insert(id);
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassEntry, Distribution, FunctionEntry, Parameter, ParameterKind};

    #[test]
    fn test_assigned_attributes() {
        let src = r#"
    def __init__(self, a):
        self.a = a
        self.b: int = 0
        self.count += 1
        self.x, (self.y, other.z) = 1, (2, 3)
        if (n := a):
            self.n = n
        other.q = 1
        self.obj.inner = 2
"#;
        let names = assigned_attributes(src, "self").unwrap();
        let names: Vec<_> = names.into_iter().collect();
        assert_eq!(names, vec!["a", "b", "count", "n", "x", "y"]);
    }

    #[test]
    fn test_custom_receiver_name() {
        let src = "def __init__(this):\n    this.value = 1\n    self.other = 2\n";
        let names = assigned_attributes(src, "this").unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["value"]);
    }

    #[test]
    fn test_enrich_instance_attributes() {
        let mut cls = ClassEntry::new("pkg.C");
        cls.members.insert("__init__".into(), "pkg.C.__init__".into());
        let mut init = FunctionEntry::new("pkg.C.__init__");
        init.base.scope = ItemScope::Instance;
        init.base.src = "    def __init__(self):\n        self.value = 1\n        self._hidden = 2\n".into();
        init.parameters = vec![Parameter::new(ParameterKind::PositionalOrKeyword, "self")];

        let mut slotted = ClassEntry::new("pkg.S");
        slotted.slots = Some(vec!["value".into()]);
        slotted.members.insert("__init__".into(), "pkg.C.__init__".into());

        let mut desc = ApiDescription::from_entries(
            Distribution::default(),
            vec![cls.into(), slotted.into(), init.into()],
        )
        .unwrap();

        assert_eq!(enrich_instance_attributes(&mut desc), 2);
        let value = desc.get("pkg.C.value").unwrap();
        assert_eq!(value.base().scope, ItemScope::Instance);
        assert!(!value.is_private());
        assert!(desc.get("pkg.C._hidden").unwrap().is_private());
        assert!(desc.get("pkg.S.value").is_none());

        let cls = desc.get("pkg.C").unwrap().as_class().unwrap();
        assert_eq!(cls.members.get("value").map(String::as_str), Some("pkg.C.value"));
    }
}
