//! Call-site extraction from function bodies.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use super::source::{get_node_text, parse_function, walk_tree};
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentKind {
    Positional,
    Keyword,
    /// `*args`
    Splat,
    /// `**kwargs`
    KeywordSplat,
}

/// One argument of a call expression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub kind: ArgumentKind,
    /// Keyword name; `None` for positional and splat arguments.
    pub name: Option<String>,
    /// Source text of the argument value.
    pub raw: String,
}

/// A call expression found in a function body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Final name of the callee (`f` in `a.b.f(...)`), if it has one.
    pub target: Option<String>,
    /// Full source text of the callee expression.
    pub callee: String,
    pub arguments: Vec<Argument>,
    pub line: i64,
}

impl CallSite {
    pub fn positional_count(&self) -> usize {
        self.arguments
            .iter()
            .filter(|a| a.kind == ArgumentKind::Positional)
            .count()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(|a| a.name.as_deref())
    }

    pub fn has_splat(&self) -> bool {
        self.arguments
            .iter()
            .any(|a| matches!(a.kind, ArgumentKind::Splat | ArgumentKind::KeywordSplat))
    }

    /// Whether the call forwards `**name`.
    pub fn forwards_kwargs(&self, name: &str) -> bool {
        self.arguments
            .iter()
            .any(|a| a.kind == ArgumentKind::KeywordSplat && a.raw == name)
    }

    /// Receiver expression of an attribute call (`obj` in `obj.m()`).
    pub fn receiver(&self) -> Option<&str> {
        let target = self.target.as_deref()?;
        self.callee
            .strip_suffix(target)
            .and_then(|s| s.strip_suffix('.'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Every call expression in the given function source, in source order.
pub fn extract_call_sites(src: &str) -> Result<Vec<CallSite>> {
    let (source, tree) = parse_function(src)?;
    let mut sites = Vec::new();
    walk_tree(tree.root_node(), &mut |node| {
        if node.kind() == "call" {
            sites.push(call_site(&node, &source));
        }
    });
    Ok(sites)
}

fn call_site(node: &Node, source: &str) -> CallSite {
    let mut site = CallSite {
        line: node.start_position().row as i64 + 1,
        ..Default::default()
    };

    if let Some(function) = node.child_by_field_name("function") {
        site.callee = get_node_text(&function, source).to_string();
        site.target = match function.kind() {
            "identifier" => Some(site.callee.clone()),
            "attribute" => function
                .child_by_field_name("attribute")
                .map(|a| get_node_text(&a, source).to_string()),
            _ => None,
        };
    }

    let Some(arguments) = node.child_by_field_name("arguments") else {
        return site;
    };
    let mut cursor = arguments.walk();
    for arg in arguments.named_children(&mut cursor) {
        let argument = match arg.kind() {
            "comment" => continue,
            "keyword_argument" => Argument {
                kind: ArgumentKind::Keyword,
                name: arg
                    .child_by_field_name("name")
                    .map(|n| get_node_text(&n, source).to_string()),
                raw: arg
                    .child_by_field_name("value")
                    .map(|v| get_node_text(&v, source).to_string())
                    .unwrap_or_default(),
            },
            "list_splat" => Argument {
                kind: ArgumentKind::Splat,
                name: None,
                raw: splat_inner(&arg, source),
            },
            "dictionary_splat" => Argument {
                kind: ArgumentKind::KeywordSplat,
                name: None,
                raw: splat_inner(&arg, source),
            },
            _ => Argument {
                kind: ArgumentKind::Positional,
                name: None,
                raw: get_node_text(&arg, source).to_string(),
            },
        };
        site.arguments.push(argument);
    }
    site
}

fn splat_inner(node: &Node, source: &str) -> String {
    node.named_child(0)
        .map(|n| get_node_text(&n, source).to_string())
        .unwrap_or_default()
}
