//! Translation of annotation text into [`TypeType`].
//!
//! Annotations arrive as the inspector rendered them: plain source
//! (`Optional[int]`, `int | None`), runtime reprs (`<class 'int'>`), forward
//! references in quotes, or type-variable reprs (`~T`). The text is parsed as
//! a Python expression and translated node by node.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::extracting::source::{get_node_text, parse_python, string_literal};
use crate::models::TypeType;

static CLASS_REPR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<class '([\w.]+)'>$").unwrap());

const BUILTIN_CLASSES: &[&str] = &[
    "int", "str", "float", "bool", "bytes", "complex", "list", "dict", "set", "frozenset",
    "tuple", "object", "type", "bytearray", "memoryview", "range", "slice", "BaseException",
    "Exception",
];

/// Looks up a (possibly dotted) name in the scope the annotation was written in.
///
/// Returns `Some(TypeType::Any)` for type variables, `Some(Class)` for known
/// classes and `None` when the name is unknown.
pub type NameResolver<'a> = dyn Fn(&str) -> Option<TypeType> + 'a;

/// Parse annotation text. An empty annotation is `Any`.
pub fn parse_annotation(text: &str, resolve: &NameResolver<'_>) -> TypeType {
    let text = text.trim();
    if text.is_empty() {
        return TypeType::Any;
    }
    if let Some(caps) = CLASS_REPR.captures(text) {
        return class_by_name(&caps[1], resolve);
    }
    // Type variable reprs: ~T, +T_co, -T_contra.
    if let Some(rest) = text.strip_prefix(['~', '+', '-']) {
        if rest.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && rest.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return TypeType::Any;
        }
    }
    let Ok(tree) = parse_python(text) else {
        return TypeType::unknown(text);
    };
    let root = tree.root_node();
    if root.has_error() {
        return TypeType::unknown(text);
    }
    let Some(expr) = root
        .named_child(0)
        .filter(|n| n.kind() == "expression_statement")
        .and_then(|n| n.named_child(0))
    else {
        return TypeType::unknown(text);
    };
    translate(&expr, text, resolve)
}

fn translate(node: &Node, source: &str, resolve: &NameResolver<'_>) -> TypeType {
    let text = get_node_text(node, source);
    match node.kind() {
        "none" => TypeType::None,
        "ellipsis" => TypeType::Any,
        "identifier" | "attribute" => class_by_name(text, resolve),
        "string" => match string_literal(node, source) {
            Some(inner) => parse_annotation(&inner, resolve),
            None => TypeType::unknown(text),
        },
        "integer" | "float" | "true" | "false" => TypeType::literal(text),
        "unary_operator" => TypeType::literal(text),
        "parenthesized_expression" => match node.named_child(0) {
            Some(inner) => translate(&inner, source, resolve),
            None => TypeType::unknown(text),
        },
        "binary_operator" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|o| get_node_text(&o, source))
                .unwrap_or_default();
            match (
                operator,
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ) {
                ("|", Some(left), Some(right)) => union(vec![
                    translate(&left, source, resolve),
                    translate(&right, source, resolve),
                ]),
                _ => TypeType::unknown(text),
            }
        }
        "list" | "tuple" => TypeType::product(
            named_children(node)
                .iter()
                .map(|n| translate(n, source, resolve))
                .collect(),
        ),
        "subscript" => translate_subscript(node, source, resolve),
        _ => TypeType::unknown(text),
    }
}

fn named_children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    let children = node
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    children
}

fn translate_subscript(node: &Node, source: &str, resolve: &NameResolver<'_>) -> TypeType {
    let text = get_node_text(node, source);
    let Some(value) = node.child_by_field_name("value") else {
        return TypeType::unknown(text);
    };
    let mut cursor = node.walk();
    let args: Vec<Node> = node
        .children_by_field_name("subscript", &mut cursor)
        .collect();
    let base_name = get_node_text(&value, source);
    let translate_all = |nodes: &[Node]| -> Vec<TypeType> {
        nodes.iter().map(|n| translate(n, source, resolve)).collect()
    };

    match special_form(base_name) {
        Some("Optional") => match args.first() {
            Some(arg) => union(vec![translate(arg, source, resolve), TypeType::None]),
            None => TypeType::unknown(text),
        },
        Some("Union") => union(translate_all(&args)),
        Some("Literal") => {
            let literals: Vec<TypeType> = args
                .iter()
                .map(|a| match a.kind() {
                    "none" => TypeType::None,
                    _ => TypeType::literal(get_node_text(a, source)),
                })
                .collect();
            if literals.len() == 1 {
                literals.into_iter().next().unwrap_or(TypeType::Any)
            } else {
                TypeType::sum(literals)
            }
        }
        Some("Tuple") | Some("tuple") => {
            let is_variadic = args.len() == 2 && args[1].kind() == "ellipsis";
            if is_variadic {
                TypeType::generic(
                    TypeType::class("builtins.tuple"),
                    vec![translate(&args[0], source, resolve)],
                )
            } else {
                TypeType::product(translate_all(&args))
            }
        }
        Some("Callable") => {
            let params = match args.first() {
                Some(first) if first.kind() == "list" => TypeType::product(translate_all(&named_children(first))),
                Some(_) => TypeType::Any,
                None => TypeType::product(Vec::new()),
            };
            let ret = args
                .get(1)
                .map(|r| translate(r, source, resolve))
                .unwrap_or(TypeType::Any);
            TypeType::callable(params, ret)
        }
        Some("Annotated") | Some("ClassVar") | Some("Final") | Some("Required")
        | Some("NotRequired") | Some("ReadOnly") => match args.first() {
            Some(arg) => translate(arg, source, resolve),
            None => TypeType::Any,
        },
        Some("Type") => TypeType::generic(TypeType::class("builtins.type"), translate_all(&args)),
        _ => {
            let base = class_by_name(base_name, resolve);
            TypeType::generic(base, translate_all(&args))
        }
    }
}

/// Name of a `typing` special form, accepting qualified spellings.
fn special_form(name: &str) -> Option<&'static str> {
    let bare = name
        .strip_prefix("typing_extensions.")
        .or_else(|| name.strip_prefix("typing."))
        .unwrap_or(name);
    [
        "Optional", "Union", "Literal", "Tuple", "tuple", "Callable", "Annotated", "ClassVar",
        "Final", "Required", "NotRequired", "ReadOnly", "Type",
    ]
    .into_iter()
    .find(|f| *f == bare)
}

/// Generic aliases from `typing` that stand for builtin classes.
fn typing_alias(name: &str) -> Option<&'static str> {
    let bare = name.strip_prefix("typing.").unwrap_or(name);
    match bare {
        "List" => Some("builtins.list"),
        "Dict" => Some("builtins.dict"),
        "Set" => Some("builtins.set"),
        "FrozenSet" => Some("builtins.frozenset"),
        "Text" => Some("builtins.str"),
        "Type" => Some("builtins.type"),
        _ => None,
    }
}

fn class_by_name(name: &str, resolve: &NameResolver<'_>) -> TypeType {
    match name {
        "None" | "NoneType" | "builtins.NoneType" => return TypeType::None,
        "Any" | "typing.Any" | "typing_extensions.Any" => return TypeType::Any,
        _ => {}
    }
    if let Some(id) = typing_alias(name) {
        return TypeType::class(id);
    }
    if BUILTIN_CLASSES.contains(&name) {
        return TypeType::class(format!("builtins.{}", name));
    }
    if let Some(resolved) = resolve(name) {
        return resolved;
    }
    if name.contains('.') {
        TypeType::class(name)
    } else {
        TypeType::unknown(name)
    }
}

/// Build a sum, flattening nested sums and dropping duplicates.
fn union(types: Vec<TypeType>) -> TypeType {
    let mut flat: Vec<TypeType> = Vec::new();
    for ty in types {
        let parts = match ty {
            TypeType::Sum { types } => types,
            other => vec![other],
        };
        for part in parts {
            if !flat.iter().any(|t| t.id() == part.id()) {
                flat.push(part);
            }
        }
    }
    if flat.len() == 1 {
        flat.into_iter().next().unwrap_or(TypeType::Any)
    } else {
        TypeType::sum(flat)
    }
}

/// Qualified class name inside a runtime repr like `<class 'typing.TypeVar'>`;
/// any other text comes back unchanged.
pub fn unwrap_class_repr(text: &str) -> &str {
    CLASS_REPR
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
}

/// Type of a default value rendered as `TypeName('repr')`, or bare `None`.
pub fn type_of_default(default: &str) -> Option<TypeType> {
    if default == "None" {
        return Some(TypeType::None);
    }
    let (name, _) = default.split_once('(')?;
    match name {
        "bool" | "int" | "float" | "complex" | "str" | "bytes" | "tuple" => {
            Some(TypeType::class(format!("builtins.{}", name)))
        }
        "None" => Some(TypeType::None),
        _ => None,
    }
}
