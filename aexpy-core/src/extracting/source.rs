//! Helpers for parsing entry source text with tree-sitter.

use tree_sitter::{Node, Parser, Tree};

use crate::error::{Error, Result};

/// Drop comment-only lines and remove common indentation, so a method body
/// copied out of its class parses as a module.
pub fn clear_src(src: &str) -> String {
    let lines: Vec<&str> = src
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect();
    dedent(&lines)
}

fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = String::new();
    for line in lines {
        if line.len() >= indent && line.is_char_boundary(indent) {
            out.push_str(&line[indent..]);
        } else {
            out.push_str(line.trim_start());
        }
        out.push('\n');
    }
    out
}

/// Parse Python source into a syntax tree.
pub fn parse_python(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| Error::Other(format!("failed to set Python language: {}", e)))?;
    parser
        .parse(source, None)
        .ok_or_else(|| Error::Other("failed to parse Python source".to_string()))
}

/// Text content of a node.
pub fn get_node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// First direct child of the given kind.
pub fn find_child_by_type<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// 1-indexed start line.
pub fn get_start_line(node: &Node) -> i64 {
    node.start_position().row as i64 + 1
}

/// Call `visit` on `node` and every descendant, depth first.
pub fn walk_tree<'a>(node: Node<'a>, visit: &mut impl FnMut(Node<'a>)) {
    visit(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_tree(child, visit);
    }
}

/// Value of a plain string literal node (`'x'`, `"x"`), without prefix or quotes.
///
/// Returns `None` for f-strings, concatenations and non-string nodes.
pub fn string_literal(node: &Node, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    if find_child_by_type(node, "interpolation").is_some() {
        return None;
    }
    let text = get_node_text(node, source);
    let body = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return Some(body[quote.len()..body.len() - quote.len()].to_string());
        }
    }
    None
}

/// Parse the source of a function and return its `function_definition` node
/// together with the tree that owns it.
pub fn parse_function(src: &str) -> Result<(String, Tree)> {
    let cleared = clear_src(src);
    let tree = parse_python(&cleared)?;
    if tree.root_node().has_error() {
        return Err(Error::Other("source contains syntax errors".to_string()));
    }
    Ok((cleared, tree))
}

/// Outermost function definition in a parsed snippet, looking through decorators.
pub fn top_function<'a>(tree: &'a Tree) -> Option<Node<'a>> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    let found = root.children(&mut cursor).find_map(|child| match child.kind() {
        "function_definition" => Some(child),
        "decorated_definition" => child.child_by_field_name("definition"),
        _ => None,
    });
    found
}
