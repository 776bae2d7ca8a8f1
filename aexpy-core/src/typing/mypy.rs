//! Types inferred by mypy.
//!
//! mypy runs inside the extraction environment over the distribution's
//! source root. A small driver script builds the package, walks the symbol
//! table of every package module and prints one record per function and
//! variable after the transfer marker:
//!
//! ```json
//! { "pkg.C.run": { "kind": "func", "owner": "pkg.C", "ret": "builtins.int", "args": [["x", "builtins.str"]] },
//!   "pkg.C.size": { "kind": "var", "owner": "pkg.C", "type": "builtins.int" } }
//! ```
//!
//! Type strings use mypy's own notation (`Union[builtins.int, None]`,
//! `def (x: builtins.int) -> builtins.str`, `T`-1`) and are translated by
//! [`parse_mypy_type`]. Whatever mypy cannot answer goes to the annotation
//! checker.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;

use super::checker::SourceTypeChecker;
use super::{MemberSymbol, TypeChecker};
use crate::environment::{ExecutionEnvironment, Invocation};
use crate::error::{Error, Result};
use crate::extracting::callsites::CallSite;
use crate::extracting::split_transfer;
use crate::models::{ApiDescription, ApiEntry, ClassEntry, FunctionEntry, Parameter, TypeType};

const DRIVER: &str = r#"
import json, os, sys
from mypy import build, find_sources
from mypy.errors import CompileError
from mypy.nodes import Decorator, FuncBase, Var
from mypy.options import Options
from mypy.types import CallableType

request = json.load(sys.stdin)
root = request["root"]
modules = request["modules"]
options = Options()
options.incremental = False
options.cache_dir = os.devnull
options.follow_imports = "silent"
options.ignore_missing_imports = True
options.check_untyped_defs = True
try:
    options.python_version = tuple(int(p) for p in request["pyversion"].split(".")[:2])
except ValueError:
    pass
paths = [p for m in modules for p in (os.path.join(root, m), os.path.join(root, m + ".py")) if os.path.exists(p)]
try:
    result = build.build(find_sources.create_source_list(paths, options), options)
except CompileError as ex:
    sys.stderr.write("\n".join(ex.messages))
    sys.exit(2)

def text(t):
    return None if t is None else str(t)

symbols = {}
for name, state in result.graph.items():
    if state.tree is None or not any(name == m or name.startswith(m + ".") for m in modules):
        continue
    for fullname, node, info in state.tree.local_definitions():
        target = node.node.func if isinstance(node.node, Decorator) else node.node
        owner = info.fullname if info is not None else None
        if isinstance(target, FuncBase):
            record = {"kind": "func", "owner": owner, "type": text(target.type)}
            if isinstance(target.type, CallableType):
                record["ret"] = text(target.type.ret_type)
                record["args"] = [[n, text(t)] for n, t in zip(target.type.arg_names, target.type.arg_types) if n]
            symbols[fullname] = record
        elif isinstance(target, Var):
            symbols[fullname] = {"kind": "var", "owner": owner, "type": text(target.type)}

sys.stdout.flush()
print(request["marker"])
print(json.dumps(symbols))
"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Func,
    Var,
}

/// One symbol-table record from the driver.
#[derive(Clone, Debug, Deserialize)]
pub struct InferredSymbol {
    pub kind: SymbolKind,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, rename = "type")]
    pub r#type: Option<String>,
    #[serde(default)]
    pub ret: Option<String>,
    #[serde(default)]
    pub args: Vec<(String, Option<String>)>,
}

/// Checker answering from mypy's inferred types, backed by the annotation
/// checker.
pub struct MypyTypeChecker {
    symbols: IndexMap<String, InferredSymbol>,
    fallback: SourceTypeChecker,
}

impl MypyTypeChecker {
    /// Run mypy over the distribution of `description` inside `env`.
    pub fn run(description: &ApiDescription, env: &dyn ExecutionEnvironment) -> Result<Self> {
        let dist = &description.distribution;
        let root = dist
            .root_path
            .as_ref()
            .ok_or_else(|| Error::Environment("no source root for mypy".to_string()))?;
        let request = json!({
            "root": root,
            "modules": dist.top_modules,
            "pyversion": dist.pyversion,
            "marker": crate::models::TRANSFER_BEGIN,
        });
        let invocation = Invocation::python()
            .arg("-c")
            .arg(DRIVER)
            .stdin(request.to_string())
            .python_path(root);
        let output = env.run_python(invocation)?;
        if output.err.contains("No module named 'mypy'") {
            return Err(Error::Environment(format!("mypy is not installed in {}", env.describe())));
        }
        let output = output.check("mypy driver")?;
        Self::from_output(description, &output.out)
    }

    /// Build a checker from driver stdout.
    pub fn from_output(description: &ApiDescription, stdout: &str) -> Result<Self> {
        let symbols = serde_json::from_str(split_transfer(stdout)?)?;
        Ok(Self {
            symbols,
            fallback: SourceTypeChecker::new(description),
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn symbol(&self, id: &str, kind: SymbolKind) -> Option<&InferredSymbol> {
        self.symbols.get(id).filter(|s| s.kind == kind)
    }
}

fn inferred(text: Option<&str>) -> Option<TypeType> {
    let text = text?;
    let ty = parse_mypy_type(text);
    if ty.is_none() {
        tracing::debug!(ty = %text, "Untranslatable mypy type");
    }
    ty
}

impl TypeChecker for MypyTypeChecker {
    fn type_of(&self, entry: &ApiEntry) -> Option<TypeType> {
        let found = match entry {
            ApiEntry::Attribute(attr) => self
                .symbol(&attr.base.id, SymbolKind::Var)
                .and_then(|s| inferred(s.r#type.as_deref())),
            ApiEntry::Function(func) => self
                .symbol(&func.base.id, SymbolKind::Func)
                .and_then(|s| inferred(s.ret.as_deref())),
            _ => None,
        };
        found.or_else(|| self.fallback.type_of(entry))
    }

    fn parameter_type(&self, func: &FunctionEntry, param: &Parameter) -> Option<TypeType> {
        self.symbol(&func.base.id, SymbolKind::Func)
            .and_then(|s| s.args.iter().find(|(name, _)| *name == param.name))
            .and_then(|(_, ty)| inferred(ty.as_deref()))
            .or_else(|| self.fallback.parameter_type(func, param))
    }

    fn members_of(&self, cls: &ClassEntry) -> IndexMap<String, MemberSymbol> {
        let mut members = self.fallback.members_of(cls);
        let prefix = format!("{}.", cls.base.id);
        for (id, symbol) in &self.symbols {
            if symbol.kind != SymbolKind::Var || symbol.owner.as_deref() != Some(cls.base.id.as_str()) {
                continue;
            }
            let Some(name) = id.strip_prefix(&prefix).filter(|n| !n.contains('.')) else {
                continue;
            };
            if members.contains_key(name) || cls.members.contains_key(name) {
                continue;
            }
            members.insert(
                name.to_string(),
                MemberSymbol {
                    name: name.to_string(),
                    annotation: String::new(),
                    r#type: inferred(symbol.r#type.as_deref()).unwrap_or(TypeType::Any),
                    implicit: true,
                },
            );
        }
        members
    }

    fn target_of(&self, caller: &FunctionEntry, site: &CallSite) -> Option<String> {
        self.fallback.target_of(caller, site)
    }
}

/// Translate a type printed by mypy. `None` when the text is not understood.
pub fn parse_mypy_type(text: &str) -> Option<TypeType> {
    let mut cursor = Cursor { text, pos: 0 };
    let ty = cursor.union()?;
    cursor.skip_ws();
    (cursor.pos == text.len()).then_some(ty)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Option<()> {
        self.eat(token).then_some(())
    }

    /// Dotted name, keeping a type-variable suffix such as `` T`-1 ``.
    fn name(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            let ok = if i == 0 {
                c.is_alphabetic() || c == '_'
            } else {
                c.is_alphanumeric() || matches!(c, '_' | '.' | '`' | '*') || (c == '-' && rest[..i].ends_with('`'))
            };
            if !ok {
                break;
            }
            end = i + c.len_utf8();
        }
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(rest[..end].trim_end_matches('.'))
    }

    /// Literal value inside `Literal[...]`.
    fn literal(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let end = match rest.chars().next()? {
            quote @ ('\'' | '"') => rest[1..].find(quote)? + 2,
            _ => rest
                .find(|c: char| c == ',' || c == ']')
                .unwrap_or(rest.len()),
        };
        self.pos += end;
        Some(rest[..end].trim())
    }

    fn union(&mut self) -> Option<TypeType> {
        let mut parts = vec![self.atom()?];
        while self.eat("|") {
            parts.push(self.atom()?);
        }
        Some(flatten(parts))
    }

    fn list(&mut self, close: &str) -> Option<Vec<TypeType>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Some(items);
        }
        loop {
            if self.eat("...") {
                items.push(TypeType::Any);
            } else {
                items.push(self.union()?);
            }
            if self.eat(close) {
                return Some(items);
            }
            self.expect(",")?;
        }
    }

    fn atom(&mut self) -> Option<TypeType> {
        if self.eat("<nothing>") {
            return Some(TypeType::Any);
        }
        if self.peek() == Some('(') {
            self.expect("(")?;
            let inner = self.union()?;
            self.expect(")")?;
            return Some(inner);
        }
        let name = self.name()?;
        if name == "def" {
            return self.callable();
        }
        if name.contains('`') {
            return Some(TypeType::Any);
        }
        let name = name.trim_end_matches('*');
        if name == "Literal" {
            return self.literals();
        }
        let args = if self.eat("[") { Some(self.list("]")?) } else { None };
        let ty = match (name, args) {
            ("None" | "builtins.None" | "NoneType", None) => TypeType::None,
            ("Any" | "Never" | "NoReturn" | "Uninhabited", None) => TypeType::Any,
            ("Union", Some(args)) => flatten(args),
            ("Optional", Some(args)) => flatten(args.into_iter().chain([TypeType::None]).collect()),
            ("Tuple" | "tuple" | "builtins.tuple", Some(args)) => {
                let variadic = args.len() == 2 && self.text[..self.pos].trim_end().ends_with("...]");
                if variadic {
                    TypeType::generic(TypeType::class("builtins.tuple"), args.into_iter().take(1).collect())
                } else {
                    TypeType::product(args)
                }
            }
            ("Type" | "type", Some(args)) => TypeType::generic(TypeType::class("builtins.type"), args),
            ("Overload" | "TypedDict" | "TypeGuard" | "TypeIs", _) => return None,
            (name, None) => TypeType::class(name),
            (name, Some(args)) => TypeType::generic(TypeType::class(name), args),
        };
        Some(ty)
    }

    /// `Literal[1, 'a']`, or `Literal[1]?` for a value whose declared type is
    /// its class.
    fn literals(&mut self) -> Option<TypeType> {
        self.expect("[")?;
        let mut values = Vec::new();
        loop {
            values.push(self.literal()?);
            if self.eat("]") {
                break;
            }
            self.expect(",")?;
        }
        if self.eat("?") {
            return values.first().map(|v| TypeType::class(literal_class(v)));
        }
        let types: Vec<TypeType> = values
            .into_iter()
            .map(|v| if v == "None" { TypeType::None } else { TypeType::literal(v) })
            .collect();
        Some(flatten(types))
    }

    /// `def [T] (x: T`-1, *args: Any, y: builtins.int =) -> builtins.str`
    fn callable(&mut self) -> Option<TypeType> {
        if self.eat("[") {
            let mut depth = 1;
            while depth > 0 {
                let c = self.rest().chars().next()?;
                self.pos += c.len_utf8();
                match c {
                    '[' => depth += 1,
                    ']' => depth -= 1,
                    _ => {}
                }
            }
        }
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.eat(")") {
            loop {
                let star = self.eat("*");
                if star && matches!(self.peek(), Some(',') | Some(')')) {
                    // keyword-only marker
                } else {
                    self.eat("*");
                    let start = self.pos;
                    let named = self.name().is_some() && self.eat(":");
                    if !named {
                        self.pos = start;
                    }
                    args.push(self.union()?);
                    self.eat("=");
                }
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }
        self.expect("->")?;
        let ret = self.union()?;
        Some(TypeType::callable(TypeType::product(args), ret))
    }
}

fn literal_class(value: &str) -> &'static str {
    match value {
        "True" | "False" => "builtins.bool",
        v if v.starts_with('b') && v[1..].starts_with(['\'', '"']) => "builtins.bytes",
        v if v.starts_with(['\'', '"']) => "builtins.str",
        v if v.contains('.') => "builtins.float",
        _ => "builtins.int",
    }
}

/// Sum of `types`, flattening nested sums and dropping duplicates.
fn flatten(types: Vec<TypeType>) -> TypeType {
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
        flat.pop().unwrap_or(TypeType::Any)
    } else {
        TypeType::sum(flat)
    }
}
