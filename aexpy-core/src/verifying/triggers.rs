//! Trigger snippet generators.
//!
//! A trigger is a few lines of Python that should run under the old release
//! and fail under the new one. Generators read only the old description and
//! the entry itself, so the same entry always yields the same snippet. Kinds
//! without a generator yield nothing.

use crate::models::{ApiDescription, ApiEntry, DiffEntry, FunctionEntry, ParameterKind};

/// Helpers every snippet can call.
pub const PRELUDE: &str = "import inspect
def _aexpy_log(obj):
    print(f'Object: {obj}')
def _aexpy_bind(func, *args, **kwargs):
    inspect.signature(func).bind(*args, **kwargs)";

/// Full program text for a trigger.
pub fn snippet(trigger: &[String]) -> String {
    format!("{}\n{}\n", PRELUDE, trigger.join("\n"))
}

/// Python string literal.
fn py_str(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n"))
}

fn py_list(items: &[String]) -> String {
    format!("[{}]", items.iter().map(|s| py_str(s)).collect::<Vec<_>>().join(", "))
}

fn py_dict(items: &[(String, Option<String>)]) -> String {
    let body = items
        .iter()
        .map(|(k, v)| format!("{}: {}", py_str(k), v.as_deref().map_or("None".to_string(), py_str)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

struct Generator<'a> {
    api: &'a ApiDescription,
}

impl<'a> Generator<'a> {
    fn parent(&self, entry: &ApiEntry) -> Option<&'a ApiEntry> {
        let id = entry.id().strip_suffix(&format!(".{}", entry.name()))?;
        self.api.get(id)
    }

    /// Import the module owning `entry` and bind it to `var`.
    fn import_module(&self, entry: &ApiEntry, var: &str) -> Vec<String> {
        if let ApiEntry::Module(module) = entry {
            return vec![format!("import {}", module.base.id), format!("{} = {}", var, module.base.id)];
        }
        let declared = entry
            .base()
            .location
            .as_ref()
            .and_then(|l| self.api.get(&l.module))
            .filter(|m| matches!(m, ApiEntry::Module(_)));
        if let Some(module) = declared {
            return self.import_module(module, var);
        }
        match self.parent(entry) {
            Some(parent) if parent.id() != entry.id() => self.import_module(parent, var),
            _ => Vec::new(),
        }
    }

    /// `cls` must be a class entry.
    fn import_class(&self, cls: &ApiEntry, var: &str) -> Vec<String> {
        let mut lines = self.import_module(cls, "mod");
        if !lines.is_empty() {
            lines.push(format!("{} = {}", var, cls.id()));
        }
        lines
    }

    /// Bind a module-level item, or a class member looked up on its class,
    /// to `var`.
    fn import_item(&self, entry: &ApiEntry, var: &str) -> Vec<String> {
        let Some(parent) = self.parent(entry) else {
            return Vec::new();
        };
        let (mut lines, target) = match parent {
            ApiEntry::Class(_) => (self.import_class(parent, "cls"), format!("cls.{}", entry.name())),
            _ => (self.import_module(parent, "mod"), entry.id().to_string()),
        };
        if !lines.is_empty() {
            lines.push(format!("{} = {}", var, target));
        }
        lines
    }

    fn log(&self, var: &str) -> Vec<String> {
        vec![format!("_aexpy_log({})", var)]
    }

    fn bind(&self, func: &str, args: &[String], kwds: &[(String, Option<String>)]) -> Vec<String> {
        vec![format!("_aexpy_bind({}, *{}, **{})", func, py_list(args), py_dict(kwds))]
    }
}

/// Arguments accepted by `func`: the required ones only, or every
/// parameter plus a probe value for each variadic (`all`).
fn valid_parameters(func: &FunctionEntry, all: bool) -> (Vec<String>, Vec<(String, Option<String>)>) {
    let mut args = Vec::new();
    let mut kwds = Vec::new();
    for param in &func.parameters {
        if !all && param.optional {
            continue;
        }
        match param.kind {
            ParameterKind::Positional => args.push(param.name.clone()),
            _ if param.is_keyword() => kwds.push((param.name.clone(), param.default.clone())),
            ParameterKind::VarPositional if all => args.push("test_var_positional".to_string()),
            ParameterKind::VarKeyword if all => {
                kwds.push(("test_var_keyword".to_string(), Some("test_var_keyword".to_string())))
            }
            _ => {}
        }
    }
    (args, kwds)
}

fn with_log(mut lines: Vec<String>, generator: &Generator, var: &str) -> Vec<String> {
    if !lines.is_empty() {
        lines.extend(generator.log(var));
    }
    lines
}

fn bind_parameters(entry: &DiffEntry, generator: &Generator, all: bool) -> Vec<String> {
    let Some(old) = entry.old.as_ref() else {
        return Vec::new();
    };
    let Some(func) = old.as_function() else {
        return Vec::new();
    };
    let mut lines = generator.import_item(old, "item");
    if lines.is_empty() {
        return lines;
    }
    let (args, kwds) = valid_parameters(func, all);
    lines.extend(generator.bind("item", &args, &kwds));
    lines
}

fn remove_alias(entry: &DiffEntry, generator: &Generator) -> Vec<String> {
    let (Some(old), Some(name)) = (entry.old.as_ref(), entry.data_str("name")) else {
        return Vec::new();
    };
    let (mut lines, owner) = match old {
        ApiEntry::Class(_) => (generator.import_class(old, "cls"), "cls"),
        _ => (generator.import_module(old, "mod"), "mod"),
    };
    if lines.is_empty() {
        return lines;
    }
    lines.push(format!("alias = {}.{}", owner, name));
    with_log(lines, generator, "alias")
}

/// Trigger lines for one evaluated entry. Empty when the kind cannot be
/// exercised by a snippet.
pub fn generate(entry: &DiffEntry, old: &ApiDescription) -> Vec<String> {
    let generator = Generator { api: old };
    let Some(snapshot) = entry.old.as_ref() else {
        return Vec::new();
    };
    match entry.kind.as_str() {
        "RemoveModule" => with_log(generator.import_module(snapshot, "mod"), &generator, "mod"),
        "RemoveClass" if matches!(snapshot, ApiEntry::Class(_)) => {
            with_log(generator.import_class(snapshot, "cls"), &generator, "cls")
        }
        "RemoveFunction" | "RemoveMethod" | "RemoveAttribute" => {
            with_log(generator.import_item(snapshot, "item"), &generator, "item")
        }
        "RemoveAlias" | "RemoveExternalAlias" => remove_alias(entry, &generator),
        "AddParameter" => bind_parameters(entry, &generator, false),
        "ChangeParameterOptional" if entry.data_bool("newoptional") == Some(false) => {
            bind_parameters(entry, &generator, false)
        }
        "RemoveParameter" | "RemoveVarPositional" | "RemoveVarKeyword" => bind_parameters(entry, &generator, true),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Distribution, ItemScope, Location, ModuleEntry, Parameter};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn description(entries: Vec<ApiEntry>) -> ApiDescription {
        ApiDescription::from_entries(Distribution::default(), entries).unwrap()
    }

    fn removed(kind: &str, old: ApiEntry) -> DiffEntry {
        let mut entry = DiffEntry::new("test");
        entry.kind = kind.to_string();
        entry.old = Some(old);
        entry
    }

    #[test]
    fn test_remove_module_trigger() {
        let module = ApiEntry::from(ModuleEntry::new("pkg.sub"));
        let old = description(vec![ModuleEntry::new("pkg").into(), module.clone()]);
        let lines = generate(&removed("RemoveModule", module), &old);
        assert_eq!(lines, vec!["import pkg.sub", "mod = pkg.sub", "_aexpy_log(mod)"]);
    }

    #[test]
    fn test_remove_function_uses_declaring_module() {
        let mut f = FunctionEntry::new("pkg.api.run");
        f.base.location = Some(Location {
            module: "pkg.api".into(),
            ..Default::default()
        });
        let f = ApiEntry::from(f);
        let old = description(vec![ModuleEntry::new("pkg").into(), ModuleEntry::new("pkg.api").into(), f.clone()]);
        let lines = generate(&removed("RemoveFunction", f), &old);
        assert_eq!(
            lines,
            vec!["import pkg.api", "mod = pkg.api", "item = pkg.api.run", "_aexpy_log(item)"]
        );
    }

    #[test]
    fn test_remove_method_goes_through_class() {
        let mut cls = crate::models::ClassEntry::new("pkg.C");
        cls.base.location = Some(Location {
            module: "pkg".into(),
            ..Default::default()
        });
        let mut method = FunctionEntry::new("pkg.C.run");
        method.base.scope = ItemScope::Class;
        let method = ApiEntry::from(method);
        let old = description(vec![ModuleEntry::new("pkg").into(), cls.into(), method.clone()]);
        let lines = generate(&removed("RemoveMethod", method), &old);
        assert_eq!(
            lines,
            vec!["import pkg", "mod = pkg", "cls = pkg.C", "item = cls.run", "_aexpy_log(item)"]
        );
    }

    #[test]
    fn test_required_binding() {
        let mut f = FunctionEntry::new("pkg.f");
        f.parameters = vec![
            Parameter::new(ParameterKind::Positional, "a"),
            Parameter::new(ParameterKind::PositionalOrKeyword, "b"),
            Parameter::new(ParameterKind::Keyword, "c").with_default(Some("1")),
        ];
        let f = ApiEntry::from(f);
        let old = description(vec![ModuleEntry::new("pkg").into(), f.clone()]);
        let mut entry = removed("AddParameter", f.clone());
        entry.new = Some(f);
        let lines = generate(&entry.with_data(json!({ "new": "d" })), &old);
        assert_eq!(lines.last().unwrap(), "_aexpy_bind(item, *['a'], **{'b': None})");
    }

    #[test]
    fn test_maximal_binding_includes_variadics() {
        let mut f = FunctionEntry::new("pkg.f");
        f.parameters = vec![
            Parameter::new(ParameterKind::Keyword, "c").with_default(Some("'x'")),
            Parameter::new(ParameterKind::VarPositional, "args"),
            Parameter::new(ParameterKind::VarKeyword, "kwargs"),
        ];
        let f = ApiEntry::from(f);
        let old = description(vec![ModuleEntry::new("pkg").into(), f.clone()]);
        let lines = generate(&removed("RemoveVarKeyword", f), &old);
        assert_eq!(
            lines.last().unwrap(),
            "_aexpy_bind(item, *['test_var_positional'], **{'c': '\\'x\\'', 'test_var_keyword': 'test_var_keyword'})"
        );
    }

    #[test]
    fn test_unsupported_kinds_yield_nothing() {
        let f = ApiEntry::from(FunctionEntry::new("pkg.f"));
        let old = description(vec![ModuleEntry::new("pkg").into(), f.clone()]);
        assert!(generate(&removed("ChangeReturnType", f.clone()), &old).is_empty());
        assert!(generate(&removed("MoveParameter", f), &old).is_empty());
    }

    #[test]
    fn test_snippet_has_prelude() {
        let program = snippet(&["_aexpy_log(1)".to_string()]);
        assert!(program.starts_with("import inspect\n"));
        assert!(program.ends_with("_aexpy_log(1)\n"));
    }
}
