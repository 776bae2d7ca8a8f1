//! Walks imported modules and records every reachable API entry.
//!
//! Objects owned by other packages are not visited: their member slot holds
//! the external object's id and the core later turns those ids into
//! external placeholders.

use std::path::{Path, PathBuf};

use aexpy_core::models::{
    ApiEntry, AttributeEntry, ClassEntry, ClassFlag, EntryBase, FunctionEntry, ItemScope, Location,
    ModuleEntry,
};
use indexmap::IndexMap;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::abcs;
use crate::signature::Signatures;

/// Dunder and bookkeeping names that never form part of an API.
const IGNORED_MEMBERS: &[&str] = &[
    "__weakref__",
    "__dict__",
    "__annotations__",
    "__package__",
    "__builtins__",
    "__file__",
    "__name__",
    "__members__",
    "__slots__",
    "__bases__",
    "__mro__",
    "__cached__",
    "__all__",
    "__doc__",
    "__init_subclass__",
    "__module__",
    "__subclasshook__",
    "__abstractmethods__",
    "_abc_impl",
    "__match_args__",
    "__dataclass_params__",
    "__dataclass_fields__",
    "__loader__",
    "__spec__",
    "__path__",
];

/// Whether `module` belongs to one of the top modules being inspected.
pub fn is_internal_module(module: &str, tops: &[String]) -> bool {
    tops.iter().any(|top| {
        module == top || module.strip_prefix(top.as_str()).is_some_and(|rest| rest.starts_with('.'))
    })
}

/// What a member slot ends up pointing at.
enum Visited {
    Entry(String),
    External(String),
    Skipped,
}

pub struct Processor<'py> {
    py: Python<'py>,
    inspect: Bound<'py, PyModule>,
    builtins: Bound<'py, PyModule>,
    dataclasses: Bound<'py, PyModule>,
    abcs: Vec<(String, Bound<'py, PyAny>)>,
    signatures: Signatures<'py>,
    tops: Vec<String>,
    /// Directory that contains the top modules, for relative locations.
    root: Option<PathBuf>,
    entries: IndexMap<String, ApiEntry>,
}

impl<'py> Processor<'py> {
    pub fn new(py: Python<'py>, tops: Vec<String>, root: Option<PathBuf>) -> PyResult<Self> {
        Ok(Self {
            py,
            inspect: py.import_bound("inspect")?,
            builtins: py.import_bound("builtins")?,
            dataclasses: py.import_bound("dataclasses")?,
            abcs: abcs::load(py),
            signatures: Signatures::new(py)?,
            tops,
            root,
            entries: IndexMap::new(),
        })
    }

    pub fn into_entries(self) -> Vec<ApiEntry> {
        self.entries.into_values().collect()
    }

    // ------------------------------------------------------------------
    // Importing
    // ------------------------------------------------------------------

    /// Import `name` and every submodule below it. Submodules that fail to
    /// import are logged and skipped.
    pub fn import_package(&self, name: &str) -> PyResult<Vec<Bound<'py, PyAny>>> {
        let importlib = self.py.import_bound("importlib")?;
        let top = importlib.call_method1("import_module", (name,))?;
        let mut modules = vec![top.clone()];

        let Ok(path) = top.getattr("__path__") else {
            return Ok(modules);
        };
        let pkgutil = self.py.import_bound("pkgutil")?;
        let onerror = self.py.eval_bound("lambda name: None", None, None)?;
        let kwargs = PyDict::new_bound(self.py);
        kwargs.set_item("path", path)?;
        kwargs.set_item("prefix", format!("{}.", name))?;
        kwargs.set_item("onerror", onerror)?;
        let walker = pkgutil.getattr("walk_packages")?.call((), Some(&kwargs))?;
        for info in walker.iter()? {
            let info = match info {
                Ok(info) => info,
                Err(e) => {
                    tracing::error!(module = name, error = %e, "Failed to walk package");
                    break;
                }
            };
            let sub: String = info.getattr("name")?.extract()?;
            tracing::debug!(module = %sub, "Import");
            match importlib.call_method1("import_module", (sub.as_str(),)) {
                Ok(module) => modules.push(module),
                Err(e) => tracing::error!(module = %sub, error = %e, "Failed to import submodule"),
            }
        }
        Ok(modules)
    }

    /// Visit every module of one top package. Returns whether the top
    /// module itself could be imported.
    pub fn process(&mut self, name: &str) -> bool {
        let modules = match self.import_package(name) {
            Ok(modules) => modules,
            Err(e) => {
                tracing::error!(module = name, error = %e, "Failed to import top module");
                return false;
            }
        };
        tracing::info!(module = name, count = modules.len(), "Imported package");
        for module in modules {
            if let Err(e) = self.visit_module(&module) {
                tracing::error!(module = name, error = %e, "Failed to visit module");
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Object queries
    // ------------------------------------------------------------------

    fn inspect_test(&self, test: &str, obj: &Bound<'py, PyAny>) -> bool {
        self.inspect
            .call_method1(test, (obj,))
            .and_then(|v| v.is_truthy())
            .unwrap_or(false)
    }

    fn is_function(&self, obj: &Bound<'py, PyAny>) -> bool {
        [
            "isfunction",
            "ismethod",
            "iscoroutinefunction",
            "isasyncgenfunction",
            "isgeneratorfunction",
        ]
        .iter()
        .any(|test| self.inspect_test(test, obj))
    }

    fn module_name(&self, obj: &Bound<'py, PyAny>) -> Option<String> {
        if let Ok(module) = self.inspect.call_method1("getmodule", (obj,)) {
            if !module.is_none() {
                return module.getattr("__name__").and_then(|n| n.extract()).ok();
            }
        }
        obj.getattr("__module__")
            .and_then(|m| m.extract::<String>())
            .ok()
            .filter(|m| !m.is_empty())
    }

    /// Dotted id: module name for modules, `module.qualname` otherwise.
    fn object_id(&self, obj: &Bound<'py, PyAny>) -> String {
        if self.inspect_test("ismodule", obj) {
            return obj
                .getattr("__name__")
                .and_then(|n| n.extract())
                .unwrap_or_default();
        }
        let qualname = ["__qualname__", "__name__"]
            .iter()
            .find_map(|name| obj.getattr(*name).and_then(|n| n.extract::<String>()).ok())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                let ty = obj.get_type().to_string();
                if self.inspect_test("isclass", obj) {
                    format!("<class ({})>", ty)
                } else if self.is_function(obj) {
                    format!("<function ({})>", ty)
                } else {
                    format!("<instance ({})>", ty)
                }
            });
        match self.module_name(obj) {
            Some(module) => format!("{}.{}", module, qualname),
            None => qualname,
        }
    }

    fn source_file(&self, obj: &Bound<'py, PyAny>) -> Option<PathBuf> {
        self.inspect
            .call_method1("getfile", (obj,))
            .and_then(|f| f.extract::<String>())
            .ok()
            .map(PathBuf::from)
    }

    fn is_external(&self, obj: &Bound<'py, PyAny>) -> bool {
        if let Some(module) = self.module_name(obj) {
            return !is_internal_module(&module, &self.tops);
        }
        let definable = self.inspect_test("ismodule", obj)
            || self.inspect_test("isclass", obj)
            || self.is_function(obj);
        if !definable {
            return false;
        }
        match (self.source_file(obj), &self.root) {
            (Some(file), Some(root)) => !file.starts_with(root),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn str_list(&self, value: &Bound<'py, PyAny>) -> Vec<String> {
        if let Ok(single) = value.extract::<String>() {
            return vec![single];
        }
        let Ok(items) = value.iter() else {
            return Vec::new();
        };
        items
            .filter_map(|item| item.and_then(|i| i.str()).ok())
            .map(|s| s.to_string())
            .collect()
    }

    fn annotations_of(&self, obj: &Bound<'py, PyAny>) -> IndexMap<String, String> {
        let mut annotations = IndexMap::new();
        let Ok(value) = obj.getattr("__annotations__") else {
            return annotations;
        };
        let Ok(dict) = value.downcast::<PyDict>() else {
            return annotations;
        };
        for (key, value) in dict.iter() {
            if let Ok(key) = key.extract::<String>() {
                annotations.insert(key, self.signatures.annotation(&value));
            }
        }
        annotations
    }

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    fn register(&mut self, entry: ApiEntry) -> PyResult<()> {
        if let Some(existing) = self.entries.get(entry.id()) {
            return Err(PyValueError::new_err(format!(
                "id {} already registered as {}",
                entry.id(),
                existing.form()
            )));
        }
        self.entries.insert(entry.id().to_string(), entry);
        Ok(())
    }

    /// Id of an already visited entry of the same form.
    fn visited(&self, id: &str, form: &str) -> PyResult<Option<String>> {
        match self.entries.get(id) {
            Some(entry) if entry.form() == form => Ok(Some(id.to_string())),
            Some(entry) => Err(PyValueError::new_err(format!(
                "id {} already registered as {}",
                id,
                entry.form()
            ))),
            None => Ok(None),
        }
    }

    /// Location, source and documentation shared by every visited object.
    fn describe(&self, obj: &Bound<'py, PyAny>, base: &mut EntryBase) {
        let mut location = Location {
            module: self.module_name(obj).unwrap_or_default(),
            ..Default::default()
        };
        if let (Some(file), Some(root)) = (self.source_file(obj), &self.root) {
            location.file = relative(&file, root);
        }
        match self.inspect.call_method1("getsourcelines", (obj,)) {
            Ok(lines) => {
                if let Ok((src, line)) = lines.extract::<(Vec<String>, i64)>() {
                    base.src = src.concat();
                    location.line = line;
                }
            }
            Err(e) => tracing::debug!(entry = %base.id, error = %e, "No source"),
        }
        base.docs = self
            .inspect
            .call_method1("getdoc", (obj,))
            .and_then(|d| d.extract::<Option<String>>())
            .ok()
            .flatten()
            .and_then(|d| {
                self.inspect
                    .call_method1("cleandoc", (d,))
                    .and_then(|c| c.extract::<String>())
                    .ok()
            })
            .unwrap_or_default();
        base.comments = self
            .inspect
            .call_method1("getcomments", (obj,))
            .and_then(|c| c.extract::<Option<String>>())
            .ok()
            .flatten()
            .unwrap_or_default();
        base.location = Some(location);
    }

    pub fn visit_module(&mut self, obj: &Bound<'py, PyAny>) -> PyResult<String> {
        let id = self.object_id(obj);
        if let Some(id) = self.visited(&id, "module")? {
            return Ok(id);
        }
        tracing::debug!(entry = %id, "Module");

        let mut module = ModuleEntry::new(id.as_str());
        self.describe(obj, &mut module.base);
        module.annotations = self.annotations_of(obj);
        module.slots = obj.getattr("__all__").ok().map(|all| self.str_list(&all));
        let annotations = module.annotations.clone();
        let location = module.base.location.clone();
        self.register(module.into())?;

        let mut members = IndexMap::new();
        let listed = self.inspect.call_method1("getmembers", (obj,))?;
        for item in listed.iter()? {
            let (name, member): (String, Bound<'py, PyAny>) = item?.extract()?;
            let visited = if IGNORED_MEMBERS.contains(&name.as_str()) {
                Ok(Visited::Skipped)
            } else if self.is_external(&member) {
                Ok(Visited::External(self.object_id(&member)))
            } else {
                self.visit_member(&member, &format!("{}.{}", id, name), annotations.get(&name), &location, ItemScope::Static)
            };
            match visited {
                Ok(Visited::Entry(target)) | Ok(Visited::External(target)) => {
                    members.insert(name, target);
                }
                Ok(Visited::Skipped) => {}
                Err(e) => tracing::error!(entry = %id, member = %name, error = %e, "Failed to extract module member"),
            }
        }

        if let Some(ApiEntry::Module(module)) = self.entries.get_mut(&id) {
            module.members = members;
        }
        Ok(id)
    }

    /// Dispatch one internal member by its runtime kind.
    fn visit_member(
        &mut self,
        member: &Bound<'py, PyAny>,
        slot_id: &str,
        annotation: Option<&String>,
        location: &Option<Location>,
        scope: ItemScope,
    ) -> PyResult<Visited> {
        let id = if self.inspect_test("ismodule", member) {
            self.visit_module(member)?
        } else if self.inspect_test("isclass", member) {
            self.visit_class(member)?
        } else if self.is_function(member) {
            self.visit_function(member, None)?
        } else {
            self.visit_attribute(member, slot_id, annotation, location, scope)?
        };
        Ok(Visited::Entry(id))
    }

    pub fn visit_class(&mut self, obj: &Bound<'py, PyAny>) -> PyResult<String> {
        let id = self.object_id(obj);
        if let Some(id) = self.visited(&id, "class")? {
            return Ok(id);
        }
        tracing::debug!(entry = %id, "Class");

        let bases: Vec<Bound<'py, PyAny>> = obj
            .getattr("__bases__")?
            .iter()?
            .collect::<PyResult<_>>()?;
        let tuple = self.builtins.getattr("tuple")?;
        let is_tuple = bases.iter().any(|b| b.is(&tuple));

        let mut class = ClassEntry::new(id.as_str());
        class.bases = bases.iter().map(|b| self.object_id(b)).collect();
        class.mros = self
            .inspect
            .call_method1("getmro", (obj,))?
            .iter()?
            .filter_map(|c| c.ok())
            .map(|c| self.object_id(&c))
            .collect();
        class.abcs = self
            .abcs
            .iter()
            .filter(|(_, abc)| {
                self.builtins
                    .call_method1("issubclass", (obj, abc))
                    .and_then(|v| v.is_truthy())
                    .unwrap_or(false)
            })
            .map(|(abc_id, _)| abc_id.clone())
            .collect();
        class.slots = obj.getattr("__slots__").ok().map(|s| self.str_list(&s));
        class.flags = self.class_flags(obj);
        class.annotations = self.annotations_of(obj);
        self.describe(obj, &mut class.base);
        let annotations = class.annotations.clone();
        let location = class.base.location.clone();
        self.register(class.into())?;

        let mut members = IndexMap::new();
        let listed = self.inspect.call_method1("getmembers", (obj,))?;
        for item in listed.iter()? {
            let (name, member): (String, Bound<'py, PyAny>) = item?.extract()?;
            let inherited = bases.iter().any(|base| {
                base.getattr(name.as_str())
                    .map(|m| m.is(&member))
                    .unwrap_or(false)
            });
            let tuple_new = is_tuple && name == "__new__";
            let slot_id = format!("{}.{}", id, name);
            let scope = self.member_scope(obj, &name, &member);
            let visited = if inherited || IGNORED_MEMBERS.contains(&name.as_str()) {
                Ok(Visited::Skipped)
            } else if !tuple_new && self.is_external(&member) {
                Ok(Visited::External(self.object_id(&member)))
            } else if tuple_new && self.is_function(&member) {
                // named tuples get a generated __new__ with a foreign module
                self.visit_function(&member, Some(slot_id.clone())).map(Visited::Entry)
            } else {
                self.visit_member(&member, &slot_id, annotations.get(&name), &location, scope)
            };
            match visited {
                Ok(Visited::Entry(target)) => {
                    if target == slot_id {
                        self.set_scope(&target, scope);
                    }
                    members.insert(name, target);
                }
                Ok(Visited::External(target)) => {
                    members.insert(name, target);
                }
                Ok(Visited::Skipped) => {}
                Err(e) => tracing::error!(entry = %id, member = %name, error = %e, "Failed to extract class member"),
            }
        }

        if let Some(ApiEntry::Class(class)) = self.entries.get_mut(&id) {
            class.members = members;
        }
        Ok(id)
    }

    fn class_flags(&self, obj: &Bound<'py, PyAny>) -> Vec<ClassFlag> {
        let mut flags = Vec::new();
        if self.inspect_test("isabstract", obj) {
            flags.push(ClassFlag::Abstract);
        }
        let truthy = |name: &str| obj.getattr(name).and_then(|v| v.is_truthy()).unwrap_or(false);
        if truthy("__final__") {
            flags.push(ClassFlag::Final);
        }
        if truthy("__parameters__") {
            flags.push(ClassFlag::Generic);
        }
        let dataclass = self
            .dataclasses
            .call_method1("is_dataclass", (obj,))
            .and_then(|v| v.is_truthy())
            .unwrap_or(false);
        if dataclass {
            flags.push(ClassFlag::Dataclass);
        }
        flags
    }

    /// Binding of a class member, read from the raw class attribute.
    fn member_scope(&self, cls: &Bound<'py, PyAny>, name: &str, member: &Bound<'py, PyAny>) -> ItemScope {
        let Ok(raw) = self.inspect.call_method1("getattr_static", (cls, name)) else {
            return ItemScope::Class;
        };
        let is = |ty: &str| {
            self.builtins
                .getattr(ty)
                .and_then(|t| self.builtins.call_method1("isinstance", (&raw, t)))
                .and_then(|v| v.is_truthy())
                .unwrap_or(false)
        };
        if is("staticmethod") {
            ItemScope::Static
        } else if is("classmethod") {
            ItemScope::Class
        } else if is("property") || self.is_function(member) {
            ItemScope::Instance
        } else {
            ItemScope::Class
        }
    }

    fn set_scope(&mut self, id: &str, scope: ItemScope) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.base_mut().scope = scope;
        }
    }

    pub fn visit_function(&mut self, obj: &Bound<'py, PyAny>, id: Option<String>) -> PyResult<String> {
        let id = id.unwrap_or_else(|| self.object_id(obj));
        if let Some(id) = self.visited(&id, "func")? {
            return Ok(id);
        }
        tracing::debug!(entry = %id, "Function");

        let mut func = FunctionEntry::new(id.as_str());
        self.describe(obj, &mut func.base);
        func.annotations = self.annotations_of(obj);
        self.signatures.read(obj, &mut func);
        self.register(func.into())?;
        Ok(id)
    }

    pub fn visit_attribute(
        &mut self,
        obj: &Bound<'py, PyAny>,
        id: &str,
        annotation: Option<&String>,
        location: &Option<Location>,
        scope: ItemScope,
    ) -> PyResult<String> {
        if let Some(id) = self.visited(id, "attr")? {
            return Ok(id);
        }
        tracing::debug!(entry = %id, "Attribute");

        let mut attr = AttributeEntry::new(id);
        attr.raw_type = obj.get_type().to_string();
        attr.annotation = annotation.cloned().unwrap_or_default();
        attr.property = self
            .builtins
            .getattr("property")
            .and_then(|p| self.builtins.call_method1("isinstance", (obj, p)))
            .and_then(|v| v.is_truthy())
            .unwrap_or(false);
        attr.base.scope = scope;
        attr.base.location = location.clone();
        self.register(attr.into())?;
        Ok(id.to_string())
    }
}

fn relative(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use pretty_assertions::assert_eq;

    const DEMO: &str = r#"
import os
from collections.abc import Sequence

__all__ = ["Point", "origin", "VERSION"]

VERSION: str = "1.0"
path_join = os.path.join


class Point(Sequence):
    """A point."""

    dims = 2

    def __init__(self, x, y=0):
        self.x = x
        self.y = y

    def __getitem__(self, i):
        return (self.x, self.y)[i]

    def __len__(self):
        return 2

    @staticmethod
    def zero():
        return Point(0)

    @classmethod
    def parse(cls, text, **kwargs):
        return cls(*map(int, text.split(",")))

    @property
    def norm(self):
        return abs(self.x) + abs(self.y)


def origin() -> Point:
    return Point(0, 0)
"#;

    /// Source files must outlive every test that imports them, since
    /// `inspect` reads them lazily.
    static DEMO_DIR: Lazy<PathBuf> = Lazy::new(|| {
        let dir = tempfile::tempdir().unwrap().into_path();
        std::fs::write(dir.join("inspect_demo.py"), DEMO).unwrap();
        dir
    });

    fn inspect_demo() -> Vec<ApiEntry> {
        Python::with_gil(|py| {
            let dir = DEMO_DIR.to_string_lossy().to_string();
            let path = py.import_bound("sys").unwrap().getattr("path").unwrap();
            if !path.contains(dir.as_str()).unwrap() {
                path.call_method1("insert", (0, dir)).unwrap();
            }
            let mut processor =
                Processor::new(py, vec!["inspect_demo".into()], Some(DEMO_DIR.clone())).unwrap();
            assert!(processor.process("inspect_demo"));
            processor.into_entries()
        })
    }

    fn find<'a>(entries: &'a [ApiEntry], id: &str) -> &'a ApiEntry {
        entries
            .iter()
            .find(|e| e.id() == id)
            .unwrap_or_else(|| panic!("missing {}", id))
    }

    #[test]
    fn test_internal_modules() {
        let tops = vec!["pkg".to_string()];
        assert!(is_internal_module("pkg", &tops));
        assert!(is_internal_module("pkg.sub", &tops));
        assert!(!is_internal_module("pkgx", &tops));
        assert!(!is_internal_module("os", &tops));
    }

    #[test]
    fn test_module_members_and_exports() {
        let entries = inspect_demo();
        let module = find(&entries, "inspect_demo").as_module().unwrap();
        assert_eq!(
            module.slots.as_deref(),
            Some(&["Point".to_string(), "origin".to_string(), "VERSION".to_string()][..])
        );
        assert_eq!(module.members.get("Point").map(String::as_str), Some("inspect_demo.Point"));
        assert_eq!(module.members.get("os").map(String::as_str), Some("os"));
        assert_eq!(module.members.get("Sequence").map(String::as_str), Some("collections.abc.Sequence"));
        assert_eq!(module.annotations.get("VERSION").map(String::as_str), Some("str"));

        let version = find(&entries, "inspect_demo.VERSION").as_attribute().unwrap();
        assert_eq!(version.annotation, "str");
        assert_eq!(version.raw_type, "<class 'str'>");
    }

    #[test]
    fn test_class_structure() {
        let entries = inspect_demo();
        let class = find(&entries, "inspect_demo.Point").as_class().unwrap();
        assert_eq!(class.bases, vec!["collections.abc.Sequence"]);
        assert_eq!(class.mros.first().map(String::as_str), Some("inspect_demo.Point"));
        assert_eq!(class.mros.last().map(String::as_str), Some("builtins.object"));
        assert!(class.abcs.contains(&"collections.abc.Sequence".to_string()));
        assert!(class.abcs.contains(&"collections.abc.Sized".to_string()));
        assert_eq!(class.base.docs, "A point.");
        assert!(class.members.contains_key("__init__"));
        assert!(!class.members.contains_key("__module__"));
    }

    #[test]
    fn test_method_scopes() {
        let entries = inspect_demo();
        let scope = |id: &str| find(&entries, id).base().scope;
        assert_eq!(scope("inspect_demo.Point.__init__"), ItemScope::Instance);
        assert_eq!(scope("inspect_demo.Point.zero"), ItemScope::Static);
        assert_eq!(scope("inspect_demo.Point.parse"), ItemScope::Class);
        assert_eq!(scope("inspect_demo.Point.dims"), ItemScope::Class);

        let norm = find(&entries, "inspect_demo.Point.norm").as_attribute().unwrap();
        assert!(norm.property);
        assert_eq!(norm.base.scope, ItemScope::Instance);

        let init = find(&entries, "inspect_demo.Point.__init__").as_function().unwrap();
        let names: Vec<_> = init.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["self", "x", "y"]);
        assert!(init.base.src.contains("self.x = x"));
        let location = init.base.location.as_ref().unwrap();
        assert_eq!(location.file, "inspect_demo.py");
        assert_eq!(location.module, "inspect_demo");
    }

    #[test]
    fn test_entries_are_unique() {
        let entries = inspect_demo();
        let mut ids: Vec<_> = entries.iter().map(ApiEntry::id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(entries.iter().all(|e| !e.id().starts_with("os.")));
    }
}
