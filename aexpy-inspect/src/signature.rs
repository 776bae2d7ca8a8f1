//! Runtime signatures to [`Parameter`] records.

use aexpy_core::models::{FunctionEntry, FunctionFlag, Parameter, ParameterKind};
use pyo3::prelude::*;

/// Builtin types whose defaults are stable enough to compare across versions.
const LITERAL_DEFAULTS: &[&str] = &["bool", "int", "float", "complex", "str", "bytes", "tuple"];

/// Map `inspect.Parameter.kind.name` onto a [`ParameterKind`].
pub fn parameter_kind(name: &str) -> Option<ParameterKind> {
    match name {
        "POSITIONAL_ONLY" => Some(ParameterKind::Positional),
        "POSITIONAL_OR_KEYWORD" => Some(ParameterKind::PositionalOrKeyword),
        "VAR_POSITIONAL" => Some(ParameterKind::VarPositional),
        "KEYWORD_ONLY" => Some(ParameterKind::Keyword),
        "VAR_KEYWORD" => Some(ParameterKind::VarKeyword),
        _ => None,
    }
}

/// `TypeName('text')` for literal defaults, `None` for the `None` object and
/// no value at all for anything computed.
pub fn encode_default(type_name: &str, text: &str) -> Option<String> {
    if type_name == "NoneType" {
        return Some("None".to_string());
    }
    LITERAL_DEFAULTS
        .contains(&type_name)
        .then(|| format!("{}('{}')", type_name, text))
}

/// Helpers around the `inspect` module shared by every signature read.
pub struct Signatures<'py> {
    inspect: Bound<'py, PyModule>,
    builtins: Bound<'py, PyModule>,
    empty: Bound<'py, PyAny>,
}

impl<'py> Signatures<'py> {
    pub fn new(py: Python<'py>) -> PyResult<Self> {
        let inspect = py.import_bound("inspect")?;
        let empty = inspect.getattr("Parameter")?.getattr("empty")?;
        Ok(Self {
            builtins: py.import_bound("builtins")?,
            inspect,
            empty,
        })
    }

    /// Annotation text as written (`int`, `list[str]`), or empty.
    pub fn annotation(&self, value: &Bound<'py, PyAny>) -> String {
        if value.is(&self.empty) {
            return String::new();
        }
        if let Ok(text) = value.extract::<String>() {
            return text;
        }
        self.inspect
            .call_method1("formatannotation", (value,))
            .and_then(|v| v.extract::<String>())
            .unwrap_or_default()
    }

    /// Name of the literal builtin type `value` is an instance of, if any.
    fn literal_type(&self, value: &Bound<'py, PyAny>) -> PyResult<String> {
        if value.is_none() {
            return Ok("NoneType".to_string());
        }
        // bool before int: every bool is an int
        for name in LITERAL_DEFAULTS {
            let ty = self.builtins.getattr(*name)?;
            if self.builtins.call_method1("isinstance", (value, ty))?.is_truthy()? {
                return Ok(name.to_string());
            }
        }
        Ok(String::new())
    }

    fn parameter(&self, param: &Bound<'py, PyAny>, owner: &str) -> PyResult<Option<Parameter>> {
        let kind_name: String = param.getattr("kind")?.getattr("name")?.extract()?;
        let Some(kind) = parameter_kind(&kind_name) else {
            tracing::warn!(function = owner, kind = %kind_name, "Unknown parameter kind");
            return Ok(None);
        };
        let mut result = Parameter::new(kind, param.getattr("name")?.extract::<String>()?);
        result.source = owner.to_string();
        result.annotation = self.annotation(&param.getattr("annotation")?);

        let default = param.getattr("default")?;
        if !default.is(&self.empty) {
            let type_name = self.literal_type(&default)?;
            let text = default.str()?.to_string();
            result.optional = true;
            result.default = encode_default(&type_name, &text);
        }
        Ok(Some(result))
    }

    /// Fill parameters, return annotation and flags of `func` from `obj`.
    ///
    /// Objects without a retrievable signature (many builtins) keep an empty
    /// parameter list.
    pub fn read(&self, obj: &Bound<'py, PyAny>, func: &mut FunctionEntry) {
        match self.inspect.call_method1("signature", (obj,)) {
            Ok(sign) => {
                func.return_annotation = sign
                    .getattr("return_annotation")
                    .map(|v| self.annotation(&v))
                    .unwrap_or_default();
                if let Err(e) = self.read_parameters(&sign, func) {
                    tracing::error!(entry = %func.base.id, error = %e, "Failed to read parameters");
                }
            }
            Err(e) => {
                tracing::warn!(entry = %func.base.id, error = %e, "Failed to get signature");
            }
        }
        self.read_flags(obj, func);
    }

    fn read_parameters(&self, sign: &Bound<'py, PyAny>, func: &mut FunctionEntry) -> PyResult<()> {
        let params = sign.getattr("parameters")?.call_method0("values")?;
        for param in params.iter()? {
            if let Some(p) = self.parameter(&param?, &func.base.id)? {
                func.parameters.push(p);
            }
        }
        Ok(())
    }

    fn read_flags(&self, obj: &Bound<'py, PyAny>, func: &mut FunctionEntry) {
        let test = |name: &str| {
            self.inspect
                .call_method1(name, (obj,))
                .and_then(|v| v.is_truthy())
                .unwrap_or(false)
        };
        let marked = |name: &str| {
            obj.getattr(name)
                .and_then(|v| v.is_truthy())
                .unwrap_or(false)
        };
        if test("iscoroutinefunction") || test("isasyncgenfunction") {
            func.set_flag(FunctionFlag::Async);
        }
        if marked("__isabstractmethod__") {
            func.set_flag(FunctionFlag::Abstract);
        }
        if marked("__final__") {
            func.set_flag(FunctionFlag::Final);
        }
        if marked("__override__") {
            func.set_flag(FunctionFlag::Override);
        }
        if marked("__type_params__") {
            func.set_flag(FunctionFlag::Generic);
        }
    }
}
