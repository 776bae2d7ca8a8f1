//! Structured types attached to attributes, parameters and return values.

use serde::{Deserialize, Serialize};

/// Class id of the root object class.
pub const OBJECT_CLASS_ID: &str = "builtins.object";

/// A structured type, tagged by `form` when serialized.
///
/// Two types are equal for diffing purposes when their canonical ids are
/// equal, see [`TypeType::id`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "lowercase")]
pub enum TypeType {
    None,
    Any,
    Unknown {
        #[serde(default)]
        message: String,
    },
    /// A literal value, stored as its source representation (`'a'`, `1`).
    Literal { value: String },
    Class { id: String },
    Sum { types: Vec<TypeType> },
    Product { types: Vec<TypeType> },
    Callable {
        args: Box<TypeType>,
        ret: Box<TypeType>,
    },
    Generic {
        base: Box<TypeType>,
        vars: Vec<TypeType>,
    },
}

impl TypeType {
    pub fn unknown(message: impl Into<String>) -> Self {
        TypeType::Unknown {
            message: message.into(),
        }
    }

    pub fn class(id: impl Into<String>) -> Self {
        TypeType::Class { id: id.into() }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        TypeType::Literal {
            value: value.into(),
        }
    }

    pub fn sum(types: Vec<TypeType>) -> Self {
        TypeType::Sum { types }
    }

    pub fn product(types: Vec<TypeType>) -> Self {
        TypeType::Product { types }
    }

    pub fn callable(args: TypeType, ret: TypeType) -> Self {
        TypeType::Callable {
            args: Box::new(args),
            ret: Box::new(ret),
        }
    }

    pub fn generic(base: TypeType, vars: Vec<TypeType>) -> Self {
        TypeType::Generic {
            base: Box::new(base),
            vars,
        }
    }

    /// `Optional[t]`, i.e. `[t | none]`.
    pub fn optional(inner: TypeType) -> Self {
        TypeType::sum(vec![inner, TypeType::None])
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TypeType::Any)
    }

    /// Canonical string form used for type equality.
    pub fn id(&self) -> String {
        match self {
            TypeType::None => "none".to_string(),
            TypeType::Any => "any".to_string(),
            TypeType::Unknown { message } => format!("unknown({})", message),
            TypeType::Literal { value } => value.clone(),
            TypeType::Class { id } => id.clone(),
            TypeType::Sum { types } => format!("[{}]", join_ids(types, " | ")),
            TypeType::Product { types } => format!("({})", join_ids(types, ", ")),
            TypeType::Callable { args, ret } => format!("{} -> {}", args.id(), ret.id()),
            TypeType::Generic { base, vars } => {
                format!("{}<{}>", base.id(), join_ids(vars, ", "))
            }
        }
    }
}

impl std::fmt::Display for TypeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

fn join_ids(types: &[TypeType], sep: &str) -> String {
    types.iter().map(TypeType::id).collect::<Vec<_>>().join(sep)
}

/// A resolved type together with its canonical id and the raw text it came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<TypeType>,
    pub id: String,
    pub raw: String,
}

impl TypeInfo {
    pub fn new(ty: TypeType, raw: impl Into<String>) -> Self {
        Self {
            id: ty.id(),
            r#type: Some(ty),
            raw: raw.into(),
        }
    }

    /// Whether the resolved type is `Any`.
    pub fn is_any(&self) -> bool {
        self.r#type.as_ref().is_some_and(TypeType::is_any)
    }
}
