//! The type system: primitives, flattened tuples and array references.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Runtime representation a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StackType {
    Int,
    String,
    Long,
}

impl StackType {
    pub const ALL: [StackType; 3] = [StackType::Int, StackType::String, StackType::Long];
}

/// Value a declaration without initialiser starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Int(i32),
    String(String),
    Long(i64),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Undefined,
    Void,
    Int,
    String,
    Long,
    Bool,
    Coordgrid,
    Obj,
    Namedobj,
    Npc,
    Loc,
    Enum,
    Stat,
    Inv,
    Graphic,
    Struct,
    Component,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 17] = [
        PrimitiveType::Undefined,
        PrimitiveType::Void,
        PrimitiveType::Int,
        PrimitiveType::String,
        PrimitiveType::Long,
        PrimitiveType::Bool,
        PrimitiveType::Coordgrid,
        PrimitiveType::Obj,
        PrimitiveType::Namedobj,
        PrimitiveType::Npc,
        PrimitiveType::Loc,
        PrimitiveType::Enum,
        PrimitiveType::Stat,
        PrimitiveType::Inv,
        PrimitiveType::Graphic,
        PrimitiveType::Struct,
        PrimitiveType::Component,
    ];

    /// Source spelling, as used in `def_<type>` and parameter lists.
    pub fn representation(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Void => "void",
            Self::Int => "int",
            Self::String => "string",
            Self::Long => "long",
            Self::Bool => "boolean",
            Self::Coordgrid => "coord",
            Self::Obj => "obj",
            Self::Namedobj => "namedobj",
            Self::Npc => "npc",
            Self::Loc => "loc",
            Self::Enum => "enum",
            Self::Stat => "stat",
            Self::Inv => "inv",
            Self::Graphic => "graphic",
            Self::Struct => "struct",
            Self::Component => "component",
        }
    }

    pub fn for_representation(text: &str) -> Option<PrimitiveType> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.is_declarable() && ty.representation() == text)
    }

    /// One-character code used by array definitions and packed signatures.
    pub fn code(self) -> char {
        match self {
            Self::Undefined | Self::Void => '\0',
            Self::Int => 'i',
            Self::String => 's',
            Self::Long => '\u{cf}',
            Self::Bool => '1',
            Self::Coordgrid => 'c',
            Self::Obj => 'o',
            Self::Namedobj => 'O',
            Self::Npc => 'n',
            Self::Loc => 'l',
            Self::Enum => 'g',
            Self::Stat => 'S',
            Self::Inv => 'v',
            Self::Graphic => 'd',
            Self::Struct => 'J',
            Self::Component => 'I',
        }
    }

    pub fn stack_type(self) -> Option<StackType> {
        match self {
            Self::Undefined | Self::Void => None,
            Self::String => Some(StackType::String),
            Self::Long => Some(StackType::Long),
            _ => Some(StackType::Int),
        }
    }

    /// Whether a local, parameter or array may have this type.
    pub fn is_declarable(self) -> bool {
        self.stack_type().is_some()
    }

    /// Whether values of this type name entries of a config table.
    pub fn is_config(self) -> bool {
        matches!(
            self,
            Self::Obj
                | Self::Namedobj
                | Self::Npc
                | Self::Loc
                | Self::Enum
                | Self::Stat
                | Self::Inv
                | Self::Graphic
                | Self::Struct
                | Self::Component
        )
    }

    pub fn default_value(self) -> Option<DefaultValue> {
        match self {
            Self::Undefined | Self::Void => None,
            Self::Int | Self::Bool => Some(DefaultValue::Int(0)),
            Self::String => Some(DefaultValue::String(String::new())),
            Self::Long => Some(DefaultValue::Long(0)),
            _ => Some(DefaultValue::Int(-1)),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.representation())
    }
}

/// Any type an expression, signature or declaration can have.
#[derive(Debug, Clone, Eq, Serialize)]
pub enum Type {
    Primitive(PrimitiveType),
    /// Always flat: never contains another tuple, never a single element.
    Tuple(Vec<Type>),
    ArrayReference { element: PrimitiveType, index: usize },
}

impl Type {
    pub const VOID: Type = Type::Primitive(PrimitiveType::Void);
    pub const UNDEFINED: Type = Type::Primitive(PrimitiveType::Undefined);
    pub const INT: Type = Type::Primitive(PrimitiveType::Int);
    pub const STRING: Type = Type::Primitive(PrimitiveType::String);
    pub const LONG: Type = Type::Primitive(PrimitiveType::Long);
    pub const BOOL: Type = Type::Primitive(PrimitiveType::Bool);

    /// Build a tuple, flattening nested tuples and dropping `void` members.
    pub fn tuple(types: impl IntoIterator<Item = Type>) -> Type {
        let mut flat = Vec::new();
        for ty in types {
            ty.flatten_into(&mut flat);
        }
        match flat.len() {
            0 => Type::VOID,
            1 => flat.pop().unwrap_or(Type::VOID),
            _ => Type::Tuple(flat),
        }
    }

    fn flatten_into(self, out: &mut Vec<Type>) {
        match self {
            Type::Tuple(inner) => {
                for ty in inner {
                    ty.flatten_into(out);
                }
            }
            Type::Primitive(PrimitiveType::Void) => {}
            other => out.push(other),
        }
    }

    /// The flat list of single-value types this type stands for.
    pub fn flatten(&self) -> Vec<Type> {
        let mut out = Vec::new();
        self.clone().flatten_into(&mut out);
        out
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn stack_type(&self) -> Option<StackType> {
        match self {
            Type::Primitive(p) => p.stack_type(),
            Type::ArrayReference { element, .. } => element.stack_type(),
            Type::Tuple(_) => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Void))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Undefined))
    }

    /// Number of stack values the type occupies.
    pub fn arity(&self) -> usize {
        self.flatten().len()
    }
}

/// Array references compare by element type only; the index is the slot
/// the array occupies, which differs between caller and callee.
impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Primitive(a), Type::Primitive(b)) => a == b,
            (Type::ArrayReference { element: a, .. }, Type::ArrayReference { element: b, .. }) => {
                a == b
            }
            (Type::Tuple(_), _) | (_, Type::Tuple(_)) => self.flatten() == other.flatten(),
            _ => false,
        }
    }
}

impl From<PrimitiveType> for Type {
    fn from(value: PrimitiveType) -> Self {
        Type::Primitive(value)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{p}"),
            Type::Tuple(types) => {
                f.write_str("(")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{ty}")?;
                }
                f.write_str(")")
            }
            Type::ArrayReference { element, .. } => write!(f, "{element}array"),
        }
    }
}
