//! # Type System
//!
//! Every IR node carries a `Type`. A type is a base shape (`TypeKind`) plus an
//! orthogonal nullability bit; `Option<T>` is never a separate shape.
//!
//! ```text
//! scalars:    bool  i16 i32 i64  f32 f64  Decimal  String  Date  Timestamp  Interval  usize
//! composites: Tuple2<A, B>  (A, B)  ZSet<T>  IndexedZSet<K, V>  Vec<T>  struct  Fn(A) -> R  &T
//! ```
//!
//! Two types are the *same* iff their shapes, components and nullability all
//! match, recursively.

use crate::error::{CompileError, CompileResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Width of a signed integer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntWidth {
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }
}

/// A named field of a struct type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        StructField {
            name: name.into(),
            ty,
        }
    }
}

/// Base shape of a type, without nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Bool,
    Integer(IntWidth),
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    Decimal {
        precision: u32,
        scale: u32,
    },
    String,
    Date,
    Timestamp,
    /// Interval in milliseconds
    Interval,
    USize,
    /// Type of the untyped SQL `NULL` literal
    Null,
    /// Named tuple (the `TupleN` structs of the runtime)
    Tuple(Vec<Type>),
    /// Plain Rust tuple, used for key/value pairs
    RawTuple(Vec<Type>),
    ZSet(Box<Type>),
    IndexedZSet {
        key: Box<Type>,
        value: Box<Type>,
    },
    Vec(Box<Type>),
    Struct {
        name: String,
        fields: Vec<StructField>,
    },
    Function {
        params: Vec<Type>,
        result: Box<Type>,
    },
    Ref(Box<Type>),
    /// Generic type supplied by the runtime library, e.g. `Fold<..>`
    User {
        name: String,
        args: Vec<Type>,
    },
    /// Wildcard, only used for identity closures whose type is fixed later
    Any,
}

/// A type: base shape plus nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    #[serde(default)]
    pub may_be_null: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            may_be_null: false,
        }
    }

    pub fn bool() -> Self {
        Type::new(TypeKind::Bool)
    }

    pub fn int16() -> Self {
        Type::new(TypeKind::Integer(IntWidth::W16))
    }

    pub fn int32() -> Self {
        Type::new(TypeKind::Integer(IntWidth::W32))
    }

    pub fn int64() -> Self {
        Type::new(TypeKind::Integer(IntWidth::W64))
    }

    pub fn float() -> Self {
        Type::new(TypeKind::Float)
    }

    pub fn double() -> Self {
        Type::new(TypeKind::Double)
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Type::new(TypeKind::Decimal { precision, scale })
    }

    pub fn string() -> Self {
        Type::new(TypeKind::String)
    }

    pub fn date() -> Self {
        Type::new(TypeKind::Date)
    }

    pub fn timestamp() -> Self {
        Type::new(TypeKind::Timestamp)
    }

    pub fn interval() -> Self {
        Type::new(TypeKind::Interval)
    }

    pub fn usize() -> Self {
        Type::new(TypeKind::USize)
    }

    /// Type of the SQL `NULL` literal (always nullable)
    pub fn null() -> Self {
        Type::new(TypeKind::Null).with_nullable(true)
    }

    pub fn any() -> Self {
        Type::new(TypeKind::Any)
    }

    /// The empty tuple, used as the type of statements
    pub fn unit() -> Self {
        Type::new(TypeKind::RawTuple(Vec::new()))
    }

    pub fn tuple(fields: Vec<Type>) -> Self {
        Type::new(TypeKind::Tuple(fields))
    }

    pub fn raw_tuple(fields: Vec<Type>) -> Self {
        Type::new(TypeKind::RawTuple(fields))
    }

    pub fn zset(element: Type) -> Self {
        Type::new(TypeKind::ZSet(Box::new(element)))
    }

    pub fn indexed_zset(key: Type, value: Type) -> Self {
        Type::new(TypeKind::IndexedZSet {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    pub fn vec(element: Type) -> Self {
        Type::new(TypeKind::Vec(Box::new(element)))
    }

    pub fn function(params: Vec<Type>, result: Type) -> Self {
        Type::new(TypeKind::Function {
            params,
            result: Box::new(result),
        })
    }

    pub fn reference(inner: Type) -> Self {
        Type::new(TypeKind::Ref(Box::new(inner)))
    }

    pub fn user(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::new(TypeKind::User {
            name: name.into(),
            args,
        })
    }

    /// Named struct type. Field names must be unique and structs are never nullable.
    pub fn structure(
        name: impl Into<String>,
        fields: Vec<StructField>,
        may_be_null: bool,
    ) -> CompileResult<Self> {
        let name = name.into();
        if may_be_null {
            return Err(CompileError::construction(format!(
                "struct type {name} cannot be nullable"
            )));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(CompileError::construction(format!(
                    "duplicate field name {} in struct {name}",
                    field.name
                )));
            }
        }
        Ok(Type::new(TypeKind::Struct { name, fields }))
    }

    /// Same shape with the given nullability
    pub fn with_nullable(&self, may_be_null: bool) -> Self {
        Type {
            kind: self.kind.clone(),
            may_be_null,
        }
    }

    pub fn nullable(&self) -> Self {
        self.with_nullable(true)
    }

    pub fn non_null(&self) -> Self {
        self.with_nullable(false)
    }

    /// Structural type equality, including nullability
    pub fn same(&self, other: &Type) -> bool {
        self == other
    }

    /// Structural equality ignoring the outermost nullability bit
    pub fn same_shape(&self, other: &Type) -> bool {
        self.kind == other.kind
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind, TypeKind::Bool)
    }

    pub fn is_null_type(&self) -> bool {
        matches!(self.kind, TypeKind::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Integer(_)
                | TypeKind::Float
                | TypeKind::Double
                | TypeKind::Decimal { .. }
                | TypeKind::USize
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self.kind, TypeKind::Float | TypeKind::Double)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, TypeKind::String)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, TypeKind::ZSet(_) | TypeKind::IndexedZSet { .. })
    }

    /// Element type of a `ZSet<T>`
    pub fn zset_element(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::ZSet(element) => Some(element),
            _ => None,
        }
    }

    /// Key and value types of an `IndexedZSet<K, V>`
    pub fn indexed_parts(&self) -> Option<(&Type, &Type)> {
        match &self.kind {
            TypeKind::IndexedZSet { key, value } => Some((key, value)),
            _ => None,
        }
    }

    /// Fields of a tuple or raw tuple
    pub fn tuple_fields(&self) -> Option<&[Type]> {
        match &self.kind {
            TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => Some(fields),
            _ => None,
        }
    }

    /// Type of field `index` of a tuple, raw tuple or struct
    pub fn field(&self, index: usize) -> Option<&Type> {
        match &self.kind {
            TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => fields.get(index),
            TypeKind::Struct { fields, .. } => fields.get(index).map(|f| &f.ty),
            _ => None,
        }
    }

    /// Parameter and result types of a function type
    pub fn function_parts(&self) -> Option<(&[Type], &Type)> {
        match &self.kind {
            TypeKind::Function { params, result } => Some((params, result)),
            _ => None,
        }
    }

    /// Pointee of a reference type
    pub fn deref(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Ref(inner) => Some(inner),
            _ => None,
        }
    }

    /// Abbreviation used to name specialized runtime functions
    pub fn short_name(&self) -> Option<&'static str> {
        let name = match &self.kind {
            TypeKind::Bool => "b",
            TypeKind::Integer(IntWidth::W16) => "i16",
            TypeKind::Integer(IntWidth::W32) => "i32",
            TypeKind::Integer(IntWidth::W64) => "i64",
            TypeKind::Float => "f",
            TypeKind::Double => "d",
            TypeKind::Decimal { .. } => "decimal",
            TypeKind::String => "s",
            TypeKind::Date => "Date",
            TypeKind::Timestamp => "Timestamp",
            TypeKind::Interval => "ShortInterval",
            TypeKind::USize => "u",
            _ => return None,
        };
        Some(name)
    }

    fn fmt_base(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Integer(width) => write!(f, "i{}", width.bits()),
            TypeKind::Float => write!(f, "F32"),
            TypeKind::Double => write!(f, "F64"),
            TypeKind::Decimal { .. } => write!(f, "Decimal"),
            TypeKind::String => write!(f, "String"),
            TypeKind::Date => write!(f, "Date"),
            TypeKind::Timestamp => write!(f, "Timestamp"),
            TypeKind::Interval => write!(f, "ShortInterval"),
            TypeKind::USize => write!(f, "usize"),
            TypeKind::Null => write!(f, "()"),
            TypeKind::Tuple(fields) => {
                write!(f, "Tuple{}<", fields.len())?;
                write_list(f, fields)?;
                write!(f, ">")
            }
            TypeKind::RawTuple(fields) => {
                write!(f, "(")?;
                write_list(f, fields)?;
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            TypeKind::ZSet(element) => write!(f, "ZSet<{element}>"),
            TypeKind::IndexedZSet { key, value } => write!(f, "IndexedZSet<{key}, {value}>"),
            TypeKind::Vec(element) => write!(f, "Vec<{element}>"),
            TypeKind::Struct { name, .. } => write!(f, "{name}"),
            TypeKind::Function { params, result } => {
                write!(f, "Fn(")?;
                write_list(f, params)?;
                write!(f, ") -> {result}")
            }
            TypeKind::Ref(inner) => write!(f, "&{inner}"),
            TypeKind::User { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    write_list(f, args)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeKind::Any => write!(f, "_"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The NULL type is already an Option
        if self.may_be_null && !self.is_null_type() {
            write!(f, "Option<")?;
            self.fmt_base(f)?;
            write!(f, ">")
        } else {
            self.fmt_base(f)
        }
    }
}
