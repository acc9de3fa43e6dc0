use super::DecodeError;

/// The kind of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Null-terminated text.
    Text,
}

impl Primitive {
    /// Width of this primitive in bytes, or `None` if it has a variable width.
    pub const fn width(self) -> Option<usize> {
        Some(match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
            Self::Text => return None,
        })
    }
}

/// How a field is laid out in the stream.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Primitive(Primitive),
    Record(&'static Schema),
    /// `len` consecutive elements of the same kind. Elements must not be arrays themselves.
    Array {
        len: usize,
        element: &'static FieldKind,
    },
}

impl FieldKind {
    /// Size of this field in bytes, or `None` if it contains text.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Primitive(primitive) => primitive.width(),
            Self::Record(schema) => schema.fixed_size(),
            Self::Array { len, element } => match element.fixed_size() {
                Some(size) => Some(size * *len),
                None => None,
            },
        }
    }

    fn validate(&self, record: &'static str, field: &'static str) -> Result<(), DecodeError> {
        match self {
            Self::Primitive(_) => Ok(()),
            Self::Record(schema) => schema.validate(),
            Self::Array { element, .. } => match element {
                Self::Array { .. } => Err(DecodeError::UnsupportedFieldKind { record, field }),
                _ => element.validate(record, field),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The layout of a record: its fields, in stream order. No padding exists between fields.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }

    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }

    true
}

impl Schema {
    /// Size of a record with this schema in bytes, or `None` if it contains text.
    pub const fn fixed_size(&self) -> Option<usize> {
        let mut size = 0;
        let mut i = 0;
        while i < self.fields.len() {
            match self.fields[i].kind.fixed_size() {
                Some(field) => size += field,
                None => return None,
            }
            i += 1;
        }

        Some(size)
    }

    /// Offset of the first byte following the top-level field `name`, relative to the start of
    /// the record. `None` if there is no such field or a field up to it contains text.
    pub const fn offset_after(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        let mut i = 0;
        while i < self.fields.len() {
            let field = &self.fields[i];
            match field.kind.fixed_size() {
                Some(size) => offset += size,
                None => return None,
            }

            if str_eq(field.name, name) {
                return Some(offset);
            }
            i += 1;
        }

        None
    }

    /// Checks that every field, including those of nested records, can be decoded.
    pub fn validate(&self) -> Result<(), DecodeError> {
        self.fields
            .iter()
            .try_for_each(|field| field.kind.validate(self.name, field.name))
    }
}

/// A decoded field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Record(Vec<Value>),
    Array(Vec<Value>),
}

/// Types which can be built from a decoded [`Value`].
pub trait FromValue: Sized {
    fn from_value(field: &'static str, value: Value) -> Result<Self, DecodeError>;
}

/// Types which are decoded from a single [`Primitive`].
pub trait Scalar: FromValue {
    const PRIMITIVE: Primitive;
}

/// A type with a [`Schema`]. Usually implemented through [`record!`](crate::record).
pub trait Record: Sized {
    const SCHEMA: &'static Schema;

    /// Builds the record from the values of its fields, in schema order.
    fn from_values(values: Vec<Value>) -> Result<Self, DecodeError>;
}

macro_rules! scalars {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(field: &'static str, value: Value) -> Result<Self, DecodeError> {
                    match value {
                        Value::$variant(value) => Ok(value),
                        _ => Err(DecodeError::ValueMismatch {
                            field,
                            expected: stringify!($variant),
                        }),
                    }
                }
            }

            impl Scalar for $ty {
                const PRIMITIVE: Primitive = Primitive::$variant;
            }
        )*
    };
}

scalars! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Text,
}

impl<T, const N: usize> FromValue for [T; N]
where
    T: FromValue,
{
    fn from_value(field: &'static str, value: Value) -> Result<Self, DecodeError> {
        let mismatch = DecodeError::ValueMismatch {
            field,
            expected: "Array",
        };

        let Value::Array(values) = value else {
            return Err(mismatch);
        };

        let elements = values
            .into_iter()
            .map(|value| T::from_value(field, value))
            .collect::<Result<Vec<_>, _>>()?;

        elements.try_into().map_err(|_| mismatch)
    }
}

/// Expands to the [`FieldKind`] of a field type as written in a [`record!`](crate::record)
/// declaration.
#[doc(hidden)]
#[macro_export]
macro_rules! field_kind {
    (bool) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::Bool) };
    (u8) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::U8) };
    (i8) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::I8) };
    (u16) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::U16) };
    (i16) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::I16) };
    (u32) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::U32) };
    (i32) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::I32) };
    (u64) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::U64) };
    (i64) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::I64) };
    (f32) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::F32) };
    (f64) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::F64) };
    (String) => { $crate::codec::FieldKind::Primitive($crate::codec::Primitive::Text) };
    ([$element:tt; $len:expr]) => {
        $crate::codec::FieldKind::Array {
            len: $len,
            element: &$crate::field_kind!($element),
        }
    };
    ($record:ident) => {
        $crate::codec::FieldKind::Record(<$record as $crate::codec::Record>::SCHEMA)
    };
}

/// Declares a struct together with its [`Schema`], implementing [`Record`] and [`FromValue`]
/// for it.
///
/// Field types must be a single token tree: a primitive (`u32`, `bool`, `String`, ...), another
/// record type or an array `[T; N]` of those.
///
/// ```
/// pulsar::record! {
///     #[derive(Debug)]
///     pub struct Variant {
///         pub slot: u8,
///         pub music_slot: u8,
///     }
/// }
///
/// let (variant, consumed) = pulsar::codec::decode::<Variant>(&[0x08, 0x75], 0).unwrap();
/// assert_eq!((variant.slot, variant.music_slot, consumed), (0x08, 0x75, 2));
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident: $ty:tt
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::codec::Record for $name {
            const SCHEMA: &'static $crate::codec::Schema = &$crate::codec::Schema {
                name: stringify!($name),
                fields: &[
                    $(
                        $crate::codec::Field {
                            name: stringify!($field),
                            kind: $crate::field_kind!($ty),
                        },
                    )*
                ],
            };

            fn from_values(
                values: ::std::vec::Vec<$crate::codec::Value>,
            ) -> ::std::result::Result<Self, $crate::codec::DecodeError> {
                let mut values = values.into_iter();
                ::std::result::Result::Ok(Self {
                    $(
                        $field: $crate::codec::FromValue::from_value(
                            stringify!($field),
                            values.next().ok_or($crate::codec::DecodeError::ValueMismatch {
                                field: stringify!($field),
                                expected: "present",
                            })?,
                        )?,
                    )*
                })
            }
        }

        impl $crate::codec::FromValue for $name {
            fn from_value(
                field: &'static str,
                value: $crate::codec::Value,
            ) -> ::std::result::Result<Self, $crate::codec::DecodeError> {
                match value {
                    $crate::codec::Value::Record(values) => {
                        <Self as $crate::codec::Record>::from_values(values)
                    }
                    _ => ::std::result::Result::Err($crate::codec::DecodeError::ValueMismatch {
                        field,
                        expected: "Record",
                    }),
                }
            }
        }
    };
}
