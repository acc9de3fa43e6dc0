//! A schema-driven decoder for big-endian binary records.
//!
//! Record types are declared with [`record!`](crate::record), which produces both the Rust struct
//! and a static [`Schema`] describing its layout. A single generic routine
//! ([`decode_record`]) walks that schema, so adding a field to a declaration is all it takes
//! for decoding to pick it up.

mod cursor;
mod primitive;
mod record;
mod schema;

pub use cursor::Cursor;
pub use primitive::decode_primitive;
pub use record::{decode, decode_record};
pub use schema::{Field, FieldKind, FromValue, Primitive, Record, Scalar, Schema, Value};

use easyerr::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("needed {needed} bytes at offset 0x{offset:X} but only {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("offset 0x{offset:X} is outside of the {len} byte buffer")]
    OutOfBounds { offset: usize, len: usize },
    #[error("field `{field}` of `{record}` is an array of arrays, which is not supported")]
    UnsupportedFieldKind {
        record: &'static str,
        field: &'static str,
    },
    #[error("field `{field}` expected a {expected} value")]
    ValueMismatch {
        field: &'static str,
        expected: &'static str,
    },
    #[error(transparent)]
    Format { source: binrw::Error },
}
