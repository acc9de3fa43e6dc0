use super::{Cursor, DecodeError, FieldKind, Record, Schema, Value};

fn decode_field(cursor: &mut Cursor<'_>, kind: &FieldKind) -> Result<Value, DecodeError> {
    match *kind {
        FieldKind::Primitive(primitive) => cursor.primitive(primitive),
        FieldKind::Record(schema) => decode_fields(cursor, schema).map(Value::Record),
        FieldKind::Array { len, element } => (0..len)
            .map(|_| decode_field(cursor, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

fn decode_fields(cursor: &mut Cursor<'_>, schema: &Schema) -> Result<Vec<Value>, DecodeError> {
    schema
        .fields
        .iter()
        .map(|field| decode_field(cursor, &field.kind))
        .collect()
}

/// Decodes one record with the given schema at the cursor, returning the values of its fields
/// in schema order.
///
/// The schema is validated before anything is read. On error, the cursor position is
/// unspecified.
pub fn decode_record(cursor: &mut Cursor<'_>, schema: &Schema) -> Result<Vec<Value>, DecodeError> {
    schema.validate()?;
    decode_fields(cursor, schema)
}

/// Decodes a `T` at `offset`, returning it along with the number of bytes it occupied.
pub fn decode<T: Record>(bytes: &[u8], offset: usize) -> Result<(T, usize), DecodeError> {
    let mut cursor = Cursor::at(bytes, offset)?;
    let record = cursor.record::<T>()?;

    Ok((record, cursor.offset() - offset))
}
