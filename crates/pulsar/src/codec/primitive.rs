use super::{DecodeCtx, DecodeError, Primitive, Value};
use binrw::{BinRead, NullString, io::Cursor};
use easyerr::ResultExt;

fn read<T>(reader: &mut Cursor<&[u8]>) -> Result<T, DecodeError>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    T::read_options(reader, binrw::endian::BE, ()).context(DecodeCtx::Format)
}

/// Decodes a single primitive of the given kind at `offset`.
///
/// Returns the value along with the number of bytes it occupied. For text, this count includes
/// the null terminator, which is not part of the returned string.
pub fn decode_primitive(
    bytes: &[u8],
    offset: usize,
    kind: Primitive,
) -> Result<(Value, usize), DecodeError> {
    let rest = bytes.get(offset..).unwrap_or_default();
    let available = rest.len();
    let needed = match kind.width() {
        Some(width) => width,
        None => match rest.iter().position(|&b| b == 0) {
            Some(end) => end + 1,
            // the terminator would be at least one byte past the end
            None => available + 1,
        },
    };

    if needed > available {
        return Err(DecodeError::Truncated {
            offset,
            needed,
            available,
        });
    }

    let mut reader = Cursor::new(&rest[..needed]);
    let value = match kind {
        Primitive::Bool => Value::Bool(read::<u8>(&mut reader)? != 0),
        Primitive::U8 => Value::U8(read(&mut reader)?),
        Primitive::I8 => Value::I8(read(&mut reader)?),
        Primitive::U16 => Value::U16(read(&mut reader)?),
        Primitive::I16 => Value::I16(read(&mut reader)?),
        Primitive::U32 => Value::U32(read(&mut reader)?),
        Primitive::I32 => Value::I32(read(&mut reader)?),
        Primitive::U64 => Value::U64(read(&mut reader)?),
        Primitive::I64 => Value::I64(read(&mut reader)?),
        Primitive::F32 => Value::F32(read(&mut reader)?),
        Primitive::F64 => Value::F64(read(&mut reader)?),
        Primitive::Text => {
            let text = read::<NullString>(&mut reader)?;
            Value::Text(String::from_utf8_lossy(&text.0).into_owned())
        }
    };

    Ok((value, needed))
}
