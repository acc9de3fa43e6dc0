use super::{DecodeError, Primitive, Record, Scalar, Value, decode_primitive, decode_record};

/// A read position into a borrowed byte buffer.
///
/// The offset never exceeds the length of the buffer: reads which would go past the end fail
/// instead.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Creates a cursor positioned at `offset`.
    pub fn at(bytes: &'a [u8], offset: usize) -> Result<Self, DecodeError> {
        let mut cursor = Self::new(bytes);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn seek(&mut self, offset: usize) -> Result<(), DecodeError> {
        if offset > self.bytes.len() {
            return Err(DecodeError::OutOfBounds {
                offset,
                len: self.bytes.len(),
            });
        }

        self.offset = offset;
        Ok(())
    }

    /// Returns the next `len` bytes and moves past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }

        let taken = &self.bytes[self.offset..][..len];
        self.offset += len;

        Ok(taken)
    }

    pub fn primitive(&mut self, kind: Primitive) -> Result<Value, DecodeError> {
        let (value, consumed) = decode_primitive(self.bytes, self.offset, kind)?;
        self.offset += consumed;

        Ok(value)
    }

    /// Reads a single scalar, e.g. a magic word.
    pub fn read<T: Scalar>(&mut self) -> Result<T, DecodeError> {
        let value = self.primitive(T::PRIMITIVE)?;
        T::from_value("scalar", value)
    }

    /// Decodes a record at the current offset and moves past it.
    pub fn record<T: Record>(&mut self) -> Result<T, DecodeError> {
        let values = decode_record(self, T::SCHEMA)?;
        T::from_values(values)
    }
}
