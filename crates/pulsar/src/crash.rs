//! Crash dumps written by Pulsar's exception handler.
//!
//! A dump is a single fixed-layout [`ExceptionFile`]: the PowerPC register state at the time of
//! the exception followed by a short stack trace.

use crate::{
    Section,
    codec::{Cursor, DecodeError},
};
use easyerr::{Error, ResultExt};
use std::fmt;

/// Magic word at the start of every crash dump ("PULD").
pub const CRASH_MAGIC: u32 = 0x5055_4C44;
/// Minimum length of a crash dump, i.e. the size of an [`ExceptionFile`].
pub const MIN_LEN: usize = 1000;

crate::record! {
    /// A general purpose register.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Gpr {
        pub name: u32,
        pub value: u32,
    }
}

crate::record! {
    /// A floating point register.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Fpr {
        pub name: u32,
        /// Not part of the register, but present in dumps nonetheless.
        pub padding: u32,
        pub value: f64,
    }
}

crate::record! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct StackFrame {
        pub sp_name: u32,
        pub sp: u32,
        pub lr_name: u32,
        pub lr: u32,
    }
}

crate::record! {
    /// The contents of a crash dump.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ExceptionFile {
        pub magic: u32,
        /// Region of the game, as an ASCII letter in the lowest byte.
        pub region: u32,
        pub reserved: u32,
        /// The OS error (exception) which caused the crash.
        pub error: u32,
        pub srr0: Gpr,
        pub srr1: Gpr,
        pub msr: Gpr,
        pub cr: Gpr,
        pub lr: Gpr,
        pub gprs: [Gpr; 32],
        pub fprs: [Fpr; 32],
        pub fpscr: Fpr,
        pub frames: [StackFrame; 10],
    }
}

#[derive(Debug, Error)]
pub enum CrashError {
    #[error("crash dump is too short ({len} bytes, expected at least {min})")]
    Truncated { len: usize, min: usize },
    #[error(
        "mismatched {section} magic at offset 0x{offset:X}: expected 0x{expected:08X}, found 0x{found:08X}"
    )]
    MagicMismatch {
        section: Section,
        offset: usize,
        expected: u64,
        found: u64,
    },
    #[error(transparent)]
    Decode { source: DecodeError },
}

/// The kind of exception which caused a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsError {
    /// Data storage interrupt.
    Dsi,
    /// Instruction storage interrupt.
    Isi,
    FloatingPoint,
    /// Floating point exception.
    Fpe,
    Unknown(u32),
}

impl From<u32> for OsError {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::Dsi,
            3 => Self::Isi,
            7 => Self::FloatingPoint,
            8 => Self::Fpe,
            _ => Self::Unknown(value),
        }
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dsi => f.write_str("DSI"),
            Self::Isi => f.write_str("ISI"),
            Self::FloatingPoint | Self::Fpe => f.write_str("FPE"),
            Self::Unknown(value) => write!(f, "Unknown ({value})"),
        }
    }
}

impl ExceptionFile {
    /// Decodes a crash dump.
    pub fn decode(bytes: &[u8]) -> Result<Self, CrashError> {
        if bytes.len() < MIN_LEN {
            return Err(CrashError::Truncated {
                len: bytes.len(),
                min: MIN_LEN,
            });
        }

        let mut cursor = Cursor::new(bytes);
        let magic = cursor.read::<u32>().context(CrashCtx::Decode)?;
        if magic != CRASH_MAGIC {
            return Err(CrashError::MagicMismatch {
                section: Section::CrashDump,
                offset: 0,
                expected: CRASH_MAGIC.into(),
                found: magic.into(),
            });
        }

        cursor.seek(0).context(CrashCtx::Decode)?;
        let file = cursor.record::<Self>().context(CrashCtx::Decode)?;
        if cursor.remaining() > 0 {
            tracing::debug!(
                trailing = cursor.remaining(),
                "crash dump has trailing bytes"
            );
        }

        Ok(file)
    }

    /// The region letter of the game which crashed (`P`, `E`, `J` or `K`).
    pub fn region(&self) -> char {
        char::from(self.region as u8)
    }

    pub fn error_kind(&self) -> OsError {
        OsError::from(self.error)
    }
}

#[cfg(test)]
mod test {
    use super::{CRASH_MAGIC, CrashError, ExceptionFile, MIN_LEN, OsError};
    use crate::{Section, codec::Record};

    fn word(bytes: &mut Vec<u8>, value: u32) {
        bytes.extend(value.to_be_bytes());
    }

    fn dump() -> Vec<u8> {
        let mut bytes = vec![];

        word(&mut bytes, CRASH_MAGIC);
        word(&mut bytes, u32::from(b'E'));
        word(&mut bytes, 0);
        word(&mut bytes, 2);

        // srr0, srr1, msr, cr, lr
        for value in [0x8023_4567, 0x0000_B032, 0x0000_3032, 0x2400_0088, 0x8012_3456] {
            word(&mut bytes, 0);
            word(&mut bytes, value);
        }

        for i in 0..32 {
            word(&mut bytes, i);
            word(&mut bytes, 0x8000_0000 + i);
        }

        for i in 0..33 {
            word(&mut bytes, i);
            word(&mut bytes, 0xDEAD_BEEF);
            bytes.extend((f64::from(i) * 0.5).to_be_bytes());
        }

        for i in 0..10 {
            word(&mut bytes, 0);
            word(&mut bytes, 0x8100_0000 - i * 0x10);
            word(&mut bytes, 0);
            word(&mut bytes, 0x8000_4000 + i * 4);
        }

        bytes
    }

    #[test]
    fn schema_matches_minimum_length() {
        assert_eq!(ExceptionFile::SCHEMA.fixed_size(), Some(MIN_LEN));
        assert_eq!(dump().len(), MIN_LEN);
    }

    #[test]
    fn decodes_dump() {
        let file = ExceptionFile::decode(&dump()).unwrap();

        assert_eq!(file.region(), 'E');
        assert_eq!(file.error_kind(), OsError::Dsi);
        assert_eq!(file.srr0.value, 0x8023_4567);
        assert_eq!(file.lr.value, 0x8012_3456);
        assert_eq!(file.gprs[31].name, 31);
        assert_eq!(file.gprs[31].value, 0x8000_001F);
        assert_eq!(file.fprs[3].value, 1.5);
        assert_eq!(file.fprs[3].padding, 0xDEAD_BEEF);
        assert_eq!(file.fpscr.value, 16.0);
        assert_eq!(file.frames[0].sp, 0x8100_0000);
        assert_eq!(file.frames[9].lr, 0x8000_4024);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = dump();
        bytes.extend([0xFF; 24]);

        assert!(ExceptionFile::decode(&bytes).is_ok());
    }

    #[test]
    fn short_dump_reports_length() {
        let mut bytes = dump();
        bytes.truncate(999);

        let result = ExceptionFile::decode(&bytes);
        assert!(matches!(
            result,
            Err(CrashError::Truncated { len: 999, min: 1000 })
        ));
        assert!(matches!(
            ExceptionFile::decode(&[]),
            Err(CrashError::Truncated { len: 0, .. })
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = dump();
        bytes[..4].copy_from_slice(b"PULS");

        let result = ExceptionFile::decode(&bytes);
        assert!(matches!(
            result,
            Err(CrashError::MagicMismatch {
                section: Section::CrashDump,
                offset: 0,
                expected: 0x5055_4C44,
                found: 0x5055_4C53,
            })
        ));
    }

    #[test]
    fn os_errors() {
        assert_eq!(OsError::from(3), OsError::Isi);
        assert_eq!(OsError::from(7).to_string(), "FPE");
        assert_eq!(OsError::from(8).to_string(), "FPE");
        assert_eq!(OsError::from(42), OsError::Unknown(42));
    }
}
