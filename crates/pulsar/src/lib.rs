//! Parsers for files produced by Pulsar, a Mario Kart Wii mod engine: `config.pul` mod
//! configurations and crash dumps.

pub mod bmg;
pub mod codec;
pub mod config;
pub mod crash;
pub mod input;
pub mod symbols;

pub use binrw;

/// A magic-prefixed region of a Pulsar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Section {
    Config,
    Info,
    Cups,
    Bmg,
    File,
    CrashDump,
}
