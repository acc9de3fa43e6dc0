//! Resolution of addresses in crash dumps to symbol names.
//!
//! Symbols are known for the PAL (`P`) version of the game only. Addresses from other regions
//! are first ported to PAL using a versions file, which lists the address ranges that moved
//! between versions:
//!
//! ```text
//! [E]
//! 80004000-80008000: -0x40
//! 80008000-80010000: +0x1C
//! #
//! ```
//!
//! Ranges are given in PAL addresses, and offsets are what has to be added to a PAL address to
//! obtain the address in the region.

use easyerr::{Error, ResultExt};
use rustc_hash::FxHashMap;
use std::{fmt, path::Path};

/// The region the symbol map is for.
pub const BASE_REGION: char = 'P';

#[derive(Debug, Error)]
pub enum SymbolsError {
    #[error(transparent)]
    Io { source: std::io::Error },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

fn parse_hex(line: usize, text: &str) -> Result<u32, SymbolsError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    u32::from_str_radix(digits, 16).map_err(|e| SymbolsError::Parse {
        line,
        reason: format!("invalid address {text:?}: {e}"),
    })
}

/// A resolved symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// The address in the symbol map's region.
    pub address: u32,
    /// Whether the address had to be ported from another region.
    pub ported: bool,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ported {
            write!(f, "{} (0x{:x})", self.name, self.address)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Something which can name the code at an address.
pub trait SymbolResolver {
    fn find_symbol(&self, region: char, addr: u32) -> Option<Symbol>;
}

/// Symbols sorted by address. Each symbol extends up to the next one, and the last entry only
/// marks the end of the one before it.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    entries: Vec<(u32, String)>,
}

impl SymbolMap {
    /// Parses a map with one `ADDRESS NAME` entry per line.
    pub fn parse(text: &str) -> Result<Self, SymbolsError> {
        let mut entries = vec![];
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (address, name) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let address = parse_hex(index + 1, address)?;
            entries.push((address, name.trim().to_owned()));
        }

        if !entries.is_sorted_by_key(|(address, _)| *address) {
            tracing::warn!("symbol map is not sorted, sorting it");
            entries.sort_by_key(|(address, _)| *address);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the symbol containing `addr`.
    pub fn find(&self, addr: u32) -> Option<&str> {
        let next = self.entries.partition_point(|(address, _)| *address <= addr);
        if next == 0 || next == self.entries.len() {
            return None;
        }

        Some(&self.entries[next - 1].1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Port {
    lower: u32,
    upper: u32,
    offset: i64,
}

/// Address ranges which moved between the base region and the other regions.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    regions: FxHashMap<char, Vec<Port>>,
}

impl PortTable {
    pub fn parse(text: &str) -> Result<Self, SymbolsError> {
        let mut regions: FxHashMap<char, Vec<Port>> = FxHashMap::default();
        let mut current = None;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            let number = index + 1;

            if line.is_empty() {
                continue;
            }

            if line == "#" {
                current = None;
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let mut chars = header.chars();
                let (Some(region), None) = (chars.next(), chars.next()) else {
                    return Err(SymbolsError::Parse {
                        line: number,
                        reason: format!("invalid region header {line:?}"),
                    });
                };

                regions.entry(region).or_default();
                current = Some(region);
                continue;
            }

            let Some(ports) = current.and_then(|region| regions.get_mut(&region)) else {
                tracing::trace!(line = number, "skipping line outside of a region");
                continue;
            };

            ports.push(Self::parse_port(number, line)?);
        }

        Ok(Self { regions })
    }

    fn parse_port(line: usize, text: &str) -> Result<Port, SymbolsError> {
        let malformed = || SymbolsError::Parse {
            line,
            reason: format!("expected `LOWER-UPPER: OFFSET`, found {text:?}"),
        };

        let (range, offset) = text.split_once(':').ok_or_else(malformed)?;
        let (lower, upper) = range.trim().split_once('-').ok_or_else(malformed)?;

        let offset = offset.trim();
        let (negative, magnitude) = match offset.as_bytes().first() {
            Some(b'-') => (true, &offset[1..]),
            Some(b'+') => (false, &offset[1..]),
            _ => (false, offset),
        };

        let magnitude = i64::from(parse_hex(line, magnitude)?);
        Ok(Port {
            lower: parse_hex(line, lower.trim())?,
            upper: parse_hex(line, upper.trim())?,
            offset: if negative { -magnitude } else { magnitude },
        })
    }

    /// Ports an address of `region` to the base region. Returns `None` if the region is unknown
    /// or no range contains the address.
    pub fn port(&self, region: char, addr: u32) -> Option<u32> {
        if region == BASE_REGION {
            return Some(addr);
        }

        self.regions.get(&region)?.iter().find_map(|port| {
            let ported = u32::try_from(i64::from(addr) - port.offset).ok()?;
            (port.lower..port.upper).contains(&ported).then_some(ported)
        })
    }
}

/// A symbol map along with the port table needed to use it for every region.
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    pub map: SymbolMap,
    pub ports: PortTable,
}

impl Symbols {
    pub fn parse(map: &str, versions: &str) -> Result<Self, SymbolsError> {
        Ok(Self {
            map: SymbolMap::parse(map)?,
            ports: PortTable::parse(versions)?,
        })
    }

    /// Loads the symbol map and versions files at the given paths.
    pub fn load(map: impl AsRef<Path>, versions: impl AsRef<Path>) -> Result<Self, SymbolsError> {
        let map = std::fs::read_to_string(map).context(SymbolsCtx::Io)?;
        let versions = std::fs::read_to_string(versions).context(SymbolsCtx::Io)?;
        let symbols = Self::parse(&map, &versions)?;

        tracing::debug!(symbols = symbols.map.len(), "loaded symbol map");
        Ok(symbols)
    }
}

impl SymbolResolver for Symbols {
    fn find_symbol(&self, region: char, addr: u32) -> Option<Symbol> {
        let address = self.ports.port(region, addr)?;
        let name = self.map.find(address)?;

        Some(Symbol {
            name: name.to_owned(),
            address,
            ported: region != BASE_REGION,
        })
    }
}
