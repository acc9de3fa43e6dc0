//! `config.pul` files: the mod configuration written by the Pulsar pack creator.
//!
//! A config is a header followed by sections at the offsets it lists:
//! - Info: global settings of the pack.
//! - Cups: a fixed-size header, then 4 track records per cup, then a pool of variant records.
//!   Each track says how many variants it has, so the pool can only be walked alongside the
//!   tracks.
//! - BMG: cup, track and author names, as a binary BMG blob.
//! - FILE: an embedded payload which is not decoded here.

pub mod text;

use crate::{
    Section,
    bmg::{BmgError, TextDecoder},
    codec::{Cursor, DecodeError, Record},
};
use easyerr::{Error, ResultExt};

/// Magic of the config header ("PULS").
pub const CONFIG_MAGIC: u32 = 0x5055_4C53;
/// Magic of the info section ("INFO").
pub const INFO_MAGIC: u32 = 0x494E_464F;
/// Magic of the cups section ("CUPS").
pub const CUPS_MAGIC: u32 = 0x4355_5053;
/// Magic of the BMG section ("MESGbmg1").
pub const BMG_MAGIC: u64 = 0x4D45_5347_626D_6731;
/// Magic of the FILE section ("FILE").
pub const FILE_MAGIC: u32 = 0x4649_4C45;
/// The only config version which can be decoded. Older versions must be converted with the pack
/// creator first.
pub const SUPPORTED_VERSION: i32 = 3;
pub const TRACKS_PER_CUP: usize = 4;

// tracks start right after the last fixed field of the cups header
const TRACK_REGION_START: usize = match CupsHeader::SCHEMA.offset_after("total_variant_count") {
    Some(offset) => offset,
    None => panic!("cups header must have a fixed layout"),
};

const TRACK_SIZE: usize = match Track::SCHEMA.fixed_size() {
    Some(size) => size,
    None => panic!("tracks must have a fixed layout"),
};

crate::record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct ConfigHeader {
        pub magic: u32,
        pub version: i32,
        pub info_offset: i32,
        pub cups_offset: i32,
        pub bmg_offset: i32,
        /// Name of the folder containing the mod's files on the SD card.
        pub mod_folder_name: String,
    }
}

crate::record! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct SectionHeader {
        pub magic: u32,
        pub version: u32,
        pub size: u32,
    }
}

crate::record! {
    /// Global settings of a pack.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Info {
        pub header: SectionHeader,
        /// Key which online players must share in order to be matched together.
        pub room_key: u32,
        pub prob_100cc: u32,
        pub prob_150cc: u32,
        pub wiimmfi_region: i32,
        /// Number of races a track is blocked for after being picked.
        pub track_blocking: u32,
        pub has_tt_trophies: bool,
        pub has_200cc: bool,
        pub has_umts: bool,
        pub has_feather: bool,
        pub has_mega_tc: bool,
        pub cup_icon_count: u16,
        pub choose_next_track_timer: u8,
        pub reserved: [u8; 40],
    }
}

crate::record! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CupsHeader {
        pub header: SectionHeader,
        /// Number of custom cups.
        pub cts_cup_count: u16,
        pub regs_mode: u8,
        pub padding: u8,
        pub trophy_count: [u16; 4],
        pub total_variant_count: i32,
    }
}

crate::record! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Track {
        pub slot: u8,
        pub music_slot: u8,
        /// Number of variants of this track in the variant pool.
        pub variant_count: i16,
        pub crc32: u32,
    }
}

crate::record! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Variant {
        pub slot: u8,
        pub music_slot: u8,
    }
}

/// A track along with its variants and the names given to it by the BMG section.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHolder {
    pub name: Option<String>,
    pub author: Option<String>,
    pub info: Track,
    /// The variants of this track, in pool order.
    pub variants: Vec<Variant>,
}

impl TrackHolder {
    fn new(info: Track, variants: Vec<Variant>) -> Self {
        Self {
            name: None,
            author: None,
            info,
            variants,
        }
    }

    /// The main variant, i.e. the track itself.
    pub fn main(&self) -> Variant {
        Variant {
            slot: self.info.slot,
            music_slot: self.info.music_slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CupHolder {
    pub name: Option<String>,
    pub tracks: [TrackHolder; TRACKS_PER_CUP],
}

impl CupHolder {
    /// All variants of the tracks in this cup, in pool order.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.tracks.iter().flat_map(|track| &track.variants)
    }
}

/// Location of a section within the config buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

/// A decoded `config.pul`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub header: ConfigHeader,
    pub info: Info,
    pub cups_header: CupsHeader,
    pub cups: Vec<CupHolder>,
    /// The BMG blob, header included.
    pub bmg: Span,
    /// The FILE payload, magic included. It extends to the end of the buffer.
    pub file: Span,
    /// Names for main and alternate variants, which are not attributed to tracks.
    pub unattributed: Vec<text::UnattributedName>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "mismatched {section} magic at offset 0x{offset:X}: expected 0x{expected:X}, found 0x{found:X}"
    )]
    MagicMismatch {
        section: Section,
        offset: usize,
        expected: u64,
        found: u64,
    },
    #[error("config version {found} is not supported (only version {supported} is)")]
    UnsupportedVersion { found: i32, supported: i32 },
    #[error("{section} section has an invalid offset ({offset})")]
    InvalidOffset { section: Section, offset: i32 },
    #[error(transparent)]
    Decode { source: DecodeError },
    #[error(transparent)]
    ExternalDecodeFailed { source: BmgError },
}

fn check_magic(
    section: Section,
    offset: usize,
    expected: impl Into<u64>,
    found: impl Into<u64>,
) -> Result<(), ConfigError> {
    let (expected, found) = (expected.into(), found.into());
    if expected != found {
        return Err(ConfigError::MagicMismatch {
            section,
            offset,
            expected,
            found,
        });
    }

    Ok(())
}

/// Checks the magic word of the section at `offset`, leaving the cursor at the start of the
/// section. Nothing else of the section is read until its magic matches.
fn expect_section(
    cursor: &mut Cursor<'_>,
    section: Section,
    offset: usize,
    expected: u32,
) -> Result<(), ConfigError> {
    cursor.seek(offset).context(ConfigCtx::Decode)?;
    let found = cursor.read::<u32>().context(ConfigCtx::Decode)?;
    check_magic(section, offset, expected, found)?;

    cursor.seek(offset).context(ConfigCtx::Decode)
}

fn section_offset(section: Section, offset: i32) -> Result<usize, ConfigError> {
    usize::try_from(offset).map_err(|_| ConfigError::InvalidOffset { section, offset })
}

/// Walks the track region and the variant pool of the cups section. Returns the cups and the
/// offset right after the last variant.
fn walk_cups(
    bytes: &[u8],
    cups_offset: usize,
    header: &CupsHeader,
) -> Result<(Vec<CupHolder>, usize), DecodeError> {
    let cup_count = usize::from(header.cts_cup_count);
    let track_start = cups_offset + TRACK_REGION_START;
    let pool_start = track_start + TRACKS_PER_CUP * cup_count * TRACK_SIZE;

    tracing::debug!(
        cup_count,
        track_start,
        pool_start,
        "walking tracks and variants"
    );

    let mut track_cursor = Cursor::at(bytes, track_start)?;
    let mut variant_cursor = Cursor::at(bytes, pool_start)?;
    let mut decode_track = || -> Result<TrackHolder, DecodeError> {
        let track = track_cursor.record::<Track>()?;

        // a negative count can only come from a broken file, treat it as no variants
        let count = usize::try_from(track.variant_count).unwrap_or_default();
        let variants = (0..count)
            .map(|_| variant_cursor.record::<Variant>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TrackHolder::new(track, variants))
    };

    let mut cups = Vec::with_capacity(cup_count);
    for _ in 0..cup_count {
        let tracks = [
            decode_track()?,
            decode_track()?,
            decode_track()?,
            decode_track()?,
        ];

        cups.push(CupHolder { name: None, tracks });
    }

    let variant_count: usize = cups.iter().map(|cup| cup.variants().count()).sum();
    if i64::from(header.total_variant_count) != variant_count as i64 {
        tracing::warn!(
            expected = header.total_variant_count,
            found = variant_count,
            "total variant count does not match the tracks"
        );
    }

    Ok((cups, variant_cursor.offset()))
}

impl Config {
    /// Decodes a config, using `decoder` to turn its BMG section into text.
    ///
    /// Any structural error aborts the whole decode.
    pub fn decode(bytes: &[u8], decoder: &impl TextDecoder) -> Result<Self, ConfigError> {
        let mut cursor = Cursor::new(bytes);

        expect_section(&mut cursor, Section::Config, 0, CONFIG_MAGIC)?;
        let mut header = cursor.record::<ConfigHeader>().context(ConfigCtx::Decode)?;
        if header.version != SUPPORTED_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: header.version,
                supported: SUPPORTED_VERSION,
            });
        }

        header.mod_folder_name = header
            .mod_folder_name
            .trim_start_matches(['/', '\\'])
            .to_owned();

        let info_offset = section_offset(Section::Info, header.info_offset)?;
        expect_section(&mut cursor, Section::Info, info_offset, INFO_MAGIC)?;
        let info = cursor.record::<Info>().context(ConfigCtx::Decode)?;

        let cups_offset = section_offset(Section::Cups, header.cups_offset)?;
        expect_section(&mut cursor, Section::Cups, cups_offset, CUPS_MAGIC)?;
        let cups_header = cursor.record::<CupsHeader>().context(ConfigCtx::Decode)?;

        let (cups, pool_end) =
            walk_cups(bytes, cups_offset, &cups_header).context(ConfigCtx::Decode)?;

        let bmg_offset = section_offset(Section::Bmg, header.bmg_offset)?;
        if pool_end != bmg_offset {
            tracing::warn!(
                pool_end,
                bmg_offset,
                "variant pool does not end at the BMG section"
            );
        }

        cursor.seek(bmg_offset).context(ConfigCtx::Decode)?;
        let bmg_magic = cursor.read::<u64>().context(ConfigCtx::Decode)?;
        check_magic(Section::Bmg, bmg_offset, BMG_MAGIC, bmg_magic)?;
        let bmg_len = cursor.read::<u32>().context(ConfigCtx::Decode)? as usize;

        cursor.seek(bmg_offset).context(ConfigCtx::Decode)?;
        let blob = cursor.take(bmg_len).context(ConfigCtx::Decode)?;

        let file_offset = cursor.offset();
        let file_magic = cursor.read::<u32>().context(ConfigCtx::Decode)?;
        check_magic(Section::File, file_offset, FILE_MAGIC, file_magic)?;

        let text = decoder
            .decode(blob)
            .context(ConfigCtx::ExternalDecodeFailed)?;

        let mut config = Self {
            header,
            info,
            cups_header,
            cups,
            bmg: Span {
                offset: bmg_offset,
                len: bmg_len,
            },
            file: Span {
                offset: file_offset,
                len: bytes.len() - file_offset,
            },
            unattributed: vec![],
        };

        config.apply_text(&text);
        Ok(config)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{
        BMG_MAGIC, CONFIG_MAGIC, CUPS_MAGIC, Config, ConfigError, FILE_MAGIC, INFO_MAGIC,
    };
    use crate::{
        Section,
        bmg::{BmgError, TextDecoder},
        codec::DecodeError,
    };
    use std::cell::Cell;

    /// A text decoder which returns fixed text and counts its calls.
    pub(crate) struct Lines {
        text: &'static str,
        calls: Cell<usize>,
    }

    impl Lines {
        pub(crate) fn new(text: &'static str) -> Self {
            Self {
                text,
                calls: Cell::new(0),
            }
        }
    }

    impl TextDecoder for Lines {
        fn decode(&self, bmg: &[u8]) -> Result<String, BmgError> {
            assert_eq!(&bmg[..8], b"MESGbmg1");
            self.calls.set(self.calls.get() + 1);
            Ok(self.text.to_owned())
        }
    }

    struct Failing;

    impl TextDecoder for Failing {
        fn decode(&self, _: &[u8]) -> Result<String, BmgError> {
            Err(BmgError::Stderr {
                stderr: "invalid bmg".to_owned(),
            })
        }
    }

    /// Builds a config buffer with one 4-track cup per entry of `cups`, each entry listing the
    /// variant counts of its tracks.
    pub(crate) struct Builder {
        pub(crate) version: i32,
        pub(crate) folder: &'static str,
        pub(crate) info_magic: u32,
        pub(crate) cups_magic: u32,
        pub(crate) bmg_magic: u64,
        pub(crate) file_magic: u32,
        pub(crate) cups: Vec<[i16; 4]>,
    }

    impl Default for Builder {
        fn default() -> Self {
            Self {
                version: 3,
                folder: "/MyPack",
                info_magic: INFO_MAGIC,
                cups_magic: CUPS_MAGIC,
                bmg_magic: BMG_MAGIC,
                file_magic: FILE_MAGIC,
                cups: vec![[1, 0, 0, 2]],
            }
        }
    }

    impl Builder {
        pub(crate) fn build(&self) -> Vec<u8> {
            let header_len = 20 + self.folder.len() + 1;
            let info_offset = header_len;
            let cups_offset = info_offset + 12 + 20 + 5 + 2 + 1 + 40;

            let mut tracks = vec![];
            let mut variants = vec![];
            let mut total = 0;
            for (cup, counts) in self.cups.iter().enumerate() {
                for (track, &count) in counts.iter().enumerate() {
                    let slot = (cup * 4 + track) as u8;
                    tracks.extend([slot, slot + 0x20]);
                    tracks.extend(count.to_be_bytes());
                    tracks.extend(0x1234_5678_u32.to_be_bytes());

                    for variant in 0..count.max(0) {
                        variants.extend([slot, variant as u8]);
                        total += 1;
                    }
                }
            }

            let bmg_offset = cups_offset + 28 + tracks.len() + variants.len();

            let mut bytes = vec![];
            bytes.extend(CONFIG_MAGIC.to_be_bytes());
            bytes.extend(self.version.to_be_bytes());
            for offset in [info_offset, cups_offset, bmg_offset] {
                bytes.extend((offset as i32).to_be_bytes());
            }
            bytes.extend(self.folder.as_bytes());
            bytes.push(0);

            // info
            bytes.extend(self.info_magic.to_be_bytes());
            bytes.extend(1_u32.to_be_bytes());
            bytes.extend(80_u32.to_be_bytes());
            bytes.extend(0xBEEF_u32.to_be_bytes());
            bytes.extend(50_u32.to_be_bytes());
            bytes.extend(50_u32.to_be_bytes());
            bytes.extend(0_i32.to_be_bytes());
            bytes.extend(32_u32.to_be_bytes());
            bytes.extend([1, 1, 0, 2, 0]);
            bytes.extend(8_u16.to_be_bytes());
            bytes.push(30);
            bytes.extend([0; 40]);
            assert_eq!(bytes.len(), cups_offset);

            // cups
            bytes.extend(self.cups_magic.to_be_bytes());
            bytes.extend(3_u32.to_be_bytes());
            bytes.extend(0_u32.to_be_bytes());
            bytes.extend((self.cups.len() as u16).to_be_bytes());
            bytes.extend([1, 0]);
            for trophies in [1_u16, 2, 3, 4] {
                bytes.extend(trophies.to_be_bytes());
            }
            bytes.extend((total as i32).to_be_bytes());
            bytes.extend(tracks);
            bytes.extend(variants);
            assert_eq!(bytes.len(), bmg_offset);

            // bmg
            bytes.extend(self.bmg_magic.to_be_bytes());
            bytes.extend(0x20_u32.to_be_bytes());
            bytes.extend([0xAA; 0x14]);

            // file
            bytes.extend(self.file_magic.to_be_bytes());
            bytes.extend(b"payload");

            bytes
        }
    }

    #[test]
    fn variant_pool_is_attributed_per_track() {
        let builder = Builder {
            cups: vec![[0, 2, 1, 0]],
            ..Builder::default()
        };

        let config = Config::decode(&builder.build(), &Lines::new("")).unwrap();
        assert_eq!(config.cups.len(), 1);

        let cup = &config.cups[0];
        let counts: Vec<_> = cup.tracks.iter().map(|t| t.variants.len()).collect();
        assert_eq!(counts, [0, 2, 1, 0]);
        assert_eq!(cup.variants().count(), 3);

        // variants carry the slot of their track
        assert!(cup.tracks[1].variants.iter().all(|v| v.slot == 1));
        assert_eq!(cup.tracks[1].variants[1].music_slot, 1);
        assert_eq!(cup.tracks[2].variants[0].slot, 2);
    }

    #[test]
    fn pool_is_shared_across_cups() {
        let builder = Builder {
            cups: vec![[1, 0, 0, 2], [0, 3, 0, 0]],
            ..Builder::default()
        };

        let config = Config::decode(&builder.build(), &Lines::new("")).unwrap();
        assert_eq!(config.cups.len(), 2);
        assert_eq!(config.cups[0].variants().count(), 3);
        assert_eq!(config.cups[1].tracks[1].variants.len(), 3);
        assert!(
            config.cups[1].tracks[1]
                .variants
                .iter()
                .all(|v| v.slot == 5)
        );
        assert_eq!(config.cups[1].tracks[3].info.slot, 7);
        assert_eq!(config.cups[1].tracks[3].main().music_slot, 0x27);
    }

    #[test]
    fn decodes_sections() {
        let bytes = Builder::default().build();
        let lines = Lines::new("");
        let config = Config::decode(&bytes, &lines).unwrap();

        assert_eq!(config.header.mod_folder_name, "MyPack");
        assert_eq!(config.info.room_key, 0xBEEF);
        assert!(config.info.has_tt_trophies);
        assert!(!config.info.has_umts);
        assert!(config.info.has_feather);
        assert_eq!(config.info.cup_icon_count, 8);
        assert_eq!(config.info.choose_next_track_timer, 30);
        assert_eq!(config.cups_header.cts_cup_count, 1);
        assert_eq!(config.cups_header.trophy_count, [1, 2, 3, 4]);
        assert_eq!(config.cups_header.total_variant_count, 3);
        assert_eq!(config.bmg.len, 0x20);
        assert_eq!(config.file.offset, config.bmg.offset + 0x20);
        assert_eq!(config.file.offset + config.file.len, bytes.len());
        assert_eq!(lines.calls.get(), 1);
    }

    #[test]
    fn strips_leading_separators() {
        let builder = Builder {
            folder: "\\/\\Retro Rewind",
            ..Builder::default()
        };

        let config = Config::decode(&builder.build(), &Lines::new("")).unwrap();
        assert_eq!(config.header.mod_folder_name, "Retro Rewind");
    }

    #[test]
    fn config_magic_mismatch() {
        let mut bytes = Builder::default().build();
        bytes[0] = b'X';

        let result = Config::decode(&bytes, &Lines::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::Config,
                offset: 0,
                ..
            })
        ));
    }

    #[test]
    fn only_version_3_is_supported() {
        for version in [1, 2, 4] {
            let builder = Builder {
                version,
                ..Builder::default()
            };

            let result = Config::decode(&builder.build(), &Lines::new(""));
            assert!(matches!(
                result,
                Err(ConfigError::UnsupportedVersion { found, supported: 3 }) if found == version
            ));
        }
    }

    #[test]
    fn info_magic_mismatch_aborts() {
        let builder = Builder {
            info_magic: 0x1234_5678,
            ..Builder::default()
        };

        let lines = Lines::new("[10000]CupOne");
        let result = Config::decode(&builder.build(), &lines);
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::Info,
                expected: 0x494E_464F,
                found: 0x1234_5678,
                ..
            })
        ));
        assert_eq!(lines.calls.get(), 0);
    }

    #[test]
    fn cups_magic_mismatch() {
        let builder = Builder {
            cups_magic: 0,
            ..Builder::default()
        };

        let result = Config::decode(&builder.build(), &Lines::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::Cups,
                ..
            })
        ));
    }

    #[test]
    fn short_section_reports_magic_first() {
        let mut bytes = Builder {
            info_magic: 0x1234_5678,
            ..Builder::default()
        }
        .build();

        let info_offset =
            usize::try_from(i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]))
                .unwrap();
        bytes.truncate(info_offset + 8);

        let result = Config::decode(&bytes, &Lines::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::Info,
                found: 0x1234_5678,
                ..
            })
        ));
    }

    #[test]
    fn foreign_buffer_is_not_a_config() {
        // no terminator anywhere, so the folder name could never be decoded
        let result = Config::decode(&[0x41; 64], &Lines::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::Config,
                offset: 0,
                expected: 0x5055_4C53,
                found: 0x4141_4141,
            })
        ));
    }

    #[test]
    fn bmg_and_file_magic_mismatch() {
        let builder = Builder {
            bmg_magic: 0x4D45_5347_626D_6732,
            ..Builder::default()
        };

        let lines = Lines::new("");
        let result = Config::decode(&builder.build(), &lines);
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::Bmg,
                ..
            })
        ));

        let builder = Builder {
            file_magic: 0x4649_4C46,
            ..Builder::default()
        };

        let result = Config::decode(&builder.build(), &lines);
        assert!(matches!(
            result,
            Err(ConfigError::MagicMismatch {
                section: Section::File,
                ..
            })
        ));
        assert_eq!(lines.calls.get(), 0);
    }

    #[test]
    fn truncated_variant_pool() {
        let mut bytes = Builder {
            cups: vec![[0, 0, 0, 9]],
            ..Builder::default()
        }
        .build();

        // cut the buffer right after the track records
        let cups_offset = usize::try_from(i32::from_be_bytes([
            bytes[12], bytes[13], bytes[14], bytes[15],
        ]))
        .unwrap();
        bytes.truncate(cups_offset + 28 + 4 * 8 + 3);

        let result = Config::decode(&bytes, &Lines::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::Decode {
                source: DecodeError::Truncated { .. }
            })
        ));
    }

    #[test]
    fn negative_offsets_are_rejected() {
        let mut bytes = Builder::default().build();
        bytes[8..12].copy_from_slice(&(-4_i32).to_be_bytes());

        let result = Config::decode(&bytes, &Lines::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOffset {
                section: Section::Info,
                offset: -4
            })
        ));
    }

    #[test]
    fn decoder_failure_is_fatal() {
        let result = Config::decode(&Builder::default().build(), &Failing);
        assert!(matches!(
            result,
            Err(ConfigError::ExternalDecodeFailed { .. })
        ));
    }
}
