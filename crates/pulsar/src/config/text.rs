//! Scanning of the text exported from the BMG section.
//!
//! Every line holds one message: a 5 digit hexadecimal message ID, optionally in brackets,
//! followed by an optional `=` and the message itself. The ID says what the message names:
//!
//! | ID              | Meaning                                          |
//! |-----------------|--------------------------------------------------|
//! | `x2847`         | Build date of the pack                           |
//! | `1CCCC`         | Name of cup `CCCC`                               |
//! | `2VTTT`         | Name of variant `V` of track `TTT`               |
//! | `3VTTT`         | Author of variant `V` of track `TTT`             |
//! | `4xxxx`/`5xxxx` | Other messages                                   |
//!
//! Track indices are global, i.e. track `TTT` is track `TTT % 4` of cup `TTT / 4`. Variant
//! indices of 8 and above refer to the track itself.

use super::{Config, TRACKS_PER_CUP};

const DATE_ID: u32 = 0x2847;
// variants from this index on refer to the track itself
const TRACK_VARIANT: u8 = 8;

/// What a text message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Name,
    Author,
}

/// A classified line of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// The build date. Recognized but not interpreted.
    Date,
    Cup {
        cup: usize,
        name: &'a str,
    },
    Track {
        kind: NameKind,
        track: usize,
        name: &'a str,
    },
    /// A name for the main variant or one of the alternates of a track.
    Variant {
        kind: NameKind,
        track: usize,
        variant: u8,
        name: &'a str,
    },
    /// A message which names nothing this crate knows about.
    Other { id: u32 },
}

/// A name which could not be attributed to a cup or track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnattributedName {
    pub id: u32,
    pub kind: NameKind,
    /// Global index of the track.
    pub track: usize,
    pub variant: u8,
    pub name: String,
}

/// Splits a line into its message ID and message. Returns `None` if the line does not start
/// with an ID.
pub fn split_line(line: &str) -> Option<(u32, &str)> {
    let line = line.trim_start();
    let line = line.strip_prefix('[').unwrap_or(line);

    let digits = line.get(..5)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let id = u32::from_str_radix(digits, 16).ok()?;
    let rest = &line[5..];
    let rest = rest.strip_prefix(']').unwrap_or(rest).trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest);

    Some((id, rest.trim()))
}

fn classify_message(id: u32, name: &str) -> Directive<'_> {
    if id & 0xFFFF == DATE_ID {
        return Directive::Date;
    }

    let low = id & 0xFFFF;
    let track = (low & 0x0FFF) as usize;
    let variant = (low >> 12) as u8;
    let kind = match id >> 16 {
        0x1 => {
            return Directive::Cup {
                cup: low as usize,
                name,
            };
        }
        0x2 => NameKind::Name,
        0x3 => NameKind::Author,
        _ => return Directive::Other { id },
    };

    if variant >= TRACK_VARIANT {
        Directive::Track { kind, track, name }
    } else {
        Directive::Variant {
            kind,
            track,
            variant,
            name,
        }
    }
}

impl Config {
    /// Fills cup and track names from the text exported from the BMG section. Lines which
    /// cannot be applied are skipped.
    pub fn apply_text(&mut self, text: &str) {
        for (index, line) in text.lines().enumerate() {
            let Some((id, name)) = split_line(line) else {
                tracing::trace!(line = index + 1, "skipping line without message id");
                continue;
            };

            match classify_message(id, name) {
                Directive::Date | Directive::Other { .. } => (),
                Directive::Cup { cup, name } => match self.cups.get_mut(cup) {
                    Some(holder) => holder.name = Some(name.to_owned()),
                    None => tracing::debug!(line = index + 1, cup, "cup name out of range"),
                },
                Directive::Track { kind, track, name } => {
                    let holder = self
                        .cups
                        .get_mut(track / TRACKS_PER_CUP)
                        .map(|cup| &mut cup.tracks[track % TRACKS_PER_CUP]);

                    let Some(holder) = holder else {
                        tracing::debug!(line = index + 1, track, "track name out of range");
                        continue;
                    };

                    let slot = match kind {
                        NameKind::Name => &mut holder.name,
                        NameKind::Author => &mut holder.author,
                    };
                    *slot = Some(name.to_owned());
                }
                Directive::Variant {
                    kind,
                    track,
                    variant,
                    name,
                } => {
                    self.unattributed.push(UnattributedName {
                        id,
                        kind,
                        track,
                        variant,
                        name: name.to_owned(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Directive, NameKind, classify_message, split_line};
    use crate::config::{
        Config,
        test::{Builder, Lines},
    };

    fn classify(line: &str) -> Option<Directive<'_>> {
        let (id, name) = split_line(line)?;
        Some(classify_message(id, name))
    }

    fn config(cups: usize) -> Config {
        let builder = Builder {
            cups: vec![[0, 1, 0, 0]; cups],
            ..Builder::default()
        };

        Config::decode(&builder.build(), &Lines::new("")).unwrap()
    }

    #[test]
    fn splits_ids() {
        assert_eq!(split_line("[10000]CupOne"), Some((0x10000, "CupOne")));
        assert_eq!(
            split_line("  28003\t= Mario Circuit "),
            Some((0x28003, "Mario Circuit"))
        );
        assert_eq!(split_line("[2800A] = a = b"), Some((0x2800A, "a = b")));
        assert_eq!(split_line("1234"), None);
        assert_eq!(split_line("#BMG"), None);
        assert_eq!(split_line("+1234 = plus"), None);
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(classify("[12847]2024"), Some(Directive::Date));
        assert_eq!(classify("  02847 = 2024-01-01"), Some(Directive::Date));
        assert_eq!(
            classify("[10000]CupOne"),
            Some(Directive::Cup {
                cup: 0,
                name: "CupOne"
            })
        );
        assert_eq!(
            classify("38005 = Someone"),
            Some(Directive::Track {
                kind: NameKind::Author,
                track: 5,
                name: "Someone"
            })
        );
        assert_eq!(
            classify("22001 = Alt"),
            Some(Directive::Variant {
                kind: NameKind::Name,
                track: 1,
                variant: 2,
                name: "Alt"
            })
        );
        assert_eq!(
            classify("40001 = Whatever"),
            Some(Directive::Other { id: 0x40001 })
        );
        assert_eq!(classify("zzzzz = nope"), None);
    }

    #[test]
    fn names_cups_and_tracks() {
        let mut config = config(2);
        config.apply_text(concat!(
            "#BMG\n",
            "\n",
            "[12847]2024\n",
            "[10000]CupOne\n",
            "  10001 = Cup Two\n",
            "  10002 = Cup Three\n",
            "  28000 = Luigi Circuit\n",
            "  38000 = Nintendo\n",
            "  28007 = Rainbow Road\n",
            "  28010 = Nowhere\n",
            "not a message\n",
        ));

        assert_eq!(config.cups[0].name.as_deref(), Some("CupOne"));
        assert_eq!(config.cups[1].name.as_deref(), Some("Cup Two"));
        assert_eq!(
            config.cups[0].tracks[0].name.as_deref(),
            Some("Luigi Circuit")
        );
        assert_eq!(config.cups[0].tracks[0].author.as_deref(), Some("Nintendo"));
        assert_eq!(
            config.cups[1].tracks[3].name.as_deref(),
            Some("Rainbow Road")
        );
        assert!(config.cups[1].tracks[3].author.is_none());
        assert!(config.unattributed.is_empty());
    }

    #[test]
    fn variant_names_are_kept_aside() {
        let mut config = config(1);
        config.apply_text("  20001 = Main\n  31001 = Alt Author\n");

        assert!(config.cups[0].tracks[1].name.is_none());
        assert_eq!(config.unattributed.len(), 2);

        let alt = &config.unattributed[1];
        assert_eq!(alt.id, 0x31001);
        assert_eq!(alt.kind, NameKind::Author);
        assert_eq!(alt.track, 1);
        assert_eq!(alt.variant, 1);
        assert_eq!(alt.name, "Alt Author");
    }

    #[test]
    fn text_is_applied_by_decode() {
        let bytes = Builder::default().build();
        let config = Config::decode(&bytes, &Lines::new("[10000]CupOne\n28002=Track")).unwrap();

        assert_eq!(config.cups[0].name.as_deref(), Some("CupOne"));
        assert_eq!(config.cups[0].tracks[2].name.as_deref(), Some("Track"));
    }
}
