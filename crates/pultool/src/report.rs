use bytesize::ByteSize;
use comfy_table::{
    Cell, CellAlignment, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};
use pulsar::{
    config::{Config, TrackHolder},
    crash::ExceptionFile,
    symbols::SymbolResolver,
};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).set_alignment(CellAlignment::Center))
        .collect()
}

fn info(title: String, rows: Vec<(&str, String)>) -> Table {
    let mut info = Table::new();
    info.load_preset(comfy_table::presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new(title)]);

    for (name, value) in rows {
        info.add_row(vec![Cell::new(name), Cell::new(value)]);
    }

    info
}

/// Formats a float in scientific notation with a signed, 3 digit exponent, e.g. ` 1.50e+000`.
/// Positive values are padded with a space so that columns line up.
pub fn scientific(value: f64) -> String {
    let formatted = format!("{value:.2e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };

    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };

    let pad = if value.is_sign_negative() { "" } else { " " };
    format!("{pad}{mantissa}e{sign}{digits:0>3}")
}

struct Resolver<'a> {
    symbols: Option<&'a dyn SymbolResolver>,
    region: char,
}

impl Resolver<'_> {
    fn resolve(&self, addr: u32) -> String {
        let Some(symbols) = self.symbols else {
            return "-".to_owned();
        };

        match symbols.find_symbol(self.region, addr) {
            Some(symbol) => symbol.to_string(),
            None => format!("Unknown (0x{addr:08x})"),
        }
    }
}

pub fn crash(dump: &ExceptionFile, symbols: Option<&dyn SymbolResolver>) {
    let resolver = Resolver {
        symbols,
        region: dump.region(),
    };

    let summary = info(
        "Crash Dump".to_owned(),
        vec![
            ("Error", dump.error_kind().to_string()),
            ("Region", dump.region().to_string()),
            (
                "SRR0",
                format!("0x{:08X} {}", dump.srr0.value, resolver.resolve(dump.srr0.value)),
            ),
            ("SRR1", format!("0x{:08X}", dump.srr1.value)),
            ("MSR", format!("0x{:08X}", dump.msr.value)),
            ("CR", format!("0x{:08X}", dump.cr.value)),
            (
                "LR",
                format!("0x{:08X} {}", dump.lr.value, resolver.resolve(dump.lr.value)),
            ),
        ],
    );

    println!("{summary}");

    // registers are laid out column-major, 8 rows of 4
    let mut gprs = table();
    gprs.set_header(header(&["GPR", "Value", "GPR", "Value", "GPR", "Value", "GPR", "Value"]));
    for row in 0..8 {
        gprs.add_row((0..4).flat_map(|column| {
            let index = row + column * 8;
            [
                Cell::new(format!("R{index:02}")),
                Cell::new(format!("0x{:08X}", dump.gprs[index].value)),
            ]
        }));
    }

    println!("{gprs}");

    let mut fprs = table();
    fprs.set_header(header(&["FPR", "Value", "FPR", "Value", "FPR", "Value", "FPR", "Value"]));
    for row in 0..8 {
        fprs.add_row((0..4).flat_map(|column| {
            let index = row + column * 8;
            [
                Cell::new(format!("F{index:02}")),
                Cell::new(scientific(dump.fprs[index].value)),
            ]
        }));
    }

    println!("{fprs}");
    println!("FPSCR: 0x{:016X}", dump.fpscr.value.to_bits());

    let mut frames = table();
    frames.set_header(header(&["Frame", "SP", "LR", "Symbol"]));
    for (index, frame) in dump.frames.iter().enumerate() {
        frames.add_row(vec![
            Cell::new(index).set_alignment(CellAlignment::Center),
            Cell::new(format!("0x{:08X}", frame.sp)),
            Cell::new(format!("0x{:08X}", frame.lr)),
            Cell::new(resolver.resolve(frame.lr)),
        ]);
    }

    println!("{frames}");
}

fn flag(value: bool) -> String {
    let text = if value { "yes" } else { "no" };
    text.to_owned()
}

fn track_name(track: &TrackHolder) -> String {
    match &track.name {
        Some(name) => name.clone(),
        None => format!("<crc 0x{:08X}>", track.info.crc32),
    }
}

pub fn config(config: &Config) {
    let settings = &config.info;
    let summary = info(
        format!("Pulsar Config ({})", config.header.mod_folder_name),
        vec![
            ("Version", config.header.version.to_string()),
            ("Room Key", format!("0x{:08X}", settings.room_key)),
            ("100cc Probability", format!("{}%", settings.prob_100cc)),
            ("150cc Probability", format!("{}%", settings.prob_150cc)),
            ("Wiimmfi Region", settings.wiimmfi_region.to_string()),
            ("Track Blocking", settings.track_blocking.to_string()),
            ("TT Trophies", flag(settings.has_tt_trophies)),
            ("200cc", flag(settings.has_200cc)),
            ("UMTs", flag(settings.has_umts)),
            ("Feather", flag(settings.has_feather)),
            ("Mega TC", flag(settings.has_mega_tc)),
            ("Cup Icons", settings.cup_icon_count.to_string()),
            (
                "Next Track Timer",
                format!("{}s", settings.choose_next_track_timer),
            ),
            ("Cups", config.cups_header.cts_cup_count.to_string()),
            (
                "Variants",
                config.cups_header.total_variant_count.to_string(),
            ),
            (
                "BMG",
                format!(
                    "0x{:X} ({})",
                    config.bmg.offset,
                    ByteSize(config.bmg.len as u64).display()
                ),
            ),
            (
                "FILE",
                format!(
                    "0x{:X} ({})",
                    config.file.offset,
                    ByteSize(config.file.len as u64).display()
                ),
            ),
        ],
    );

    println!("{summary}");

    let mut cups = table();
    cups.set_header(header(&[
        "Cup", "Name", "Track", "Author", "Slot", "Music", "Variants",
    ]));

    for (index, cup) in config.cups.iter().enumerate() {
        for (position, track) in cup.tracks.iter().enumerate() {
            let main = track.main();
            let variants = track
                .variants
                .iter()
                .map(|variant| format!("{}/{}", variant.slot, variant.music_slot))
                .collect::<Vec<_>>()
                .join(", ");

            let (number, name) = if position == 0 {
                (index.to_string(), cup.name.clone().unwrap_or_default())
            } else {
                (String::new(), String::new())
            };

            cups.add_row(vec![
                Cell::new(number).set_alignment(CellAlignment::Center),
                Cell::new(name),
                Cell::new(track_name(track)),
                Cell::new(track.author.as_deref().unwrap_or("-")),
                Cell::new(main.slot).set_alignment(CellAlignment::Center),
                Cell::new(main.music_slot).set_alignment(CellAlignment::Center),
                Cell::new(variants),
            ]);
        }
    }

    println!("{cups}");

    if !config.unattributed.is_empty() {
        let mut names = table();
        names.set_header(header(&["ID", "Kind", "Track", "Variant", "Text"]));
        for name in &config.unattributed {
            names.add_row(vec![
                Cell::new(format!("{:05X}", name.id)),
                Cell::new(format!("{:?}", name.kind)),
                Cell::new(name.track).set_alignment(CellAlignment::Center),
                Cell::new(name.variant).set_alignment(CellAlignment::Center),
                Cell::new(&name.name),
            ]);
        }

        println!("{names}");
    }
}
