//! Unicode and emoji key domains
//!
//! Everything is computed once by [`UnicodeTables::load`] and then passed
//! around as an immutable value. Maps are name-sorted so that case order is
//! the same on every run.

use std::collections::BTreeMap;

use tracing::debug;
use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_script::{Script, UnicodeScript};

use super::{ObjectKey, RangeTable};

const ZWJ: char = '\u{200D}';
const VARIATION_SELECTOR_16: char = '\u{FE0F}';
const COMBINING_KEYCAP: char = '\u{20E3}';
const REGIONAL_INDICATORS: (u32, u32) = (0x1F1E6, 0x1F1FF);
const SKIN_TONE_MODIFIERS: (u32, u32) = (0x1F3FB, 0x1F3FF);
const TAG_CHARACTERS: (u32, u32) = (0xE0020, 0xE007F);

const NONCHARACTERS: &[(u32, u32)] = &[
    (0xFDD0, 0xFDEF),
    (0xFFFE, 0xFFFF),
    (0x1FFFE, 0x1FFFF),
    (0x2FFFE, 0x2FFFF),
    (0x3FFFE, 0x3FFFF),
    (0x4FFFE, 0x4FFFF),
    (0x5FFFE, 0x5FFFF),
    (0x6FFFE, 0x6FFFF),
    (0x7FFFE, 0x7FFFF),
    (0x8FFFE, 0x8FFFF),
    (0x9FFFE, 0x9FFFF),
    (0xAFFFE, 0xAFFFF),
    (0xBFFFE, 0xBFFFF),
    (0xCFFFE, 0xCFFFF),
    (0xDFFFE, 0xDFFFF),
    (0xEFFFE, 0xEFFFF),
    (0xFFFFE, 0xFFFFF),
    (0x10FFFE, 0x10FFFF),
];

const EMOJI_MODIFIER_BASE: &[(u32, u32)] = &[
    (0x261D, 0x261D),
    (0x26F9, 0x26F9),
    (0x270A, 0x270D),
    (0x1F385, 0x1F385),
    (0x1F3C2, 0x1F3C4),
    (0x1F3C7, 0x1F3C7),
    (0x1F3CA, 0x1F3CC),
    (0x1F442, 0x1F443),
    (0x1F446, 0x1F450),
    (0x1F466, 0x1F478),
    (0x1F47C, 0x1F47C),
    (0x1F481, 0x1F483),
    (0x1F485, 0x1F487),
    (0x1F48F, 0x1F48F),
    (0x1F491, 0x1F491),
    (0x1F4AA, 0x1F4AA),
    (0x1F574, 0x1F575),
    (0x1F57A, 0x1F57A),
    (0x1F590, 0x1F590),
    (0x1F595, 0x1F596),
    (0x1F645, 0x1F647),
    (0x1F64B, 0x1F64F),
    (0x1F6A3, 0x1F6A3),
    (0x1F6B4, 0x1F6B6),
    (0x1F6C0, 0x1F6C0),
    (0x1F6CC, 0x1F6CC),
    (0x1F90C, 0x1F90C),
    (0x1F90F, 0x1F90F),
    (0x1F918, 0x1F91F),
    (0x1F926, 0x1F926),
    (0x1F930, 0x1F939),
    (0x1F93C, 0x1F93E),
    (0x1F977, 0x1F977),
    (0x1F9B5, 0x1F9B6),
    (0x1F9B8, 0x1F9B9),
    (0x1F9BB, 0x1F9BB),
    (0x1F9CD, 0x1F9CF),
    (0x1F9D1, 0x1F9DD),
    (0x1FAC3, 0x1FAC5),
    (0x1FAF0, 0x1FAF8),
];

/// Named key domains, built once at startup
#[derive(Debug, Clone)]
pub struct UnicodeTables {
    pub categories: BTreeMap<String, RangeTable>,
    pub scripts: BTreeMap<String, RangeTable>,
    pub properties: BTreeMap<String, RangeTable>,
    pub emoji_properties: BTreeMap<String, RangeTable>,
    pub emoji_sequences: BTreeMap<String, Vec<String>>,
    pub invalid_characters: BTreeMap<String, RangeTable>,
    pub invalid_utf8: BTreeMap<String, Vec<ObjectKey>>,
}

impl UnicodeTables {
    /// Compute every table
    pub fn load() -> Self {
        let (categories, scripts) = categories_and_scripts();
        let emoji_properties = emoji_properties();
        let modifier_bases = emoji_properties
            .get("Emoji_Modifier_Base")
            .cloned()
            .unwrap_or_else(|| RangeTable::from_ranges([]));

        let tables = Self {
            categories,
            scripts,
            properties: properties(),
            emoji_sequences: emoji_sequences(&modifier_bases),
            emoji_properties,
            invalid_characters: invalid_characters(),
            invalid_utf8: invalid_utf8_sequences(),
        };
        debug!(
            "Loaded {} categories, {} scripts, {} properties, {} emoji properties, {} emoji sequence types",
            tables.categories.len(),
            tables.scripts.len(),
            tables.properties.len(),
            tables.emoji_properties.len(),
            tables.emoji_sequences.len()
        );
        tables
    }
}

fn all_chars() -> impl Iterator<Item = char> {
    '\0'..=char::MAX
}

/// Append `c` to the table named `name`, extending the last range if adjacent
fn push_char(map: &mut BTreeMap<String, Vec<(u32, u32)>>, name: &str, c: char) {
    let cp = c as u32;
    if let Some(ranges) = map.get_mut(name) {
        match ranges.last_mut() {
            Some(last) if last.1 + 1 == cp => last.1 = cp,
            _ => ranges.push((cp, cp)),
        }
        return;
    }
    map.insert(name.to_string(), vec![(cp, cp)]);
}

fn into_tables(map: BTreeMap<String, Vec<(u32, u32)>>) -> BTreeMap<String, RangeTable> {
    map.into_iter()
        .map(|(name, ranges)| (name, RangeTable::from_ranges(ranges)))
        .collect()
}

fn categories_and_scripts() -> (BTreeMap<String, RangeTable>, BTreeMap<String, RangeTable>) {
    let mut categories = BTreeMap::new();
    let mut scripts = BTreeMap::new();

    for c in all_chars() {
        let category = get_general_category(c);
        if !matches!(category, GeneralCategory::Unassigned) {
            push_char(&mut categories, &format!("{:?}", category), c);
        }
        let script = c.script();
        if script != Script::Unknown {
            push_char(&mut scripts, script.full_name(), c);
        }
    }

    (into_tables(categories), into_tables(scripts))
}

fn properties() -> BTreeMap<String, RangeTable> {
    let predicates: [(&str, fn(char) -> bool); 6] = [
        ("Alphabetic", char::is_alphabetic),
        ("Lowercase", char::is_lowercase),
        ("Uppercase", char::is_uppercase),
        ("White_Space", char::is_whitespace),
        ("Numeric", char::is_numeric),
        ("Control", char::is_control),
    ];

    let mut map = BTreeMap::new();
    for c in all_chars() {
        for (name, predicate) in &predicates {
            if predicate(c) {
                push_char(&mut map, name, c);
            }
        }
    }
    let mut tables = into_tables(map);

    let constant: [(&str, &[(u32, u32)]); 7] = [
        ("ASCII_Hex_Digit", &[(0x30, 0x39), (0x41, 0x46), (0x61, 0x66)]),
        (
            "Bidi_Control",
            &[(0x061C, 0x061C), (0x200E, 0x200F), (0x202A, 0x202E), (0x2066, 0x2069)],
        ),
        (
            "Hex_Digit",
            &[
                (0x30, 0x39),
                (0x41, 0x46),
                (0x61, 0x66),
                (0xFF10, 0xFF19),
                (0xFF21, 0xFF26),
                (0xFF41, 0xFF46),
            ],
        ),
        ("Join_Control", &[(0x200C, 0x200D)]),
        (
            "Pattern_White_Space",
            &[(0x09, 0x0D), (0x20, 0x20), (0x85, 0x85), (0x200E, 0x200F), (0x2028, 0x2029)],
        ),
        ("Regional_Indicator", &[REGIONAL_INDICATORS]),
        (
            "Variation_Selector",
            &[(0x180B, 0x180D), (0x180F, 0x180F), (0xFE00, 0xFE0F), (0xE0100, 0xE01EF)],
        ),
    ];
    for (name, ranges) in constant {
        tables.insert(name.to_string(), RangeTable::from_ranges(ranges.iter().copied()));
    }
    tables.insert(
        "Noncharacter_Code_Point".to_string(),
        RangeTable::from_ranges(NONCHARACTERS.iter().copied()).non_textual(),
    );
    tables
}

fn emoji_properties() -> BTreeMap<String, RangeTable> {
    let single_code_points = emojis::iter().filter_map(|emoji| {
        let mut chars = emoji.as_str().trim_end_matches(VARIATION_SELECTOR_16).chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c as u32),
            _ => None,
        }
    });

    let mut tables = BTreeMap::new();
    tables.insert(
        "Emoji".to_string(),
        RangeTable::from_code_points(single_code_points),
    );
    tables.insert(
        "Emoji_Component".to_string(),
        RangeTable::from_ranges([
            (0x23, 0x23),
            (0x2A, 0x2A),
            (0x30, 0x39),
            (0x200D, 0x200D),
            (0x20E3, 0x20E3),
            (0xFE0F, 0xFE0F),
            REGIONAL_INDICATORS,
            SKIN_TONE_MODIFIERS,
            (0x1F9B0, 0x1F9B3),
            TAG_CHARACTERS,
        ]),
    );
    tables.insert(
        "Emoji_Modifier".to_string(),
        RangeTable::from_ranges([SKIN_TONE_MODIFIERS]),
    );
    tables.insert(
        "Emoji_Modifier_Base".to_string(),
        RangeTable::from_ranges(EMOJI_MODIFIER_BASE.iter().copied()),
    );
    tables
}

fn in_range(c: char, (lo, hi): (u32, u32)) -> bool {
    (lo..=hi).contains(&(c as u32))
}

/// Sequence type of an emoji, following the UTS #51 names
fn sequence_type(emoji: &str) -> &'static str {
    let chars: Vec<char> = emoji.chars().collect();
    if chars.contains(&ZWJ) {
        "RGI_Emoji_ZWJ_Sequence"
    } else if chars.iter().any(|&c| in_range(c, TAG_CHARACTERS)) {
        "RGI_Emoji_Tag_Sequence"
    } else if chars.contains(&COMBINING_KEYCAP) {
        "Emoji_Keycap_Sequence"
    } else if chars.len() == 2 && chars.iter().all(|&c| in_range(c, REGIONAL_INDICATORS)) {
        "RGI_Emoji_Flag_Sequence"
    } else if chars.iter().any(|&c| in_range(c, SKIN_TONE_MODIFIERS)) {
        "RGI_Emoji_Modifier_Sequence"
    } else {
        "Basic_Emoji"
    }
}

fn emoji_sequences(modifier_bases: &RangeTable) -> BTreeMap<String, Vec<String>> {
    let mut sequences: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for emoji in emojis::iter() {
        let text = emoji.as_str();
        sequences
            .entry(sequence_type(text).to_string())
            .or_default()
            .push(text.to_string());
    }

    let modifiers = sequences
        .entry("RGI_Emoji_Modifier_Sequence".to_string())
        .or_default();
    for base in modifier_bases.iter().filter_map(char::from_u32) {
        for modifier in (SKIN_TONE_MODIFIERS.0..=SKIN_TONE_MODIFIERS.1).filter_map(char::from_u32) {
            modifiers.push(format!("{}{}", base, modifier));
        }
    }

    sequences.retain(|_, seqs| !seqs.is_empty());
    sequences
}

fn invalid_characters() -> BTreeMap<String, RangeTable> {
    let mut tables = BTreeMap::new();
    tables.insert(
        "C0_Control".to_string(),
        RangeTable::from_ranges([(0x01, 0x08), (0x0B, 0x0C), (0x0E, 0x1F)]),
    );
    tables.insert("NUL".to_string(), RangeTable::from_code_points([0]));
    tables.insert(
        "Noncharacter_Code_Point".to_string(),
        RangeTable::from_ranges(NONCHARACTERS.iter().copied()).non_textual(),
    );
    tables.insert(
        "Surrogate".to_string(),
        RangeTable::from_ranges([(0xD800, 0xDFFF)]),
    );
    tables
}

fn invalid_utf8_sequences() -> BTreeMap<String, Vec<ObjectKey>> {
    let groups: [(&str, &[&[u8]]); 6] = [
        (
            "Beyond_Max_Code_Point",
            &[
                &[0xF4, 0x90, 0x80, 0x80],
                &[0xF5, 0x80, 0x80, 0x80],
                &[0xF8, 0x88, 0x80, 0x80, 0x80],
            ],
        ),
        (
            "Continuation_Without_Lead",
            &[&[0x80], &[0xBF], &[0x80, 0x80], &[0x61, 0x80, 0x62]],
        ),
        ("Impossible_Byte", &[&[0xFE], &[0xFF], &[0xFE, 0xFE, 0xFF, 0xFF]]),
        (
            "Overlong_Encoding",
            &[
                &[0xC0, 0x80],
                &[0xC0, 0xAF],
                &[0xC1, 0xBF],
                &[0xE0, 0x80, 0xAF],
                &[0xF0, 0x80, 0x80, 0xAF],
            ],
        ),
        (
            "Surrogate_Half",
            &[
                &[0xED, 0xA0, 0x80],
                &[0xED, 0xBF, 0xBF],
                &[0xED, 0xA0, 0x80, 0xED, 0xB0, 0x80],
            ],
        ),
        (
            "Truncated_Sequence",
            &[&[0xC3], &[0xE2, 0x82], &[0xF0, 0x9F, 0x98], &[0x61, 0xE2, 0x82]],
        ),
    ];

    groups
        .iter()
        .map(|(name, seqs)| {
            let keys = seqs.iter().map(|bytes| ObjectKey::new(bytes.to_vec())).collect();
            (name.to_string(), keys)
        })
        .collect()
}
