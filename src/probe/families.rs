//! Case families: size, count and the Unicode key domains
//!
//! Within a family, cases follow the name order of their source tables so
//! that every run lists them identically.

use std::collections::BTreeMap;

use super::{Case, CountCase, ExhaustiveCase, Polarity, SequenceCase, SizeCase};
use crate::keys::{KeyList, ObjectKey, RangeTable, UnicodeTables};

pub const CATEGORIES_PREFIX: &str = "Unicode categories: ";
pub const PROPERTIES_PREFIX: &str = "Unicode properties: ";
pub const SCRIPTS_PREFIX: &str = "Unicode scripts: ";
pub const EMOJI_PROPERTIES_PREFIX: &str = "Unicode emoji properties: ";
pub const EMOJI_SEQUENCES_PREFIX: &str = "Unicode emoji sequences: ";
pub const INVALID_CHARACTERS_PREFIX: &str = "Unicode invalid characters: ";
pub const INVALID_UTF8_PREFIX: &str = "UTF-8 invalid sequences: ";

/// Which Unicode families to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnicodeSelection {
    pub categories: bool,
    pub properties: bool,
    pub scripts: bool,
    pub emoji: bool,
    pub invalid: bool,
}

impl UnicodeSelection {
    pub fn all() -> Self {
        Self {
            categories: true,
            properties: true,
            scripts: true,
            emoji: true,
            invalid: true,
        }
    }

    pub fn any(&self) -> bool {
        self.categories || self.properties || self.scripts || self.emoji || self.invalid
    }
}

pub fn size_cases(size_max: u64) -> Vec<Box<dyn Case>> {
    vec![Box::new(SizeCase::new("Maximum object size", size_max))]
}

pub fn count_cases(count_max: u64) -> Vec<Box<dyn Case>> {
    vec![Box::new(CountCase::new("Maximum object count", count_max))]
}

pub fn unicode_cases(tables: &UnicodeTables, selection: UnicodeSelection) -> Vec<Box<dyn Case>> {
    let mut cases = Vec::new();
    if selection.categories {
        cases.extend(range_table_cases(CATEGORIES_PREFIX, &tables.categories));
    }
    if selection.properties {
        cases.extend(range_table_cases(PROPERTIES_PREFIX, &tables.properties));
    }
    if selection.scripts {
        cases.extend(range_table_cases(SCRIPTS_PREFIX, &tables.scripts));
    }
    if selection.emoji {
        cases.extend(range_table_cases(EMOJI_PROPERTIES_PREFIX, &tables.emoji_properties));
        cases.extend(sequence_cases(EMOJI_SEQUENCES_PREFIX, &tables.emoji_sequences));
    }
    if selection.invalid {
        cases.extend(invalid_cases(tables));
    }
    cases
}

/// Bisected acceptance cases; tables that cannot become keys are skipped
fn range_table_cases(prefix: &str, tables: &BTreeMap<String, RangeTable>) -> Vec<Box<dyn Case>> {
    tables
        .iter()
        .filter_map(|(name, table)| KeyList::from_range_table(name.as_str(), table))
        .map(|list| Box::new(SequenceCase::new(prefix, list)) as Box<dyn Case>)
        .collect()
}

fn sequence_cases(prefix: &str, sequences: &BTreeMap<String, Vec<String>>) -> Vec<Box<dyn Case>> {
    sequences
        .iter()
        .map(|(name, seqs)| KeyList::from_sequences(name.as_str(), seqs.iter().map(String::as_str)))
        .filter(|list| !list.is_empty())
        .map(|list| Box::new(SequenceCase::new(prefix, list)) as Box<dyn Case>)
        .collect()
}

/// Exhaustive rejection cases for invalid characters and malformed UTF-8
fn invalid_cases(tables: &UnicodeTables) -> Vec<Box<dyn Case>> {
    let characters = tables
        .invalid_characters
        .iter()
        .filter_map(|(name, table)| KeyList::from_range_table(name.as_str(), table))
        .map(|list| {
            Box::new(ExhaustiveCase::new(INVALID_CHARACTERS_PREFIX, list, Polarity::ExpectRejection)) as Box<dyn Case>
        });

    let sequences = tables.invalid_utf8.iter().map(|(name, keys)| {
        let list = KeyList::from_sequences(name.as_str(), keys.iter().cloned().collect::<Vec<ObjectKey>>());
        Box::new(ExhaustiveCase::new(INVALID_UTF8_PREFIX, list, Polarity::ExpectRejection)) as Box<dyn Case>
    });

    characters.chain(sequences).collect()
}
