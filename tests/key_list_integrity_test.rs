use std::collections::HashSet;
use std::sync::OnceLock;

use cloudprobe::keys::{KeyList, ObjectKey, UnicodeTables};

fn tables() -> &'static UnicodeTables {
    static TABLES: OnceLock<UnicodeTables> = OnceLock::new();
    TABLES.get_or_init(UnicodeTables::load)
}

fn all_lists() -> Vec<KeyList> {
    let tables = tables();
    let ranges = [
        &tables.categories,
        &tables.scripts,
        &tables.properties,
        &tables.emoji_properties,
        &tables.invalid_characters,
    ];
    let mut lists: Vec<KeyList> = ranges
        .iter()
        .flat_map(|family| family.iter())
        .filter_map(|(name, table)| KeyList::from_range_table(name.as_str(), table))
        .collect();
    lists.extend(
        tables
            .emoji_sequences
            .iter()
            .map(|(name, seqs)| KeyList::from_sequences(name.as_str(), seqs.iter().map(String::as_str))),
    );
    lists.extend(
        tables
            .invalid_utf8
            .iter()
            .map(|(name, keys)| KeyList::from_sequences(name.as_str(), keys.iter().cloned())),
    );
    lists
}

#[test]
fn test_count_matches_enumeration_and_keys_are_unique() {
    for list in all_lists() {
        let mut seen = HashSet::new();
        let mut enumerated = 0u64;
        for key in list.keys() {
            assert!(seen.insert(key.clone()), "{}: duplicate key {}", list.name(), key);
            enumerated += 1;
        }
        assert_eq!(enumerated, list.count(), "{}", list.name());
        assert!(!list.is_empty(), "{}", list.name());
    }
}

#[test]
fn test_indexed_access_agrees_with_enumeration() {
    for list in all_lists() {
        let count = list.count();
        let probes = [0, count / 2, count - 1];
        let keys: Vec<ObjectKey> = list.keys().collect();
        for index in probes {
            assert_eq!(list.key(index).as_ref(), keys.get(index as usize), "{}", list.name());
        }
        assert!(list.key(count).is_none());
    }
}

#[test]
fn test_well_known_tables_present() {
    let tables = tables();
    assert!(tables.categories.contains_key("UppercaseLetter"));
    assert!(tables.scripts.contains_key("Latin"));
    assert!(tables.scripts.contains_key("Han"));
    assert!(tables.emoji_properties.contains_key("Emoji"));
    assert!(tables.invalid_utf8.contains_key("Overlong_Encoding"));
}

#[test]
fn test_invalid_utf8_keys_are_not_utf8() {
    for (name, keys) in &tables().invalid_utf8 {
        for key in keys {
            assert!(key.to_str().is_err(), "{}: {} is valid UTF-8", name, key.to_hex());
        }
    }
}
