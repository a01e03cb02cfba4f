//! Object keys and the key domains probed by the Unicode cases

pub mod key;
pub mod list;
pub mod ranges;
pub mod unicode;

pub use key::ObjectKey;
pub use list::{KeyList, KeyResult, KeySource};
pub use ranges::RangeTable;
pub use unicode::UnicodeTables;
