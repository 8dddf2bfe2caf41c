//! Shared pieces of the human-readable message formats.

use std::collections::HashMap;
use std::fmt::Write;

/// Names for flow tables, used when printing and parsing.
#[derive(Clone, Debug, Default)]
pub struct TableMap {
    by_name: HashMap<String, u8>,
    by_number: HashMap<u8, String>,
}

impl TableMap {
    pub fn new() -> TableMap {
        TableMap::default()
    }

    pub fn insert(&mut self, table_id: u8, name: &str) {
        self.by_name.insert(name.to_string(), table_id);
        self.by_number.insert(table_id, name.to_string());
    }
}

/// Append `table_id`, or its name if `table_map` has one.
pub fn format_table(s: &mut String, table_id: u8, table_map: &TableMap) {
    match table_map.by_number.get(&table_id) {
        Some(name) => {
            let _ = write!(s, "\"{}\"", name);
        }
        None => {
            let _ = write!(s, "{}", table_id);
        }
    }
}

/// Parse a table number or a name from `table_map`.
pub fn parse_table(value: &str, table_map: &TableMap) -> Option<u8> {
    let unquoted = value.trim_matches('"');
    unquoted.parse::<u8>().ok().or_else(|| table_map.by_name.get(unquoted).cloned())
}

/// Append a duration in seconds. Fractional seconds are printed only when present, without
/// trailing zeros.
pub fn format_duration(s: &mut String, sec: u32, nsec: u32) {
    let _ = write!(s, "{}", sec);
    if nsec > 0 {
        let frac = format!("{:09}", nsec);
        let _ = write!(s, ".{}", frac.trim_end_matches('0'));
    }
    s.push('s');
}

/// Append the names of the bits set in `bits`, separated by `delim`. Bits without a name are
/// printed as `0x<hex>`.
pub fn format_bit_names<F>(s: &mut String, bits: u32, bit_to_name: F, delim: char)
    where F: Fn(u32) -> Option<&'static str>
{
    let mut first = true;
    let mut rest = bits;
    while rest != 0 {
        let bit = rest & rest.wrapping_neg();
        rest &= !bit;
        if !first {
            s.push(delim);
        }
        first = false;
        match bit_to_name(bit) {
            Some(name) => s.push_str(name),
            None => {
                let _ = write!(s, "0x{:x}", bit);
            }
        }
    }
}
