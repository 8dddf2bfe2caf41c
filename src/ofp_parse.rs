//! The `key[=value]` grammar shared by the free-text request formats.
//!
//! Pairs are separated by commas or white space. A key is followed by `=` or `:` and a value
//! that runs to the next comma or white space, by `(` and a value that runs to the matching
//! `)`, or by nothing, in which case the value is empty. Parentheses inside a value nest.

const PAIR_DELIMS: &[u8] = b", \t\r\n";
const KEY_DELIMS: &[u8] = b":=(, \t\r\n";

/// Iterator over the `(key, value)` pairs of a string.
#[derive(Clone, Debug)]
pub struct KeyValues<'a> {
    rest: &'a str,
}

/// Split `s` into `(key, value)` pairs.
pub fn key_values(s: &str) -> KeyValues {
    KeyValues { rest: s }
}

fn value_len(s: &[u8], delims: &[u8]) -> usize {
    let mut n = 0;
    while n < s.len() && !delims.contains(&s[n]) {
        if s[n] == b'(' {
            let mut level = 0;
            loop {
                if n >= s.len() {
                    return n;
                }
                match s[n] {
                    b'(' => level += 1,
                    b')' => level -= 1,
                    _ => (),
                }
                n += 1;
                if level == 0 {
                    break;
                }
            }
        } else {
            n += 1;
        }
    }
    n
}

impl<'a> Iterator for KeyValues<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<(&'a str, &'a str)> {
        let bytes = self.rest.as_bytes();
        let start = bytes.iter().position(|b| !PAIR_DELIMS.contains(b))?;
        let s = &self.rest[start..];
        let bytes = s.as_bytes();

        let key_len = bytes.iter().position(|b| KEY_DELIMS.contains(b)).unwrap_or(bytes.len());
        let key = &s[..key_len];
        let key_delim = bytes.get(key_len).cloned();
        let after_key = &s[(key_len + key_delim.map_or(0, |_| 1))..];

        let value_delims: &[u8] = match key_delim {
            Some(b':') | Some(b'=') => PAIR_DELIMS,
            Some(b'(') => b")",
            _ => {
                self.rest = after_key;
                return Some((key, ""));
            }
        };

        let n = value_len(after_key.as_bytes(), value_delims);
        let value = &after_key[..n];
        let consumed = if n < after_key.len() { n + 1 } else { n };
        self.rest = &after_key[consumed..];
        Some((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(s: &str) -> Vec<(&str, &str)> {
        key_values(s).collect()
    }

    #[test]
    fn plain_keys_and_values() {
        assert_eq!(pairs("table=3, !initial tcp,out_port:2"),
                   vec![("table", "3"), ("!initial", ""), ("tcp", ""), ("out_port", "2")]);
    }

    #[test]
    fn parenthesized_values_nest() {
        assert_eq!(pairs("apply(output(1),drop) x=f(a,b)"),
                   vec![("apply", "output(1),drop"), ("x", "f(a,b)")]);
    }

    #[test]
    fn empty_and_trailing_delimiters() {
        assert!(pairs("  , \n").is_empty());
        assert_eq!(pairs("key="), vec![("key", "")]);
        assert_eq!(pairs("a=(unterminated"), vec![("a", "(unterminated")]);
    }
}
