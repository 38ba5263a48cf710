//! Decoding of serialized metadata values.
//!
//! Builder metadata is stored either as JSON or in PHP's `serialize()` format.
//! Both decode into a [`serde_json::Value`] so one walker handles them.
//! PHP arrays with keys `0..n` in order become JSON arrays; any other array
//! or object becomes a JSON object with string keys.

use serde_json::{Map, Number, Value};

/// Nesting limit for decoded values, matching serde_json's own.
pub const MAX_DEPTH: usize = 128;

/// Decode a metadata value if it looks serialized. Plain strings return `None`,
/// as does anything nested deeper than [`MAX_DEPTH`].
pub fn decode(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).ok();
    }
    if looks_php_serialized(trimmed) {
        return unserialize(trimmed);
    }
    None
}

/// Cheap shape check for PHP `serialize()` output.
pub fn looks_php_serialized(s: &str) -> bool {
    if s == "N;" {
        return true;
    }
    let bytes = s.as_bytes();
    if bytes.len() < 4 || bytes[1] != b':' {
        return false;
    }
    match bytes[0] {
        b'a' | b'O' => s.ends_with('}'),
        b's' => s.ends_with("\";"),
        b'b' | b'i' | b'd' => s.ends_with(';'),
        _ => false,
    }
}

/// Parse a complete PHP-serialized value. Trailing garbage fails the parse.
pub fn unserialize(s: &str) -> Option<Value> {
    let mut parser = Parser {
        bytes: s.as_bytes(),
        pos: 0,
    };
    let value = parser.value(0)?;
    (parser.pos == parser.bytes.len()).then_some(value)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn value(&mut self, depth: usize) -> Option<Value> {
        let tag = self.next()?;
        if tag == b'N' {
            self.expect(b';')?;
            return Some(Value::Null);
        }
        self.expect(b':')?;

        match tag {
            b'b' => {
                let raw = self.until(b';')?;
                Some(Value::Bool(raw == "1"))
            }
            b'i' => {
                let raw = self.until(b';')?;
                raw.parse::<i64>().ok().map(|n| Value::Number(n.into()))
            }
            b'd' => {
                let raw = self.until(b';')?;
                let f = raw.parse::<f64>().ok()?;
                Some(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
            }
            b's' => {
                let s = self.string()?;
                self.expect(b';')?;
                Some(Value::String(s))
            }
            b'a' => {
                let count = self.until(b':')?.parse::<usize>().ok()?;
                self.members(count, depth + 1)
            }
            b'O' => {
                // Class name is discarded; the members are what matter
                self.string()?;
                self.expect(b':')?;
                let count = self.until(b':')?.parse::<usize>().ok()?;
                self.members(count, depth + 1)
            }
            b'r' | b'R' => {
                self.until(b';')?;
                Some(Value::Null)
            }
            _ => None,
        }
    }

    /// `{key;value;...}` with `count` pairs.
    fn members(&mut self, count: usize, depth: usize) -> Option<Value> {
        if depth > MAX_DEPTH {
            return None;
        }
        self.expect(b'{')?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = match self.value(depth)? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let value = self.value(depth)?;
            entries.push((key, value));
        }
        self.expect(b'}')?;

        let is_list = entries
            .iter()
            .enumerate()
            .all(|(i, (key, _))| key.parse::<usize>().ok() == Some(i));
        if is_list {
            return Some(Value::Array(entries.into_iter().map(|(_, v)| v).collect()));
        }

        let mut map = Map::new();
        for (key, value) in entries {
            map.insert(key, value);
        }
        Some(Value::Object(map))
    }

    /// `LEN:"bytes"`, where LEN counts bytes, not characters.
    fn string(&mut self) -> Option<String> {
        let len = self.until(b':')?.parse::<usize>().ok()?;
        self.expect(b'"')?;
        let end = self.pos.checked_add(len)?;
        let raw = self.bytes.get(self.pos..end)?;
        self.pos = end;
        self.expect(b'"')?;
        Some(String::from_utf8_lossy(raw).into_owned())
    }

    fn next(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, want: u8) -> Option<()> {
        (self.next()? == want).then_some(())
    }

    /// Text up to (and consuming) `delim`.
    fn until(&mut self, delim: u8) -> Option<&str> {
        let start = self.pos;
        let offset = self.bytes[start..].iter().position(|&b| b == delim)?;
        self.pos = start + offset + 1;
        std::str::from_utf8(&self.bytes[start..start + offset]).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_php_scalars() {
        assert_eq!(unserialize("N;"), Some(Value::Null));
        assert_eq!(unserialize("b:1;"), Some(json!(true)));
        assert_eq!(unserialize("i:-42;"), Some(json!(-42)));
        assert_eq!(unserialize("d:0.5;"), Some(json!(0.5)));
        assert_eq!(unserialize(r#"s:5:"hello";"#), Some(json!("hello")));
    }

    #[test]
    fn string_length_counts_bytes() {
        // "café" is five bytes
        assert_eq!(unserialize(r#"s:5:"café";"#), Some(json!("café")));
        assert_eq!(unserialize(r#"s:4:"café";"#), None);
    }

    #[test]
    fn sequential_array_becomes_list() {
        let value = unserialize(r#"a:2:{i:0;s:1:"a";i:1;i:7;}"#).unwrap();
        assert_eq!(value, json!(["a", 7]));
    }

    #[test]
    fn keyed_array_and_object_become_maps() {
        let value = unserialize(
            r#"a:2:{s:5:"image";s:19:"https://x.com/a.jpg";s:4:"meta";O:8:"stdClass":1:{s:5:"bg_id";i:12;}}"#,
        )
        .unwrap();
        assert_eq!(
            value,
            json!({"image": "https://x.com/a.jpg", "meta": {"bg_id": 12}})
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(unserialize(r#"a:2:{i:0;s:1:"a";}"#), None);
        assert_eq!(unserialize(r#"s:10:"short";"#), None);
        assert_eq!(unserialize("i:1;trailing"), None);
    }

    #[test]
    fn decode_picks_format_by_shape() {
        assert_eq!(decode(r#" {"src": "x"} "#), Some(json!({"src": "x"})));
        assert_eq!(decode(r#"a:1:{i:0;i:5;}"#), Some(json!([5])));
        assert_eq!(decode("on"), None);
        assert_eq!(decode("https://x.com/a.jpg"), None);
    }

    #[test]
    fn keyed_members_keep_stored_order() {
        let value = unserialize(
            r#"a:2:{s:7:"z_image";s:20:"https://x.com/zz.jpg";s:7:"a_image";s:20:"https://x.com/aa.jpg";}"#,
        )
        .unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z_image", "a_image"]);
    }

    #[test]
    fn deep_nesting_is_rejected_without_overflow() {
        let php = format!("{}N;{}", "a:1:{i:0;".repeat(20_000), "}".repeat(20_000));
        assert_eq!(decode(&php), None);

        let json = format!("{}{}", "[".repeat(20_000), "]".repeat(20_000));
        assert_eq!(decode(&json), None);
    }

    #[test]
    fn nesting_up_to_the_limit_decodes() {
        let php = format!("{}N;{}", "a:1:{i:0;".repeat(MAX_DEPTH), "}".repeat(MAX_DEPTH));
        assert!(unserialize(&php).is_some());

        let php = format!(
            "{}N;{}",
            "a:1:{i:0;".repeat(MAX_DEPTH + 1),
            "}".repeat(MAX_DEPTH + 1)
        );
        assert_eq!(unserialize(&php), None);
    }
}
