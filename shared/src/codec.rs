//! Stateless wire helpers: URI decoding, HTML quoting and name-sorted pairs.

use crate::error::CodecError;
use std::cmp::Ordering;

/// A decoded `name`/`value` pair from a header block or argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub name: String,
    pub value: String,
}

impl Pair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Byte-wise, case-sensitive ordering on the pair name.
pub fn compare_by_name(left: &Pair, right: &Pair) -> Ordering {
    left.name.as_bytes().cmp(right.name.as_bytes())
}

/// Collection of pairs kept sorted by name for logarithmic lookup.
///
/// The sort is stable, so entries sharing a name stay in stream order and
/// [`SortedPairs::get`] returns the one that was written last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedPairs {
    pairs: Vec<Pair>,
}

impl SortedPairs {
    pub fn from_stream(mut pairs: Vec<Pair>) -> Self {
        pairs.sort_by(compare_by_name);
        Self { pairs }
    }

    /// Value of the last occurrence of `name` in the original stream.
    pub fn get(&self, name: &str) -> Option<&str> {
        let end = self
            .pairs
            .partition_point(|pair| pair.name.as_bytes() <= name.as_bytes());
        match end.checked_sub(1).map(|index| &self.pairs[index]) {
            Some(pair) if pair.name == name => Some(pair.value.as_str()),
            _ => None,
        }
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Pair> {
        self.pairs.get(index)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.iter()
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decodes `+` to space and `%XX` to the byte it names, in place.
///
/// The output never grows, so the buffer is only ever truncated. A `%`
/// without two hex digits after it fails the whole field; nothing past the
/// end of the buffer is read.
pub fn decode_uri_in_place(text: &mut Vec<u8>) -> Result<(), CodecError> {
    let mut read = 0;
    let mut write = 0;
    while read < text.len() {
        let decoded = match text[read] {
            b'+' => b' ',
            b'%' => {
                let hi = text.get(read + 1).copied().and_then(hex_value);
                let lo = text.get(read + 2).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        read += 2;
                        hi << 4 | lo
                    }
                    _ => return Err(CodecError::MalformedEncoding { position: read }),
                }
            }
            other => other,
        };
        text[write] = decoded;
        write += 1;
        read += 1;
    }
    text.truncate(write);
    Ok(())
}

/// Decodes a raw field into an owned string. Bytes that do not form UTF-8
/// after decoding are replaced.
pub fn decode_uri(raw: &[u8]) -> Result<String, CodecError> {
    let mut buffer = raw.to_vec();
    decode_uri_in_place(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Escapes text for echoing into diagnostic HTML.
pub fn quote_for_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            ' ' => out.push_str("&nbsp;"),
            '\t' => out.push_str("&nbsp;&nbsp;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> Result<String, CodecError> {
        decode_uri(text.as_bytes())
    }

    #[test]
    fn test_decode_plus_and_percent() {
        assert_eq!(decode("a+b%20c").unwrap(), "a b c");
        assert_eq!(decode("%2B").unwrap(), "+");
        assert_eq!(decode("%2b%2F").unwrap(), "+/");
        assert_eq!(decode("plain").unwrap(), "plain");
        assert_eq!(decode("").unwrap(), "");
    }

    #[test]
    fn test_decode_in_place_never_grows() {
        let mut buffer = b"%41%42%43".to_vec();
        decode_uri_in_place(&mut buffer).unwrap();
        assert_eq!(buffer, b"ABC");
    }

    #[test]
    fn test_decode_rejects_truncated_escape() {
        assert_eq!(
            decode("abc%4"),
            Err(CodecError::MalformedEncoding { position: 3 })
        );
        assert_eq!(
            decode("%"),
            Err(CodecError::MalformedEncoding { position: 0 })
        );
    }

    #[test]
    fn test_decode_rejects_non_hex_digits() {
        assert!(decode("%zz").is_err());
        assert!(decode("ok%g1").is_err());
    }

    #[test]
    fn test_quote_for_html() {
        assert_eq!(
            quote_for_html("<a href='x'>&\"\t"),
            "&lt;a&nbsp;href=&apos;x&apos;&gt;&amp;&quot;&nbsp;&nbsp;"
        );
        assert_eq!(quote_for_html("safe"), "safe");
    }

    #[test]
    fn test_compare_by_name_is_case_sensitive() {
        let upper = Pair::new("Host", "a");
        let lower = Pair::new("host", "b");
        assert_eq!(compare_by_name(&upper, &lower), Ordering::Less);
        assert_eq!(compare_by_name(&lower, &lower.clone()), Ordering::Equal);
    }

    #[test]
    fn test_sorted_pairs_lookup() {
        let pairs = SortedPairs::from_stream(vec![
            Pair::new("zeta", "1"),
            Pair::new("alpha", "2"),
            Pair::new("mid", "3"),
        ]);
        assert_eq!(pairs.get("alpha"), Some("2"));
        assert_eq!(pairs.get("mid"), Some("3"));
        assert_eq!(pairs.get("zeta"), Some("1"));
        assert_eq!(pairs.get("missing"), None);
        assert_eq!(pairs.get_by_index(0).unwrap().name, "alpha");
        assert!(pairs.get_by_index(3).is_none());
    }

    #[test]
    fn test_sorted_pairs_last_occurrence_wins() {
        let pairs = SortedPairs::from_stream(vec![
            Pair::new("key", "first"),
            Pair::new("other", "x"),
            Pair::new("key", "second"),
            Pair::new("key", "third"),
        ]);
        assert_eq!(pairs.get("key"), Some("third"));
        // Duplicates are retained in stream order.
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs.get_by_index(0).unwrap().value, "first");
        assert_eq!(pairs.get_by_index(2).unwrap().value, "third");
    }
}
