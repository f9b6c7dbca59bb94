/// Bencodex value codec
///
/// State values are stored Bencodex-encoded. Only the shapes below exist:
///
///   n                 null
///   t / f             booleans
///   i<digits>e        arbitrary precision integer
///   <len>:<bytes>     binary
///   u<len>:<utf8>     text
///   l<values>e        list
///   d<pairs>e         dictionary, binary keys first then text keys, each
///                     sorted by raw bytes
///
/// The scanner only ever asks two things of a value: is it a dictionary
/// holding key K, and what sits under key K. Everything else here exists so
/// stores can be written and corrupt entries reported precisely.

use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigInt;

use crate::error::{CensusError, Result};

/// Nesting deeper than this is treated as corruption.
const MAX_DEPTH: usize = 64;

/// Dictionary key. Variant order gives the canonical key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Binary(Vec<u8>),
    Text(String),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(BigInt),
    Binary(Vec<u8>),
    Text(String),
    List(Vec<Value>),
    Dictionary(BTreeMap<Key, Value>),
}

impl Value {
    pub fn decode(data: &[u8]) -> Result<Value> {
        let mut decoder = Decoder { data, offset: 0 };
        let value = decoder.value(0)?;
        if decoder.offset != data.len() {
            return Err(CensusError::decode(decoder.offset, "trailing bytes after value"));
        }
        Ok(value)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(b'n'),
            Value::Boolean(true) => out.push(b't'),
            Value::Boolean(false) => out.push(b'f'),
            Value::Integer(n) => {
                out.push(b'i');
                out.extend_from_slice(n.to_string().as_bytes());
                out.push(b'e');
            }
            Value::Binary(bytes) => encode_binary(bytes, out),
            Value::Text(text) => encode_text(text, out),
            Value::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Value::Dictionary(map) => {
                out.push(b'd');
                for (key, value) in map {
                    match key {
                        Key::Binary(bytes) => encode_binary(bytes, out),
                        Key::Text(text) => encode_text(text, out),
                    }
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }

    /// Short name of the shape, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Binary(_) => "binary",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<Key, Value>> {
        match self {
            Value::Dictionary(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Build a dictionary from text-keyed pairs.
    pub fn dictionary<'a, I>(pairs: I) -> Value
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        Value::Dictionary(pairs.into_iter().map(|(k, v)| (Key::from(k), v)).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Binary(bytes) => write!(f, "binary({} bytes)", bytes.len()),
            Value::Text(text) => write!(f, "text({:?})", text),
            Value::Integer(n) => write!(f, "integer({})", n),
            Value::Boolean(b) => write!(f, "boolean({})", b),
            Value::List(items) => write!(f, "list({} items)", items.len()),
            Value::Dictionary(map) => write!(f, "dictionary({} keys)", map.len()),
            Value::Null => write!(f, "null"),
        }
    }
}

fn encode_binary(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn encode_text(text: &str, out: &mut Vec<u8>) {
    out.push(b'u');
    encode_binary(text.as_bytes(), out);
}

struct Decoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.offset)
            .copied()
            .ok_or_else(|| CensusError::decode(self.offset, "unexpected end of input"))
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        let found = self.peek()?;
        if found != byte {
            return Err(CensusError::decode(
                self.offset,
                format!("expected {:?}, found {:?}", byte as char, found as char),
            ));
        }
        self.offset += 1;
        Ok(())
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(CensusError::decode(self.offset, "nesting too deep"));
        }
        match self.peek()? {
            b'n' => {
                self.offset += 1;
                Ok(Value::Null)
            }
            b't' => {
                self.offset += 1;
                Ok(Value::Boolean(true))
            }
            b'f' => {
                self.offset += 1;
                Ok(Value::Boolean(false))
            }
            b'i' => self.integer(),
            b'u' => self.text().map(Value::Text),
            b'0'..=b'9' => self.binary().map(Value::Binary),
            b'l' => {
                self.offset += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth + 1)?);
                }
                self.offset += 1;
                Ok(Value::List(items))
            }
            b'd' => {
                self.offset += 1;
                let mut map = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key_offset = self.offset;
                    let key = match self.peek()? {
                        b'u' => Key::Text(self.text()?),
                        b'0'..=b'9' => Key::Binary(self.binary()?),
                        other => {
                            return Err(CensusError::decode(
                                key_offset,
                                format!("invalid dictionary key tag {:?}", other as char),
                            ))
                        }
                    };
                    let value = self.value(depth + 1)?;
                    if map.insert(key, value).is_some() {
                        return Err(CensusError::decode(key_offset, "duplicate dictionary key"));
                    }
                }
                self.offset += 1;
                Ok(Value::Dictionary(map))
            }
            other => Err(CensusError::decode(
                self.offset,
                format!("invalid value tag {:?}", other as char),
            )),
        }
    }

    fn integer(&mut self) -> Result<Value> {
        self.expect(b'i')?;
        let start = self.offset;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == b'e')
            .map(|p| start + p)
            .ok_or_else(|| CensusError::decode(start, "unterminated integer"))?;
        let digits = &self.data[start..end];
        let n = BigInt::parse_bytes(digits, 10)
            .ok_or_else(|| CensusError::decode(start, "invalid integer digits"))?;
        self.offset = end + 1;
        Ok(Value::Integer(n))
    }

    fn length(&mut self) -> Result<usize> {
        let start = self.offset;
        let mut len: usize = 0;
        loop {
            let b = self.peek()?;
            match b {
                b'0'..=b'9' => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add((b - b'0') as usize))
                        .ok_or_else(|| CensusError::decode(start, "length overflow"))?;
                    self.offset += 1;
                }
                b':' if self.offset > start => {
                    self.offset += 1;
                    return Ok(len);
                }
                _ => return Err(CensusError::decode(self.offset, "invalid length prefix")),
            }
        }
    }

    fn binary(&mut self) -> Result<Vec<u8>> {
        let len = self.length()?;
        let start = self.offset;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CensusError::decode(start, format!("binary of {} bytes runs past end", len)))?;
        self.offset = end;
        Ok(self.data[start..end].to_vec())
    }

    fn text(&mut self) -> Result<String> {
        self.expect(b'u')?;
        let start = self.offset;
        let bytes = self.binary()?;
        String::from_utf8(bytes).map_err(|e| CensusError::decode(start, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(Value::decode(b"n").unwrap(), Value::Null);
        assert_eq!(Value::decode(b"t").unwrap(), Value::Boolean(true));
        assert_eq!(Value::decode(b"f").unwrap(), Value::Boolean(false));
        assert_eq!(Value::decode(b"i-42e").unwrap(), Value::Integer(BigInt::from(-42)));
        assert_eq!(Value::decode(b"3:abc").unwrap(), Value::Binary(b"abc".to_vec()));
        assert_eq!(Value::decode(b"u5:hello").unwrap(), Value::Text("hello".to_string()));
        assert_eq!(Value::decode(b"0:").unwrap(), Value::Binary(Vec::new()));
    }

    #[test]
    fn test_decode_big_integer() {
        let digits = "123456789012345678901234567890123456789012345678901234567890";
        let encoded = format!("i{}e", digits);
        match Value::decode(encoded.as_bytes()).unwrap() {
            Value::Integer(n) => assert_eq!(n.to_string(), digits),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_agent_like_dictionary() {
        let encoded = b"d1:\x01tu7:address2:\xab\xcdu15:unlockedOptionsl i1e i2e ee".to_vec();
        // Spaces are not valid Bencodex; strip them to build the real encoding.
        let encoded: Vec<u8> = encoded.into_iter().filter(|&b| b != b' ').collect();
        let value = Value::decode(&encoded).unwrap();
        let map = value.as_dictionary().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(
            map.get(&Key::from("address")).and_then(Value::as_binary),
            Some(&[0xab, 0xcd][..])
        );
        assert!(map.contains_key(&Key::Binary(vec![0x01])));
    }

    #[test]
    fn test_encode_orders_binary_keys_before_text_keys() {
        let mut map = BTreeMap::new();
        map.insert(Key::Text("a".to_string()), Value::Null);
        map.insert(Key::Binary(b"z".to_vec()), Value::Null);
        let encoded = Value::Dictionary(map).encode();
        assert_eq!(encoded, b"d1:znu1:ane".to_vec());
    }

    #[test]
    fn test_encode_decode_nested() {
        let value = Value::dictionary([
            ("address", Value::Binary(vec![1, 2, 3])),
            ("name", Value::Text("avatar".to_string())),
            ("slots", Value::List(vec![Value::Integer(BigInt::from(3)), Value::Null])),
        ]);
        assert_eq!(Value::decode(&value.encode()).unwrap(), value);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        assert!(matches!(Value::decode(b""), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"5:abc"), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"i12"), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"l"), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"nn"), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"x"), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"dl e"), Err(CensusError::Decode { .. })));
        assert!(matches!(Value::decode(b"u2:\xff\xfe"), Err(CensusError::Decode { .. })));
    }

    fn nested_lists(depth: usize) -> Vec<u8> {
        let mut encoded = vec![b'l'; depth];
        encoded.extend(std::iter::repeat(b'e').take(depth));
        encoded
    }

    #[test]
    fn test_decode_nesting_limit() {
        assert!(Value::decode(&nested_lists(MAX_DEPTH + 1)).is_ok());
        assert!(matches!(
            Value::decode(&nested_lists(MAX_DEPTH + 2)),
            Err(CensusError::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_runaway_nesting() {
        // Deep enough to exhaust a test thread's stack if the guard did not
        // stop descent early.
        let encoded = nested_lists(100_000);
        assert!(matches!(Value::decode(&encoded), Err(CensusError::Decode { .. })));
    }
}
