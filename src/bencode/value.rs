use std::collections::BTreeMap;

/// A decoded bencode value.
///
/// Dictionaries are kept in a `BTreeMap`, so iteration (and therefore
/// encoding) always yields keys in ascending byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    /// `i<number>e`
    Integer(i64),
    /// `<length>:<bytes>`, not necessarily UTF-8
    String(Vec<u8>),
    /// `l<values>e`
    List(Vec<BencodeValue>),
    /// `d<key><value>...e`
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    /// Build a dictionary from `(key, value)` pairs.
    pub fn dict<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, BencodeValue)>,
    {
        BencodeValue::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v))
                .collect(),
        )
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        BencodeValue::String(bytes.into())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a UTF-8 string, if it is a byte string holding valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn dict_get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict()?.get(key)
    }

    pub fn dict_get_str(&self, key: &[u8]) -> Option<&str> {
        self.dict_get(key)?.as_str()
    }

    pub fn dict_get_int(&self, key: &[u8]) -> Option<i64> {
        self.dict_get(key)?.as_integer()
    }

    pub fn dict_get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.dict_get(key)?.as_bytes()
    }
}
