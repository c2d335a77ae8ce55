//! Key type
//!
//! Keys are one of three distinct kinds. Equality, hashing and ordering all
//! take the kind into account first, so `Key::Int(1)` never equals
//! `Key::Str("1")`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A key in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    /// 64-bit signed integer key
    Int(i64),

    /// UTF-8 string key
    Str(String),

    /// Raw byte-string key
    Bytes(Vec<u8>),
}

impl Key {
    /// The key as an unsigned 32-bit row key, if it is representable as one
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Key::Int(n) => u32::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Str(s) => write!(f, "{:?}", s),
            Key::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b {
                    write!(f, "{}", std::ascii::escape_default(*byte))?;
                }
                write!(f, "\"")
            }
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(n as i64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(b: &[u8; N]) -> Self {
        Key::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key::Bytes(b)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_kinds_never_compare_equal() {
        let mut set = HashSet::new();
        set.insert(Key::Int(1));
        set.insert(Key::Str("1".to_string()));
        set.insert(Key::Bytes(b"1".to_vec()));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_as_u32_range() {
        assert_eq!(Key::Int(7).as_u32(), Some(7));
        assert_eq!(Key::Int(-1).as_u32(), None);
        assert_eq!(Key::Int(u32::MAX as i64 + 1).as_u32(), None);
        assert_eq!(Key::from("7").as_u32(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Key::Int(-3).to_string(), "-3");
        assert_eq!(Key::from("a").to_string(), "\"a\"");
        assert_eq!(Key::from(b"a\x00").to_string(), "b\"a\\x00\"");
    }
}
