use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::ParseIntError;

use err_derive::Error;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

/// A store-assigned identifier for a record of kind `T`.
pub struct Id<T> {
    val: i64,
    phantom: PhantomData<T>,
}

#[derive(Debug, Clone, Error)]
pub enum IdParseError {
    #[error(display = "Unparseable Id: {:?}", _0)]
    Unparseable(String),
    #[error(display = "Id out of range: {}", _0)]
    OutOfRange(i64),
}

/// Persisted record kinds.
pub trait Entity: Serialize + DeserializeOwned {
    const PREFIX: &'static str;

    /// Checked by the store before every insert and save.
    fn validate(&self) -> Result<(), crate::persistence::InvalidDocument> {
        Ok(())
    }
}

impl<T> Id<T> {
    pub fn of(val: i64) -> Self {
        Id {
            val,
            phantom: PhantomData,
        }
    }

    pub fn value(&self) -> i64 {
        self.val
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.val)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_tuple("Id").field(&self.val).finish()
    }
}

impl<T> std::str::FromStr for Id<T> {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let val = src
            .parse::<i64>()
            .map_err(|_: ParseIntError| IdParseError::Unparseable(src.to_string()))?;
        if val < 1 {
            return Err(IdParseError::OutOfRange(val));
        }
        Ok(Id::of(val))
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.val.cmp(&other.val)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.val.hash(state)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Id {
            val: self.val,
            phantom: self.phantom,
        }
    }
}

impl<T> Copy for Id<T> {}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.val)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Id::of)
    }
}
