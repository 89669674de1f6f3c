use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Literal stored for the absent value.
pub const ABSENT_TOKEN: &str = "undefined";

/// Encode a value into the store's string format.
///
/// `None` becomes [`ABSENT_TOKEN`]; anything else is its canonical JSON text.
///
/// # Examples
///
/// ```
/// use kvcell::codec::encode;
///
/// assert_eq!(encode(Some(&vec![1, 2, 3])).unwrap(), "[1,2,3]");
/// assert_eq!(encode::<i32>(None).unwrap(), "undefined");
/// ```
pub fn encode<T: Serialize + ?Sized>(value: Option<&T>) -> Result<String> {
    match value {
        None => Ok(ABSENT_TOKEN.to_string()),
        Some(value) => serde_json::to_string(value).map_err(Error::Encode),
    }
}

/// Decode a raw store entry.
///
/// Both a missing entry and [`ABSENT_TOKEN`] decode to `None`. Any other
/// text must be valid JSON for `T`, otherwise [`Error::Decode`] is returned
/// carrying `key` for context.
///
/// # Examples
///
/// ```
/// use kvcell::codec::decode;
///
/// assert_eq!(decode::<i32>("n", Some("42")).unwrap(), Some(42));
/// assert_eq!(decode::<i32>("n", Some("undefined")).unwrap(), None);
/// assert_eq!(decode::<i32>("n", None).unwrap(), None);
/// assert!(decode::<i32>("n", Some("{oops")).is_err());
/// ```
pub fn decode<T: DeserializeOwned>(key: &str, raw: Option<&str>) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(ABSENT_TOKEN) => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|source| Error::Decode {
                key: key.to_string(),
                source,
            }),
    }
}
