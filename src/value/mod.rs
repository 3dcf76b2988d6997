//! Tagged values
//!
//! [`Value`] is the closed set of persistable kinds. Every backend encodes and
//! decodes through it, and [`ConfigValue`] maps plain Rust types onto it for the
//! typed node accessors.

mod currency;
mod datetime;
mod tag;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDateTime;

use crate::error::{Error, Result};

pub use currency::Currency;
pub use datetime::{format_iso, from_ole, parse_iso, to_ole};
pub use tag::TypeTag;

/// 32-bit signed integer persisted under the `l` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Long(pub i32);

/// 32-bit unsigned integer persisted under the `ul` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ULong(pub u32);

/// Byte blob persisted under the `dab` tag.
///
/// Same content as a `Vec<u8>` (`vb`); the key store keeps the two apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ByteArray(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    UInt(u32),
    Long(Long),
    ULong(ULong),
    Char(i8),
    UChar(u8),
    Short(i16),
    UShort(u16),
    LongLong(i64),
    ULongLong(u64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
    Float(f32),
    Double(f64),
    Currency(Currency),
    TextList(Vec<String>),
    ByteArray(ByteArray),
    ByteVec(Vec<u8>),
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Int,
            Value::UInt(_) => TypeTag::UInt,
            Value::Long(_) => TypeTag::Long,
            Value::ULong(_) => TypeTag::ULong,
            Value::Char(_) => TypeTag::Char,
            Value::UChar(_) => TypeTag::UChar,
            Value::Short(_) => TypeTag::Short,
            Value::UShort(_) => TypeTag::UShort,
            Value::LongLong(_) => TypeTag::LongLong,
            Value::ULongLong(_) => TypeTag::ULongLong,
            Value::Bool(_) => TypeTag::Bool,
            Value::Text(_) => TypeTag::Text,
            Value::DateTime(_) => TypeTag::DateTime,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::Currency(_) => TypeTag::Currency,
            Value::TextList(_) => TypeTag::TextList,
            Value::ByteArray(_) => TypeTag::ByteArray,
            Value::ByteVec(_) => TypeTag::ByteVec,
        }
    }

    /// Locale-independent text form.
    ///
    /// Booleans are `True`/`False`, text lists put every item on its own
    /// `\n`-terminated line and byte blobs are standard base64.
    pub fn to_text(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Long(v) => v.0.to_string(),
            Value::ULong(v) => v.0.to_string(),
            Value::Char(v) => v.to_string(),
            Value::UChar(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::UShort(v) => v.to_string(),
            Value::LongLong(v) => v.to_string(),
            Value::ULongLong(v) => v.to_string(),
            Value::Bool(v) => String::from(if *v { "True" } else { "False" }),
            Value::Text(v) => v.clone(),
            Value::DateTime(v) => format_iso(v),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Currency(v) => v.to_string(),
            Value::TextList(items) => items.iter().map(|item| format!("{item}\n")).collect(),
            Value::ByteArray(v) => BASE64.encode(&v.0),
            Value::ByteVec(v) => BASE64.encode(v),
        }
    }

    /// Decode the text form of `tag`.
    pub fn from_text(tag: TypeTag, text: &str) -> Result<Value> {
        let invalid = || Error::format(format!("invalid {tag} text '{text}'"));
        let trimmed = text.trim();

        macro_rules! number {
            ($variant:expr) => {
                trimmed.parse().map($variant).map_err(|_| invalid())
            };
        }

        match tag {
            TypeTag::Int => number!(Value::Int),
            TypeTag::UInt => number!(Value::UInt),
            TypeTag::Long => number!(|v| Value::Long(Long(v))),
            TypeTag::ULong => number!(|v| Value::ULong(ULong(v))),
            TypeTag::Char => number!(Value::Char),
            TypeTag::UChar => number!(Value::UChar),
            TypeTag::Short => number!(Value::Short),
            TypeTag::UShort => number!(Value::UShort),
            TypeTag::LongLong => number!(Value::LongLong),
            TypeTag::ULongLong => number!(Value::ULongLong),
            TypeTag::Float => number!(Value::Float),
            TypeTag::Double => number!(Value::Double),
            TypeTag::Bool => parse_bool(trimmed).map(Value::Bool).ok_or_else(invalid),
            TypeTag::Text => Ok(Value::Text(text.to_string())),
            TypeTag::DateTime => parse_iso(trimmed).map(Value::DateTime),
            TypeTag::Currency => trimmed.parse().map(Value::Currency),
            TypeTag::TextList => Ok(Value::TextList(text.lines().map(str::to_string).collect())),
            TypeTag::ByteArray => decode_base64(trimmed).map(|b| Value::ByteArray(ByteArray(b))),
            TypeTag::ByteVec => decode_base64(trimmed).map(Value::ByteVec),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| Error::format(format!("invalid base64 payload: {e}")))
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// A Rust type that maps onto exactly one [`Value`] kind.
pub trait ConfigValue: Clone {
    const TAG: TypeTag;

    fn into_value(self) -> Value;

    /// Hands the value back on a kind mismatch.
    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! config_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl ConfigValue for $ty {
            const TAG: TypeTag = TypeTag::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    )*};
}

config_value! {
    i32 => Int,
    u32 => UInt,
    Long => Long,
    ULong => ULong,
    i8 => Char,
    u8 => UChar,
    i16 => Short,
    u16 => UShort,
    i64 => LongLong,
    u64 => ULongLong,
    bool => Bool,
    String => Text,
    NaiveDateTime => DateTime,
    f32 => Float,
    f64 => Double,
    Currency => Currency,
    Vec<String> => TextList,
    ByteArray => ByteArray,
    Vec<u8> => ByteVec,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_tag_matches_variant() {
        assert_eq!(Value::from(42u32).tag(), TypeTag::UInt);
        assert_eq!(Value::from(Long(1)).tag(), TypeTag::Long);
        assert_eq!(Value::from(vec![1u8]).tag(), TypeTag::ByteVec);
        assert_eq!(Value::from(ByteArray(vec![1])).tag(), TypeTag::ByteArray);
        assert_eq!(Value::from("x").tag(), TypeTag::Text);
    }

    #[test]
    fn test_to_text_is_locale_independent() {
        assert_eq!(Value::Double(3.5).to_text(), "3.5");
        assert_eq!(Value::Float(0.1).to_text(), "0.1");
        assert_eq!(Value::Currency(Currency::from_scaled(-15_000)).to_text(), "-1.5");
        assert_eq!(Value::Bool(true).to_text(), "True");
        assert_eq!(Value::Bool(false).to_text(), "False");
    }

    #[test]
    fn test_text_list_lines() {
        let list = Value::TextList(vec!["Uno".into(), "Due".into(), "Tre".into()]);
        assert_eq!(list.to_text(), "Uno\nDue\nTre\n");
        assert_eq!(Value::from_text(TypeTag::TextList, "Uno\r\nDue\nTre\n").unwrap(), list);
        assert_eq!(Value::from_text(TypeTag::TextList, "").unwrap(), Value::TextList(vec![]));
    }

    #[test]
    fn test_from_text_every_kind() {
        let dt = NaiveDate::from_ymd_opt(2001, 2, 3).unwrap().and_hms_opt(4, 5, 6).unwrap();
        let samples = [
            Value::Int(-7),
            Value::UInt(u32::MAX),
            Value::Long(Long(i32::MIN)),
            Value::ULong(ULong(9)),
            Value::Char(-128),
            Value::UChar(255),
            Value::Short(-300),
            Value::UShort(65_535),
            Value::LongLong(i64::MIN),
            Value::ULongLong(u64::MAX),
            Value::Bool(true),
            Value::Text("  spaced  ".into()),
            Value::DateTime(dt),
            Value::Float(1.25),
            Value::Double(-2.0e-10),
            Value::Currency(Currency::from_scaled(12_345)),
            Value::TextList(vec!["a".into(), String::new(), "c".into()]),
            Value::ByteArray(ByteArray(vec![0, 1, 254, 255])),
            Value::ByteVec(b"hello".to_vec()),
        ];
        for value in samples {
            let text = value.to_text();
            assert_eq!(Value::from_text(value.tag(), &text).unwrap(), value, "text={text:?}");
        }
    }

    #[test]
    fn test_from_text_bool_spellings() {
        for (text, expected) in [("TRUE", true), ("1", true), ("false", false), (" 0 ", false)] {
            assert_eq!(Value::from_text(TypeTag::Bool, text).unwrap(), Value::Bool(expected));
        }
        assert!(Value::from_text(TypeTag::Bool, "yes").is_err());
    }

    #[test]
    fn test_from_text_rejects_out_of_range() {
        assert!(Value::from_text(TypeTag::UChar, "256").is_err());
        assert!(Value::from_text(TypeTag::UInt, "-1").is_err());
        assert!(Value::from_text(TypeTag::ByteVec, "***").is_err());
    }

    #[test]
    fn test_config_value_mismatch_returns_value() {
        assert_eq!(i32::from_value(Value::Int(3)), Ok(3));
        assert_eq!(u32::from_value(Value::Int(3)), Err(Value::Int(3)));
        assert_eq!(<Vec<u8>>::TAG, TypeTag::ByteVec);
        assert_eq!(ByteArray::TAG, TypeTag::ByteArray);
    }
}
