//! Symbolic type tags
//!
//! One table, shared by every backend: the JSON wrapper keys, the XML `type`
//! attribute and the registry `name:(tag)` suffix all use these symbols.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of a [`Value`](super::Value), with its stable wire symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Int,
    UInt,
    Long,
    ULong,
    Char,
    UChar,
    Short,
    UShort,
    LongLong,
    ULongLong,
    Bool,
    Text,
    DateTime,
    Float,
    Double,
    Currency,
    TextList,
    ByteArray,
    ByteVec,
}

impl TypeTag {
    /// All tags, in declaration order.
    pub const ALL: [TypeTag; 19] = [
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Long,
        TypeTag::ULong,
        TypeTag::Char,
        TypeTag::UChar,
        TypeTag::Short,
        TypeTag::UShort,
        TypeTag::LongLong,
        TypeTag::ULongLong,
        TypeTag::Bool,
        TypeTag::Text,
        TypeTag::DateTime,
        TypeTag::Float,
        TypeTag::Double,
        TypeTag::Currency,
        TypeTag::TextList,
        TypeTag::ByteArray,
        TypeTag::ByteVec,
    ];

    /// Wire symbol of this tag.
    pub const fn symbol(self) -> &'static str {
        match self {
            TypeTag::Int => "i",
            TypeTag::UInt => "u",
            TypeTag::Long => "l",
            TypeTag::ULong => "ul",
            TypeTag::Char => "c",
            TypeTag::UChar => "uc",
            TypeTag::Short => "s",
            TypeTag::UShort => "us",
            TypeTag::LongLong => "ll",
            TypeTag::ULongLong => "ull",
            TypeTag::Bool => "b",
            TypeTag::Text => "sz",
            TypeTag::DateTime => "dt",
            TypeTag::Float => "flt",
            TypeTag::Double => "dbl",
            TypeTag::Currency => "cur",
            TypeTag::TextList => "sv",
            TypeTag::ByteArray => "dab",
            TypeTag::ByteVec => "vb",
        }
    }

    /// Look a tag up by its wire symbol (case-sensitive).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.symbol() == symbol)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_symbol(s).ok_or_else(|| Error::format(format!("unknown type tag '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_unique() {
        let mut symbols: Vec<_> = TypeTag::ALL.iter().map(|t| t.symbol()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), TypeTag::ALL.len());
    }

    #[test]
    fn test_from_symbol_resolves_every_tag() {
        for tag in TypeTag::ALL {
            assert_eq!(TypeTag::from_symbol(tag.symbol()), Some(tag));
        }
    }

    #[test]
    fn test_from_symbol_rejects_unknown_and_wrong_case() {
        assert_eq!(TypeTag::from_symbol("x"), None);
        assert_eq!(TypeTag::from_symbol("DBL"), None);
        assert_eq!(TypeTag::from_symbol(""), None);
    }

    #[test]
    fn test_parse_and_display() {
        let tag: TypeTag = "ull".parse().unwrap();
        assert_eq!(tag, TypeTag::ULongLong);
        assert_eq!(tag.to_string(), "ull");
        assert!("nope".parse::<TypeTag>().is_err());
    }
}
