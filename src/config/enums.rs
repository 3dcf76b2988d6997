//! Name tables for persisting enums by symbol

/// Caller-supplied `(symbol, variant)` pairs for one enum type.
///
/// The ordinal of a variant is its index in the table. Symbols are matched
/// case-insensitively on read.
///
/// ```
/// use cfgtree::EnumTable;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Align { Left, Right }
///
/// static ALIGN: EnumTable<Align> = EnumTable::new(&[("alLeft", Align::Left), ("alRight", Align::Right)]);
/// assert_eq!(ALIGN.symbol(Align::Right), Some("alRight"));
/// assert_eq!(ALIGN.from_symbol("ALLEFT"), Some(Align::Left));
/// ```
#[derive(Debug)]
pub struct EnumTable<E: 'static> {
    entries: &'static [(&'static str, E)],
}

impl<E: Copy + PartialEq> EnumTable<E> {
    pub const fn new(entries: &'static [(&'static str, E)]) -> Self {
        Self { entries }
    }

    pub fn symbol(&self, value: E) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, variant)| *variant == value)
            .map(|(symbol, _)| *symbol)
    }

    pub fn ordinal(&self, value: E) -> Option<usize> {
        self.entries.iter().position(|(_, variant)| *variant == value)
    }

    pub fn from_symbol(&self, symbol: &str) -> Option<E> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
            .map(|(_, variant)| *variant)
    }

    pub fn from_ordinal(&self, ordinal: i64) -> Option<E> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| self.entries.get(index))
            .map(|(_, variant)| *variant)
    }
}
