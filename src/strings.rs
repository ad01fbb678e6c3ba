//! Byte-string views and label lists
//!
//! [`Str`] is a view into arena memory (a decoded name, a label inside a
//! received datagram). [`StrList`] collects views while a name is split into
//! labels or reassembled from them.

use crate::arena::{Arena, ArenaError, Span};

/// Immutable byte string living in an [`Arena`]
///
/// Compare with [`Str::eq_bytes`]; the handle alone says nothing about content.
#[derive(Debug, Clone, Copy, Default)]
pub struct Str {
    span: Span,
}

impl Str {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Copy `bytes` into the arena
    pub fn from_bytes(arena: &mut Arena, bytes: &[u8]) -> Result<Self, ArenaError> {
        Ok(Self::new(arena.alloc_copy(bytes)?))
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn as_bytes<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        arena.bytes(self.span)
    }

    pub fn to_string_lossy(&self, arena: &Arena) -> String {
        String::from_utf8_lossy(self.as_bytes(arena)).into_owned()
    }

    /// Byte-wise, length-sensitive equality
    pub fn eq_bytes(&self, other: &Str, arena: &Arena) -> bool {
        self.as_bytes(arena) == other.as_bytes(arena)
    }

    /// ASCII case-insensitive equality, for comparing domain names
    pub fn eq_ignore_case(&self, other: &Str, arena: &Arena) -> bool {
        self.as_bytes(arena).eq_ignore_ascii_case(other.as_bytes(arena))
    }
}

/// Ordered list of string views with a running byte total
#[derive(Debug, Clone, Default)]
pub struct StrList {
    parts: Vec<Str>,
    total_len: usize,
}

impl StrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: Str) {
        self.total_len += s.len();
        self.parts.push(s);
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sum of the lengths of all parts
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn iter(&self) -> impl Iterator<Item = &Str> {
        self.parts.iter()
    }

    /// Split `s` on `delim`. The parts are views into `s`, nothing is copied.
    /// Empty parts are kept, so `"a..b."` yields `a`, ``, `b`, ``.
    pub fn split(arena: &Arena, s: Str, delim: u8) -> Self {
        let mut list = Self::new();
        let mut start = 0;

        for (i, byte) in s.as_bytes(arena).iter().enumerate() {
            if *byte == delim {
                list.push_sub(s, start, i - start);
                start = i + 1;
            }
        }
        list.push_sub(s, start, s.len() - start);

        list
    }

    fn push_sub(&mut self, s: Str, offset: usize, len: usize) {
        if let Some(span) = s.span.sub(offset, len) {
            self.push(Str::new(span));
        }
    }

    /// Concatenate all parts with `sep` between them
    pub fn join(&self, arena: &mut Arena, sep: u8) -> Result<Str, ArenaError> {
        let mut out = arena.alloc(0)?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out = arena.extend(out, &[sep])?;
            }
            out = arena.extend_from(out, part.span)?;
        }
        Ok(Str::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(arena: &Arena, list: &StrList) -> Vec<String> {
        list.iter().map(|s| s.to_string_lossy(arena)).collect()
    }

    #[test]
    fn test_split_domain() {
        let mut arena = Arena::new(128);
        let s = Str::from_bytes(&mut arena, b"www.example.com").unwrap();

        let list = StrList::split(&arena, s, b'.');
        assert_eq!(texts(&arena, &list), vec!["www", "example", "com"]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.total_len(), 13);
    }

    #[test]
    fn test_split_keeps_empty_parts() {
        let mut arena = Arena::new(128);
        let s = Str::from_bytes(&mut arena, b"example.com.").unwrap();
        let list = StrList::split(&arena, s, b'.');
        assert_eq!(texts(&arena, &list), vec!["example", "com", ""]);

        let single = Str::from_bytes(&mut arena, b"localhost").unwrap();
        let list = StrList::split(&arena, single, b'.');
        assert_eq!(texts(&arena, &list), vec!["localhost"]);
    }

    #[test]
    fn test_split_does_not_allocate() {
        let mut arena = Arena::new(128);
        let s = Str::from_bytes(&mut arena, b"a.b.c").unwrap();
        let used = arena.used();

        StrList::split(&arena, s, b'.');
        assert_eq!(arena.used(), used);
    }

    #[test]
    fn test_join_round_trip() {
        let mut arena = Arena::new(128);
        let s = Str::from_bytes(&mut arena, b"ns1.example.org").unwrap();
        let list = StrList::split(&arena, s, b'.');

        let joined = list.join(&mut arena, b'.').unwrap();
        assert!(joined.eq_bytes(&s, &arena));
        assert_ne!(joined.span(), s.span());
    }

    #[test]
    fn test_join_empty_and_single() {
        let mut arena = Arena::new(64);
        let empty = StrList::new().join(&mut arena, b'.').unwrap();
        assert!(empty.is_empty());

        let com = Str::from_bytes(&mut arena, b"com").unwrap();
        let mut list = StrList::new();
        list.push(com);
        let joined = list.join(&mut arena, b'.').unwrap();
        assert_eq!(joined.as_bytes(&arena), b"com");
        assert_ne!(joined.span(), com.span());
    }

    #[test]
    fn test_equality() {
        let mut arena = Arena::new(64);
        let a = Str::from_bytes(&mut arena, b"Example.COM").unwrap();
        let b = Str::from_bytes(&mut arena, b"example.com").unwrap();
        let c = Str::from_bytes(&mut arena, b"example.co").unwrap();

        assert!(!a.eq_bytes(&b, &arena));
        assert!(a.eq_ignore_case(&b, &arena));
        assert!(!b.eq_bytes(&c, &arena));
        let d = Str::from_bytes(&mut arena, b"example.com").unwrap();
        assert!(b.eq_bytes(&d, &arena));
    }
}
