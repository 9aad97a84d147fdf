// regctype.rs - Byte classification tables and word-delimiter sets.
//
// The classification table is built at compile time. The delimiter set
// consulted by `<`, `>`, `\B`, `\y` and `\Y` is a plain value; a
// process-wide default is kept behind a lock and copied once per search.

use std::fmt;
use std::sync::RwLock;

use bitflags::bitflags;

use crate::regint::{bitset_at, BitSet, OpCode, BITSET_REAL_SIZE};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CType: u8 {
        const DIGIT = 1 << 0;
        const LETTER = 1 << 1;
        const WORD = 1 << 2;
        const SPACE = 1 << 3;
    }
}

const fn build_ctype_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        let c = i as u8;
        let mut bits = 0u8;
        if c.is_ascii_digit() {
            bits |= CType::DIGIT.bits() | CType::WORD.bits();
        }
        if c.is_ascii_alphabetic() {
            bits |= CType::LETTER.bits() | CType::WORD.bits();
        }
        if c == b'_' {
            bits |= CType::WORD.bits();
        }
        // C isspace(): space, \t, \n, \v, \f, \r
        if c == b' ' || (c >= 0x09 && c <= 0x0d) {
            bits |= CType::SPACE.bits();
        }
        table[i] = bits;
        i += 1;
    }
    table
}

static CTYPE_TABLE: [u8; 256] = build_ctype_table();

#[inline]
pub fn is_ctype(c: u8, ctype: CType) -> bool {
    CTYPE_TABLE[c as usize] & ctype.bits() != 0
}

#[inline]
pub fn is_digit(c: u8) -> bool {
    is_ctype(c, CType::DIGIT)
}

#[inline]
pub fn is_letter(c: u8) -> bool {
    is_ctype(c, CType::LETTER)
}

#[inline]
pub fn is_word(c: u8) -> bool {
    is_ctype(c, CType::WORD)
}

#[inline]
pub fn is_space(c: u8) -> bool {
    is_ctype(c, CType::SPACE)
}

/// Test `c` against a single-step class opcode.
///
/// Returns `None` for opcodes that are not plain classes (literals, sets and
/// the delimiter tests need their operand or table).
pub fn match_ctype(op: OpCode, c: u8) -> Option<bool> {
    let r = match op {
        OpCode::Any => c != b'\n',
        OpCode::Every => true,
        OpCode::Digit => is_digit(c),
        OpCode::NotDigit => !is_digit(c),
        OpCode::Letter => is_letter(c),
        OpCode::NotLetter => !is_letter(c),
        // \s without (?n) leaves newline out; \S is its complement
        OpCode::Space => is_space(c) && c != b'\n',
        OpCode::SpaceNl => is_space(c),
        OpCode::NotSpace => !is_space(c) || c == b'\n',
        OpCode::NotSpaceNl => !is_space(c),
        OpCode::WordChar => is_word(c),
        OpCode::NotWordChar => !is_word(c),
        _ => return None,
    };
    Some(r)
}

// === Delimiters ===

/// Characters that delimit words unless the caller says otherwise.
pub const DEFAULT_WORD_DELIMITERS: &str = ".,/\\`'!|@#%^&*()-=+{}[]\":;<>?~";

/// A 256-entry table of word delimiters.
///
/// NUL, space, tab and newline are always delimiters regardless of the
/// characters supplied.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    bits: BitSet,
}

impl Delimiters {
    pub const fn from_bytes(chars: &[u8]) -> Self {
        let mut bits: BitSet = [0; BITSET_REAL_SIZE];
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i] as usize;
            bits[c >> 5] |= 1 << (c & 0x1f);
            i += 1;
        }
        let always = [0u8, b' ', b'\t', b'\n'];
        let mut j = 0;
        while j < always.len() {
            let c = always[j] as usize;
            bits[c >> 5] |= 1 << (c & 0x1f);
            j += 1;
        }
        Delimiters { bits }
    }

    pub const fn new(chars: &str) -> Self {
        Self::from_bytes(chars.as_bytes())
    }

    #[inline]
    pub fn is_delimiter(&self, c: u8) -> bool {
        bitset_at(&self.bits, c as usize)
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters::new(DEFAULT_WORD_DELIMITERS)
    }
}

impl fmt::Debug for Delimiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<u8> = (0..=255u8).filter(|&c| self.is_delimiter(c)).collect();
        f.debug_tuple("Delimiters")
            .field(&String::from_utf8_lossy(&chars))
            .finish()
    }
}

static DEFAULT_DELIMITERS: RwLock<Delimiters> =
    RwLock::new(Delimiters::new(DEFAULT_WORD_DELIMITERS));

/// Replace the process-wide default delimiter set.
///
/// Searches already running keep the set they started with.
pub fn set_default_word_delimiters(chars: &str) {
    let delims = Delimiters::new(chars);
    let mut guard = DEFAULT_DELIMITERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = delims;
}

/// Copy of the current process-wide default delimiter set.
pub fn default_word_delimiters() -> Delimiters {
    *DEFAULT_DELIMITERS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(is_digit(b'7'));
        assert!(!is_digit(b'a'));
        assert!(is_letter(b'Q'));
        assert!(!is_letter(b'_'));
        assert!(is_word(b'_'));
        assert!(is_word(b'9'));
        assert!(!is_word(b'-'));
        for c in [b' ', b'\t', b'\n', 0x0b, 0x0c, b'\r'] {
            assert!(is_space(c), "{:#x} should be space", c);
        }
        assert!(!is_space(b'x'));
        assert!(!is_letter(0xe9));
    }

    #[test]
    fn ctype_opcodes() {
        assert_eq!(match_ctype(OpCode::Any, b'\n'), Some(false));
        assert_eq!(match_ctype(OpCode::Every, b'\n'), Some(true));
        assert_eq!(match_ctype(OpCode::Space, b'\n'), Some(false));
        assert_eq!(match_ctype(OpCode::SpaceNl, b'\n'), Some(true));
        assert_eq!(match_ctype(OpCode::NotSpace, b'\n'), Some(true));
        assert_eq!(match_ctype(OpCode::NotSpaceNl, b'\n'), Some(false));
        assert_eq!(match_ctype(OpCode::NotSpace, b' '), Some(false));
        assert_eq!(match_ctype(OpCode::NotDigit, b'\n'), Some(true));
        assert_eq!(match_ctype(OpCode::WordChar, b'_'), Some(true));
        assert_eq!(match_ctype(OpCode::IsDelim, b'.'), None);
        assert_eq!(match_ctype(OpCode::Branch, b'a'), None);
    }

    #[test]
    fn delimiters_always_include_whitespace() {
        let d = Delimiters::new("");
        assert!(d.is_delimiter(0));
        assert!(d.is_delimiter(b' '));
        assert!(d.is_delimiter(b'\t'));
        assert!(d.is_delimiter(b'\n'));
        assert!(!d.is_delimiter(b'.'));
    }

    #[test]
    fn default_delimiters() {
        let d = Delimiters::default();
        assert!(d.is_delimiter(b'.'));
        assert!(d.is_delimiter(b'('));
        assert!(d.is_delimiter(b'"'));
        assert!(!d.is_delimiter(b'a'));
        assert!(!d.is_delimiter(b'_'));
        assert!(!d.is_delimiter(b'$'));
    }

    #[test]
    fn debug_lists_members() {
        let d = Delimiters::new("x");
        let text = format!("{:?}", d);
        assert!(text.contains('x'));
    }
}
