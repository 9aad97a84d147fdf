// regsub.rs - Replacement-template expansion against a completed match.
//
// `&` and `\0` insert the whole match, `\1`..`\9` a group. `\u` `\l`
// change the case of the first inserted character and `\U` `\L` of the
// whole insertion; a case directive with no insertion after it applies to
// the next literal character instead.

use crate::regexec::MatchResult;
use crate::regparse::fetch_escaped_value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CaseChange {
    UpperFirst,
    LowerFirst,
    Upper,
    Lower,
}

impl CaseChange {
    fn apply(self, c: u8, first: bool) -> u8 {
        match self {
            CaseChange::UpperFirst if first => c.to_ascii_uppercase(),
            CaseChange::LowerFirst if first => c.to_ascii_lowercase(),
            CaseChange::Upper => c.to_ascii_uppercase(),
            CaseChange::Lower => c.to_ascii_lowercase(),
            _ => c,
        }
    }
}

enum Piece {
    Group(usize),
    Char(u8),
    Case(CaseChange),
}

/// Read one template item at `i`; returns it with the index after it.
fn next_piece(template: &[u8], i: usize) -> (Piece, usize) {
    let c = template[i];
    if c == b'&' {
        return (Piece::Group(0), i + 1);
    }
    if c != b'\\' {
        return (Piece::Char(c), i + 1);
    }
    let Some(&e) = template.get(i + 1) else {
        return (Piece::Char(b'\\'), i + 1);
    };
    match e {
        b'0'..=b'9' => (Piece::Group((e - b'0') as usize), i + 2),
        b'u' => (Piece::Case(CaseChange::UpperFirst), i + 2),
        b'l' => (Piece::Case(CaseChange::LowerFirst), i + 2),
        b'U' => (Piece::Case(CaseChange::Upper), i + 2),
        b'L' => (Piece::Case(CaseChange::Lower), i + 2),
        b'\\' | b'&' => (Piece::Char(e), i + 2),
        _ => match fetch_escaped_value(i + 1, template) {
            Ok((v, next)) => (Piece::Char(v), next),
            // unknown escape: keep the backslash, the character follows as-is
            Err(_) => (Piece::Char(b'\\'), i + 1),
        },
    }
}

/// Expand `template` against the match `m` over `text`.
///
/// The output is cut at `max_len` bytes; the flag reports whether that
/// happened. Groups that did not participate insert nothing.
pub fn substitute(
    m: &MatchResult,
    text: &[u8],
    template: &[u8],
    max_len: usize,
) -> (Vec<u8>, bool) {
    let mut out = Vec::with_capacity(template.len().min(max_len));
    let mut pending: Option<CaseChange> = None;
    let mut i = 0;

    while i < template.len() {
        let (piece, next) = next_piece(template, i);
        i = next;
        match piece {
            Piece::Case(change) => pending = Some(change),
            Piece::Char(c) => {
                let c = pending.take().map_or(c, |change| change.apply(c, true));
                if out.len() >= max_len {
                    return (out, true);
                }
                out.push(c);
            }
            Piece::Group(n) => {
                let change = pending.take();
                let Some(bytes) = m.group(n).and_then(|r| text.get(r)) else {
                    continue;
                };
                for (k, &c) in bytes.iter().enumerate() {
                    if out.len() >= max_len {
                        return (out, true);
                    }
                    out.push(change.map_or(c, |change| change.apply(c, k == 0)));
                }
            }
        }
    }
    (out, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regcomp::compile;
    use crate::regexec::{execute, ExecOptions};
    use crate::regint::RegexOptions;

    fn sub(pattern: &str, text: &str, template: &str, max_len: usize) -> (String, bool) {
        let prog = compile(pattern.as_bytes(), RegexOptions::empty()).unwrap();
        let m = execute(&prog, text.as_bytes(), &ExecOptions::new())
            .unwrap()
            .unwrap();
        let (out, truncated) = substitute(&m, text.as_bytes(), template.as_bytes(), max_len);
        (String::from_utf8(out).unwrap(), truncated)
    }

    fn s(pattern: &str, text: &str, template: &str) -> String {
        sub(pattern, text, template, 1024).0
    }

    #[test]
    fn whole_match_and_groups() {
        assert_eq!(s("(a)(b)", "ab", r"&-\1"), "ab-a");
        assert_eq!(s("(a)(b)", "ab", r"\2\1\0"), "baab");
        assert_eq!(s("(a)|(b)", "b", r"[\1][\2]"), "[][b]");
        assert_eq!(s("x", "x", r"\7"), "");
    }

    #[test]
    fn case_directives() {
        assert_eq!(s("(abc)", "abc", r"\u\1"), "Abc");
        assert_eq!(s("(abc)", "abc", r"\U&!"), "ABC!");
        assert_eq!(s("(ABC)", "ABC", r"\l\1"), "aBC");
        assert_eq!(s("(ABC)", "ABC", r"\L\1"), "abc");
        // no insertion follows: the next literal takes the change
        assert_eq!(s("a", "a", r"\uxyz"), "Xyz");
        assert_eq!(s("a", "a", r"\Uxyz"), "Xyz");
    }

    #[test]
    fn escapes() {
        assert_eq!(s("a", "a", r"1\t2"), "1\t2");
        assert_eq!(s("a", "a", r"\\"), "\\");
        assert_eq!(s("a", "a", r"\&"), "&");
        assert_eq!(s("a", "a", r"\x41"), "A");
        assert_eq!(s("a", "a", r"\q"), "\\q");
        assert_eq!(s("a", "a", "end\\"), "end\\");
    }

    #[test]
    fn truncation() {
        assert_eq!(sub("(abcdef)", "abcdef", "&&", 3), ("abc".to_string(), true));
        assert_eq!(sub("(abc)", "abc", "&", 3), ("abc".to_string(), false));
        assert_eq!(sub("a", "a", "xyz", 2), ("xy".to_string(), true));
        assert_eq!(sub("a", "a", "xyz", 0), (String::new(), true));
    }
}
