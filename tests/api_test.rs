// api_test.rs - Regex, RegexBuilder, Captures and FindIter from the outside.

use spanrex::api::{Regex, RegexBuilder};
use spanrex::error::RegexError;
use spanrex::prelude::*;

// === searching ===

#[test]
fn finds_leftmost_number() {
    let re = Regex::new(r"\d+").unwrap();
    let m = re.find("width: 640px; height: 480px").unwrap();
    assert_eq!((m.as_str(), m.start()), (Some("640"), 7));
}

#[test]
fn absent_identifier_is_none() {
    let re = Regex::new(r"<unused_var>").unwrap();
    assert!(re.find("let used_var = unused_variable;").is_none());
}

#[test]
fn empty_pattern_matches_at_zero() {
    let m = Regex::new("").unwrap().find("anything").unwrap();
    assert_eq!(m.range(), 0..0);
    assert!(m.is_empty());
}

#[test]
fn invalid_pattern_compile_error() {
    let err = Regex::new(r"(unclosed").unwrap_err();
    assert_eq!(err.kind(), Some(CompileErrorKind::UnmatchedOpenParen));
    assert!(err.to_string().starts_with("syntax error:"));
}

#[test]
fn bytes_pattern_and_text() {
    let re = Regex::new_bytes(b"\\x80+").unwrap();
    let m = re.find_bytes(b"a\x80\x80b").unwrap();
    assert_eq!(m.range(), 1..3);
    assert_eq!(m.as_bytes(), b"\x80\x80");
    assert!(re.is_match_bytes(b"\x80"));
    assert!(!re.is_match_bytes(b"abc"));
}

#[test]
fn span_inside_multibyte_char() {
    let m = Regex::new(".").unwrap().find("é").unwrap();
    assert_eq!(m.range(), 0..1);
    assert_eq!(m.as_bytes(), b"\xc3");
    assert_eq!(m.as_str(), None);
    let m = Regex::new("..").unwrap().find("é").unwrap();
    assert_eq!(m.as_str(), Some("é"));
}

// === builder ===

#[test]
fn builder_case_insensitive() {
    let re = RegexBuilder::new("hello").case_insensitive(true).build().unwrap();
    assert!(re.is_match("HeLLo"));
    let re = Regex::builder("hello").case_insensitive(false).build().unwrap();
    assert!(!re.is_match("HELLO"));
}

#[test]
fn builder_match_newline() {
    let re = Regex::builder("a.b").match_newline(true).build().unwrap();
    assert!(re.is_match("a\nb"));
    // an inline (?N) still turns it off
    let re = Regex::builder("(?N)a.b").match_newline(true).build().unwrap();
    assert!(!re.is_match("a\nb"));
}

#[test]
fn builder_reports_compile_errors() {
    let err = Regex::builder("a{3,1}").build().unwrap_err();
    assert_eq!(err.kind(), Some(CompileErrorKind::BraceMinExceedsMax));
    assert!(matches!(err, RegexError::Compile { offset: 1, .. }));
}

// === captures ===

#[test]
fn optional_group_left_unset() {
    let re = Regex::new(r"(\w+)=(\d+)?").unwrap();
    let caps = re.captures("key=").unwrap();
    assert_eq!(caps.get(0).unwrap().as_str(), Some("key="));
    assert_eq!(caps.get(1).unwrap().as_str(), Some("key"));
    assert!(caps.get(2).is_none());
    assert_eq!(caps.len(), 3);
    assert_eq!(re.captures_len(), 2);
}

#[test]
fn captures_iter_reports_missing_groups() {
    let re = Regex::new(r"(\w+)(:\d+)?").unwrap();
    let caps = re.captures("localhost").unwrap();
    let present: Vec<bool> = caps.iter().map(|g| g.is_some()).collect();
    assert_eq!(present, vec![true, true, false]);
    assert_eq!(caps.iter().len(), 3);
}

#[test]
fn captures_top_branch_and_result() {
    let re = Regex::new(r"(\d+)|([a-z]+)").unwrap();
    let caps = re.captures("== abc").unwrap();
    assert_eq!(caps.top_branch(), 1);
    assert_eq!(caps.result().range(), 3..6);
    assert_eq!(caps.get(2).unwrap().as_str(), Some("abc"));
}

#[test]
fn captures_expand() {
    let re = Regex::new(r"(a)(b)").unwrap();
    let caps = re.captures("ab").unwrap();
    assert_eq!(caps.expand(r"&-\1", 100), ("ab-a".to_string(), false));
    assert_eq!(caps.expand(r"\U&\E", 100), ("AB\\E".to_string(), false));
    assert_eq!(caps.expand("&&&", 4), ("abab".to_string(), true));
}

#[test]
fn captures_debug_lists_groups() {
    let re = Regex::new(r"(x)?y").unwrap();
    let caps = re.captures("y").unwrap();
    let text = format!("{:?}", caps);
    assert!(text.contains("None"));
}

// === iteration ===

#[test]
fn find_iter_all_matches() {
    let re = Regex::new(r"\d+").unwrap();
    let found: Vec<&str> = re.find_iter("1 + 22 = 333").filter_map(|m| m.as_str()).collect();
    assert_eq!(found, vec!["1", "22", "333"]);
}

#[test]
fn find_iter_keeps_line_context() {
    let re = Regex::new(r"^\w").unwrap();
    let found: Vec<_> = re.find_iter("ab\ncd\n ef").map(|m| m.start()).collect();
    assert_eq!(found, vec![0, 3]);
}

#[test]
fn find_iter_keeps_word_context() {
    let re = Regex::new(r"<\w").unwrap();
    let found: Vec<_> = re.find_iter("ab cd").map(|m| m.start()).collect();
    assert_eq!(found, vec![0, 3]);
}

#[test]
fn find_iter_lookbehind_sees_previous_match() {
    let re = Regex::new(r"(?<=a)b").unwrap();
    let found: Vec<_> = re.find_iter("abab").map(|m| m.start()).collect();
    assert_eq!(found, vec![1, 3]);
}

#[test]
fn find_iter_empty_matches() {
    let re = Regex::new(r"a*").unwrap();
    let found: Vec<_> = re.find_iter("baa").map(|m| m.range()).collect();
    assert_eq!(found, vec![0..0, 1..3, 3..3]);
}

#[test]
fn find_iter_bytes() {
    let re = Regex::new(r"[\x00-\x7f]+").unwrap();
    let found: Vec<_> = re.find_iter_bytes(b"ab\xffcd").map(|m| m.range()).collect();
    assert_eq!(found, vec![0..2, 3..5]);
}

// === low-level access ===

#[test]
fn exec_span_with_context() {
    let re = Regex::new(r"<let>").unwrap();
    let line = b"xlet let";
    let opts = ExecOptions::new().start(1).end(1).prev_char(Some(b'x'));
    assert!(re.exec(line, &opts).is_none());
    let m = re.exec(line, &ExecOptions::new()).unwrap();
    assert_eq!(m.range(), 5..8);
}

#[test]
fn as_program_exposes_group_count() {
    let re = Regex::new(r"(a)(b)").unwrap();
    assert_eq!(re.as_program().num_parens, 2);
    assert!(format!("{:?}", re).contains("groups: 2"));
}
