// default_delimiters.rs - The process-wide delimiter set.
//
// Lives in its own test binary: changing the default affects every search
// in the process that does not pass explicit delimiters.

use spanrex::prelude::*;
use spanrex::regctype::{
    default_word_delimiters, set_default_word_delimiters, DEFAULT_WORD_DELIMITERS,
};

#[test]
fn replacing_the_default_changes_word_boundaries() {
    let start = Regex::new("<b").unwrap();
    let delim = Regex::new(r"\y").unwrap();
    let text = "a.b_c";

    assert_eq!(default_word_delimiters(), Delimiters::default());
    assert_eq!(start.find(text).map(|m| m.start()), Some(2));
    assert_eq!(delim.find(text).map(|m| m.start()), Some(1));

    // `.` joins words, `_` splits them
    set_default_word_delimiters("_");
    assert!(start.find(text).is_none());
    assert_eq!(delim.find(text).map(|m| m.start()), Some(3));
    assert!(!default_word_delimiters().is_delimiter(b'.'));
    assert!(default_word_delimiters().is_delimiter(b'_'));
    assert!(default_word_delimiters().is_delimiter(b' '));
    let ends: Vec<_> = Regex::new("c>|a>")
        .unwrap()
        .find_iter(text)
        .map(|m| m.start())
        .collect();
    assert_eq!(ends, vec![4]);

    // explicit delimiters win over the default
    let opts = ExecOptions::new().delimiters(Delimiters::default());
    assert_eq!(start.exec(text.as_bytes(), &opts).map(|m| m.start()), Some(2));

    set_default_word_delimiters(DEFAULT_WORD_DELIMITERS);
    assert_eq!(default_word_delimiters(), Delimiters::default());
    assert_eq!(start.find(text).map(|m| m.start()), Some(2));
    assert_eq!(delim.find(text).map(|m| m.start()), Some(1));
}
