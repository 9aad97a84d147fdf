//! # spanrex
//!
//! Regex compiler and backtracking matcher for editor search and syntax
//! highlighting. Patterns compile to a compact program of operations; the
//! matcher runs it over a byte span with caller-supplied edge context and
//! reports captures, the top-level alternative that matched, and how far
//! lookaround read on either side of the match.
//!
//! ## Searching
//!
//! ```rust
//! use spanrex::prelude::*;
//!
//! let re = Regex::new(r"0x[0-9a-f]+").unwrap();
//! let m = re.find("mov eax, 0x1f ; load").unwrap();
//! assert_eq!(m.as_str(), Some("0x1f"));
//! assert_eq!(m.range(), 9..13);
//! ```
//!
//! Options and limits go through [`RegexBuilder`](api::RegexBuilder):
//!
//! ```rust
//! use spanrex::prelude::*;
//!
//! let re = Regex::builder(r"<select>")
//!     .case_insensitive(true)
//!     .build()
//!     .unwrap();
//! assert!(re.is_match("SELECT * FROM t"));
//! assert!(!re.is_match("selected"));
//! ```
//!
//! ## Span Matching
//!
//! Highlighters match one span at a time and tell the matcher what lies
//! around it:
//!
//! ```rust
//! use spanrex::regcomp::compile;
//! use spanrex::regexec::{execute, ExecOptions};
//! use spanrex::regint::RegexOptions;
//!
//! let prog = compile(br"(?<=fn )\w+|let", RegexOptions::empty()).unwrap();
//! let text = b"pub fn main() { let x = 1; }";
//! let m = execute(&prog, text, &ExecOptions::new().start(4).look_behind_to(0))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(m.range(), 7..11);
//! assert_eq!(m.top_branch, 0);
//! assert_eq!(m.extent_backward, 4);
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`regparse`] | Pattern parser |
//! | [`regparse_types`] | Syntax tree and parse environment |
//! | [`regcomp`] | Tree-to-program compiler |
//! | [`regexec`] | Backtracking executor |
//! | [`regint`] | Internal types, opcodes and limits |
//! | [`regctype`] | Byte classes and word delimiters |
//! | [`regsub`] | Replacement templates |
//! | [`regerror`] | Error kinds and messages |
//! | [`api`] | `Regex`, `RegexBuilder`, `Captures`, `FindIter` |
//! | [`error`] | `RegexError` |

pub mod api;
pub mod error;
pub mod prelude;
pub mod regcomp;
pub mod regctype;
pub mod regerror;
pub mod regexec;
pub mod regint;
pub mod regparse;
pub mod regparse_types;
pub mod regsub;

#[cfg(test)]
mod test_log;
