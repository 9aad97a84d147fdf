// prelude.rs - One-line import for the common types.
//
//! ```
//! use spanrex::prelude::*;
//!
//! let re = Regex::new(r"#\w+").unwrap();
//! let tags: Vec<_> = re.find_iter("#fix #perf").filter_map(|m| m.as_str()).collect();
//! assert_eq!(tags, ["#fix", "#perf"]);
//! ```

pub use crate::api::{Captures, CapturesIter, FindIter, Match, Regex, RegexBuilder};
pub use crate::error::RegexError;
pub use crate::regctype::Delimiters;
pub use crate::regerror::CompileErrorKind;
pub use crate::regexec::{Direction, ExecOptions, MatchResult};
pub use crate::regint::{MatchLimits, RegexOptions};
