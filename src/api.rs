// api.rs - High-level wrapper over compile, execute and substitute.
//
// `Regex` owns a compiled program plus the limits chosen at build time.
// Searches that run into a limit are logged and treated as no match; the
// `try_` entry point surfaces them instead.

use std::ops::Range;

use tracing::warn;

use crate::error::RegexError;
use crate::regcomp::compile;
use crate::regexec::{execute, ExecOptions, MatchResult};
use crate::regint::{MatchLimits, Program, RegexOptions};
use crate::regsub::substitute;

/// A compiled pattern, ready to search any number of texts.
///
/// `Regex` is immutable and can be shared between threads.
///
/// # Examples
///
/// ```
/// use spanrex::api::Regex;
///
/// let re = Regex::new(r"<(fn|let)>").unwrap();
/// assert!(re.is_match("    let x = 1;"));
///
/// let m = re.find("pub fn run()").unwrap();
/// assert_eq!(m.as_str(), Some("fn"));
/// assert_eq!(m.range(), 4..6);
/// ```
pub struct Regex {
    prog: Program,
    limits: MatchLimits,
}

impl Regex {
    /// Compile `pattern` with no options and the default limits.
    pub fn new(pattern: &str) -> Result<Regex, RegexError> {
        Regex::new_bytes(pattern.as_bytes())
    }

    /// Byte-pattern variant of [`Regex::new`].
    pub fn new_bytes(pattern: &[u8]) -> Result<Regex, RegexError> {
        Ok(Regex {
            prog: compile(pattern, RegexOptions::empty())?,
            limits: MatchLimits::default(),
        })
    }

    /// Start a [`RegexBuilder`] for `pattern`.
    pub fn builder(pattern: &str) -> RegexBuilder {
        RegexBuilder::new(pattern)
    }

    /// Run one search with full control over the span and its context.
    ///
    /// Limits not set in `opts` come from the builder. A search aborted by
    /// the recursion or step limit is logged once and reported as no match;
    /// use [`Regex::try_exec`] to observe the error.
    ///
    /// ```
    /// use spanrex::api::Regex;
    /// use spanrex::regexec::ExecOptions;
    ///
    /// let re = Regex::new(r"^let").unwrap();
    /// let line = b"x = 1; let y";
    /// // the span starts mid-line: `^` sees the byte before it
    /// let opts = ExecOptions::new().start(7).prev_char(Some(b' '));
    /// assert!(re.exec(line, &opts).is_none());
    /// let opts = ExecOptions::new().start(7).prev_char(None);
    /// assert_eq!(re.exec(line, &opts).unwrap().start(), 7);
    /// ```
    pub fn exec(&self, text: &[u8], opts: &ExecOptions) -> Option<MatchResult> {
        self.try_exec(text, opts).unwrap_or_else(|err| {
            warn!(
                error = %err,
                text_len = text.len(),
                start = opts.start,
                "regex search aborted"
            );
            None
        })
    }

    /// Like [`Regex::exec`], but returns the abort instead of logging it.
    pub fn try_exec(
        &self,
        text: &[u8],
        opts: &ExecOptions,
    ) -> Result<Option<MatchResult>, RegexError> {
        let mut opts = *opts;
        opts.limits.get_or_insert(self.limits);
        execute(&self.prog, text, &opts)
    }

    /// Leftmost match in `text`.
    pub fn find<'t>(&self, text: &'t str) -> Option<Match<'t>> {
        self.find_bytes(text.as_bytes())
    }

    /// Leftmost match in a byte slice.
    pub fn find_bytes<'t>(&self, text: &'t [u8]) -> Option<Match<'t>> {
        self.exec(text, &ExecOptions::new())
            .map(|m| Match::new(text, m.range()))
    }

    /// True if the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.is_match_bytes(text.as_bytes())
    }

    pub fn is_match_bytes(&self, text: &[u8]) -> bool {
        self.exec(text, &ExecOptions::new()).is_some()
    }

    /// Leftmost match in `text` together with its groups.
    pub fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        self.captures_bytes(text.as_bytes())
    }

    pub fn captures_bytes<'t>(&self, text: &'t [u8]) -> Option<Captures<'t>> {
        self.exec(text, &ExecOptions::new())
            .map(|result| Captures { text, result })
    }

    /// Successive non-overlapping matches, left to right.
    pub fn find_iter<'r, 't>(&'r self, text: &'t str) -> FindIter<'r, 't> {
        FindIter::new(self, text.as_bytes(), true)
    }

    /// Byte-slice variant of [`Regex::find_iter`]; empty matches advance
    /// one byte at a time.
    pub fn find_iter_bytes<'r, 't>(&'r self, text: &'t [u8]) -> FindIter<'r, 't> {
        FindIter::new(self, text, false)
    }

    /// Number of capturing groups, not counting the whole match.
    pub fn captures_len(&self) -> usize {
        self.prog.num_parens
    }

    /// The compiled program, for callers driving [`execute`] directly.
    pub fn as_program(&self) -> &Program {
        &self.prog
    }
}

impl std::fmt::Debug for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Regex")
            .field("groups", &self.prog.num_parens)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

// === RegexBuilder ===

/// Compile-time options and per-search limits for a [`Regex`].
///
/// ```
/// use spanrex::api::Regex;
///
/// let re = Regex::builder(r"todo:.*")
///     .case_insensitive(true)
///     .step_limit(50_000)
///     .build()
///     .unwrap();
/// assert!(re.is_match("// TODO: tidy up"));
/// ```
pub struct RegexBuilder {
    pattern: Vec<u8>,
    options: RegexOptions,
    limits: MatchLimits,
}

impl RegexBuilder {
    pub fn new(pattern: &str) -> Self {
        RegexBuilder {
            pattern: pattern.into(),
            options: RegexOptions::empty(),
            limits: MatchLimits::default(),
        }
    }

    /// Fold ASCII case; a leading `(?i)` does the same.
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.options.set(RegexOptions::IGNORE_CASE, yes);
        self
    }

    /// Let `.` and `\s` match newline; a leading `(?n)` does the same.
    pub fn match_newline(mut self, yes: bool) -> Self {
        self.options.set(RegexOptions::MATCH_NEWLINE, yes);
        self
    }

    /// Maximum interpreter nesting per search.
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.limits.recursion = limit;
        self
    }

    /// Maximum opcode dispatches per search.
    pub fn step_limit(mut self, limit: u64) -> Self {
        self.limits.steps = limit;
        self
    }

    pub fn build(self) -> Result<Regex, RegexError> {
        Ok(Regex {
            prog: compile(&self.pattern, self.options)?,
            limits: self.limits,
        })
    }
}

// === Match ===

/// One matched span of the searched text.
#[derive(Debug, Clone, Copy)]
pub struct Match<'t> {
    text: &'t [u8],
    start: usize,
    end: usize,
}

impl<'t> Match<'t> {
    fn new(text: &'t [u8], span: Range<usize>) -> Self {
        Match {
            text,
            start: span.start,
            end: span.end,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn as_bytes(&self) -> &'t [u8] {
        &self.text[self.range()]
    }

    /// The matched text as a `&str`, or `None` if the span is not valid
    /// UTF-8.
    ///
    /// Matching works on bytes, so a span found in a `&str` can still start
    /// or stop inside a multi-byte character: `.` matches one byte of `é`.
    pub fn as_str(&self) -> Option<&'t str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// === Captures ===

/// Groups of one match, plus the match metadata.
///
/// Index 0 is the whole match; `(...)` groups are numbered from 1 in the
/// order their opening parenthesis appears.
pub struct Captures<'t> {
    text: &'t [u8],
    result: MatchResult,
}

impl<'t> Captures<'t> {
    /// Group `i`, or `None` if it did not take part in the match.
    pub fn get(&self, i: usize) -> Option<Match<'t>> {
        self.result.group(i).map(|span| Match::new(self.text, span))
    }

    /// Slot count, the whole match included.
    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn iter(&self) -> CapturesIter<'_, 't> {
        CapturesIter {
            captures: self,
            slots: 0..self.len(),
        }
    }

    /// Index of the top-level alternative that matched.
    pub fn top_branch(&self) -> usize {
        self.result.top_branch
    }

    /// The raw match result (spans and extents).
    pub fn result(&self) -> &MatchResult {
        &self.result
    }

    /// Expand a replacement template (`&`, `\1`..`\9`, `\u \l \U \L`).
    ///
    /// Returns the expansion and whether it was cut at `max_len` bytes.
    ///
    /// ```
    /// use spanrex::api::Regex;
    ///
    /// let re = Regex::new(r"(\w+)@(\w+)").unwrap();
    /// let caps = re.captures("mail bob@host").unwrap();
    /// assert_eq!(caps.expand(r"\U\2: \u\1", 64), ("HOST: Bob".to_string(), false));
    /// ```
    pub fn expand(&self, template: &str, max_len: usize) -> (String, bool) {
        let (out, truncated) = substitute(&self.result, self.text, template.as_bytes(), max_len);
        (String::from_utf8_lossy(&out).into_owned(), truncated)
    }
}

impl std::fmt::Debug for Captures<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Captures")
            .field("groups", &self.iter().collect::<Vec<_>>())
            .field("top_branch", &self.result.top_branch)
            .finish()
    }
}

// === CapturesIter ===

/// Iterator over the slots of a [`Captures`], in group order.
pub struct CapturesIter<'c, 't> {
    captures: &'c Captures<'t>,
    slots: Range<usize>,
}

impl<'t> Iterator for CapturesIter<'_, 't> {
    type Item = Option<Match<'t>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.next().map(|i| self.captures.get(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.slots.size_hint()
    }
}

impl ExactSizeIterator for CapturesIter<'_, '_> {}

// === FindIter ===

/// Successive matches over one text.
///
/// Each search after the first sees the byte before its start position, so
/// `^` and word boundaries behave as they would in one pass over the text.
pub struct FindIter<'r, 't> {
    regex: &'r Regex,
    text: &'t [u8],
    /// `None` once the text is exhausted.
    next_start: Option<usize>,
    /// Step over whole UTF-8 sequences after an empty match.
    utf8: bool,
}

impl<'r, 't> FindIter<'r, 't> {
    fn new(regex: &'r Regex, text: &'t [u8], utf8: bool) -> Self {
        FindIter {
            regex,
            text,
            next_start: Some(0),
            utf8,
        }
    }

    fn step_past(&self, pos: usize) -> Option<usize> {
        if pos >= self.text.len() {
            return None;
        }
        let mut p = pos + 1;
        if self.utf8 {
            while p < self.text.len() && (self.text[p] & 0xc0) == 0x80 {
                p += 1;
            }
        }
        Some(p)
    }
}

impl<'t> Iterator for FindIter<'_, 't> {
    type Item = Match<'t>;

    fn next(&mut self) -> Option<Match<'t>> {
        let pos = self.next_start?;
        let opts = ExecOptions::new()
            .start(pos)
            .look_behind_to(0)
            .prev_char(pos.checked_sub(1).map(|i| self.text[i]));

        let Some(m) = self.regex.exec(self.text, &opts) else {
            self.next_start = None;
            return None;
        };
        let span = m.range();
        // an empty match would be found again at the same place
        self.next_start = if span.is_empty() {
            self.step_past(span.end)
        } else {
            Some(span.end)
        };
        Some(Match::new(self.text, span))
    }
}
