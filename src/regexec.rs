// regexec.rs - Backtracking interpreter and candidate search.
//
// `execute` validates the caller's offsets, picks candidate start
// positions (line starts, positions holding the required first byte, or
// every position) and runs the interpreter at each one until a match is
// found or the range is exhausted. The interpreter keeps its choice points
// and undo records on a heap stack, so the recursion limit bounds that
// stack rather than the thread's call stack.

use std::ops::Range;

use memchr::{memchr, memrchr};
use smallvec::{smallvec, SmallVec};

use crate::error::RegexError;
use crate::regctype::{default_word_delimiters, match_ctype, Delimiters};
use crate::regint::*;

// ============================================================================
// Public types
// ============================================================================

/// Order in which candidate start positions are tried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Left to right; the first match is the left-most.
    #[default]
    Forward,
    /// Right to left; the first match is the right-most.
    Backward,
}

/// Per-call parameters of [`execute`].
///
/// Offsets are byte indices into the text. `None` fields take their
/// defaults: `end` and `match_to` the text length, `look_behind_to` the
/// start, `delimiters` the process-wide default set, `limits` the
/// default [`MatchLimits`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecOptions {
    /// First candidate start position.
    pub start: usize,
    /// Last candidate start position (inclusive).
    pub end: Option<usize>,
    pub direction: Direction,
    /// Byte before `start`; `None` means the start of a buffer.
    pub prev_char: Option<u8>,
    /// Byte after `match_to`; `None` means the end of a buffer.
    pub succ_char: Option<u8>,
    pub delimiters: Option<Delimiters>,
    /// Lowest position a lookbehind may read.
    pub look_behind_to: Option<usize>,
    /// Logical end of the text. Matches never extend past it; lookahead may.
    pub match_to: Option<usize>,
    pub limits: Option<MatchLimits>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn end(mut self, end: usize) -> Self {
        self.end = Some(end);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Shorthand for `direction(Direction::Backward)`.
    pub fn backward(self) -> Self {
        self.direction(Direction::Backward)
    }

    pub fn prev_char(mut self, c: Option<u8>) -> Self {
        self.prev_char = c;
        self
    }

    pub fn succ_char(mut self, c: Option<u8>) -> Self {
        self.succ_char = c;
        self
    }

    pub fn delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = Some(delimiters);
        self
    }

    pub fn look_behind_to(mut self, pos: usize) -> Self {
        self.look_behind_to = Some(pos);
        self
    }

    pub fn match_to(mut self, pos: usize) -> Self {
        self.match_to = Some(pos);
        self
    }

    pub fn limits(mut self, limits: MatchLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Outcome of a successful [`execute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    /// Group spans; index 0 is the whole match. Groups that did not take
    /// part in the match are `None`.
    pub captures: SmallVec<[Option<Range<usize>>; 10]>,
    /// Index of the top-level alternative that matched (0 without `|`).
    pub top_branch: usize,
    /// One past the furthest position the match or its lookaheads examined.
    pub extent_forward: usize,
    /// Lowest position the match or its lookbehinds examined.
    pub extent_backward: usize,
}

impl MatchResult {
    pub fn start(&self) -> usize {
        self.range().start
    }

    pub fn end(&self) -> usize {
        self.range().end
    }

    pub fn range(&self) -> Range<usize> {
        self.captures
            .first()
            .cloned()
            .flatten()
            .unwrap_or(0..0)
    }

    pub fn group(&self, i: usize) -> Option<Range<usize>> {
        self.captures.get(i).cloned().flatten()
    }

    /// Number of capture slots, group 0 included.
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

// ============================================================================
// Backtrack stack
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MatchAbort {
    RecursionLimit,
    StepLimit,
    Corrupt,
}

impl From<MatchAbort> for RegexError {
    fn from(abort: MatchAbort) -> Self {
        match abort {
            MatchAbort::RecursionLimit => RegexError::RecursionLimitOver,
            MatchAbort::StepLimit => RegexError::StepLimitOver,
            MatchAbort::Corrupt => RegexError::InternalBug {
                message: "malformed program".to_string(),
            },
        }
    }
}

type Verdict = Result<bool, MatchAbort>;

/// What the interpreter does next.
enum Flow {
    /// Continue at an op index with the cursor at a text position.
    Goto(usize, usize),
    /// Resume the latest frame on the stack.
    Fail,
    Matched,
}

/// Entry of the backtrack stack.
///
/// Choice points resume a path that was not taken yet; undo records put
/// back a value the current path overwrote.
#[derive(Clone, Copy, Debug)]
enum Frame {
    /// Untried alternatives of the Branch at `branch`, from `alt` on.
    Alt { branch: usize, alt: usize, pos: usize },
    /// SIMPLE repeat at `scan` that last went on after `n` iterations.
    Repeat { scan: usize, pos: usize, n: usize },
    MemStart { num: usize, old: Option<usize> },
    MemEnd { num: usize, old: Option<usize> },
    Counter { id: usize, old: u32 },
    /// A lookaround whose body is still running.
    Look(LookFrame),
}

impl Frame {
    fn is_undo(&self) -> bool {
        matches!(
            self,
            Frame::MemStart { .. } | Frame::MemEnd { .. } | Frame::Counter { .. }
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct LookFrame {
    /// The opening op.
    open: usize,
    pos: usize,
    /// Next lookbehind distance to try.
    next_off: usize,
    // bounds to put back when the body finishes
    eos: usize,
    limit: usize,
    behind_target: Option<usize>,
}

/// A decoded SIMPLE repeat.
struct SimpleRepeat<'a> {
    operand: &'a Operation,
    next: usize,
    min: usize,
    max: usize,
    greedy: bool,
    /// First byte of a literal right after the repeat.
    follow: Option<u8>,
}

/// Outcome of a lookaround whose body cannot match at `pos`.
fn look_exhausted(open: &Operation, pos: usize) -> Result<Flow, MatchAbort> {
    if matches!(open.opcode, OpCode::NegAheadOpen | OpCode::NegBehindOpen) {
        let next = open.next.target().ok_or(MatchAbort::Corrupt)?;
        Ok(Flow::Goto(next, pos))
    } else {
        Ok(Flow::Fail)
    }
}

type Slots = SmallVec<[Option<usize>; 10]>;

struct MatchArg<'a> {
    prog: &'a Program,
    text: &'a [u8],
    delims: Delimiters,
    /// First candidate position; `prev_char` describes the byte before it.
    begin: usize,
    look_behind_to: usize,
    /// Logical end; `succ_char` describes the byte at it.
    eos: usize,
    /// Nothing is consumed at or past this position.
    limit: usize,
    prev_char: Option<u8>,
    succ_char: Option<u8>,
    match_end: usize,
    mem_start: Slots,
    mem_end: Slots,
    counters: SmallVec<[u32; 4]>,
    stack: Vec<Frame>,
    steps: u64,
    limits: MatchLimits,
    extent_fw: usize,
    extent_bw: usize,
    behind_target: Option<usize>,
    top_branch: usize,
}

impl<'a> MatchArg<'a> {
    fn new(
        prog: &'a Program,
        text: &'a [u8],
        opts: &ExecOptions,
        match_to: usize,
        look_behind_to: usize,
    ) -> Self {
        let slots = prog.num_parens + 1;
        MatchArg {
            prog,
            text,
            delims: opts.delimiters.unwrap_or_else(default_word_delimiters),
            begin: opts.start,
            look_behind_to,
            eos: match_to,
            limit: match_to,
            prev_char: opts.prev_char,
            succ_char: opts.succ_char,
            match_end: opts.start,
            mem_start: smallvec![None; slots],
            mem_end: smallvec![None; slots],
            counters: smallvec![0; prog.num_braces],
            stack: Vec::new(),
            steps: 0,
            limits: opts.limits.unwrap_or_default(),
            extent_fw: opts.start,
            extent_bw: opts.start,
            behind_target: None,
            top_branch: 0,
        }
    }

    #[inline]
    fn tick(&mut self) -> Result<(), MatchAbort> {
        self.steps += 1;
        if self.steps > self.limits.steps {
            return Err(MatchAbort::StepLimit);
        }
        Ok(())
    }

    #[inline]
    fn peek(&self, pos: usize) -> Option<u8> {
        if pos < self.limit {
            self.text.get(pos).copied()
        } else {
            None
        }
    }

    /// Push a frame; the stack depth is what the recursion limit bounds.
    #[inline]
    fn push(&mut self, frame: Frame) -> Result<(), MatchAbort> {
        if self.stack.len() >= self.limits.recursion {
            return Err(MatchAbort::RecursionLimit);
        }
        self.stack.push(frame);
        Ok(())
    }

    fn undo(&mut self, frame: Frame) {
        match frame {
            Frame::MemStart { num, old } => self.mem_start[num] = old,
            Frame::MemEnd { num, old } => self.mem_end[num] = old,
            Frame::Counter { id, old } => self.counters[id] = old,
            _ => {}
        }
    }

    /// Pop every frame above `depth`, applying undo records on the way.
    fn unwind_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(frame) = self.stack.pop() {
                self.undo(frame);
            }
        }
    }

    // --- context tests ---

    fn at_bol(&self, pos: usize) -> bool {
        if pos == self.begin {
            self.prev_char.map_or(true, |c| c == b'\n')
        } else if pos == 0 {
            true
        } else {
            self.text[pos - 1] == b'\n'
        }
    }

    fn at_eol(&self, pos: usize) -> bool {
        if pos >= self.eos {
            self.succ_char.map_or(true, |c| c == b'\n')
        } else {
            self.text[pos] == b'\n'
        }
    }

    fn prev_is_delim(&self, pos: usize) -> bool {
        if pos == self.begin {
            self.prev_char.map_or(true, |c| self.delims.is_delimiter(c))
        } else if pos == 0 {
            true
        } else {
            self.delims.is_delimiter(self.text[pos - 1])
        }
    }

    fn cur_is_delim(&self, pos: usize) -> bool {
        if pos >= self.eos {
            self.succ_char.map_or(true, |c| self.delims.is_delimiter(c))
        } else {
            self.delims.is_delimiter(self.text[pos])
        }
    }

    fn test_simple(&self, op: &Operation, c: u8) -> Verdict {
        match (op.opcode, &op.payload) {
            (OpCode::Exactly, OperationPayload::Str { s }) => Ok(s.first() == Some(&c)),
            (OpCode::SimilarIc, OperationPayload::Str { s }) => {
                Ok(s.first() == Some(&c.to_ascii_lowercase()))
            }
            (OpCode::AnyOf, OperationPayload::CClass { bsp }) => Ok(bitset_at(bsp, c as usize)),
            (OpCode::AnyBut, OperationPayload::CClass { bsp }) => {
                Ok(!bitset_at(bsp, c as usize))
            }
            (OpCode::IsDelim, _) => Ok(self.delims.is_delimiter(c)),
            (OpCode::NotDelim, _) => Ok(!self.delims.is_delimiter(c)),
            (opcode, _) => match_ctype(opcode, c).ok_or(MatchAbort::Corrupt),
        }
    }

    // ========================================================================
    // Interpreter
    // ========================================================================

    /// Run the program from `scan` with the cursor at `pos`, backtracking
    /// through the frame stack until `End` is reached or no frame is left.
    fn run(&mut self, scan: usize, pos: usize) -> Verdict {
        let mut flow = Flow::Goto(scan, pos);
        loop {
            flow = match flow {
                Flow::Goto(scan, pos) => self.step(scan, pos)?,
                Flow::Fail => match self.stack.pop() {
                    Some(frame) => self.resume(frame)?,
                    None => return Ok(false),
                },
                Flow::Matched => return Ok(true),
            };
        }
    }

    /// Execute ops along one path until it fails, forks or ends.
    fn step(&mut self, mut scan: usize, mut pos: usize) -> Result<Flow, MatchAbort> {
        let prog = self.prog;
        loop {
            self.tick()?;
            let op = prog.ops.get(scan).ok_or(MatchAbort::Corrupt)?;
            match op.opcode {
                OpCode::End => {
                    self.match_end = pos;
                    return Ok(Flow::Matched);
                }
                OpCode::Bol => {
                    if !self.at_bol(pos) {
                        return Ok(Flow::Fail);
                    }
                }
                OpCode::Eol => {
                    if !self.at_eol(pos) {
                        return Ok(Flow::Fail);
                    }
                }
                OpCode::Boundary => {
                    if self.prev_is_delim(pos) == self.cur_is_delim(pos) {
                        return Ok(Flow::Fail);
                    }
                }
                OpCode::NotBoundary => {
                    if self.prev_is_delim(pos) != self.cur_is_delim(pos) {
                        return Ok(Flow::Fail);
                    }
                }
                OpCode::Exactly | OpCode::SimilarIc => {
                    let OperationPayload::Str { s } = &op.payload else {
                        return Err(MatchAbort::Corrupt);
                    };
                    let stop = pos + s.len();
                    if stop > self.limit || stop > self.text.len() {
                        return Ok(Flow::Fail);
                    }
                    let window = &self.text[pos..stop];
                    let hit = if op.opcode == OpCode::SimilarIc {
                        window
                            .iter()
                            .zip(s)
                            .all(|(&t, &p)| t.to_ascii_lowercase() == p)
                    } else {
                        window == s.as_slice()
                    };
                    if !hit {
                        return Ok(Flow::Fail);
                    }
                    pos = stop;
                }
                opcode if opcode.is_simple() => match self.peek(pos) {
                    Some(c) if self.test_simple(op, c)? => pos += 1,
                    _ => return Ok(Flow::Fail),
                },
                opcode if opcode.is_simple_repeat() => {
                    return self.enter_simple_repeat(scan, pos);
                }
                OpCode::Branch => return self.take_alt(scan, 0, pos),
                OpCode::Back | OpCode::Nothing => {}
                OpCode::InitCount | OpCode::IncCount => {
                    let OperationPayload::Counter { id } = op.payload else {
                        return Err(MatchAbort::Corrupt);
                    };
                    let slot = self.counters.get_mut(id).ok_or(MatchAbort::Corrupt)?;
                    let old = *slot;
                    *slot = if op.opcode == OpCode::InitCount {
                        0
                    } else {
                        old.saturating_add(1)
                    };
                    self.push(Frame::Counter { id, old })?;
                }
                OpCode::TestCount => {
                    let OperationPayload::TestCount { id, bound, body } = op.payload else {
                        return Err(MatchAbort::Corrupt);
                    };
                    let count = *self.counters.get(id).ok_or(MatchAbort::Corrupt)?;
                    if count < bound {
                        scan = body;
                        continue;
                    }
                }
                OpCode::BackRef | OpCode::BackRefIc => {
                    let OperationPayload::BackRef { num } = op.payload else {
                        return Err(MatchAbort::Corrupt);
                    };
                    match self.match_backref(num, pos, op.opcode == OpCode::BackRefIc) {
                        Some(p) => pos = p,
                        None => return Ok(Flow::Fail),
                    }
                }
                OpCode::Open | OpCode::Close => {
                    let OperationPayload::Memory { num } = op.payload else {
                        return Err(MatchAbort::Corrupt);
                    };
                    let frame = if op.opcode == OpCode::Open {
                        let slot = self.mem_start.get_mut(num).ok_or(MatchAbort::Corrupt)?;
                        Frame::MemStart {
                            num,
                            old: slot.replace(pos),
                        }
                    } else {
                        let slot = self.mem_end.get_mut(num).ok_or(MatchAbort::Corrupt)?;
                        Frame::MemEnd {
                            num,
                            old: slot.replace(pos),
                        }
                    };
                    self.push(frame)?;
                }
                OpCode::PosAheadOpen | OpCode::NegAheadOpen => {
                    let OperationPayload::LookAhead { body } = op.payload else {
                        return Err(MatchAbort::Corrupt);
                    };
                    self.push(Frame::Look(LookFrame {
                        open: scan,
                        pos,
                        next_off: 0,
                        eos: self.eos,
                        limit: self.limit,
                        behind_target: self.behind_target,
                    }))?;
                    self.eos = self.text.len();
                    self.limit = self.text.len();
                    scan = body;
                    continue;
                }
                OpCode::LookAheadClose => {
                    self.extent_fw = self.extent_fw.max(pos);
                    return self.close_look();
                }
                OpCode::PosBehindOpen | OpCode::NegBehindOpen => {
                    return self.enter_look_behind(scan, pos, None);
                }
                OpCode::LookBehindClose => {
                    if self.behind_target != Some(pos) {
                        return Ok(Flow::Fail);
                    }
                    return self.close_look();
                }
                _ => return Err(MatchAbort::Corrupt),
            }
            scan = op.next.target().ok_or(MatchAbort::Corrupt)?;
        }
    }

    /// Pick up a frame popped while backtracking.
    fn resume(&mut self, frame: Frame) -> Result<Flow, MatchAbort> {
        match frame {
            Frame::Alt { branch, alt, pos } => self.take_alt(branch, alt, pos),
            Frame::Repeat { scan, pos, n } => {
                let rep = self.simple_repeat(scan)?;
                match self.next_count(&rep, pos, n)? {
                    Some(n) => self.continue_repeat(scan, &rep, pos, n),
                    None => Ok(Flow::Fail),
                }
            }
            // the body ran out of ways to match
            Frame::Look(look) => {
                self.restore_bounds(&look);
                let prog = self.prog;
                let op = prog.ops.get(look.open).ok_or(MatchAbort::Corrupt)?;
                match op.opcode {
                    OpCode::PosBehindOpen | OpCode::NegBehindOpen => {
                        self.enter_look_behind(look.open, look.pos, Some(look.next_off))
                    }
                    _ => look_exhausted(op, look.pos),
                }
            }
            undo => {
                self.undo(undo);
                Ok(Flow::Fail)
            }
        }
    }

    fn take_alt(&mut self, branch: usize, alt: usize, pos: usize) -> Result<Flow, MatchAbort> {
        let prog = self.prog;
        let op = prog.ops.get(branch).ok_or(MatchAbort::Corrupt)?;
        let OperationPayload::Branch { alts, top_level } = &op.payload else {
            return Err(MatchAbort::Corrupt);
        };
        let target = *alts.get(alt).ok_or(MatchAbort::Corrupt)?;
        if alt + 1 < alts.len() {
            self.push(Frame::Alt {
                branch,
                alt: alt + 1,
                pos,
            })?;
        }
        if *top_level {
            self.top_branch = alt;
        }
        Ok(Flow::Goto(target, pos))
    }

    fn simple_repeat(&self, scan: usize) -> Result<SimpleRepeat<'a>, MatchAbort> {
        let prog = self.prog;
        let op = prog.ops.get(scan).ok_or(MatchAbort::Corrupt)?;
        let operand = prog.ops.get(scan + 1).ok_or(MatchAbort::Corrupt)?;
        let next = op.next.target().ok_or(MatchAbort::Corrupt)?;
        let (min, max, greedy) = match (op.opcode, &op.payload) {
            (OpCode::Star, _) => (0, REG_INFINITY, true),
            (OpCode::LazyStar, _) => (0, REG_INFINITY, false),
            (OpCode::Plus, _) => (1, REG_INFINITY, true),
            (OpCode::LazyPlus, _) => (1, REG_INFINITY, false),
            (OpCode::Question, _) => (0, 1, true),
            (OpCode::LazyQuestion, _) => (0, 1, false),
            (OpCode::Brace, OperationPayload::Repeat { min, max }) => (*min, *max, true),
            (OpCode::LazyBrace, OperationPayload::Repeat { min, max }) => (*min, *max, false),
            _ => return Err(MatchAbort::Corrupt),
        };

        // a following literal lets us skip counts that cannot continue
        let follow = match prog.ops.get(next) {
            Some(Operation {
                opcode: OpCode::Exactly,
                payload: OperationPayload::Str { s },
                ..
            }) => s.first().copied(),
            _ => None,
        };
        Ok(SimpleRepeat {
            operand,
            next,
            min: min as usize,
            max: max as usize,
            greedy,
            follow,
        })
    }

    fn enter_simple_repeat(&mut self, scan: usize, pos: usize) -> Result<Flow, MatchAbort> {
        let rep = self.simple_repeat(scan)?;
        let mut n = 0;
        let upto = if rep.greedy { rep.max } else { rep.min };
        while n < upto {
            match self.peek(pos + n) {
                Some(c) if self.test_simple(rep.operand, c)? => n += 1,
                _ => break,
            }
        }
        if n < rep.min {
            return Ok(Flow::Fail);
        }
        self.continue_repeat(scan, &rep, pos, n)
    }

    /// Go on after the first count from `n` on that the follow byte allows.
    fn continue_repeat(
        &mut self,
        scan: usize,
        rep: &SimpleRepeat<'a>,
        pos: usize,
        mut n: usize,
    ) -> Result<Flow, MatchAbort> {
        loop {
            if rep.follow.map_or(true, |b| self.peek(pos + n) == Some(b)) {
                self.push(Frame::Repeat { scan, pos, n })?;
                return Ok(Flow::Goto(rep.next, pos + n));
            }
            match self.next_count(rep, pos, n)? {
                Some(m) => n = m,
                None => return Ok(Flow::Fail),
            }
        }
    }

    /// The count to try after `n`: one fewer when greedy, one more when lazy.
    fn next_count(
        &self,
        rep: &SimpleRepeat<'a>,
        pos: usize,
        n: usize,
    ) -> Result<Option<usize>, MatchAbort> {
        if rep.greedy {
            return Ok((n > rep.min).then(|| n - 1));
        }
        if n >= rep.max {
            return Ok(None);
        }
        match self.peek(pos + n) {
            Some(c) if self.test_simple(rep.operand, c)? => Ok(Some(n + 1)),
            _ => Ok(None),
        }
    }

    /// Position after the text of group `num`, or `None` on mismatch.
    /// A group that has not matched yet matches nothing.
    fn match_backref(&self, num: usize, pos: usize, ignore_case: bool) -> Option<usize> {
        let s = (*self.mem_start.get(num)?)?;
        let e = (*self.mem_end.get(num)?)?;
        if e < s {
            return None;
        }
        let stop = pos + (e - s);
        if stop > self.limit || stop > self.text.len() {
            return None;
        }
        let (want, have) = (&self.text[s..e], &self.text[pos..stop]);
        let hit = if ignore_case {
            want.eq_ignore_ascii_case(have)
        } else {
            want == have
        };
        hit.then_some(stop)
    }

    // --- lookaround ---

    fn restore_bounds(&mut self, look: &LookFrame) {
        self.eos = look.eos;
        self.limit = look.limit;
        self.behind_target = look.behind_target;
    }

    /// Start the lookbehind at `open` from the first distance, or from
    /// `from_off` when an earlier distance failed.
    fn enter_look_behind(
        &mut self,
        open: usize,
        pos: usize,
        from_off: Option<usize>,
    ) -> Result<Flow, MatchAbort> {
        let prog = self.prog;
        let op = prog.ops.get(open).ok_or(MatchAbort::Corrupt)?;
        let OperationPayload::LookBehind { body, lower, upper } = op.payload else {
            return Err(MatchAbort::Corrupt);
        };
        let off = from_off.unwrap_or(lower as usize);
        let room = pos.saturating_sub(self.look_behind_to);
        if off > (upper as usize).min(room) {
            return look_exhausted(op, pos);
        }
        self.push(Frame::Look(LookFrame {
            open,
            pos,
            next_off: off + 1,
            eos: self.eos,
            limit: self.limit,
            behind_target: self.behind_target,
        }))?;
        let from = pos - off;
        self.extent_bw = self.extent_bw.min(from);
        self.limit = pos;
        self.behind_target = Some(pos);
        Ok(Flow::Goto(body, from))
    }

    /// The body of the innermost open lookaround matched.
    ///
    /// A positive lookaround drops the body's choice points but keeps its
    /// captures; a negative one undoes the body and fails.
    fn close_look(&mut self) -> Result<Flow, MatchAbort> {
        let mark = self
            .stack
            .iter()
            .rposition(|f| matches!(f, Frame::Look(_)))
            .ok_or(MatchAbort::Corrupt)?;
        let Frame::Look(look) = self.stack[mark] else {
            return Err(MatchAbort::Corrupt);
        };
        self.restore_bounds(&look);
        let prog = self.prog;
        let op = prog.ops.get(look.open).ok_or(MatchAbort::Corrupt)?;
        if matches!(op.opcode, OpCode::NegAheadOpen | OpCode::NegBehindOpen) {
            self.unwind_to(mark);
            return Ok(Flow::Fail);
        }

        let mut keep = mark;
        for i in mark + 1..self.stack.len() {
            if self.stack[i].is_undo() {
                self.stack[keep] = self.stack[i];
                keep += 1;
            }
        }
        self.stack.truncate(keep);
        let next = op.next.target().ok_or(MatchAbort::Corrupt)?;
        Ok(Flow::Goto(next, look.pos))
    }

    // ========================================================================
    // Candidate search
    // ========================================================================

    fn attempt(&mut self, p: usize) -> Verdict {
        self.mem_start.iter_mut().for_each(|s| *s = None);
        self.mem_end.iter_mut().for_each(|s| *s = None);
        self.counters.iter_mut().for_each(|c| *c = 0);
        self.stack.clear();
        self.top_branch = 0;
        self.extent_fw = p;
        self.extent_bw = p;
        self.behind_target = None;
        self.run(self.prog.start, p)
    }

    fn search_forward(&mut self, start: usize, end: usize) -> Result<Option<usize>, MatchAbort> {
        if self.prog.anchor_bol {
            let mut p = start;
            loop {
                if self.at_bol(p) && self.attempt(p)? {
                    return Ok(Some(p));
                }
                match memchr(b'\n', &self.text[p..end]) {
                    Some(i) => p += i + 1,
                    None => return Ok(None),
                }
            }
        }

        if let Some(first) = self.prog.match_start {
            let stop = (end + 1).min(self.limit);
            let mut p = start;
            while p < stop {
                match memchr(first, &self.text[p..stop]) {
                    Some(i) => {
                        p += i;
                        if self.attempt(p)? {
                            return Ok(Some(p));
                        }
                        p += 1;
                    }
                    None => break,
                }
            }
            return Ok(None);
        }

        for p in start..=end {
            if self.attempt(p)? {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }

    fn search_backward(&mut self, start: usize, end: usize) -> Result<Option<usize>, MatchAbort> {
        if self.prog.anchor_bol {
            let mut hi = end;
            loop {
                let p = match memrchr(b'\n', &self.text[start..hi]) {
                    Some(i) => start + i + 1,
                    None => start,
                };
                if (p > start || self.at_bol(start)) && self.attempt(p)? {
                    return Ok(Some(p));
                }
                if p == start {
                    return Ok(None);
                }
                hi = p - 1;
            }
        }

        if let Some(first) = self.prog.match_start {
            let mut hi = (end + 1).min(self.limit);
            while hi > start {
                match memrchr(first, &self.text[start..hi]) {
                    Some(i) => {
                        let p = start + i;
                        if self.attempt(p)? {
                            return Ok(Some(p));
                        }
                        hi = p;
                    }
                    None => break,
                }
            }
            return Ok(None);
        }

        for p in (start..=end).rev() {
            if self.attempt(p)? {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }

    fn build_result(&self, p: usize) -> MatchResult {
        let mut captures: SmallVec<[Option<Range<usize>>; 10]> =
            SmallVec::with_capacity(self.prog.num_parens + 1);
        captures.push(Some(p..self.match_end));
        for i in 1..=self.prog.num_parens {
            let span = match (self.mem_start[i], self.mem_end[i]) {
                (Some(s), Some(e)) if s <= e => Some(s..e),
                _ => None,
            };
            captures.push(span);
        }
        MatchResult {
            captures,
            top_branch: self.top_branch,
            extent_forward: self.extent_fw.max(self.match_end),
            extent_backward: self.extent_bw.min(p),
        }
    }
}

// ============================================================================
// Entry point: execute
// ============================================================================

/// Search `text` for a match of `prog`.
///
/// Returns `Ok(None)` when no candidate position matches. Offsets that are
/// out of range or out of order are `InvalidArgument`; a search that runs
/// into the recursion or step limit fails as a whole.
pub fn execute(
    prog: &Program,
    text: &[u8],
    opts: &ExecOptions,
) -> Result<Option<MatchResult>, RegexError> {
    let len = text.len();
    let match_to = opts.match_to.unwrap_or(len);
    if match_to > len || opts.start > match_to {
        return Err(RegexError::InvalidArgument);
    }
    let look_behind_to = opts.look_behind_to.unwrap_or(opts.start);
    if look_behind_to > opts.start {
        return Err(RegexError::InvalidArgument);
    }
    let end = opts.end.unwrap_or(match_to);
    if end < opts.start || end > len {
        return Err(RegexError::InvalidArgument);
    }
    let end = end.min(match_to);

    let mut msa = MatchArg::new(prog, text, opts, match_to, look_behind_to);
    let found = match opts.direction {
        Direction::Forward => msa.search_forward(opts.start, end),
        Direction::Backward => msa.search_backward(opts.start, end),
    };
    match found {
        Ok(Some(p)) => Ok(Some(msa.build_result(p))),
        Ok(None) => Ok(None),
        Err(abort) => Err(abort.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regcomp::compile;

    fn prog(pattern: &str) -> Program {
        compile(pattern.as_bytes(), RegexOptions::empty()).unwrap()
    }

    fn exec(pattern: &str, text: &str, opts: &ExecOptions) -> Option<MatchResult> {
        execute(&prog(pattern), text.as_bytes(), opts).unwrap()
    }

    fn span(pattern: &str, text: &str) -> Option<Range<usize>> {
        exec(pattern, text, &ExecOptions::new()).map(|m| m.range())
    }

    #[test]
    fn literal_and_classes() {
        assert_eq!(span("abc", "xxabc"), Some(2..5));
        assert_eq!(span("a.c", "a\nc abc"), Some(4..7));
        assert_eq!(span("(?n)a.c", "a\nc"), Some(0..3));
        assert_eq!(span("[0-9]+", "ab123c"), Some(2..5));
        assert_eq!(span("[^a]", "aab"), Some(2..3));
        assert_eq!(span("(?i)HeLLo", "say hello"), Some(4..9));
        assert_eq!(span("abd", "abc"), None);
    }

    #[test]
    fn simple_repeats() {
        assert_eq!(span("a+", "baaa"), Some(1..4));
        assert_eq!(span("a+?", "aaa"), Some(0..1));
        assert_eq!(span("a{2,3}", "aaaa"), Some(0..3));
        assert_eq!(span("a{2,3}?", "aaaa"), Some(0..2));
        assert_eq!(span("a*ab", "aaab"), Some(0..4));
        assert_eq!(span("x?y", "y"), Some(0..1));
        assert_eq!(span("a*?b", "aaab"), Some(0..4));
    }

    #[test]
    fn counted_repeats() {
        assert_eq!(span("(ab){2,3}", "abababab"), Some(0..6));
        assert_eq!(span("(ab){2}", "ababab"), Some(0..4));
        assert_eq!(span("(ab){2,}", "abababx"), Some(0..6));
        assert_eq!(span("(ab){0,2}c", "ababc"), Some(0..5));
        assert_eq!(span("(ab){1,3}?", "ababab"), Some(0..2));
        assert_eq!(span("(ab){3,4}", "abab"), None);
        assert_eq!(span("((ab){2}c){2}", "ababcababc"), Some(0..10));
    }

    #[test]
    fn captures_keep_last_iteration() {
        let m = exec("(a|b)*c", "abc", &ExecOptions::new()).unwrap();
        assert_eq!(m.range(), 0..3);
        assert_eq!(m.group(1), Some(1..2));
        let m = exec("(x)?y", "y", &ExecOptions::new()).unwrap();
        assert_eq!(m.group(1), None);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn backreferences() {
        assert_eq!(span(r"(a+)b\1", "aabaa"), Some(0..5));
        assert_eq!(span(r"(a+)b\1", "aaba"), Some(1..4));
        assert_eq!(span(r"(?i)(ab)\1", "abAB"), Some(0..4));
        assert_eq!(span(r"(ab)\1", "abAB"), None);
        // a group that did not take part matches nothing
        assert_eq!(span(r"(a)?b\1", "b"), None);
    }

    #[test]
    fn lookaround() {
        let m = exec("a(?=b)", "acab", &ExecOptions::new()).unwrap();
        assert_eq!(m.range(), 2..3);
        assert_eq!(m.extent_forward, 4);
        assert_eq!(span("a(?!b)", "abac"), Some(2..3));
        let m = exec("(?<=ab)c", "xabc", &ExecOptions::new()).unwrap();
        assert_eq!(m.range(), 3..4);
        assert_eq!(m.extent_backward, 1);
        assert_eq!(span("(?<!a)b", "abcb"), Some(3..4));
        assert_eq!(span("(?<=a|bc)d", "bcd"), Some(2..3));
        assert_eq!(span("(?<=^)a", "a"), Some(0..1));
    }

    #[test]
    fn lookahead_captures_are_dropped_on_failure() {
        let m = exec("(?!(a)b)(a)c", "ac", &ExecOptions::new()).unwrap();
        assert_eq!(m.group(1), None);
        assert_eq!(m.group(2), Some(0..1));
    }

    #[test]
    fn lookaround_keeps_body_captures() {
        let m = exec("(?=(a+))a", "aab", &ExecOptions::new()).unwrap();
        assert_eq!(m.range(), 0..1);
        assert_eq!(m.group(1), Some(0..2));
        // the body is not re-entered when the rest fails
        assert_eq!(span("(?=(a+))\\1b", "aab"), Some(0..3));
        assert_eq!(span("(?=(a+))\\1a", "aaa"), None);
        let m = exec("(?<=(b|ab))c", "abc", &ExecOptions::new()).unwrap();
        assert_eq!(m.group(1), Some(1..2));
    }

    #[test]
    fn top_branch_index() {
        let m = exec("ab|cd|ef", "xxef", &ExecOptions::new()).unwrap();
        assert_eq!(m.top_branch, 2);
        let m = exec("ab|cd|ef", "ab", &ExecOptions::new()).unwrap();
        assert_eq!(m.top_branch, 0);
        let m = exec("(ab|cd)", "cd", &ExecOptions::new()).unwrap();
        assert_eq!(m.top_branch, 0);
    }

    #[test]
    fn edge_context() {
        let opts = ExecOptions::new().prev_char(Some(b'x'));
        assert!(exec("^a", "ab", &opts).is_none());
        let opts = ExecOptions::new().prev_char(Some(b'\n'));
        assert!(exec("^a", "ab", &opts).is_some());
        let opts = ExecOptions::new().succ_char(Some(b'x'));
        assert!(exec("a$", "a", &opts).is_none());
        assert!(exec("a$", "a", &ExecOptions::new()).is_some());
        assert_eq!(span("^b", "a\nb"), Some(2..3));
        assert_eq!(span("a$", "a\nb"), Some(0..1));
    }

    #[test]
    fn word_boundaries() {
        assert_eq!(span("<foo>", "a.foo.b"), Some(2..5));
        let opts = ExecOptions::new().delimiters(Delimiters::new(""));
        assert!(exec("<foo>", "a.foo.b", &opts).is_none());
        assert_eq!(span(r"o\B", "foo"), Some(1..2));
        assert_eq!(span(r"\y+", "ab.,c"), Some(2..4));
    }

    #[test]
    fn match_to_and_look_behind_to() {
        let opts = ExecOptions::new().match_to(2);
        assert_eq!(exec("ab*", "abbb", &opts).map(|m| m.range()), Some(0..2));
        let opts = ExecOptions::new().match_to(1);
        let m = exec("a(?=bc)", "abc", &opts).unwrap();
        assert_eq!(m.range(), 0..1);
        assert_eq!(m.extent_forward, 3);

        let opts = ExecOptions::new().start(1);
        assert!(exec("(?<=a)b", "ab", &opts).is_none());
        let opts = ExecOptions::new().start(1).look_behind_to(0);
        assert_eq!(exec("(?<=a)b", "ab", &opts).map(|m| m.range()), Some(1..2));
    }

    #[test]
    fn backward_search() {
        let back = ExecOptions::new().backward();
        assert_eq!(exec("ab", "abxab", &back).map(|m| m.range()), Some(3..5));
        assert_eq!(exec("^a", "a\na\nb", &back).map(|m| m.range()), Some(2..3));
        assert_eq!(exec("x*", "ab", &back).map(|m| m.range()), Some(2..2));
        assert!(exec("q", "ab", &back).is_none());
    }

    #[test]
    fn invalid_arguments() {
        let p = prog("a");
        let cases = [
            ExecOptions::new().start(4),
            ExecOptions::new().match_to(9),
            ExecOptions::new().start(2).end(1),
            ExecOptions::new().start(1).look_behind_to(2),
            ExecOptions::new().end(9),
        ];
        for opts in cases {
            assert_eq!(
                execute(&p, b"abc", &opts),
                Err(RegexError::InvalidArgument),
                "{:?}",
                opts
            );
        }
    }

    #[test]
    fn limits_abort_the_search() {
        let p = prog("(a|aa)*c");
        let text = "a".repeat(30);
        let opts = ExecOptions::new().limits(MatchLimits {
            recursion: 10_000,
            steps: 10_000,
        });
        assert_eq!(
            execute(&p, text.as_bytes(), &opts),
            Err(RegexError::StepLimitOver)
        );

        let p = prog("(ab)*");
        let text = "ab".repeat(100);
        let opts = ExecOptions::new().limits(MatchLimits {
            recursion: 20,
            steps: DEFAULT_STEP_LIMIT,
        });
        assert_eq!(
            execute(&p, text.as_bytes(), &opts),
            Err(RegexError::RecursionLimitOver)
        );
    }

    #[test]
    fn default_recursion_limit_fails_cleanly() {
        // runs on the test harness thread with its default stack
        let p = prog("(a|b)*c");
        let text = "ab".repeat(20_000);
        assert_eq!(
            execute(&p, text.as_bytes(), &ExecOptions::new()),
            Err(RegexError::RecursionLimitOver)
        );
        // deep but bounded loops still match
        let p = prog("(ab)*");
        let text = "ab".repeat(1_000);
        let m = execute(&p, text.as_bytes(), &ExecOptions::new()).unwrap().unwrap();
        assert_eq!(m.range(), 0..2_000);
        assert_eq!(m.group(1), Some(1_998..2_000));
    }
}
