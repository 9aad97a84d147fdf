// regint.rs - Internal types shared by the compiler and the executor.
// OpCode, Operation, Link, BitSet, Program, limits and option flags.

use bitflags::bitflags;
use smallvec::SmallVec;

// === Config Constants ===
pub const DEFAULT_RECURSION_LIMIT: usize = 10_000;
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;
pub const DEFAULT_PARSE_DEPTH_LIMIT: u32 = 256;

// === Internal Constants ===

/// Capture groups are numbered 1..NSUBEXP (group 0 is the whole match).
pub const NSUBEXP: usize = 50;
/// Largest bound accepted inside `{m,n}`.
pub const MAX_REPEAT_BOUND: u32 = 65535;
/// Upper length limit for a lookbehind body.
pub const LOOK_BEHIND_MAX_LEN: u32 = 65535;
/// Ceiling on the encoded program size, in encoding units.
pub const MAX_PROGRAM_SIZE: usize = 32767;
/// Repeat count standing for "no upper bound".
pub const REG_INFINITY: u32 = u32::MAX;

// Encoding units: opcode byte plus a two-byte next offset.
pub const NODE_SIZE: usize = 3;

#[inline]
pub fn is_infinite_repeat(n: u32) -> bool {
    n == REG_INFINITY
}

bitflags! {
    /// Compile options and the inline mode state tracked while parsing.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RegexOptions: u32 {
        /// Case-insensitive matching, `(?i)`.
        const IGNORE_CASE = 1 << 0;
        /// `.`, `\s` and `\S` match newline, `(?n)`.
        const MATCH_NEWLINE = 1 << 1;
        /// Negated classes exclude newline, `(?N)`.
        const NEWLINE_STRICT = 1 << 2;
    }
}

/// Safety valves for a single search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchLimits {
    /// Maximum depth of the interpreter's backtrack stack.
    pub recursion: usize,
    /// Maximum opcode dispatches across all candidate positions.
    pub steps: u64,
}

impl Default for MatchLimits {
    fn default() -> Self {
        MatchLimits {
            recursion: DEFAULT_RECURSION_LIMIT,
            steps: DEFAULT_STEP_LIMIT,
        }
    }
}

// === BitSet (256 bits for byte classes) ===
pub const BITS_PER_BYTE: usize = 8;
pub const SINGLE_BYTE_SIZE: usize = 1 << BITS_PER_BYTE;
pub const BITS_IN_ROOM: usize = 32;
pub const BITSET_REAL_SIZE: usize = SINGLE_BYTE_SIZE / BITS_IN_ROOM;
pub type Bits = u32;
pub type BitSet = [Bits; BITSET_REAL_SIZE];

pub const SIZE_BITSET: usize = std::mem::size_of::<BitSet>();

#[inline]
pub fn bs_room(pos: usize) -> usize {
    pos >> 5
}

#[inline]
pub fn bs_bit(pos: usize) -> u32 {
    1u32 << (pos & 0x1f)
}

#[inline]
pub fn bitset_at(bs: &BitSet, pos: usize) -> bool {
    (bs[bs_room(pos)] & bs_bit(pos)) != 0
}

#[inline]
pub fn bitset_set_bit(bs: &mut BitSet, pos: usize) {
    bs[bs_room(pos)] |= bs_bit(pos);
}

#[inline]
pub fn bitset_clear_bit(bs: &mut BitSet, pos: usize) {
    bs[bs_room(pos)] &= !bs_bit(pos);
}

#[inline]
pub fn bitset_set_range(bs: &mut BitSet, from: u8, to: u8) {
    for c in from..=to {
        bitset_set_bit(bs, c as usize);
    }
}

// === OpCode Enum ===
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    End = 0,
    // zero-width assertions
    Bol = 1,
    Eol = 2,
    Boundary = 3,
    NotBoundary = 4,
    // literals and classes
    Exactly = 5,
    SimilarIc = 6,
    AnyOf = 7,
    AnyBut = 8,
    Any = 9,
    Every = 10,
    Digit = 11,
    NotDigit = 12,
    Letter = 13,
    NotLetter = 14,
    Space = 15,
    SpaceNl = 16,
    NotSpace = 17,
    NotSpaceNl = 18,
    WordChar = 19,
    NotWordChar = 20,
    IsDelim = 21,
    NotDelim = 22,
    // quantifiers over a SIMPLE operand (the operand op follows)
    Star = 23,
    LazyStar = 24,
    Plus = 25,
    LazyPlus = 26,
    Question = 27,
    LazyQuestion = 28,
    Brace = 29,
    LazyBrace = 30,
    // control
    Branch = 31,
    Back = 32,
    Nothing = 33,
    InitCount = 34,
    IncCount = 35,
    TestCount = 36,
    // backreferences
    BackRef = 37,
    BackRefIc = 38,
    // lookaround
    PosAheadOpen = 39,
    NegAheadOpen = 40,
    LookAheadClose = 41,
    PosBehindOpen = 42,
    NegBehindOpen = 43,
    LookBehindClose = 44,
    // captures
    Open = 45,
    Close = 46,
}

impl OpCode {
    /// Opcodes that consume exactly one byte and may sit under a SIMPLE quantifier.
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            OpCode::Exactly
                | OpCode::SimilarIc
                | OpCode::AnyOf
                | OpCode::AnyBut
                | OpCode::Any
                | OpCode::Every
                | OpCode::Digit
                | OpCode::NotDigit
                | OpCode::Letter
                | OpCode::NotLetter
                | OpCode::Space
                | OpCode::SpaceNl
                | OpCode::NotSpace
                | OpCode::NotSpaceNl
                | OpCode::WordChar
                | OpCode::NotWordChar
                | OpCode::IsDelim
                | OpCode::NotDelim
        )
    }

    pub fn is_simple_repeat(self) -> bool {
        matches!(
            self,
            OpCode::Star
                | OpCode::LazyStar
                | OpCode::Plus
                | OpCode::LazyPlus
                | OpCode::Question
                | OpCode::LazyQuestion
                | OpCode::Brace
                | OpCode::LazyBrace
        )
    }
}

// === Link (successor of an operation) ===
//
// Links are plain indices into `Program::ops`. Loop back-edges carry the
// `Back` tag so a reader never has to infer direction from the opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Link {
    /// No successor: the op terminates its sub-program (End, lookaround
    /// close, operand of a SIMPLE quantifier).
    None,
    Forward(usize),
    Back(usize),
}

impl Link {
    #[inline]
    pub fn target(self) -> Option<usize> {
        match self {
            Link::None => None,
            Link::Forward(i) | Link::Back(i) => Some(i),
        }
    }
}

// === Operation (Bytecode Instruction) ===
#[derive(Clone, Debug)]
pub struct Operation {
    pub opcode: OpCode,
    pub next: Link,
    pub payload: OperationPayload,
}

#[derive(Clone, Debug)]
pub enum OperationPayload {
    None,
    Str {
        s: Vec<u8>,
    },
    CClass {
        bsp: Box<BitSet>,
    },
    Repeat {
        min: u32,
        max: u32,
    },
    Branch {
        alts: SmallVec<[usize; 2]>,
        top_level: bool,
    },
    Counter {
        id: usize,
    },
    TestCount {
        id: usize,
        bound: u32,
        body: usize,
    },
    BackRef {
        num: usize,
    },
    LookAhead {
        body: usize,
    },
    LookBehind {
        body: usize,
        lower: u32,
        upper: u32,
    },
    Memory {
        num: usize,
    },
}

impl Operation {
    /// Size of this operation in encoding units (opcode, next offset, operand).
    pub fn size(&self) -> usize {
        let operand = match &self.payload {
            OperationPayload::None => 0,
            OperationPayload::Str { s } => s.len() + 1,
            OperationPayload::CClass { .. } => SIZE_BITSET,
            OperationPayload::Repeat { .. } => 4,
            // one BRANCH node per alternative
            OperationPayload::Branch { alts, .. } => {
                NODE_SIZE * alts.len().saturating_sub(1)
            }
            OperationPayload::Counter { .. } => 1,
            OperationPayload::TestCount { .. } => 5,
            OperationPayload::BackRef { .. } => 1,
            OperationPayload::LookAhead { .. } => 0,
            OperationPayload::LookBehind { .. } => 4,
            OperationPayload::Memory { .. } => 0,
        };
        NODE_SIZE + operand
    }
}

// === Program (compiled regex) ===

/// A compiled regular expression. Immutable once built; executing it only
/// ever takes `&Program`, so one program can serve many threads.
#[derive(Clone, Debug)]
pub struct Program {
    pub ops: Vec<Operation>,
    /// Entry operation.
    pub start: usize,
    /// Number of capturing groups (group 0 excluded).
    pub num_parens: usize,
    /// Number of counted `{m,n}` constructs (counter slots).
    pub num_braces: usize,
    /// Every match must begin at a line start.
    pub anchor_bol: bool,
    /// Byte every match must begin with, if known.
    pub match_start: Option<u8>,
    /// Encoded size in encoding units.
    pub size: usize,
    pub options: RegexOptions,
}

impl Program {
    pub fn new(options: RegexOptions) -> Self {
        Program {
            ops: Vec::new(),
            start: 0,
            num_parens: 0,
            num_braces: 0,
            anchor_bol: false,
            match_start: None,
            size: 0,
            options,
        }
    }
}
