// regparse_types.rs - Syntax tree, node annotations and parse environment.
//
// The parser produces a `Node` tree; each node comes with a `NodeInfo`
// (width/SIMPLE flags and a match-length range) that the parser uses for
// validation and the compiler uses to pick a lowering.

use bitflags::bitflags;

use crate::regint::*;

// === Node Kinds ===

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorType {
    /// `^`
    Bol,
    /// `$`
    Eol,
    /// `<`, `>`
    Boundary,
    /// `\B`
    NotBoundary,
}

/// Single-step character tests that have no operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CTypeKind {
    Any,
    Every,
    Digit,
    NotDigit,
    Letter,
    NotLetter,
    Space,
    SpaceNl,
    NotSpace,
    NotSpaceNl,
    WordChar,
    NotWordChar,
    IsDelim,
    NotDelim,
}

impl CTypeKind {
    pub fn opcode(self) -> OpCode {
        match self {
            CTypeKind::Any => OpCode::Any,
            CTypeKind::Every => OpCode::Every,
            CTypeKind::Digit => OpCode::Digit,
            CTypeKind::NotDigit => OpCode::NotDigit,
            CTypeKind::Letter => OpCode::Letter,
            CTypeKind::NotLetter => OpCode::NotLetter,
            CTypeKind::Space => OpCode::Space,
            CTypeKind::SpaceNl => OpCode::SpaceNl,
            CTypeKind::NotSpace => OpCode::NotSpace,
            CTypeKind::NotSpaceNl => OpCode::NotSpaceNl,
            CTypeKind::WordChar => OpCode::WordChar,
            CTypeKind::NotWordChar => OpCode::NotWordChar,
            CTypeKind::IsDelim => OpCode::IsDelim,
            CTypeKind::NotDelim => OpCode::NotDelim,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookKind {
    PosAhead,
    NegAhead,
    PosBehind,
    NegBehind,
}

impl LookKind {
    pub fn is_behind(self) -> bool {
        matches!(self, LookKind::PosBehind | LookKind::NegBehind)
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    /// Matches the empty string.
    Empty,
    /// Literal run; folded to lower case when `ignore_case` is set.
    Str { s: Vec<u8>, ignore_case: bool },
    CClass { bsp: Box<BitSet>, not: bool },
    CType(CTypeKind),
    Anchor(AnchorType),
    BackRef { num: usize, ignore_case: bool },
    List(Vec<Node>),
    Alt(Vec<Node>),
    /// Capturing group.
    Memory { num: usize, body: Box<Node> },
    Look { kind: LookKind, body: Box<Node>, range: LenRange },
    Quant {
        body: Box<Node>,
        lower: u32,
        upper: u32,
        greedy: bool,
    },
}

impl Node {
    /// True for nodes that consume exactly one byte in one step.
    pub fn is_simple(&self) -> bool {
        match self {
            Node::Str { s, .. } => s.len() == 1,
            Node::CClass { .. } | Node::CType(_) => true,
            _ => false,
        }
    }
}

// === Node annotations ===

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Always consumes at least one byte.
        const HAS_WIDTH = 1 << 0;
        /// Consumes exactly one byte; eligible for the compact quantifier ops.
        const SIMPLE = 1 << 1;
    }
}

/// Inclusive range of byte lengths a node can match. `upper == None` is
/// unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LenRange {
    pub lower: u32,
    pub upper: Option<u32>,
}

impl LenRange {
    pub const ZERO: LenRange = LenRange {
        lower: 0,
        upper: Some(0),
    };
    pub const UNBOUNDED: LenRange = LenRange {
        lower: 0,
        upper: None,
    };

    pub fn exact(n: u32) -> Self {
        LenRange {
            lower: n,
            upper: Some(n),
        }
    }

    /// Range of `self` followed by `other`.
    pub fn concat(self, other: LenRange) -> Self {
        LenRange {
            lower: self.lower.saturating_add(other.lower),
            upper: match (self.upper, other.upper) {
                (Some(a), Some(b)) => a.checked_add(b),
                _ => None,
            },
        }
    }

    /// Range of `self | other`.
    pub fn union(self, other: LenRange) -> Self {
        LenRange {
            lower: self.lower.min(other.lower),
            upper: match (self.upper, other.upper) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    /// Range of `lower..=upper` repetitions of `self`.
    pub fn repeat(self, lower: u32, upper: u32) -> Self {
        let hi = if is_infinite_repeat(upper) {
            None
        } else {
            match self.upper {
                Some(0) => Some(0),
                Some(u) => u.checked_mul(upper),
                None if upper == 0 => Some(0),
                None => None,
            }
        };
        LenRange {
            lower: self.lower.saturating_mul(lower),
            upper: hi,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub flags: NodeFlags,
    pub range: LenRange,
}

impl NodeInfo {
    pub const ZERO_WIDTH: NodeInfo = NodeInfo {
        flags: NodeFlags::empty(),
        range: LenRange::ZERO,
    };

    /// One byte in one step.
    pub fn single() -> Self {
        NodeInfo {
            flags: NodeFlags::HAS_WIDTH | NodeFlags::SIMPLE,
            range: LenRange::exact(1),
        }
    }

    pub fn has_width(&self) -> bool {
        self.flags.contains(NodeFlags::HAS_WIDTH)
    }
}

// === Parse Environment ===

#[derive(Clone, Copy, Debug, Default)]
pub struct MemEnv {
    pub closed: bool,
    pub info: Option<NodeInfo>,
}

#[derive(Debug)]
pub struct ParseEnv {
    /// Mode flags in effect at the current parse position.
    pub options: RegexOptions,
    /// Capturing groups opened so far.
    pub num_mem: usize,
    pub mem_env: [MemEnv; NSUBEXP],
    pub parse_depth: u32,
    pub parse_depth_limit: u32,
}

impl ParseEnv {
    pub fn new(options: RegexOptions) -> Self {
        ParseEnv {
            options,
            num_mem: 0,
            mem_env: [MemEnv::default(); NSUBEXP],
            parse_depth: 0,
            parse_depth_limit: DEFAULT_PARSE_DEPTH_LIMIT,
        }
    }

    #[inline]
    pub fn ignore_case(&self) -> bool {
        self.options.contains(RegexOptions::IGNORE_CASE)
    }

    #[inline]
    pub fn match_newline(&self) -> bool {
        self.options.contains(RegexOptions::MATCH_NEWLINE)
    }

    #[inline]
    pub fn newline_strict(&self) -> bool {
        self.options.contains(RegexOptions::NEWLINE_STRICT)
    }
}
