// regparse.rs - Pattern parser.
//
// Recursive descent over the pattern bytes: chunk -> alternative -> piece
// -> atom. The quantifier after an atom is read before the atom's node is
// handed back, so the compiler always sees the complete piece.

use memchr::memchr;

use crate::error::RegexError;
use crate::regctype::match_ctype;
use crate::regerror::CompileErrorKind;
use crate::regint::*;
use crate::regparse_types::*;

type ParseResult<T> = Result<T, RegexError>;

// Escaped characters that stand for themselves.
const ESCAPED_METAS: &[u8] = b"()-[]<>{}.\\|^$*+?&/";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkKind {
    Top,
    Group,
}

fn err<T>(kind: CompileErrorKind, p: usize) -> ParseResult<T> {
    Err(RegexError::compile(kind, p))
}

#[inline]
fn is_quantifier(c: u8) -> bool {
    matches!(c, b'*' | b'+' | b'?' | b'{')
}

#[inline]
fn is_shortcut_escape(c: u8) -> bool {
    matches!(
        c,
        b'd' | b'D' | b'l' | b'L' | b's' | b'S' | b'w' | b'W' | b'y' | b'Y'
    )
}

fn shortcut_ctype(c: u8, env: &ParseEnv) -> Option<CTypeKind> {
    let nl = env.match_newline();
    let kind = match c {
        b'd' => CTypeKind::Digit,
        b'D' => CTypeKind::NotDigit,
        b'l' => CTypeKind::Letter,
        b'L' => CTypeKind::NotLetter,
        b's' if nl => CTypeKind::SpaceNl,
        b's' => CTypeKind::Space,
        b'S' if nl => CTypeKind::NotSpaceNl,
        b'S' => CTypeKind::NotSpace,
        b'w' => CTypeKind::WordChar,
        b'W' => CTypeKind::NotWordChar,
        b'y' => CTypeKind::IsDelim,
        b'Y' => CTypeKind::NotDelim,
        _ => return None,
    };
    Some(kind)
}

// ============================================================================
// Escapes
// ============================================================================

fn scan_octal_number(mut p: usize, pattern: &[u8]) -> (u8, usize) {
    let mut value: u32 = 0;
    let mut digits = 0;
    while digits < 3 {
        match pattern.get(p) {
            Some(&c @ b'0'..=b'7') => {
                let v = value * 8 + (c - b'0') as u32;
                if v > 0xff {
                    break;
                }
                value = v;
                p += 1;
                digits += 1;
            }
            _ => break,
        }
    }
    (value as u8, p)
}

fn scan_hexadecimal_number(mut p: usize, pattern: &[u8]) -> Option<(u8, usize)> {
    let mut value: u32 = 0;
    let mut digits = 0;
    while digits < 2 {
        match pattern.get(p).and_then(|&c| (c as char).to_digit(16)) {
            Some(d) => {
                value = value * 16 + d;
                p += 1;
                digits += 1;
            }
            None => break,
        }
    }
    if digits == 0 {
        None
    } else {
        Some((value as u8, p))
    }
}

/// Decode the literal escape whose letter is at `p` (just past the
/// backslash). Returns the byte value and the index after the escape.
pub(crate) fn fetch_escaped_value(
    p: usize,
    pattern: &[u8],
) -> Result<(u8, usize), CompileErrorKind> {
    let Some(&c) = pattern.get(p) else {
        return Err(CompileErrorKind::TrailingBackslash);
    };
    let v = match c {
        b'a' => 0x07,
        b'b' => 0x08,
        b'e' => 0x1b,
        b'f' => 0x0c,
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'v' => 0x0b,
        b'0' => return Ok(scan_octal_number(p + 1, pattern)),
        b'x' => {
            return scan_hexadecimal_number(p + 1, pattern).ok_or(CompileErrorKind::InvalidEscape)
        }
        c if ESCAPED_METAS.contains(&c) => c,
        _ => return Err(CompileErrorKind::InvalidEscape),
    };
    Ok((v, p + 1))
}

/// Fetch one literal character at `p`, or `None` when the token there is
/// not a literal (metacharacter, shortcut, anchor or backreference).
fn fetch_literal(p: usize, end: usize, pattern: &[u8]) -> ParseResult<Option<(u8, usize)>> {
    if p >= end {
        return Ok(None);
    }
    let c = pattern[p];
    match c {
        b'^' | b'$' | b'.' | b'[' | b'(' | b')' | b'|' | b'*' | b'+' | b'?' | b'{' | b'<'
        | b'>' => Ok(None),
        b'\\' => {
            let Some(&e) = pattern.get(p + 1) else {
                return err(CompileErrorKind::TrailingBackslash, p);
            };
            if is_shortcut_escape(e) || e == b'B' || matches!(e, b'1'..=b'9') {
                return Ok(None);
            }
            fetch_escaped_value(p + 1, pattern)
                .map(Some)
                .map_err(|kind| RegexError::compile(kind, p))
        }
        _ => Ok(Some((c, p + 1))),
    }
}

// ============================================================================
// Intervals {m,n}
// ============================================================================

fn scan_number(p: &mut usize, end: usize, pattern: &[u8]) -> ParseResult<Option<u32>> {
    let start = *p;
    let mut value: u32 = 0;
    while *p < end && pattern[*p].is_ascii_digit() {
        value = value * 10 + (pattern[*p] - b'0') as u32;
        if value > MAX_REPEAT_BOUND {
            return err(CompileErrorKind::BraceBoundTooLarge, start);
        }
        *p += 1;
    }
    Ok(if *p == start { None } else { Some(value) })
}

/// Parse `{m}`, `{m,}`, `{,n}` or `{m,n}` starting at the `{`.
fn fetch_interval(p: &mut usize, end: usize, pattern: &[u8]) -> ParseResult<(u32, u32)> {
    let open = *p;
    *p += 1;
    let low = scan_number(p, end, pattern)?;
    let (lower, upper) = if *p < end && pattern[*p] == b',' {
        *p += 1;
        let up = scan_number(p, end, pattern)?;
        (low.unwrap_or(0), up.unwrap_or(REG_INFINITY))
    } else {
        match low {
            Some(n) => (n, n),
            None => return err(CompileErrorKind::BraceBoundInvalid, open),
        }
    };
    if *p >= end || pattern[*p] != b'}' {
        return err(CompileErrorKind::BraceBoundInvalid, open);
    }
    *p += 1;

    if !is_infinite_repeat(upper) && lower > upper {
        return err(CompileErrorKind::BraceMinExceedsMax, open);
    }
    if upper == 0 {
        return err(CompileErrorKind::BraceZeroRepeat, open);
    }
    Ok((lower, upper))
}

// ============================================================================
// Character classes
// ============================================================================

enum CcItem {
    Char(u8),
    Set,
}

fn add_ctype_to_cc(bs: &mut BitSet, kind: CTypeKind) {
    let op = kind.opcode();
    for c in 0..=255u8 {
        if match_ctype(op, c) == Some(true) {
            bitset_set_bit(bs, c as usize);
        }
    }
}

fn fetch_cc_item(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &ParseEnv,
    bs: &mut BitSet,
) -> ParseResult<CcItem> {
    let c = pattern[*p];
    if c != b'\\' {
        *p += 1;
        return Ok(CcItem::Char(c));
    }
    if *p + 1 >= end {
        return err(CompileErrorKind::UnterminatedClass, *p);
    }
    let e = pattern[*p + 1];
    match e {
        b'd' | b'D' | b'l' | b'L' | b's' | b'S' | b'w' | b'W' => {
            if let Some(kind) = shortcut_ctype(e, env) {
                add_ctype_to_cc(bs, kind);
            }
            *p += 2;
            Ok(CcItem::Set)
        }
        // delimiter sets are only known at match time
        b'y' | b'Y' | b'B' | b'1'..=b'9' => err(CompileErrorKind::InvalidClassEscape, *p),
        _ => {
            let (v, next) = fetch_escaped_value(*p + 1, pattern)
                .map_err(|_| RegexError::compile(CompileErrorKind::InvalidClassEscape, *p))?;
            *p = next;
            Ok(CcItem::Char(v))
        }
    }
}

/// Parse `[...]` starting at the `[`.
fn prs_cc(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &ParseEnv,
) -> ParseResult<(Node, NodeInfo)> {
    let open = *p;
    *p += 1;
    let mut not = false;
    if *p < end && pattern[*p] == b'^' {
        not = true;
        *p += 1;
    }

    let mut bs: BitSet = [0; BITSET_REAL_SIZE];
    let mut first = true;
    let mut last: Option<u8> = None;
    loop {
        if *p >= end {
            return err(CompileErrorKind::UnterminatedClass, open);
        }
        let c = pattern[*p];
        if c == b']' && !first {
            *p += 1;
            break;
        }
        first = false;

        if c == b'-' && *p + 1 < end && pattern[*p + 1] != b']' {
            if let Some(lo) = last.take() {
                let range_at = *p;
                *p += 1;
                let hi = match fetch_cc_item(p, end, pattern, env, &mut bs)? {
                    CcItem::Char(hi) => hi,
                    CcItem::Set => return err(CompileErrorKind::InvalidClassRange, range_at),
                };
                if hi < lo {
                    return err(CompileErrorKind::InvalidClassRange, range_at);
                }
                bitset_set_range(&mut bs, lo, hi);
                continue;
            }
        }

        match fetch_cc_item(p, end, pattern, env, &mut bs)? {
            CcItem::Char(v) => {
                bitset_set_bit(&mut bs, v as usize);
                last = Some(v);
            }
            CcItem::Set => last = None,
        }
    }

    if env.ignore_case() {
        for c in b'a'..=b'z' {
            let u = c.to_ascii_uppercase();
            if bitset_at(&bs, c as usize) || bitset_at(&bs, u as usize) {
                bitset_set_bit(&mut bs, c as usize);
                bitset_set_bit(&mut bs, u as usize);
            }
        }
    }
    if not && env.newline_strict() {
        bitset_set_bit(&mut bs, b'\n' as usize);
    }

    Ok((
        Node::CClass {
            bsp: Box::new(bs),
            not,
        },
        NodeInfo::single(),
    ))
}

// ============================================================================
// Atoms
// ============================================================================

/// Coalesce a run of literal characters. Stops before a character that a
/// following quantifier applies to, unless it is the first of the run.
fn prs_string(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &ParseEnv,
) -> ParseResult<(Node, NodeInfo)> {
    let start = *p;
    let mut s = Vec::new();
    while let Some((c, next)) = fetch_literal(*p, end, pattern)? {
        if !s.is_empty() && next < end && is_quantifier(pattern[next]) {
            break;
        }
        s.push(c);
        *p = next;
    }
    if s.is_empty() {
        return Err(RegexError::InternalBug {
            message: format!("empty literal run at offset {}", start),
        });
    }

    let ignore_case = env.ignore_case() && s.iter().any(u8::is_ascii_alphabetic);
    if ignore_case {
        s.make_ascii_lowercase();
    }
    let info = if s.len() == 1 {
        NodeInfo::single()
    } else {
        NodeInfo {
            flags: NodeFlags::HAS_WIDTH,
            range: LenRange::exact(s.len() as u32),
        }
    };
    Ok((Node::Str { s, ignore_case }, info))
}

fn prs_backref_num(
    p: &mut usize,
    num: usize,
    env: &ParseEnv,
) -> ParseResult<(Node, NodeInfo)> {
    let at = *p;
    if num > env.num_mem {
        return err(CompileErrorKind::BackrefNonexistentGroup, at);
    }
    let mem = env.mem_env[num];
    if !mem.closed {
        return err(CompileErrorKind::BackrefUnclosedGroup, at);
    }
    *p += 2;
    // the reference repeats the group's text, so it shares the group's length
    let info = match mem.info {
        Some(group) => NodeInfo {
            flags: group.flags & NodeFlags::HAS_WIDTH,
            range: group.range,
        },
        None => NodeInfo {
            flags: NodeFlags::empty(),
            range: LenRange::UNBOUNDED,
        },
    };
    Ok((
        Node::BackRef {
            num,
            ignore_case: env.ignore_case(),
        },
        info,
    ))
}

fn prs_atom(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<Option<(Node, NodeInfo)>> {
    let c = pattern[*p];
    let atom = match c {
        b'^' => {
            *p += 1;
            (Node::Anchor(AnchorType::Bol), NodeInfo::ZERO_WIDTH)
        }
        b'$' => {
            *p += 1;
            (Node::Anchor(AnchorType::Eol), NodeInfo::ZERO_WIDTH)
        }
        b'<' | b'>' => {
            *p += 1;
            (Node::Anchor(AnchorType::Boundary), NodeInfo::ZERO_WIDTH)
        }
        b'.' => {
            *p += 1;
            let kind = if env.match_newline() {
                CTypeKind::Every
            } else {
                CTypeKind::Any
            };
            (Node::CType(kind), NodeInfo::single())
        }
        b'(' => return prs_group(p, end, pattern, env),
        b'[' => prs_cc(p, end, pattern, env)?,
        b'*' | b'+' | b'?' | b'{' => return err(CompileErrorKind::QuantifierFollowsNothing, *p),
        b'\\' => {
            let Some(&e) = pattern.get(*p + 1) else {
                return err(CompileErrorKind::TrailingBackslash, *p);
            };
            if let Some(kind) = shortcut_ctype(e, env) {
                *p += 2;
                (Node::CType(kind), NodeInfo::single())
            } else if e == b'B' {
                *p += 2;
                (Node::Anchor(AnchorType::NotBoundary), NodeInfo::ZERO_WIDTH)
            } else if e.is_ascii_digit() && e != b'0' {
                let num = (e - b'0') as usize;
                prs_backref_num(p, num, env)?
            } else {
                prs_string(p, end, pattern, env)?
            }
        }
        _ => prs_string(p, end, pattern, env)?,
    };
    Ok(Some(atom))
}

// ============================================================================
// Groups
// ============================================================================

fn prs_subexp(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<(Node, NodeInfo)> {
    let r = prs_chunk(p, end, pattern, env, ChunkKind::Group)?;
    // prs_chunk(Group) only returns with `)` at *p
    *p += 1;
    Ok(r)
}

fn prs_options(
    open: usize,
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<()> {
    let mut opts = env.options;
    let mut q = *p;
    loop {
        if q >= end {
            return err(CompileErrorKind::InvalidGroupSyntax, open);
        }
        match pattern[q] {
            b'i' => opts.insert(RegexOptions::IGNORE_CASE),
            b'I' => opts.remove(RegexOptions::IGNORE_CASE),
            b'n' => {
                opts.insert(RegexOptions::MATCH_NEWLINE);
                opts.remove(RegexOptions::NEWLINE_STRICT);
            }
            b'N' => {
                opts.remove(RegexOptions::MATCH_NEWLINE);
                opts.insert(RegexOptions::NEWLINE_STRICT);
            }
            b')' => break,
            _ => return err(CompileErrorKind::InvalidGroupSyntax, open),
        }
        q += 1;
    }
    env.options = opts;
    *p = q + 1;
    Ok(())
}

/// Parse a parenthesized construct starting at the `(`. Comments and mode
/// toggles produce no node.
fn prs_group(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<Option<(Node, NodeInfo)>> {
    let open = *p;
    env.parse_depth += 1;
    if env.parse_depth > env.parse_depth_limit {
        return err(CompileErrorKind::ParseDepthLimitOver, open);
    }
    *p += 1;
    let r = prs_group_body(open, p, end, pattern, env);
    env.parse_depth -= 1;
    r
}

fn prs_group_body(
    open: usize,
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<Option<(Node, NodeInfo)>> {
    if *p < end && pattern[*p] == b'?' {
        let Some(&c) = pattern.get(*p + 1) else {
            return err(CompileErrorKind::InvalidGroupSyntax, open);
        };
        let kind = match c {
            b':' => {
                *p += 2;
                let (node, info) = prs_subexp(p, end, pattern, env)?;
                return Ok(Some((node, info)));
            }
            b'=' => {
                *p += 2;
                LookKind::PosAhead
            }
            b'!' => {
                *p += 2;
                LookKind::NegAhead
            }
            b'<' => match pattern.get(*p + 2) {
                Some(b'=') => {
                    *p += 3;
                    LookKind::PosBehind
                }
                Some(b'!') => {
                    *p += 3;
                    LookKind::NegBehind
                }
                _ => return err(CompileErrorKind::InvalidGroupSyntax, open),
            },
            b'#' => {
                let from = *p + 2;
                return match memchr(b')', &pattern[from.min(end)..end]) {
                    Some(i) => {
                        *p = from + i + 1;
                        Ok(None)
                    }
                    None => err(CompileErrorKind::UnterminatedComment, open),
                };
            }
            b'i' | b'I' | b'n' | b'N' => {
                *p += 1;
                prs_options(open, p, end, pattern, env)?;
                return Ok(None);
            }
            _ => return err(CompileErrorKind::InvalidGroupSyntax, open),
        };

        let (body, info) = prs_subexp(p, end, pattern, env)?;
        if kind.is_behind() {
            match info.range.upper {
                Some(upper) if upper <= LOOK_BEHIND_MAX_LEN => {}
                _ => return err(CompileErrorKind::UnboundedLookbehind, open),
            }
        }
        return Ok(Some((
            Node::Look {
                kind,
                body: Box::new(body),
                range: info.range,
            },
            NodeInfo::ZERO_WIDTH,
        )));
    }

    let num = env.num_mem + 1;
    if num >= NSUBEXP {
        return err(CompileErrorKind::TooManyParens, open);
    }
    env.num_mem = num;
    let (body, info) = prs_subexp(p, end, pattern, env)?;
    env.mem_env[num] = MemEnv {
        closed: true,
        info: Some(info),
    };
    let info = NodeInfo {
        flags: info.flags & NodeFlags::HAS_WIDTH,
        range: info.range,
    };
    Ok(Some((
        Node::Memory {
            num,
            body: Box::new(body),
        },
        info,
    )))
}

// ============================================================================
// Pieces, alternatives, chunks
// ============================================================================

fn prs_piece(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<Option<(Node, NodeInfo)>> {
    let atom = prs_atom(p, end, pattern, env)?;
    if *p >= end || !is_quantifier(pattern[*p]) {
        return Ok(atom);
    }
    let Some((node, info)) = atom else {
        return err(CompileErrorKind::QuantifierFollowsNothing, *p);
    };

    let quant_at = *p;
    let (lower, upper) = match pattern[*p] {
        b'*' => {
            *p += 1;
            (0, REG_INFINITY)
        }
        b'+' => {
            *p += 1;
            (1, REG_INFINITY)
        }
        b'?' => {
            *p += 1;
            (0, 1)
        }
        _ => fetch_interval(p, end, pattern)?,
    };
    let mut greedy = true;
    if *p < end && pattern[*p] == b'?' {
        greedy = false;
        *p += 1;
    }
    if *p < end && is_quantifier(pattern[*p]) {
        return err(CompileErrorKind::NestedQuantifier, *p);
    }
    if is_infinite_repeat(upper) && !info.has_width() {
        return err(CompileErrorKind::EmptyQuantifierOperand, quant_at);
    }
    if lower == 1 && upper == 1 {
        return Ok(Some((node, info)));
    }

    let flags = if lower > 0 && info.has_width() {
        NodeFlags::HAS_WIDTH
    } else {
        NodeFlags::empty()
    };
    let range = info.range.repeat(lower, upper);
    Ok(Some((
        Node::Quant {
            body: Box::new(node),
            lower,
            upper,
            greedy,
        },
        NodeInfo { flags, range },
    )))
}

fn prs_alternative(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
) -> ParseResult<(Node, NodeInfo)> {
    let mut items: Vec<Node> = Vec::new();
    let mut info = NodeInfo::ZERO_WIDTH;
    let mut last_info = NodeInfo::ZERO_WIDTH;
    while *p < end && pattern[*p] != b'|' && pattern[*p] != b')' {
        if let Some((node, ninfo)) = prs_piece(p, end, pattern, env)? {
            info.flags = (info.flags | ninfo.flags) & NodeFlags::HAS_WIDTH;
            info.range = info.range.concat(ninfo.range);
            last_info = ninfo;
            items.push(node);
        }
    }
    Ok(match items.len() {
        0 => (Node::Empty, NodeInfo::ZERO_WIDTH),
        1 => (items.pop().unwrap_or(Node::Empty), last_info),
        _ => (Node::List(items), info),
    })
}

fn prs_chunk(
    p: &mut usize,
    end: usize,
    pattern: &[u8],
    env: &mut ParseEnv,
    kind: ChunkKind,
) -> ParseResult<(Node, NodeInfo)> {
    let save_options = env.options;

    let (first, mut info) = prs_alternative(p, end, pattern, env)?;
    let mut alts = vec![first];
    loop {
        if *p >= end {
            if kind == ChunkKind::Group {
                return err(CompileErrorKind::UnmatchedOpenParen, *p);
            }
            break;
        }
        match pattern[*p] {
            b'|' => {
                *p += 1;
                let (node, ninfo) = prs_alternative(p, end, pattern, env)?;
                info = NodeInfo {
                    flags: info.flags & ninfo.flags & NodeFlags::HAS_WIDTH,
                    range: info.range.union(ninfo.range),
                };
                alts.push(node);
            }
            _ => {
                // `)`: prs_alternative stops only at `|`, `)` or the end
                if kind == ChunkKind::Top {
                    return err(CompileErrorKind::UnmatchedCloseParen, *p);
                }
                break;
            }
        }
    }

    env.options = save_options;
    if alts.len() == 1 {
        let node = alts.pop().unwrap_or(Node::Empty);
        Ok((node, info))
    } else {
        Ok((Node::Alt(alts), info))
    }
}

// ============================================================================
// Entry point: parse_tree
// ============================================================================

pub fn parse_tree(pattern: &[u8], env: &mut ParseEnv) -> ParseResult<(Node, NodeInfo)> {
    let mut p: usize = 0;
    let end = pattern.len();
    prs_chunk(&mut p, end, pattern, env, ChunkKind::Top)
}

// ============================================================================
// Tests
// ============================================================================
