// regcomp.rs - Lowering of the syntax tree into a Program.
//
// One pass over the tree emits operations into a vector. Each lowered
// fragment reports its entry and the operations whose successor is still
// open ("holes"); the caller patches the holes to whatever follows.

use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::error::RegexError;
use crate::regerror::CompileErrorKind;
use crate::regint::*;
use crate::regparse::parse_tree;
use crate::regparse_types::*;

struct Frag {
    entry: usize,
    holes: SmallVec<[usize; 4]>,
}

impl Frag {
    fn single(idx: usize) -> Self {
        Frag {
            entry: idx,
            holes: smallvec![idx],
        }
    }
}

// ============================================================================
// Emission helpers
// ============================================================================

fn add_op(reg: &mut Program, opcode: OpCode, payload: OperationPayload) -> usize {
    let op = Operation {
        opcode,
        next: Link::None,
        payload,
    };
    reg.size += op.size();
    reg.ops.push(op);
    reg.ops.len() - 1
}

fn set_next(reg: &mut Program, from: usize, to: usize) {
    debug_assert!(to > from, "forward link {} -> {}", from, to);
    reg.ops[from].next = Link::Forward(to);
}

fn set_back(reg: &mut Program, from: usize, to: usize) {
    debug_assert!(to < from, "back link {} -> {}", from, to);
    reg.ops[from].next = Link::Back(to);
}

fn patch(reg: &mut Program, holes: &[usize], to: usize) {
    for &h in holes {
        set_next(reg, h, to);
    }
}

fn set_alts(reg: &mut Program, branch: usize, new_alts: &[usize]) {
    let before = reg.ops[branch].size();
    if let OperationPayload::Branch { alts, .. } = &mut reg.ops[branch].payload {
        alts.clear();
        alts.extend_from_slice(new_alts);
    }
    reg.size = reg.size - before + reg.ops[branch].size();
}

fn add_branch(reg: &mut Program, top_level: bool) -> usize {
    add_op(
        reg,
        OpCode::Branch,
        OperationPayload::Branch {
            alts: SmallVec::new(),
            top_level,
        },
    )
}

/// Emit a `Back` op looping to `target`.
fn add_back(reg: &mut Program, target: usize) -> usize {
    let back = add_op(reg, OpCode::Back, OperationPayload::None);
    set_back(reg, back, target);
    back
}

fn new_counter(reg: &mut Program) -> usize {
    let id = reg.num_braces;
    reg.num_braces += 1;
    id
}

// ============================================================================
// Tree lowering
// ============================================================================

fn compile_tree(node: &Node, reg: &mut Program, top: bool) -> Frag {
    match node {
        Node::Empty => Frag::single(add_op(reg, OpCode::Nothing, OperationPayload::None)),
        Node::Str { s, ignore_case } => {
            let opcode = if *ignore_case {
                OpCode::SimilarIc
            } else {
                OpCode::Exactly
            };
            Frag::single(add_op(reg, opcode, OperationPayload::Str { s: s.clone() }))
        }
        Node::CClass { bsp, not } => {
            let opcode = if *not { OpCode::AnyBut } else { OpCode::AnyOf };
            Frag::single(add_op(
                reg,
                opcode,
                OperationPayload::CClass { bsp: bsp.clone() },
            ))
        }
        Node::CType(kind) => Frag::single(add_op(reg, kind.opcode(), OperationPayload::None)),
        Node::Anchor(anchor) => {
            let opcode = match anchor {
                AnchorType::Bol => OpCode::Bol,
                AnchorType::Eol => OpCode::Eol,
                AnchorType::Boundary => OpCode::Boundary,
                AnchorType::NotBoundary => OpCode::NotBoundary,
            };
            Frag::single(add_op(reg, opcode, OperationPayload::None))
        }
        Node::BackRef { num, ignore_case } => {
            let opcode = if *ignore_case {
                OpCode::BackRefIc
            } else {
                OpCode::BackRef
            };
            Frag::single(add_op(reg, opcode, OperationPayload::BackRef { num: *num }))
        }
        Node::List(items) => compile_list(items, reg),
        Node::Alt(alts) => compile_alt(alts, reg, top),
        Node::Memory { num, body } => {
            let open = add_op(reg, OpCode::Open, OperationPayload::Memory { num: *num });
            let b = compile_tree(body, reg, false);
            set_next(reg, open, b.entry);
            let close = add_op(reg, OpCode::Close, OperationPayload::Memory { num: *num });
            patch(reg, &b.holes, close);
            Frag {
                entry: open,
                holes: smallvec![close],
            }
        }
        Node::Look { kind, body, range } => compile_look(*kind, body, *range, reg),
        Node::Quant {
            body,
            lower,
            upper,
            greedy,
        } => compile_quantifier(body, *lower, *upper, *greedy, reg),
    }
}

fn compile_list(items: &[Node], reg: &mut Program) -> Frag {
    let Some((first, rest)) = items.split_first() else {
        return Frag::single(add_op(reg, OpCode::Nothing, OperationPayload::None));
    };
    let head = compile_tree(first, reg, false);
    let entry = head.entry;
    let mut holes = head.holes;
    for item in rest {
        let f = compile_tree(item, reg, false);
        patch(reg, &holes, f.entry);
        holes = f.holes;
    }
    Frag { entry, holes }
}

fn compile_alt(alts: &[Node], reg: &mut Program, top: bool) -> Frag {
    let br = add_branch(reg, top);
    let mut entries: SmallVec<[usize; 2]> = SmallVec::new();
    let mut holes = SmallVec::new();
    for alt in alts {
        let f = compile_tree(alt, reg, false);
        entries.push(f.entry);
        holes.extend(f.holes);
    }
    set_alts(reg, br, &entries);
    Frag { entry: br, holes }
}

fn compile_look(kind: LookKind, body: &Node, range: LenRange, reg: &mut Program) -> Frag {
    let (open_code, close_code) = match kind {
        LookKind::PosAhead => (OpCode::PosAheadOpen, OpCode::LookAheadClose),
        LookKind::NegAhead => (OpCode::NegAheadOpen, OpCode::LookAheadClose),
        LookKind::PosBehind => (OpCode::PosBehindOpen, OpCode::LookBehindClose),
        LookKind::NegBehind => (OpCode::NegBehindOpen, OpCode::LookBehindClose),
    };
    let payload = if kind.is_behind() {
        OperationPayload::LookBehind {
            body: 0,
            lower: range.lower,
            upper: range.upper.unwrap_or(0),
        }
    } else {
        OperationPayload::LookAhead { body: 0 }
    };
    let open = add_op(reg, open_code, payload);
    let b = compile_tree(body, reg, false);
    let close = add_op(reg, close_code, OperationPayload::None);
    patch(reg, &b.holes, close);
    match &mut reg.ops[open].payload {
        OperationPayload::LookAhead { body } | OperationPayload::LookBehind { body, .. } => {
            *body = b.entry
        }
        _ => {}
    }
    Frag::single(open)
}

// ============================================================================
// Quantifiers
// ============================================================================

fn compile_quantifier(
    body: &Node,
    lower: u32,
    upper: u32,
    greedy: bool,
    reg: &mut Program,
) -> Frag {
    if body.is_simple() {
        return compile_simple_quantifier(body, lower, upper, greedy, reg);
    }
    match (lower, is_infinite_repeat(upper)) {
        (0, true) => compile_star(body, greedy, reg),
        (1, true) => compile_plus(body, greedy, reg),
        (0, false) if upper == 1 => compile_question(body, greedy, reg),
        (0, false) => compile_counted_upto(body, upper, greedy, reg),
        (_, true) => compile_counted_atleast(body, lower, greedy, reg),
        (_, false) => compile_counted_range(body, lower, upper, greedy, reg),
    }
}

/// Compact form: the quantifier op is immediately followed by its operand.
fn compile_simple_quantifier(
    body: &Node,
    lower: u32,
    upper: u32,
    greedy: bool,
    reg: &mut Program,
) -> Frag {
    let (opcode, payload) = match (lower, upper) {
        (0, REG_INFINITY) => (
            if greedy { OpCode::Star } else { OpCode::LazyStar },
            OperationPayload::None,
        ),
        (1, REG_INFINITY) => (
            if greedy { OpCode::Plus } else { OpCode::LazyPlus },
            OperationPayload::None,
        ),
        (0, 1) => (
            if greedy {
                OpCode::Question
            } else {
                OpCode::LazyQuestion
            },
            OperationPayload::None,
        ),
        (min, max) => (
            if greedy { OpCode::Brace } else { OpCode::LazyBrace },
            OperationPayload::Repeat { min, max },
        ),
    };
    let q = add_op(reg, opcode, payload);
    // the operand keeps Link::None; the quantifier op owns the continuation
    let operand = compile_tree(body, reg, false);
    debug_assert_eq!(operand.entry, q + 1);
    Frag::single(q)
}

// X*:  B: Branch[X -> Back(B), Nothing]
fn compile_star(body: &Node, greedy: bool, reg: &mut Program) -> Frag {
    let br = add_branch(reg, false);
    let x = compile_tree(body, reg, false);
    let back = add_back(reg, br);
    patch(reg, &x.holes, back);
    let nothing = add_op(reg, OpCode::Nothing, OperationPayload::None);
    let alts = if greedy {
        [x.entry, nothing]
    } else {
        [nothing, x.entry]
    };
    set_alts(reg, br, &alts);
    Frag {
        entry: br,
        holes: smallvec![nothing],
    }
}

// X+:  X -> Branch[Back(X), Nothing]
fn compile_plus(body: &Node, greedy: bool, reg: &mut Program) -> Frag {
    let x = compile_tree(body, reg, false);
    let br = add_branch(reg, false);
    patch(reg, &x.holes, br);
    let back = add_back(reg, x.entry);
    let nothing = add_op(reg, OpCode::Nothing, OperationPayload::None);
    let alts = if greedy {
        [back, nothing]
    } else {
        [nothing, back]
    };
    set_alts(reg, br, &alts);
    Frag {
        entry: x.entry,
        holes: smallvec![nothing],
    }
}

// X?:  Branch[X, Nothing]
fn compile_question(body: &Node, greedy: bool, reg: &mut Program) -> Frag {
    let br = add_branch(reg, false);
    let x = compile_tree(body, reg, false);
    let nothing = add_op(reg, OpCode::Nothing, OperationPayload::None);
    let alts = if greedy {
        [x.entry, nothing]
    } else {
        [nothing, x.entry]
    };
    set_alts(reg, br, &alts);
    let mut holes = x.holes;
    holes.push(nothing);
    Frag { entry: br, holes }
}

// X{0,max}:
//   InitCount(k) -> L: TestCount(k, max, body=B) -> exit
//   B: Branch[X -> IncCount(k) -> Back(L), Nothing -> exit]
fn compile_counted_upto(body: &Node, max: u32, greedy: bool, reg: &mut Program) -> Frag {
    let id = new_counter(reg);
    let init = add_op(reg, OpCode::InitCount, OperationPayload::Counter { id });
    let test = add_op(
        reg,
        OpCode::TestCount,
        OperationPayload::TestCount {
            id,
            bound: max,
            body: 0,
        },
    );
    set_next(reg, init, test);
    let br = add_branch(reg, false);
    set_test_body(reg, test, br);

    let x = compile_tree(body, reg, false);
    let inc = add_op(reg, OpCode::IncCount, OperationPayload::Counter { id });
    patch(reg, &x.holes, inc);
    let back = add_back(reg, test);
    set_next(reg, inc, back);
    let nothing = add_op(reg, OpCode::Nothing, OperationPayload::None);
    let alts = if greedy {
        [x.entry, nothing]
    } else {
        [nothing, x.entry]
    };
    set_alts(reg, br, &alts);
    Frag {
        entry: init,
        holes: smallvec![test, nothing],
    }
}

// X{min,}:
//   InitCount(k) -> L: X -> IncCount(k) -> TestCount(k, min, body=Back(L))
//   exit of the test: Branch[Back(L), Nothing -> exit]
fn compile_counted_atleast(body: &Node, min: u32, greedy: bool, reg: &mut Program) -> Frag {
    let id = new_counter(reg);
    let (init, x_entry, test) = compile_counted_prefix(body, id, min, reg);
    let br = add_branch(reg, false);
    set_next(reg, test, br);
    let back = add_back(reg, x_entry);
    let nothing = add_op(reg, OpCode::Nothing, OperationPayload::None);
    let alts = if greedy {
        [back, nothing]
    } else {
        [nothing, back]
    };
    set_alts(reg, br, &alts);
    Frag {
        entry: init,
        holes: smallvec![nothing],
    }
}

// X{min,max}, min > 0:
//   InitCount(k) -> L: X -> IncCount(k) -> TestCount(k, min, body=Back(L))
//   -> T: TestCount(k, max, body=B) -> exit
//   B: Branch[Back(L), Nothing -> exit]
fn compile_counted_range(
    body: &Node,
    min: u32,
    max: u32,
    greedy: bool,
    reg: &mut Program,
) -> Frag {
    let id = new_counter(reg);
    let (init, x_entry, test_min) = compile_counted_prefix(body, id, min, reg);
    if min == max {
        return Frag {
            entry: init,
            holes: smallvec![test_min],
        };
    }
    let test_max = add_op(
        reg,
        OpCode::TestCount,
        OperationPayload::TestCount {
            id,
            bound: max,
            body: 0,
        },
    );
    set_next(reg, test_min, test_max);
    let br = add_branch(reg, false);
    set_test_body(reg, test_max, br);
    let back = add_back(reg, x_entry);
    let nothing = add_op(reg, OpCode::Nothing, OperationPayload::None);
    let alts = if greedy {
        [back, nothing]
    } else {
        [nothing, back]
    };
    set_alts(reg, br, &alts);
    Frag {
        entry: init,
        holes: smallvec![test_max, nothing],
    }
}

/// Emit `InitCount -> X -> IncCount -> TestCount(min, body=Back(X))`.
/// Returns (init, entry of X, the min test); the test's exit is left open.
fn compile_counted_prefix(
    body: &Node,
    id: usize,
    min: u32,
    reg: &mut Program,
) -> (usize, usize, usize) {
    let init = add_op(reg, OpCode::InitCount, OperationPayload::Counter { id });
    let x = compile_tree(body, reg, false);
    set_next(reg, init, x.entry);
    let inc = add_op(reg, OpCode::IncCount, OperationPayload::Counter { id });
    patch(reg, &x.holes, inc);
    let test = add_op(
        reg,
        OpCode::TestCount,
        OperationPayload::TestCount {
            id,
            bound: min,
            body: 0,
        },
    );
    set_next(reg, inc, test);
    let back = add_back(reg, x.entry);
    set_test_body(reg, test, back);
    (init, x.entry, test)
}

fn set_test_body(reg: &mut Program, test: usize, target: usize) {
    if let OperationPayload::TestCount { body, .. } = &mut reg.ops[test].payload {
        *body = target;
    }
}

// ============================================================================
// Start-of-match analysis
// ============================================================================

/// Every match of `node` begins at a line start.
fn starts_with_bol(node: &Node) -> bool {
    match node {
        Node::Anchor(AnchorType::Bol) => true,
        Node::List(items) => items.first().is_some_and(starts_with_bol),
        Node::Alt(alts) => alts.iter().all(starts_with_bol),
        Node::Memory { body, .. } => starts_with_bol(body),
        Node::Quant { body, lower, .. } if *lower > 0 => starts_with_bol(body),
        _ => false,
    }
}

/// The byte every match of `node` must begin with, if there is one.
fn first_byte(node: &Node) -> Option<u8> {
    match node {
        Node::Str {
            s,
            ignore_case: false,
        } => s.first().copied(),
        Node::List(items) => {
            for item in items {
                match item {
                    // zero-width, consume nothing
                    Node::Anchor(_) | Node::Look { .. } => continue,
                    _ => return first_byte(item),
                }
            }
            None
        }
        Node::Alt(alts) => {
            let (first, rest) = alts.split_first()?;
            let c = first_byte(first)?;
            rest.iter().all(|a| first_byte(a) == Some(c)).then_some(c)
        }
        Node::Memory { body, .. } => first_byte(body),
        Node::Quant { body, lower, .. } if *lower > 0 => first_byte(body),
        _ => None,
    }
}

// ============================================================================
// Entry point: compile
// ============================================================================

/// Compile `pattern` into a [`Program`].
pub fn compile(pattern: &[u8], options: RegexOptions) -> Result<Program, RegexError> {
    let mut env = ParseEnv::new(options);
    let (root, _) = parse_tree(pattern, &mut env)?;

    let mut reg = Program::new(options);
    reg.num_parens = env.num_mem;
    let frag = compile_tree(&root, &mut reg, true);
    let end = add_op(&mut reg, OpCode::End, OperationPayload::None);
    patch(&mut reg, &frag.holes, end);
    reg.start = frag.entry;

    if reg.size > MAX_PROGRAM_SIZE {
        return Err(RegexError::compile(
            CompileErrorKind::ProgramTooLarge,
            pattern.len(),
        ));
    }

    reg.anchor_bol = starts_with_bol(&root);
    reg.match_start = if reg.anchor_bol {
        None
    } else {
        first_byte(&root)
    };

    debug!(
        pattern_len = pattern.len(),
        ops = reg.ops.len(),
        size = reg.size,
        groups = reg.num_parens,
        braces = reg.num_braces,
        anchored = reg.anchor_bol,
        "compiled regex"
    );
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log::with_captured_events;

    fn comp(pattern: &str) -> Program {
        compile(pattern.as_bytes(), RegexOptions::empty()).unwrap()
    }

    fn opcodes(reg: &Program) -> Vec<OpCode> {
        reg.ops.iter().map(|op| op.opcode).collect()
    }

    #[test]
    fn literal_program() {
        let reg = comp("abc");
        assert_eq!(opcodes(&reg), vec![OpCode::Exactly, OpCode::End]);
        assert_eq!(reg.start, 0);
        assert_eq!(reg.ops[0].next, Link::Forward(1));
        assert_eq!(reg.match_start, Some(b'a'));
        assert!(!reg.anchor_bol);
    }

    #[test]
    fn simple_quantifier_operand_follows() {
        let reg = comp("a*b");
        assert_eq!(
            opcodes(&reg),
            vec![OpCode::Star, OpCode::Exactly, OpCode::Exactly, OpCode::End]
        );
        assert_eq!(reg.ops[0].next, Link::Forward(2));
        assert_eq!(reg.ops[1].next, Link::None);

        let reg = comp("[ab]{2,3}?");
        assert_eq!(reg.ops[0].opcode, OpCode::LazyBrace);
        assert!(matches!(
            reg.ops[0].payload,
            OperationPayload::Repeat { min: 2, max: 3 }
        ));
        assert_eq!(reg.ops[1].opcode, OpCode::AnyOf);
    }

    #[test]
    fn star_loop_uses_back_edge() {
        let reg = comp("(ab)*");
        assert_eq!(reg.ops[0].opcode, OpCode::Branch);
        let back = reg
            .ops
            .iter()
            .position(|op| op.opcode == OpCode::Back)
            .unwrap();
        assert_eq!(reg.ops[back].next, Link::Back(0));
        assert_eq!(reg.num_parens, 1);
    }

    #[test]
    fn counted_forms_allocate_counters() {
        let reg = comp("(ab){2,4}(cd){0,3}(ef){2,}");
        assert_eq!(reg.num_braces, 3);
        assert!(reg.ops.iter().any(|op| op.opcode == OpCode::InitCount));
        assert!(reg.ops.iter().any(|op| op.opcode == OpCode::TestCount));
        // {n} on a simple atom stays compact
        let reg = comp("a{3}");
        assert_eq!(reg.num_braces, 0);
        assert_eq!(reg.ops[0].opcode, OpCode::Brace);
    }

    #[test]
    fn degenerate_forms() {
        assert_eq!(opcodes(&comp("a{0,}")), opcodes(&comp("a*")));
        assert_eq!(opcodes(&comp("a{1,}")), opcodes(&comp("a+")));
        assert_eq!(opcodes(&comp("a{0,1}")), opcodes(&comp("a?")));
        assert_eq!(opcodes(&comp("(ab){0,}")), opcodes(&comp("(ab)*")));
        assert_eq!(opcodes(&comp("(ab){1,1}")), opcodes(&comp("(ab)")));
    }

    #[test]
    fn top_level_branch_flag() {
        let reg = comp("ab|cd|ef");
        assert!(matches!(
            &reg.ops[0].payload,
            OperationPayload::Branch { alts, top_level: true } if alts.len() == 3
        ));
        let reg = comp("(ab|cd)");
        assert!(reg.ops.iter().all(|op| !matches!(
            op.payload,
            OperationPayload::Branch {
                top_level: true,
                ..
            }
        )));
    }

    #[test]
    fn lookbehind_carries_bounds() {
        let reg = comp("(?<=ab|c)d");
        assert!(matches!(
            reg.ops[0].payload,
            OperationPayload::LookBehind {
                lower: 1,
                upper: 2,
                ..
            }
        ));
    }

    #[test]
    fn start_analysis() {
        assert!(comp("^abc").anchor_bol);
        assert!(comp("^a|^b").anchor_bol);
        assert!(!comp("^a|b").anchor_bol);
        assert_eq!(comp("(?=x)xy").match_start, Some(b'x'));
        assert_eq!(comp("ab|ac").match_start, Some(b'a'));
        assert_eq!(comp("ab|cd").match_start, None);
        assert_eq!(comp("a*b").match_start, None);
        assert_eq!(comp("(?i)abc").match_start, None);
        assert_eq!(comp("(ab)+c").match_start, Some(b'a'));
    }

    #[test]
    fn program_size_limit() {
        let big = "[ab]".repeat(1000);
        let err = compile(big.as_bytes(), RegexOptions::empty()).unwrap_err();
        assert_eq!(err.kind(), Some(CompileErrorKind::ProgramTooLarge));
        assert!(compile("[ab]".repeat(100).as_bytes(), RegexOptions::empty()).is_ok());
    }

    #[test]
    fn links_stay_in_bounds() {
        let reg = comp(r"^(a|b(c)*)+?\2{2,5}(?<!x)(?=y)y$");
        for op in &reg.ops {
            if let Some(t) = op.next.target() {
                assert!(t < reg.ops.len());
            }
        }
        assert_eq!(reg.ops.last().map(|op| op.opcode), Some(OpCode::End));
    }

    #[test]
    fn compile_logs_summary() {
        let events = with_captured_events(|| {
            let _ = comp("(a)(b)");
        });
        let summary = events
            .iter()
            .find(|e| e.message == "compiled regex")
            .unwrap();
        assert_eq!(summary.level, tracing::Level::DEBUG);
        assert_eq!(summary.field("groups"), Some("2"));
        assert_eq!(summary.field("pattern_len"), Some("6"));
    }
}
