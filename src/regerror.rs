// regerror.rs - Compile error kinds and their messages.
//
// Every way a pattern can be rejected has its own kind, so callers can
// branch on it; the message text is fixed per kind.

use std::fmt;

/// Reason a pattern failed to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    UnmatchedOpenParen,
    UnmatchedCloseParen,
    QuantifierFollowsNothing,
    NestedQuantifier,
    EmptyQuantifierOperand,
    BraceBoundInvalid,
    BraceBoundTooLarge,
    BraceMinExceedsMax,
    BraceZeroRepeat,
    UnterminatedClass,
    InvalidClassRange,
    InvalidClassEscape,
    InvalidEscape,
    TrailingBackslash,
    BackrefNonexistentGroup,
    BackrefUnclosedGroup,
    UnboundedLookbehind,
    InvalidGroupSyntax,
    UnterminatedComment,
    TooManyParens,
    ParseDepthLimitOver,
    ProgramTooLarge,
}

/// Get the message for a compile error kind.
pub fn compile_error_to_format(kind: CompileErrorKind) -> &'static str {
    match kind {
        CompileErrorKind::UnmatchedOpenParen => "missing right parenthesis ')'",
        CompileErrorKind::UnmatchedCloseParen => "unmatched right parenthesis ')'",
        CompileErrorKind::QuantifierFollowsNothing => "target of repeat operator is not specified",
        CompileErrorKind::NestedQuantifier => "nested quantifiers",
        CompileErrorKind::EmptyQuantifierOperand => {
            "operand of '*', '+' or '{m,}' could match the empty string"
        }
        CompileErrorKind::BraceBoundInvalid => "invalid bound in '{m,n}'",
        CompileErrorKind::BraceBoundTooLarge => "'{m,n}' bound exceeds 65535",
        CompileErrorKind::BraceMinExceedsMax => "'{m,n}' minimum is greater than maximum",
        CompileErrorKind::BraceZeroRepeat => "zero-repeat '{0}', '{0,0}' or '{,0}' is meaningless",
        CompileErrorKind::UnterminatedClass => "missing right bracket ']'",
        CompileErrorKind::InvalidClassRange => "invalid range in character class",
        CompileErrorKind::InvalidClassEscape => "invalid escape inside character class",
        CompileErrorKind::InvalidEscape => "invalid escape sequence",
        CompileErrorKind::TrailingBackslash => "pattern ends with a backslash",
        CompileErrorKind::BackrefNonexistentGroup => "backreference to a nonexistent group",
        CompileErrorKind::BackrefUnclosedGroup => "backreference to an unclosed group",
        CompileErrorKind::UnboundedLookbehind => {
            "look-behind body must have a bounded length of at most 65535"
        }
        CompileErrorKind::InvalidGroupSyntax => "invalid '(?' group syntax",
        CompileErrorKind::UnterminatedComment => "missing ')' at end of comment",
        CompileErrorKind::TooManyParens => "too many capturing groups",
        CompileErrorKind::ParseDepthLimitOver => "parse depth limit over",
        CompileErrorKind::ProgramTooLarge => "compiled program is too large",
    }
}

impl CompileErrorKind {
    pub fn message(self) -> &'static str {
        compile_error_to_format(self)
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_distinct() {
        let kinds = [
            CompileErrorKind::UnmatchedOpenParen,
            CompileErrorKind::UnmatchedCloseParen,
            CompileErrorKind::QuantifierFollowsNothing,
            CompileErrorKind::NestedQuantifier,
            CompileErrorKind::EmptyQuantifierOperand,
            CompileErrorKind::BraceBoundInvalid,
            CompileErrorKind::BraceBoundTooLarge,
            CompileErrorKind::BraceMinExceedsMax,
            CompileErrorKind::BraceZeroRepeat,
            CompileErrorKind::UnterminatedClass,
            CompileErrorKind::InvalidClassRange,
            CompileErrorKind::InvalidClassEscape,
            CompileErrorKind::InvalidEscape,
            CompileErrorKind::TrailingBackslash,
            CompileErrorKind::BackrefNonexistentGroup,
            CompileErrorKind::BackrefUnclosedGroup,
            CompileErrorKind::UnboundedLookbehind,
            CompileErrorKind::InvalidGroupSyntax,
            CompileErrorKind::UnterminatedComment,
            CompileErrorKind::TooManyParens,
            CompileErrorKind::ParseDepthLimitOver,
            CompileErrorKind::ProgramTooLarge,
        ];
        let mut seen = std::collections::HashSet::new();
        for kind in kinds {
            assert!(seen.insert(kind.message()), "duplicate message for {:?}", kind);
        }
    }

    #[test]
    fn display_uses_message() {
        assert_eq!(
            CompileErrorKind::NestedQuantifier.to_string(),
            "nested quantifiers"
        );
    }
}
