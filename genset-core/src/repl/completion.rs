//! Grammar-aware completion engine for the operator console.
//!
//! Suggestions come from walking the [`catalog`](super::catalog) tree with the
//! tokens already typed, so every keyword the parser accepts is offered and
//! nothing else.

use super::catalog::{self, Node};
use super::grammar::{self, Token, TokenKind};
use heapless::Vec as HeaplessVec;

const MAX_SUGGESTIONS: usize = 16;

/// Completion result returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionResult {
    /// Replacement to apply when only one candidate matches or when the
    /// candidates share a longer prefix than what was typed.
    pub replacement: Option<Replacement>,
    /// Candidates at the cursor position. Empty when nothing matches.
    pub options: HeaplessVec<&'static str, MAX_SUGGESTIONS>,
}

impl CompletionResult {
    fn empty() -> Self {
        Self {
            replacement: None,
            options: HeaplessVec::new(),
        }
    }
}

/// Portion of the buffer to substitute with the completion string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub value: &'static str,
    pub append_space: bool,
}

/// Stateless completion engine that mirrors the console grammar.
#[derive(Default)]
pub struct CompletionEngine;

impl CompletionEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes completions for `buffer` at byte offset `cursor`.
    ///
    /// The cursor must sit on a UTF-8 boundary.
    #[must_use]
    pub fn complete(&self, buffer: &str, cursor: usize) -> CompletionResult {
        let Some(upto_cursor) = buffer.get(..cursor) else {
            return CompletionResult::empty();
        };

        let prefix_start = token_start(upto_cursor);
        let prefix = &upto_cursor[prefix_start..];
        let leading = &upto_cursor[..prefix_start];

        let Ok(leading_tokens) = grammar::lex(leading) else {
            return CompletionResult::empty();
        };
        if leading_tokens
            .iter()
            .any(|token| token.kind == TokenKind::Error)
        {
            return CompletionResult::empty();
        }

        let Some(slot) = next_slot(leading_tokens.as_slice()) else {
            return CompletionResult::empty();
        };

        let mut matches: HeaplessVec<&'static str, MAX_SUGGESTIONS> = HeaplessVec::new();
        for candidate in slot.candidates() {
            if starts_with_ignore_ascii_case(candidate, prefix) {
                let _ = matches.push(candidate);
            }
        }

        let replacement_value = match matches.as_slice() {
            [] => None,
            [only] => Some((*only, slot.expects_more_after(only))),
            several => {
                let lcp = longest_common_prefix(several);
                let shared = common_prefix_len_ignore_case(prefix, lcp);
                (lcp.len() > shared).then_some((lcp, false))
            }
        };

        CompletionResult {
            replacement: replacement_value.map(|(value, append_space)| Replacement {
                start: prefix_start,
                end: cursor,
                value,
                append_space,
            }),
            options: matches,
        }
    }
}

/// Grammar position reached after the typed tokens.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Command,
    Branches(&'static [catalog::SubcommandBranch]),
    Keywords(&'static [&'static str]),
}

impl Slot {
    fn candidates(self) -> impl Iterator<Item = &'static str> {
        let (commands, branches, keywords): (
            &'static [catalog::CommandSpec],
            &'static [catalog::SubcommandBranch],
            &'static [&'static str],
        ) = match self {
            Slot::Command => (catalog::commands(), &[], &[]),
            Slot::Branches(branches) => (&[], branches, &[]),
            Slot::Keywords(keywords) => (&[], &[], keywords),
        };
        commands
            .iter()
            .map(|spec| spec.name)
            .chain(branches.iter().map(|branch| branch.name))
            .chain(keywords.iter().copied())
    }

    /// Whether the grammar continues after `candidate` is accepted.
    fn expects_more_after(self, candidate: &str) -> bool {
        match self {
            Slot::Command => {
                catalog::find(candidate).is_some_and(|spec| !matches!(spec.grammar, Node::End))
            }
            Slot::Branches(branches) => catalog::find_branch(branches, candidate)
                .is_some_and(|branch| !matches!(branch.grammar, Node::End)),
            Slot::Keywords(_) => false,
        }
    }
}

fn next_slot(tokens: &[Token<'_>]) -> Option<Slot> {
    let Some((first, rest)) = tokens.split_first() else {
        return Some(Slot::Command);
    };
    let spec = catalog::find(first.lexeme)?;
    walk(spec.grammar, rest)
}

fn walk(node: &'static Node, tokens: &[Token<'_>]) -> Option<Slot> {
    match node {
        Node::End => None,
        Node::Argument { value, next, .. } => match tokens.split_first() {
            None => {
                let keywords = value.keywords();
                (!keywords.is_empty()).then_some(Slot::Keywords(keywords))
            }
            Some((_, rest)) => walk(next, rest),
        },
        Node::Subcommands(branches) => match tokens.split_first() {
            None => Some(Slot::Branches(branches)),
            Some((token, rest)) => {
                let branch = catalog::find_branch(branches, token.lexeme)?;
                walk(branch.grammar, rest)
            }
        },
        Node::Topic { next, .. } => match tokens.split_first() {
            None => Some(Slot::Command),
            Some((_, rest)) => walk(next, rest),
        },
    }
}

fn token_start(buffer: &str) -> usize {
    buffer
        .rfind([' ', '\t'])
        .map_or(0, |index| index + 1)
}

fn starts_with_ignore_ascii_case(candidate: &str, prefix: &str) -> bool {
    candidate
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn common_prefix_len_ignore_case(lhs: &str, rhs: &str) -> usize {
    lhs.as_bytes()
        .iter()
        .zip(rhs.as_bytes())
        .take_while(|(l, r)| l.eq_ignore_ascii_case(r))
        .count()
}

fn longest_common_prefix(candidates: &[&'static str]) -> &'static str {
    let Some((first, rest)) = candidates.split_first() else {
        return "";
    };
    let mut prefix = *first;
    for candidate in rest {
        let len = common_prefix_len_ignore_case(prefix, candidate);
        prefix = &prefix[..len];
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_options(
        result: CompletionResult,
    ) -> (
        Option<Replacement>,
        HeaplessVec<&'static str, MAX_SUGGESTIONS>,
    ) {
        assert!(
            !result.options.is_empty(),
            "expected suggestions but got no match"
        );
        (result.replacement, result.options)
    }

    #[test]
    fn offers_root_commands_from_empty_buffer() {
        let engine = CompletionEngine::new();
        let (replacement, options) = expect_options(engine.complete("", 0));
        assert!(replacement.is_none());
        assert_eq!(options.len(), catalog::commands().len());
        assert_eq!(options[0], "start");
    }

    #[test]
    fn filters_root_commands_by_prefix() {
        let engine = CompletionEngine::new();
        let (replacement, options) = expect_options(engine.complete("st", 2));
        assert!(replacement.is_none());
        assert_eq!(options.as_slice(), ["start", "stop", "status"]);
    }

    #[test]
    fn expands_unique_root_command_with_space() {
        let engine = CompletionEngine::new();
        let (replacement, options) = expect_options(engine.complete("con", 3));
        let replacement = replacement.expect("expected replacement");
        assert_eq!((replacement.start, replacement.end), (0, 3));
        assert_eq!(replacement.value, "config");
        assert!(replacement.append_space);
        assert_eq!(options.as_slice(), ["config"]);
    }

    #[test]
    fn does_not_append_space_for_status_command() {
        let engine = CompletionEngine::new();
        let (replacement, _) = expect_options(engine.complete("statu", 5));
        let replacement = replacement.expect("expected replacement");
        assert_eq!(replacement.value, "status");
        assert!(!replacement.append_space);
    }

    #[test]
    fn suggests_nested_config_keys() {
        let engine = CompletionEngine::new();
        let (replacement, options) = expect_options(engine.complete("config set st", 13));
        assert!(replacement.is_none());
        assert_eq!(options.as_slice(), ["start-temp", "start-debounce", "stop-debounce"]);

        let (replacement, options) = expect_options(engine.complete("config set sta", 14));
        let replacement = replacement.expect("expected shared prefix");
        assert_eq!((replacement.start, replacement.end), (11, 14));
        assert_eq!(replacement.value, "start-");
        assert!(!replacement.append_space);
        assert_eq!(options.as_slice(), ["start-temp", "start-debounce"]);
    }

    #[test]
    fn suggests_switch_keywords() {
        let engine = CompletionEngine::new();
        let (replacement, options) = expect_options(engine.complete("fault relay ", 12));
        assert!(replacement.is_none());
        assert_eq!(options.as_slice(), ["on", "off"]);

        let (replacement, _) = expect_options(engine.complete("auto of", 7));
        assert_eq!(replacement.map(|r| r.value), Some("off"));
    }

    #[test]
    fn applies_case_insensitive_matching() {
        let engine = CompletionEngine::new();
        let (replacement, options) = expect_options(engine.complete("FaUlT AL", 8));
        let replacement = replacement.expect("expected replacement");
        assert_eq!((replacement.start, replacement.end), (6, 8));
        assert_eq!(replacement.value, "alternator");
        assert!(replacement.append_space);
        assert_eq!(options.as_slice(), ["alternator"]);
    }

    #[test]
    fn provides_help_topics() {
        let engine = CompletionEngine::new();
        let (_, options) = expect_options(engine.complete("help s", 6));
        assert_eq!(options.as_slice(), ["start", "stop", "sim", "status"]);
    }

    #[test]
    fn numeric_slots_offer_nothing() {
        let engine = CompletionEngine::new();
        assert!(engine.complete("sim temp ", 9).options.is_empty());
        assert!(engine.complete("bogus ", 6).options.is_empty());
    }
}
