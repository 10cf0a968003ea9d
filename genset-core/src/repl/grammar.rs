#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the operator console.
//!
//! The lexer uses `regal` to produce a bounded token stream, while the parser
//! walks the [`catalog`] tree with `winnow` combinators over those tokens to
//! build structured command values. Nothing here touches the sequencer, so a
//! rejected line never mutates state.

use super::catalog::{self, CommandTag, HelpTopics, Node, SubcommandBranch, SubcommandTag, ValueSpec};
use crate::config::ConfigSetting;
use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 32;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;
const MAX_PATH_DEPTH: usize = 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Duration literal ending in `ms` or `s`.
    #[regex(r"[0-9]+(?:ms|s)", priority = 2)]
    Duration,
    /// Decimal literal, optionally signed.
    #[regex(r"-?[0-9]+(?:\.[0-9]+)?")]
    Number,
    /// Identifier or keyword (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    /// Double-quoted string without embedded quotes or line breaks.
    #[regex(r#""[^"\r\n]*""#)]
    Quoted,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidInteger {
        span: Range<usize>,
    },
    InvalidNumber {
        span: Range<usize>,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidInteger { span } => {
                write!(f, "invalid integer literal at {span:?}")
            }
            GrammarErrorKind::InvalidNumber { span } => {
                write!(f, "invalid number literal at {span:?}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Wrapper type enabling a consistent error surface for consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_integer(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidInteger {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_number(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidNumber {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ParseError<'_> {}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum Command<'a> {
    Start,
    Stop,
    Auto(bool),
    Fault(FaultCommand),
    Sim(SimCommand),
    Config(ConfigCommand<'a>),
    Tick { count: u32 },
    Advance(Duration),
    Status,
    Log { limit: Option<u32> },
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FaultCommand {
    Alternator(bool),
    Relay(bool),
    Bias(f64),
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimCommand {
    Temperature(f64),
    Battery(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigCommand<'a> {
    Show,
    Export(&'a str),
    Import(&'a str),
    Set(ConfigSetting),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Tokenize the provided line.
///
/// # Errors
///
/// Returns [`LexError`] when the line overflows the token buffer or the lexer
/// engine fails.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        if buffer
            .push(Token {
                kind: record.token,
                lexeme,
                span,
            })
            .is_err()
        {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let end = start + partial.fragment.len();
        if buffer
            .push(Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span: start..end,
            })
            .is_err()
        {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    Ok(buffer)
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
///
/// # Errors
///
/// Returns [`ParseError`] carrying the offending token span when the line
/// does not match the catalog.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let command_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        if let Some(spec) = catalog::find(command_token.lexeme) {
            let mut state = CommandState::new(spec.tag);
            parse_node(spec.grammar, input, &mut state)?;
            state.finish()
        } else {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&command_token),
            )))
        }
    }
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::Argument {
            value,
            required,
            next,
        } => {
            parse_argument(input, *value, *required, state)?;
            parse_node(next, input, state)
        }
        Node::Subcommands(branches) => parse_subcommands(input, branches, state),
        Node::Topic { topics, next } => {
            parse_topic(*topics, input, state)?;
            parse_node(next, input, state)
        }
    }
}

fn parse_argument<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    spec: ValueSpec,
    required: bool,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let at_end = input
        .first()
        .is_none_or(|token| token.kind == TokenKind::Eol);
    if at_end && !required {
        return Ok(());
    }

    let value = parse_value(input, spec)?;
    state.argument = Some(value);
    Ok(())
}

fn parse_subcommands<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    branches: &'static [SubcommandBranch],
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let expected = branches.first().map_or("subcommand", |branch| branch.name);
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            if let Some(branch) = catalog::find_branch(branches, token.lexeme) {
                *input = rest;
                state.push_subcommand(branch.tag)?;
                parse_node(branch.grammar, input, state)
            } else {
                Err(ErrMode::Backtrack(GrammarError::unexpected(
                    expected,
                    Some(token),
                )))
            }
        }
        other => Err(ErrMode::Backtrack(GrammarError::unexpected(
            expected,
            other.map(|(token, _)| token),
        ))),
    }
}

fn parse_topic<'src, 'slice>(
    _topics: HelpTopics,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    state.topic = None;

    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            state.topic = Some(token.lexeme);
            *input = rest;
            Ok(())
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Ok(()),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "identifier",
            Some(token),
        ))),
        None => Ok(()),
    }
}

fn parse_value<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    spec: ValueSpec,
) -> Result<ArgumentValue<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match spec {
        ValueSpec::Number => {
            let token = expect_kind(TokenKind::Number, "number").parse_next(input)?;
            let value = parse_number(&token).map_err(ErrMode::Cut)?;
            Ok(ArgumentValue::Number(value))
        }
        ValueSpec::Count => {
            let token = expect_kind(TokenKind::Number, "count").parse_next(input)?;
            let value = parse_count(&token).map_err(ErrMode::Cut)?;
            Ok(ArgumentValue::Count(value))
        }
        ValueSpec::Duration => {
            let token = expect_kind(TokenKind::Duration, "duration").parse_next(input)?;
            let duration = parse_duration(&token).map_err(ErrMode::Cut)?;
            Ok(ArgumentValue::Duration(duration))
        }
        ValueSpec::Quoted => {
            let token = expect_kind(TokenKind::Quoted, "quoted path").parse_next(input)?;
            let text = token
                .lexeme
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .unwrap_or(token.lexeme);
            Ok(ArgumentValue::Text(text))
        }
        ValueSpec::Switch => {
            let token = expect_kind(TokenKind::Ident, "on or off").parse_next(input)?;
            if token.lexeme.eq_ignore_ascii_case("on") {
                Ok(ArgumentValue::Switch(true))
            } else if token.lexeme.eq_ignore_ascii_case("off") {
                Ok(ArgumentValue::Switch(false))
            } else {
                Err(ErrMode::Cut(GrammarError::unexpected(
                    "on or off",
                    Some(&token),
                )))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ArgumentValue<'a> {
    Number(f64),
    Count(u32),
    Duration(Duration),
    Text(&'a str),
    Switch(bool),
}

struct CommandState<'a> {
    tag: CommandTag,
    path: HeaplessVec<SubcommandTag, MAX_PATH_DEPTH>,
    argument: Option<ArgumentValue<'a>>,
    topic: Option<&'a str>,
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        Self {
            tag,
            path: HeaplessVec::new(),
            argument: None,
            topic: None,
        }
    }

    fn push_subcommand(&mut self, tag: SubcommandTag) -> Result<(), ErrMode<GrammarError<'a>>> {
        self.path
            .push(tag)
            .map_err(|_| ErrMode::Cut(GrammarError::unexpected("end of command", None)))
    }

    fn finish(self) -> Result<Command<'a>, ErrMode<GrammarError<'a>>> {
        use ArgumentValue as V;
        use SubcommandTag as S;

        let command = match (self.tag, self.path.as_slice(), self.argument) {
            (CommandTag::Start, [], None) => Command::Start,
            (CommandTag::Stop, [], None) => Command::Stop,
            (CommandTag::Auto, [], Some(V::Switch(enabled))) => Command::Auto(enabled),
            (CommandTag::Fault, [S::FaultAlternator], Some(V::Switch(on))) => {
                Command::Fault(FaultCommand::Alternator(on))
            }
            (CommandTag::Fault, [S::FaultRelay], Some(V::Switch(on))) => {
                Command::Fault(FaultCommand::Relay(on))
            }
            (CommandTag::Fault, [S::FaultBias], Some(V::Number(bias))) => {
                Command::Fault(FaultCommand::Bias(bias))
            }
            (CommandTag::Fault, [S::FaultClear], None) => Command::Fault(FaultCommand::Clear),
            (CommandTag::Sim, [S::SimTemperature], Some(V::Number(value))) => {
                Command::Sim(SimCommand::Temperature(value))
            }
            (CommandTag::Sim, [S::SimBattery], Some(V::Number(value))) => {
                Command::Sim(SimCommand::Battery(value))
            }
            (CommandTag::Config, [S::ConfigShow], None) => Command::Config(ConfigCommand::Show),
            (CommandTag::Config, [S::ConfigExport], Some(V::Text(path))) => {
                Command::Config(ConfigCommand::Export(path))
            }
            (CommandTag::Config, [S::ConfigImport], Some(V::Text(path))) => {
                Command::Config(ConfigCommand::Import(path))
            }
            (CommandTag::Config, [S::ConfigSet, key], Some(value)) => {
                let setting = config_setting(*key, value).ok_or_else(|| {
                    ErrMode::Backtrack(GrammarError::unexpected("configuration value", None))
                })?;
                Command::Config(ConfigCommand::Set(setting))
            }
            (CommandTag::Tick, [], None) => Command::Tick { count: 1 },
            (CommandTag::Tick, [], Some(V::Count(count))) => Command::Tick { count },
            (CommandTag::Advance, [], Some(V::Duration(duration))) => Command::Advance(duration),
            (CommandTag::Status, [], None) => Command::Status,
            (CommandTag::Log, [], None) => Command::Log { limit: None },
            (CommandTag::Log, [], Some(V::Count(limit))) => Command::Log { limit: Some(limit) },
            (CommandTag::Help, [], None) => Command::Help(HelpCommand { topic: self.topic }),
            (tag, _, _) => {
                return Err(ErrMode::Backtrack(GrammarError::unexpected(
                    catalog::command(tag).name,
                    None,
                )));
            }
        };
        Ok(command)
    }
}

fn config_setting(key: SubcommandTag, value: ArgumentValue<'_>) -> Option<ConfigSetting> {
    match (key, value) {
        (SubcommandTag::SetStartTemperature, ArgumentValue::Number(value)) => {
            Some(ConfigSetting::StartTemperature(value))
        }
        (SubcommandTag::SetHysteresis, ArgumentValue::Number(value)) => {
            Some(ConfigSetting::Hysteresis(value))
        }
        (SubcommandTag::SetMinRuntime, ArgumentValue::Count(value)) => {
            Some(ConfigSetting::MinRuntime(value))
        }
        (SubcommandTag::SetStartDebounce, ArgumentValue::Count(value)) => {
            Some(ConfigSetting::StartDebounce(value))
        }
        (SubcommandTag::SetStopDebounce, ArgumentValue::Count(value)) => {
            Some(ConfigSetting::StopDebounce(value))
        }
        (SubcommandTag::SetNoise, ArgumentValue::Switch(value)) => Some(ConfigSetting::Noise(value)),
        (SubcommandTag::SetFast, ArgumentValue::Switch(value)) => Some(ConfigSetting::Fast(value)),
        _ => None,
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_count<'a>(token: &Token<'a>) -> Result<u32, GrammarError<'a>> {
    token
        .lexeme
        .parse::<u32>()
        .map_err(|_| GrammarError::invalid_integer(token))
}

fn parse_number<'a>(token: &Token<'a>) -> Result<f64, GrammarError<'a>> {
    token
        .lexeme
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| GrammarError::invalid_number(token))
}

fn parse_duration<'a>(token: &Token<'a>) -> Result<Duration, GrammarError<'a>> {
    let text = token.lexeme;
    if let Some(rest) = text.strip_suffix("ms") {
        let millis = rest
            .parse::<u32>()
            .map_err(|_| GrammarError::invalid_duration(token))?;
        Ok(Duration::from_millis(millis.into()))
    } else if let Some(rest) = text.strip_suffix('s') {
        let seconds = rest
            .parse::<u32>()
            .map_err(|_| GrammarError::invalid_duration(token))?;
        Ok(Duration::from_secs(seconds.into()))
    } else {
        Err(GrammarError::invalid_duration(token))
    }
}
