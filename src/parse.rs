//! Line buffering, tokenizing and key/value argument parsing.
//!
//! Characters are accumulated by [`LineBuffer`] until a line terminator,
//! the finished line is split by [`tokenize`] into a command word and raw
//! argument tokens, and [`parse_key_value_pairs`] turns `--KEY=VALUE`
//! tokens into [`Parameter`]s which [`check_args`] validates against a
//! command's schema.

use log::debug;
use thiserror::Error;

use crate::command::to_upper_text;
use crate::config::Limits;

const CARRIAGE_RETURN: u8 = 0x0D;
const LINE_FEED: u8 = 0x0A;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

const COMMAND_DELIMITER: char = ' ';
const KEY_VALUE_PAIR_FLAG: &str = "--";
const KEY_VALUE_PAIR_DELIMITER: char = '=';

/// Fixed-capacity buffer collecting the characters of one command line.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Feeds one character.
    ///
    /// Returns the completed line when `c` is a CR or LF and the buffer held
    /// something; the buffer is cleared in that case. Backspace and DEL remove
    /// the last character, NUL is ignored, and anything else is appended while
    /// there is room and silently dropped once the buffer is full.
    pub fn push(&mut self, c: u8) -> Option<String> {
        match c {
            0x00 => None,
            CARRIAGE_RETURN | LINE_FEED => {
                if self.buf.is_empty() {
                    return None;
                }
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.clear();
                Some(line)
            }
            BACKSPACE | DELETE => {
                self.buf.pop();
                None
            }
            _ => {
                if self.buf.len() < self.capacity {
                    self.buf.push(c);
                }
                None
            }
        }
    }

    /// Empties the buffer, zeroing what it held.
    pub fn clear(&mut self) {
        self.buf.iter_mut().for_each(|b| *b = 0);
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// What to do with an argument token or argument count that exceeds the limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Cut the token, or ignore the surplus arguments.
    Truncate,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenizeError {
    /// The command word does not fit the token limit. Always fatal for the line.
    #[error("command word is {length} characters long, the limit is {limit}")]
    CommandTooLong { length: usize, limit: usize },
    #[error("argument {index} is {length} characters long, the limit is {limit}")]
    TokenTooLong { index: usize, length: usize, limit: usize },
    #[error("{count} arguments supplied, the limit is {limit}")]
    TooManyArguments { count: usize, limit: usize },
}

/// A line split into its command word and raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenizedLine {
    pub command: String,
    pub raw_args: Vec<String>,
}

/// Splits a line on spaces.
///
/// The number of delimiters is the declared argument count; it bounds how
/// many tokens are taken even when runs of spaces leave fewer tokens than
/// declared.
pub fn tokenize(line: &str, limits: &Limits, overflow: Overflow) -> Result<TokenizedLine, TokenizeError> {
    let longest = limits.max_token_length.saturating_sub(1);
    let declared = line.matches(COMMAND_DELIMITER).count();

    if declared == 0 {
        if line.len() > longest {
            return Err(TokenizeError::CommandTooLong {
                length: line.len(),
                limit: longest,
            });
        }
        return Ok(TokenizedLine {
            command: line.to_string(),
            raw_args: Vec::new(),
        });
    }

    let mut tokens = line.split(COMMAND_DELIMITER).filter(|t| !t.is_empty());
    let command = tokens.next().unwrap_or_default();
    let command_end = line.find(COMMAND_DELIMITER).unwrap_or(line.len());
    if command_end > longest || command.len() > longest {
        return Err(TokenizeError::CommandTooLong {
            length: command.len().max(command_end),
            limit: longest,
        });
    }

    let mut raw_args = Vec::new();
    for (index, token) in tokens.take(declared).enumerate() {
        if raw_args.len() == limits.max_arguments {
            match overflow {
                Overflow::Truncate => {
                    debug!("[Command Interpreter] Ignoring arguments past {}.", limits.max_arguments);
                    break;
                }
                Overflow::Reject => {
                    return Err(TokenizeError::TooManyArguments {
                        count: line.split(COMMAND_DELIMITER).filter(|t| !t.is_empty()).count() - 1,
                        limit: limits.max_arguments,
                    })
                }
            }
        }
        if token.len() > longest {
            match overflow {
                Overflow::Truncate => {
                    debug!("[Command Interpreter] Truncating argument {} ({}).", index, token);
                    raw_args.push(truncate_at_boundary(token, longest).to_string());
                }
                Overflow::Reject => {
                    return Err(TokenizeError::TokenTooLong {
                        index,
                        length: token.len(),
                        limit: longest,
                    })
                }
            }
        } else {
            raw_args.push(token.to_string());
        }
    }

    Ok(TokenizedLine {
        command: command.to_string(),
        raw_args,
    })
}

fn truncate_at_boundary(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// One `--KEY=VALUE` argument, both halves uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

impl Parameter {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Parses a raw token of the form `--KEY=VALUE` or `--KEY`.
    ///
    /// The key runs up to the first `=`, the value up to the next one.
    /// Returns `None` for tokens without the `--` prefix.
    pub fn from_token(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix(KEY_VALUE_PAIR_FLAG)?;
        let mut parts = body.split(KEY_VALUE_PAIR_DELIMITER).filter(|p| !p.is_empty());
        let mut key = parts.next().unwrap_or_default().to_string();
        let mut value = parts.next().unwrap_or_default().to_string();
        to_upper_text(&mut key);
        to_upper_text(&mut value);
        Some(Self { key, value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("argument {index} ({token}) is not a --KEY=VALUE pair")]
pub struct MalformedArgument {
    pub index: usize,
    pub token: String,
}

/// Parses every raw token into a [`Parameter`].
///
/// Tokens without the `--` prefix are skipped and collected separately so the
/// caller can decide whether to ignore them or fail the command.
pub fn parse_key_value_pairs(raw_args: &[String]) -> (Vec<Parameter>, Vec<MalformedArgument>) {
    let mut parameters = Vec::with_capacity(raw_args.len());
    let mut malformed = Vec::new();
    for (index, raw) in raw_args.iter().enumerate() {
        match Parameter::from_token(raw) {
            Some(parameter) => parameters.push(parameter),
            None => {
                debug!(
                    "[Command Interpreter] Key/value pair {} ({}) was not properly formatted.",
                    index, raw
                );
                malformed.push(MalformedArgument {
                    index,
                    token: raw.clone(),
                });
            }
        }
    }
    (parameters, malformed)
}

/// Checks supplied parameters against a command schema.
///
/// Fails when there are more parameters than schema entries or when any key
/// is not in the schema. Missing keys are not detected here.
pub fn check_args(parameters: &[Parameter], schema: &[&str]) -> bool {
    if parameters.len() > schema.len() {
        return false;
    }
    parameters
        .iter()
        .all(|parameter| schema.iter().any(|key| *key == parameter.key))
}

/// Position of the first parameter whose key is `target`.
pub fn index_of_argument(parameters: &[Parameter], target: &str) -> Option<usize> {
    parameters.iter().position(|parameter| parameter.key == target)
}

/// Value of the first parameter whose key is `target`.
pub fn argument<'a>(parameters: &'a [Parameter], target: &str) -> Option<&'a str> {
    index_of_argument(parameters, target).map(|index| parameters[index].value.as_str())
}

/// Scans a leading base-10 integer.
///
/// Skips leading whitespace and accepts one sign. Returns the value and the
/// unconsumed remainder; when no digits are found the value is 0 and the
/// remainder is the whole input. Out-of-range values saturate.
pub fn scan_int(text: &str) -> (i64, &str) {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut pos = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            pos = 1;
            true
        }
        Some(b'+') => {
            pos = 1;
            false
        }
        _ => false,
    };
    let digits_start = pos;
    let mut value: i64 = 0;
    while let Some(digit) = bytes.get(pos).filter(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(i64::from(digit - b'0'));
        pos += 1;
    }
    if pos == digits_start {
        return (0, text);
    }
    (if negative { -value } else { value }, &trimmed[pos..])
}
