//! Channel selection mini-language.
//!
//! A channel parameter is one of `ALL`, a comma set (`1,3,7`), a dash range
//! (`2-4`, `3-`) or a single index. Resolution fills a fixed-capacity
//! [`ChannelList`] with one optional handle per requested channel; a `None`
//! slot is a channel hole, a requested index with nothing configured behind it.

use log::debug;
use thiserror::Error;

use crate::parse::scan_int;

pub const ALL_CHANNELS_STRING: &str = "ALL";
const RANGE_DELIMITER: char = '-';
const SET_DELIMITER: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    AnalogInput,
    DigitalInput,
    DigitalOutput,
}

/// Reference to a configured input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub kind: ChannelKind,
    pub number: u8,
}

impl ChannelHandle {
    pub fn new(kind: ChannelKind, number: u8) -> Self {
        Self { kind, number }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelListType {
    Single,
    Range,
    Set,
    All,
}

/// Classifies a channel parameter. `ALL` wins over a comma, a comma wins over a dash.
pub fn classify(value: &str) -> ChannelListType {
    if value == ALL_CHANNELS_STRING {
        ChannelListType::All
    } else if value.contains(SET_DELIMITER) {
        ChannelListType::Set
    } else if value.contains(RANGE_DELIMITER) {
        ChannelListType::Range
    } else {
        ChannelListType::Single
    }
}

/// How numbers inside a channel parameter are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberParsing {
    /// Leading-integer scanning: garbage reads as 0, a 0 ends a comma set and
    /// a range starting at 0 selects channel 0 alone.
    Lenient,
    /// Every number must be a well formed integer, sets may contain 0 and
    /// ranges may start at 0.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed channel list: {0}")]
pub struct ChannelListError(pub String);

/// Fixed-capacity list of resolved channel handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelList {
    slots: Vec<Option<ChannelHandle>>,
}

impl ChannelList {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn slots(&self) -> &[Option<ChannelHandle>] {
        &self.slots
    }

    /// Handles in slot order, skipping holes.
    pub fn handles(&self) -> impl Iterator<Item = ChannelHandle> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn populated(&self) -> usize {
        self.handles().count()
    }

    fn set(&mut self, slot: usize, handle: Option<ChannelHandle>) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry) => {
                *entry = handle;
                true
            }
            None => false,
        }
    }
}

/// Resolves `value` into `list`.
///
/// `channel_count` is the number of channels of the requested kind and
/// `lookup` returns the handle configured at an index, if any. Every slot is
/// cleared first, so nothing from a previous resolution survives. Entries
/// that do not fit the list's capacity are dropped.
pub fn resolve<F>(
    list: &mut ChannelList,
    value: &str,
    channel_count: usize,
    parsing: NumberParsing,
    lookup: F,
) -> Result<ChannelListType, ChannelListError>
where
    F: Fn(u8) -> Option<ChannelHandle>,
{
    list.clear();
    let find = |index: i64| u8::try_from(index).ok().and_then(&lookup);
    let count = channel_count as i64;
    let list_type = classify(value);

    match list_type {
        ChannelListType::Single => {
            let channel = parse_number(value, parsing)?;
            if channel < 0 || channel > count {
                debug!("[Command Interpreter] The requested input number is out of range.");
            } else {
                list.set(0, find(channel));
            }
        }
        ChannelListType::Set => {
            for (slot, index) in parse_set(value, parsing)?.into_iter().enumerate() {
                if !list.set(slot, find(index)) {
                    break;
                }
            }
        }
        ChannelListType::Range => {
            let (first, second) = parse_range(value, parsing)?;
            let start = first;
            let end = match (first, parsing) {
                // A zero start never opens a range in lenient mode: `0-3` is channel 0 alone.
                (0, NumberParsing::Lenient) => 0,
                _ if second != 0 => second,
                _ => count,
            };
            if start < 0 {
                debug!("[Command Interpreter] The requested range start is out of range.");
            } else {
                for (slot, index) in (start..=end).enumerate() {
                    if !list.set(slot, find(index)) {
                        break;
                    }
                }
            }
        }
        ChannelListType::All => {
            for index in 0..count {
                list.set(index as usize, find(index));
            }
        }
    }
    Ok(list_type)
}

fn parse_number(text: &str, parsing: NumberParsing) -> Result<i64, ChannelListError> {
    match parsing {
        NumberParsing::Lenient => Ok(scan_int(text).0),
        NumberParsing::Strict => text
            .trim()
            .parse::<i64>()
            .map_err(|_| ChannelListError(text.to_string())),
    }
}

fn parse_set(value: &str, parsing: NumberParsing) -> Result<Vec<i64>, ChannelListError> {
    let mut indices = Vec::new();
    for part in value.split(SET_DELIMITER) {
        let index = parse_number(part, parsing)?;
        if index == 0 && parsing == NumberParsing::Lenient {
            break;
        }
        indices.push(index);
    }
    Ok(indices)
}

fn parse_range(value: &str, parsing: NumberParsing) -> Result<(i64, i64), ChannelListError> {
    match parsing {
        NumberParsing::Lenient => {
            let (first, rest) = scan_int(value);
            // Skip the delimiter, whatever it is.
            let mut chars = rest.chars();
            chars.next();
            let (second, _) = scan_int(chars.as_str());
            Ok((first, second))
        }
        NumberParsing::Strict => {
            let (first, second) = value
                .split_once(RANGE_DELIMITER)
                .ok_or_else(|| ChannelListError(value.to_string()))?;
            let bound = |text: &str| {
                if text.trim().is_empty() {
                    Ok(0)
                } else {
                    parse_number(text, parsing)
                }
            };
            Ok((bound(first)?, bound(second)?))
        }
    }
}
