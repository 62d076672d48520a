//! Converter settings that key the calibration tables.
//!
//! The discriminants are the ADS1256 register codes, which are neither
//! contiguous nor ordered, so table positions come from [`SampleRate::index`]
//! and friends rather than from the discriminant.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {setting} value: {value}")]
pub struct SettingParseError {
    pub setting: &'static str,
    pub value: String,
}

/// Data rate of the converter in samples per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleRate {
    Sps30000 = 0xF0,
    Sps15000 = 0xE0,
    Sps7500 = 0xD0,
    Sps3750 = 0xC0,
    Sps2000 = 0xB0,
    Sps1000 = 0xA1,
    Sps500 = 0x92,
    Sps100 = 0x82,
    Sps60 = 0x72,
    Sps50 = 0x63,
    Sps30 = 0x53,
    Sps25 = 0x43,
    Sps15 = 0x33,
    Sps10 = 0x23,
    Sps5 = 0x13,
    Sps2_5 = 0x03,
}

pub const NUM_SAMPLE_RATES: usize = 16;

impl SampleRate {
    pub const ALL: [SampleRate; NUM_SAMPLE_RATES] = [
        SampleRate::Sps30000,
        SampleRate::Sps15000,
        SampleRate::Sps7500,
        SampleRate::Sps3750,
        SampleRate::Sps2000,
        SampleRate::Sps1000,
        SampleRate::Sps500,
        SampleRate::Sps100,
        SampleRate::Sps60,
        SampleRate::Sps50,
        SampleRate::Sps30,
        SampleRate::Sps25,
        SampleRate::Sps15,
        SampleRate::Sps10,
        SampleRate::Sps5,
        SampleRate::Sps2_5,
    ];

    /// Row of this rate in the calibration tables, fastest first.
    pub fn index(self) -> usize {
        match self {
            SampleRate::Sps30000 => 0,
            SampleRate::Sps15000 => 1,
            SampleRate::Sps7500 => 2,
            SampleRate::Sps3750 => 3,
            SampleRate::Sps2000 => 4,
            SampleRate::Sps1000 => 5,
            SampleRate::Sps500 => 6,
            SampleRate::Sps100 => 7,
            SampleRate::Sps60 => 8,
            SampleRate::Sps50 => 9,
            SampleRate::Sps30 => 10,
            SampleRate::Sps25 => 11,
            SampleRate::Sps15 => 12,
            SampleRate::Sps10 => 13,
            SampleRate::Sps5 => 14,
            SampleRate::Sps2_5 => 15,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleRate::Sps30000 => "30000",
            SampleRate::Sps15000 => "15000",
            SampleRate::Sps7500 => "7500",
            SampleRate::Sps3750 => "3750",
            SampleRate::Sps2000 => "2000",
            SampleRate::Sps1000 => "1000",
            SampleRate::Sps500 => "500",
            SampleRate::Sps100 => "100",
            SampleRate::Sps60 => "60",
            SampleRate::Sps50 => "50",
            SampleRate::Sps30 => "30",
            SampleRate::Sps25 => "25",
            SampleRate::Sps15 => "15",
            SampleRate::Sps10 => "10",
            SampleRate::Sps5 => "5",
            SampleRate::Sps2_5 => "2.5",
        }
    }
}

impl FromStr for SampleRate {
    type Err = SettingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SampleRate::ALL
            .iter()
            .copied()
            .find(|rate| rate.as_str() == s)
            .ok_or_else(|| SettingParseError {
                setting: "rate",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SPS", self.as_str())
    }
}

/// Programmable gain amplifier setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gain {
    X1 = 0x00,
    X2 = 0x01,
    X4 = 0x02,
    X8 = 0x03,
    X16 = 0x04,
    X32 = 0x05,
    X64 = 0x06,
}

pub const NUM_PGA_SETTINGS: usize = 7;

impl Gain {
    pub const ALL: [Gain; NUM_PGA_SETTINGS] = [Gain::X1, Gain::X2, Gain::X4, Gain::X8, Gain::X16, Gain::X32, Gain::X64];

    pub fn index(self) -> usize {
        match self {
            Gain::X1 => 0,
            Gain::X2 => 1,
            Gain::X4 => 2,
            Gain::X8 => 3,
            Gain::X16 => 4,
            Gain::X32 => 5,
            Gain::X64 => 6,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn multiplier(self) -> u8 {
        1 << self.index()
    }
}

impl FromStr for Gain {
    type Err = SettingParseError;

    /// Accepts `X4`, `x4` and a bare `4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(|c: char| c.eq_ignore_ascii_case(&'x')).unwrap_or(s);
        Gain::ALL
            .iter()
            .copied()
            .find(|gain| digits.parse::<u8>().ok() == Some(gain.multiplier()))
            .ok_or_else(|| SettingParseError {
                setting: "gain",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.multiplier())
    }
}

/// Whether the converter's input buffer stage is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BufferSetting {
    Enabled = 0x02,
    Disabled = 0x00,
}

pub const NUM_BUFFER_SETTINGS: usize = 2;

impl BufferSetting {
    pub const ALL: [BufferSetting; NUM_BUFFER_SETTINGS] = [BufferSetting::Enabled, BufferSetting::Disabled];

    pub fn index(self) -> usize {
        match self {
            BufferSetting::Enabled => 0,
            BufferSetting::Disabled => 1,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl FromStr for BufferSetting {
    type Err = SettingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENABLED" => Ok(BufferSetting::Enabled),
            "DISABLED" => Ok(BufferSetting::Disabled),
            _ => Err(SettingParseError {
                setting: "buffer",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BufferSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferSetting::Enabled => write!(f, "ENABLED"),
            BufferSetting::Disabled => write!(f, "DISABLED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_parse_from_wire_text() {
        assert_eq!("1000".parse::<SampleRate>(), Ok(SampleRate::Sps1000));
        assert_eq!("2.5".parse::<SampleRate>(), Ok(SampleRate::Sps2_5));
        assert!("1001".parse::<SampleRate>().is_err());
    }

    #[test]
    fn gains_parse_with_either_prefix_case_or_none() {
        assert_eq!("X1".parse::<Gain>(), Ok(Gain::X1));
        assert_eq!("64".parse::<Gain>(), Ok(Gain::X64));
        assert!("X3".parse::<Gain>().is_err());
        assert_eq!("x1".parse::<Gain>(), Ok(Gain::X1));
    }

    #[test]
    fn buffer_parses_uppercase_words() {
        assert_eq!("ENABLED".parse::<BufferSetting>(), Ok(BufferSetting::Enabled));
        assert!("ON".parse::<BufferSetting>().is_err());
    }

    #[test]
    fn register_codes_are_not_table_indices() {
        assert_eq!(SampleRate::Sps1000.code(), 0xA1);
        assert_eq!(SampleRate::Sps1000.index(), 5);
        assert_eq!(BufferSetting::Enabled.code(), 0x02);
        assert_eq!(BufferSetting::Enabled.index(), 0);
    }

    #[test]
    fn indices_cover_each_axis_exactly_once() {
        let mut seen = [false; NUM_SAMPLE_RATES];
        for rate in SampleRate::ALL {
            assert!(!seen[rate.index()]);
            seen[rate.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));

        let mut seen = [false; NUM_PGA_SETTINGS];
        for gain in Gain::ALL {
            assert!(!seen[gain.index()]);
            seen[gain.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
