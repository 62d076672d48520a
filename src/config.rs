//! Tunable limits and board layout for the command interpreter.

/// Maximum number of characters buffered for one command line.
pub const MAX_COMMANDLINE_LENGTH: usize = 255;
/// Maximum length of the command word or of one argument token, terminator included.
pub const MAX_COMMANDPART_LENGTH: usize = 50;
/// Maximum number of argument tokens following the command word.
pub const MAX_NUM_ARGUMENTS: usize = 10;

pub const NUM_ANALOG_INPUTS: usize = 32;
pub const NUM_DIGITAL_INPUTS: usize = 24;
pub const NUM_DIGITAL_OUTPUTS: usize = 16;

/// Lowest board temperature (Deg C) for which the factory calibration is trusted.
pub const CALIBRATION_VALID_MIN_TEMP: f32 = 0.0;
/// Highest board temperature (Deg C) for which the factory calibration is trusted.
pub const CALIBRATION_VALID_MAX_TEMP: f32 = 50.0;

/// Buffer and token limits applied by the lexer and tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_line_length: usize,
    /// Token capacity including the terminator, so the longest accepted
    /// token is one character shorter.
    pub max_token_length: usize,
    pub max_arguments: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_length: MAX_COMMANDLINE_LENGTH,
            max_token_length: MAX_COMMANDPART_LENGTH,
            max_arguments: MAX_NUM_ARGUMENTS,
        }
    }
}

/// Number of channels of each kind. Sizes the scratch channel lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardLayout {
    pub analog_inputs: usize,
    pub digital_inputs: usize,
    pub digital_outputs: usize,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self {
            analog_inputs: NUM_ANALOG_INPUTS,
            digital_inputs: NUM_DIGITAL_INPUTS,
            digital_outputs: NUM_DIGITAL_OUTPUTS,
        }
    }
}

/// Temperature window the board must have stayed inside for its calibration to be valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBounds {
    pub min_valid_temperature: f32,
    pub max_valid_temperature: f32,
}

impl Default for CalibrationBounds {
    fn default() -> Self {
        Self {
            min_valid_temperature: CALIBRATION_VALID_MIN_TEMP,
            max_valid_temperature: CALIBRATION_VALID_MAX_TEMP,
        }
    }
}

impl CalibrationBounds {
    /// Whether a recorded temperature history stayed inside the window.
    pub fn admits(&self, min_temperature: f32, max_temperature: f32) -> bool {
        !(max_temperature > self.max_valid_temperature || min_temperature < self.min_valid_temperature)
    }
}

/// Complete interpreter configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub limits: Limits,
    pub layout: BoardLayout,
    pub bounds: CalibrationBounds,
    /// When set, oversized lines, malformed key/value tokens and zero-terminated
    /// comma sets are dropped without a response, as existing clients expect.
    /// When cleared, they are reported as parse errors and comma sets may contain `0`.
    pub silent_drops: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            layout: BoardLayout::default(),
            bounds: CalibrationBounds::default(),
            silent_drops: true,
        }
    }
}

impl Config {
    /// Configuration that reports malformed input instead of dropping it.
    pub fn strict() -> Self {
        Self {
            silent_drops: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.limits.max_line_length, 255);
        assert_eq!(config.limits.max_token_length, 50);
        assert_eq!(config.limits.max_arguments, 10);
        assert_eq!(config.layout.analog_inputs, 32);
        assert!(config.silent_drops);
        assert!(!Config::strict().silent_drops);
    }

    #[test]
    fn calibration_window_is_inclusive() {
        let bounds = CalibrationBounds::default();
        assert!(bounds.admits(0.0, 50.0));
        assert!(bounds.admits(21.5, 30.0));
        assert!(!bounds.admits(-0.5, 30.0));
        assert!(!bounds.admits(10.0, 50.5));
    }
}
