//! Error taxonomy of the command interpreter.
//!
//! Two tiers: [`CommandError`] is what a command reports back over the
//! protocol, [`FunctionError`] is the finer grained reason a collaborator
//! gave when a command failed with [`CommandError::Function`].

use thiserror::Error;

/// Command-level errors. Each maps to exactly one response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A supplied key is not part of the command's parameter schema.
    #[error("The provided parameters were invalid")]
    BadParam,
    /// The command word did not match any known command.
    #[error("The command was not recognized")]
    BadCommand,
    /// A value could not be parsed.
    #[error("A parse error occurred while processing the command")]
    ParseError,
    /// A collaborator failed; the nested error says why.
    #[error("A function error occurred while processing the command")]
    Function(FunctionError),
    #[error("An unknown error occurred")]
    Unknown,
    /// The ADC is sampling and the command would disturb it.
    #[error("The operation is not allowed while the ADC is sampling")]
    AdcInvalidOperation,
    /// The digital inputs are sampling and the command would disturb them.
    #[error("The operation is not allowed while the digital inputs are sampling")]
    DiInvalidOperation,
    /// The digital outputs are sampling and the command would disturb them.
    #[error("The operation is not allowed while the digital outputs are sampling")]
    DoInvalidOperation,
}

impl From<FunctionError> for CommandError {
    fn from(error: FunctionError) -> Self {
        CommandError::Function(error)
    }
}

/// Function-level errors reported by the board collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("A required analog input key was missing")]
    AinParseMissingKey,
    #[error("An analog input parameter could not be parsed")]
    AinParseError,
    #[error("The analog input number is out of range")]
    AinInputOutOfRange,
    #[error("The analog input already exists")]
    AinInputExists,
    #[error("The analog input does not exist")]
    AinInputNotFound,
    #[error("A required digital input key was missing")]
    DinParseMissingKey,
    #[error("A digital input parameter could not be parsed")]
    DinParseError,
    #[error("The digital input number is out of range")]
    DinInputOutOfRange,
    #[error("The digital input already exists")]
    DinInputExists,
    #[error("The digital input does not exist")]
    DinInputNotFound,
    #[error("A required digital output key was missing")]
    DoutParseMissingKey,
    #[error("A digital output parameter could not be parsed")]
    DoutParseError,
    #[error("The digital output number is out of range")]
    DoutOutputOutOfRange,
    #[error("The digital output already exists")]
    DoutOutputExists,
    #[error("The digital output does not exist")]
    DoutOutputNotFound,
    #[error("The ADC register contents could not be read")]
    AdcRegisterRead,
    #[error("The ADC calibration did not complete")]
    AdcCalibrationFailed,
    #[error("Unknown function error")]
    Unknown,
}

/// Status of a flash erase or program operation that did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlashError {
    #[error("flash is busy")]
    Busy,
    #[error("flash read protection error")]
    ReadProtection,
    #[error("flash programming sequence error")]
    ProgramSequence,
    #[error("flash programming parallelism error")]
    ProgramParallelism,
    #[error("flash programming alignment error")]
    ProgramAlignment,
    #[error("flash is write protected")]
    WriteProtected,
    #[error("flash programming error")]
    Program,
    #[error("flash operation error")]
    Operation,
}

/// Errors raised by the calibration table engine.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CalibrationError {
    /// Persistent calibration data may only be written in calibration mode.
    #[error("calibration storage is write protected outside of calibration mode")]
    WriteProtected,
    #[error("serial number must be {expected} characters, got {actual}")]
    SerialTooShort { expected: usize, actual: usize },
    #[error("temperature {temperature} Deg C is outside the calibration range [{low}, {high}]")]
    TemperatureOutOfRange { temperature: f32, low: f32, high: f32 },
    #[error("calibration temperature range is invalid")]
    InvalidRange,
    #[error(transparent)]
    Storage(#[from] FlashError),
}
