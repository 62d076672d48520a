//! The fixed command set and the parameter schema of every command.

pub const PARAMETER_INPUT: &str = "INPUT";
pub const PARAMETER_RATE: &str = "RATE";
pub const PARAMETER_GAIN: &str = "GAIN";
pub const PARAMETER_BUFFER: &str = "BUFFER";
pub const PARAMETER_NUMBER: &str = "NUMBER";
pub const PARAMETER_NAME: &str = "NAME";
pub const PARAMETER_OUTPUT: &str = "OUTPUT";
pub const PARAMETER_VALUE: &str = "VALUE";

pub const NUM_COMMANDS: usize = 28;

/// Every command understood by the interpreter.
///
/// [`Command::None`] is the sentinel produced for any word that is not in
/// [`Command::ALL`]'s name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    ListAnalogInputs,
    ReadAdcRegisters,
    ReadAnalogInput,
    AddAnalogInput,
    RemoveAnalogInput,
    CheckAnalogInput,
    SystemGcal,
    SystemCal,
    ListDigitalInputs,
    ReadDigitalInput,
    AddDigitalInput,
    RemoveDigitalInput,
    ListDigitalOutputs,
    SetDigitalOutput,
    ReadDigitalOutput,
    AddDigitalOutput,
    RemoveDigitalOutput,
    ClearDigOutputFault,
    Disconnect,
    Upgrade,
    Identify,
    Sample,
    Halt,
    SetRtc,
    SetUserMac,
    SetStaticIp,
    GetCalibrationStatus,
    None,
}

impl Command {
    /// Resolution order of the name table.
    pub const ALL: [Command; NUM_COMMANDS] = [
        Command::ListAnalogInputs,
        Command::ReadAdcRegisters,
        Command::ReadAnalogInput,
        Command::AddAnalogInput,
        Command::RemoveAnalogInput,
        Command::CheckAnalogInput,
        Command::SystemGcal,
        Command::SystemCal,
        Command::ListDigitalInputs,
        Command::ReadDigitalInput,
        Command::AddDigitalInput,
        Command::RemoveDigitalInput,
        Command::ListDigitalOutputs,
        Command::SetDigitalOutput,
        Command::ReadDigitalOutput,
        Command::AddDigitalOutput,
        Command::RemoveDigitalOutput,
        Command::ClearDigOutputFault,
        Command::Disconnect,
        Command::Upgrade,
        Command::Identify,
        Command::Sample,
        Command::Halt,
        Command::SetRtc,
        Command::SetUserMac,
        Command::SetStaticIp,
        Command::GetCalibrationStatus,
        Command::None,
    ];

    /// Canonical uppercase name on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Command::ListAnalogInputs => "LIST_ANALOG_INPUTS",
            Command::ReadAdcRegisters => "READ_ADC_REGISTERS",
            Command::ReadAnalogInput => "READ_ANALOG_INPUT",
            Command::AddAnalogInput => "ADD_ANALOG_INPUT",
            Command::RemoveAnalogInput => "REMOVE_ANALOG_INPUT",
            Command::CheckAnalogInput => "CHECK_ANALOG_INPUT",
            Command::SystemGcal => "SYSTEM_GCAL",
            Command::SystemCal => "SYSTEM_CAL",
            Command::ListDigitalInputs => "LIST_DIGITAL_INPUTS",
            Command::ReadDigitalInput => "READ_DIGITAL_INPUT",
            Command::AddDigitalInput => "ADD_DIGITAL_INPUT",
            Command::RemoveDigitalInput => "REMOVE_DIGITAL_INPUT",
            Command::ListDigitalOutputs => "LIST_DIGITAL_OUTPUTS",
            Command::SetDigitalOutput => "SET_DIGITAL_OUTPUT",
            Command::ReadDigitalOutput => "READ_DIGITAL_OUTPUT",
            Command::AddDigitalOutput => "ADD_DIGITAL_OUTPUT",
            Command::RemoveDigitalOutput => "REMOVE_DIGITAL_OUTPUT",
            Command::ClearDigOutputFault => "CLEAR_DIG_OUTPUT_FAULT",
            Command::Disconnect => "DISCONNECT",
            Command::Upgrade => "UPGRADE",
            Command::Identify => "IDENTIFY",
            Command::Sample => "SAMPLE",
            Command::Halt => "HALT",
            Command::SetRtc => "SET_RTC",
            Command::SetUserMac => "SET_USER_MAC",
            Command::SetStaticIp => "SET_STATIC_IP",
            Command::GetCalibrationStatus => "GET_CALIBRATION_STATUS",
            Command::None => "NONE",
        }
    }

    /// Ordered list of keys the command accepts.
    pub fn schema(self) -> &'static [&'static str] {
        match self {
            Command::ReadAnalogInput | Command::ReadDigitalInput => &[PARAMETER_INPUT, PARAMETER_NUMBER],
            Command::AddAnalogInput => &[
                PARAMETER_INPUT,
                PARAMETER_BUFFER,
                PARAMETER_RATE,
                PARAMETER_GAIN,
                PARAMETER_NAME,
            ],
            Command::RemoveAnalogInput
            | Command::CheckAnalogInput
            | Command::RemoveDigitalInput => &[PARAMETER_INPUT],
            Command::SystemGcal => &[PARAMETER_BUFFER, PARAMETER_RATE, PARAMETER_GAIN, PARAMETER_INPUT],
            Command::SystemCal => &[PARAMETER_BUFFER, PARAMETER_RATE, PARAMETER_GAIN],
            Command::AddDigitalInput => &[PARAMETER_INPUT, PARAMETER_NAME],
            Command::SetDigitalOutput => &[PARAMETER_OUTPUT, PARAMETER_RATE],
            Command::ReadDigitalOutput => &[PARAMETER_OUTPUT, PARAMETER_NUMBER],
            Command::AddDigitalOutput => &[PARAMETER_OUTPUT, PARAMETER_NAME],
            Command::RemoveDigitalOutput | Command::ClearDigOutputFault => &[PARAMETER_OUTPUT],
            Command::Sample => &[PARAMETER_NUMBER],
            Command::SetRtc | Command::SetUserMac | Command::SetStaticIp => &[PARAMETER_VALUE],
            Command::ListAnalogInputs
            | Command::ReadAdcRegisters
            | Command::ListDigitalInputs
            | Command::ListDigitalOutputs
            | Command::Disconnect
            | Command::Upgrade
            | Command::Identify
            | Command::Halt
            | Command::GetCalibrationStatus
            | Command::None => &[],
        }
    }

    /// Resolves an already uppercased command word by exact match against the name table.
    pub fn resolve(word: &str) -> Command {
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.name() == word)
            .unwrap_or(Command::None)
    }
}

/// Uppercases text in place.
///
/// Bytes `A-Z`, `a-z` and `_` count as text; of those only `a-z` change.
/// Digits, punctuation and non-ASCII characters are left untouched.
pub fn to_upper_text(text: &mut str) {
    text.make_ascii_uppercase();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_table_round_trips_every_command() {
        for command in Command::ALL {
            assert_eq!(Command::resolve(command.name()), command);
        }
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in Command::ALL.iter().enumerate() {
            for b in &Command::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn unknown_word_resolves_to_none() {
        assert_eq!(Command::resolve("FROB"), Command::None);
        assert_eq!(Command::resolve(""), Command::None);
    }

    #[test]
    fn resolution_is_case_sensitive_before_uppercasing() {
        assert_eq!(Command::resolve("list_analog_inputs"), Command::None);
        let mut word = String::from("list_analog_inputs");
        to_upper_text(&mut word);
        assert_eq!(Command::resolve(&word), Command::ListAnalogInputs);
    }

    #[test]
    fn uppercasing_leaves_non_letters_alone() {
        let mut value = String::from("x1-0a,_b9=é");
        to_upper_text(&mut value);
        assert_eq!(value, "X1-0A,_B9=é");
    }

    #[test]
    fn schema_sizes_are_stable() {
        assert_eq!(Command::AddAnalogInput.schema().len(), 5);
        assert_eq!(Command::SystemGcal.schema().len(), 4);
        assert_eq!(Command::SystemCal.schema().len(), 3);
        assert_eq!(Command::Sample.schema(), &[PARAMETER_NUMBER]);
        assert!(Command::Identify.schema().is_empty());
    }
}
