//! Command execution.
//!
//! The [`Dispatcher`] owns the scratch channel lists shared by the read and
//! sample handlers and the last function error slot. It runs one command at a
//! time; nothing here is reentrant.

use log::{debug, info};

use crate::adc::{BufferSetting, Gain, SampleRate};
use crate::calibration::CalibrationTable;
use crate::channels::{self, ChannelKind, ChannelList, ChannelListType, NumberParsing};
use crate::command::{
    Command, PARAMETER_BUFFER, PARAMETER_GAIN, PARAMETER_INPUT, PARAMETER_NUMBER, PARAMETER_OUTPUT, PARAMETER_RATE,
};
use crate::config::{BoardLayout, CalibrationBounds};
use crate::error::{CommandError, FunctionError};
use crate::hal::{Board, Flash, SamplingMode, Transport};
use crate::parse::{argument, check_args, scan_int, Parameter};

/// Executes resolved commands against the board.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    layout: BoardLayout,
    bounds: CalibrationBounds,
    parsing: NumberParsing,
    analog_inputs: ChannelList,
    digital_inputs: ChannelList,
    digital_outputs: ChannelList,
    last_function_error: Option<FunctionError>,
}

impl Dispatcher {
    pub fn new(layout: BoardLayout, bounds: CalibrationBounds, parsing: NumberParsing) -> Self {
        Self {
            layout,
            bounds,
            parsing,
            analog_inputs: ChannelList::new(layout.analog_inputs),
            digital_inputs: ChannelList::new(layout.digital_inputs),
            digital_outputs: ChannelList::new(layout.digital_outputs),
            last_function_error: None,
        }
    }

    /// Returns the last collaborator failure and clears the slot.
    pub fn take_last_function_error(&mut self) -> Option<FunctionError> {
        self.last_function_error.take()
    }

    /// Scratch list of the given kind as left by the last command.
    pub fn channel_list(&self, kind: ChannelKind) -> &ChannelList {
        match kind {
            ChannelKind::AnalogInput => &self.analog_inputs,
            ChannelKind::DigitalInput => &self.digital_inputs,
            ChannelKind::DigitalOutput => &self.digital_outputs,
        }
    }

    /// Whether the board's recorded temperature extremes stayed inside the calibration window.
    pub fn is_calibration_valid<B: Board>(&self, board: &B) -> bool {
        self.bounds
            .admits(board.min_board_temperature(), board.max_board_temperature())
    }

    fn fail(&mut self, error: FunctionError) -> CommandError {
        debug!("[Command Interpreter] Function error: {}.", error);
        self.last_function_error = Some(error);
        CommandError::Function(error)
    }

    /// Runs `command` with already parsed parameters.
    pub fn execute<B, T, F>(
        &mut self,
        command: Command,
        parameters: &[Parameter],
        board: &mut B,
        transport: &mut T,
        calibration: &mut CalibrationTable<F>,
    ) -> Result<(), CommandError>
    where
        B: Board,
        T: Transport,
        F: Flash,
    {
        match command {
            Command::ListAnalogInputs
            | Command::ListDigitalInputs
            | Command::ListDigitalOutputs => self.list(command, parameters, board, transport),
            Command::ReadAdcRegisters => self.read_adc_registers(parameters, board, transport),
            Command::ReadAnalogInput => self.read(ChannelKind::AnalogInput, parameters, board),
            Command::ReadDigitalInput => self.read(ChannelKind::DigitalInput, parameters, board),
            Command::ReadDigitalOutput => self.read(ChannelKind::DigitalOutput, parameters, board),
            Command::AddAnalogInput
            | Command::RemoveAnalogInput
            | Command::AddDigitalInput
            | Command::RemoveDigitalInput
            | Command::AddDigitalOutput
            | Command::RemoveDigitalOutput => self.configure(command, parameters, board),
            Command::SetDigitalOutput => {
                require_schema(command, parameters)?;
                board.set_digital_output(parameters).map_err(|e| self.fail(e))
            }
            Command::SystemCal => self.system_calibration(parameters, board, calibration),
            Command::SystemGcal => self.system_gain_calibration(parameters, board, calibration),
            Command::Sample => self.sample(parameters, board),
            Command::Disconnect => {
                info!("[Command Interpreter] Closing the connection.");
                transport.close_connection();
                Ok(())
            }
            Command::Upgrade => {
                info!("[Command Interpreter] Firmware upgrade requested, resetting.");
                board.set_update_flag();
                transport.close_connection();
                board.reset();
                Ok(())
            }
            Command::Identify => {
                transport.write_status(&identify(&*board));
                Ok(())
            }
            Command::Halt => {
                board.halt_all_sampling();
                Ok(())
            }
            Command::GetCalibrationStatus => {
                let status = if self.is_calibration_valid(&*board) { "VALID" } else { "INVALID" };
                transport.write_status(&format!("Calibration Status: {}", status));
                Ok(())
            }
            Command::CheckAnalogInput
            | Command::ClearDigOutputFault
            | Command::SetRtc
            | Command::SetUserMac
            | Command::SetStaticIp => {
                debug!("[Command Interpreter] {} has no effect on this board.", command.name());
                Ok(())
            }
            Command::None => {
                debug!("[Command Interpreter] Unrecognized command, doing nothing.");
                Err(CommandError::BadCommand)
            }
        }
    }

    fn list<B: Board, T: Transport>(
        &mut self,
        command: Command,
        parameters: &[Parameter],
        board: &mut B,
        transport: &mut T,
    ) -> Result<(), CommandError> {
        require_schema(command, parameters)?;
        let listing = match command {
            Command::ListAnalogInputs => board.list_analog_inputs(),
            Command::ListDigitalInputs => board.list_digital_inputs(),
            _ => board.list_digital_outputs(),
        }
        .map_err(|e| self.fail(e))?;
        if !listing.is_empty() {
            transport.write_status(&listing);
        }
        Ok(())
    }

    fn read_adc_registers<B: Board, T: Transport>(
        &mut self,
        parameters: &[Parameter],
        board: &mut B,
        transport: &mut T,
    ) -> Result<(), CommandError> {
        require_schema(Command::ReadAdcRegisters, parameters)?;
        let dump = board.register_dump();
        if dump.is_empty() {
            debug!("[Command Interpreter] Unable to build string to print ADC registers.");
            return Err(self.fail(FunctionError::AdcRegisterRead));
        }
        transport.write_raw(&dump);
        Ok(())
    }

    fn read<B: Board>(&mut self, kind: ChannelKind, parameters: &[Parameter], board: &mut B) -> Result<(), CommandError> {
        let (command, key, missing, mode) = match kind {
            ChannelKind::AnalogInput => (
                Command::ReadAnalogInput,
                PARAMETER_INPUT,
                FunctionError::AinParseMissingKey,
                SamplingMode::AnalogInput,
            ),
            ChannelKind::DigitalInput => (
                Command::ReadDigitalInput,
                PARAMETER_INPUT,
                FunctionError::DinParseMissingKey,
                SamplingMode::DigitalInput,
            ),
            ChannelKind::DigitalOutput => (
                Command::ReadDigitalOutput,
                PARAMETER_OUTPUT,
                FunctionError::DoutParseMissingKey,
                SamplingMode::DigitalOutput,
            ),
        };
        require_schema(command, parameters)?;
        let count = sample_count(parameters)?;
        let Some(value) = argument(parameters, key) else {
            debug!("[Command Interpreter] Unable to locate key: {}.", key);
            return Err(self.fail(missing));
        };
        let list_type = self.resolve(kind, value, &*board)?;
        let single = list_type == ChannelListType::Single;
        let handles = self.channel_list(kind).slots();
        match kind {
            ChannelKind::AnalogInput => board.start_analog_sample(handles, count, single),
            ChannelKind::DigitalInput => board.start_digital_input_sample(handles, count, single),
            ChannelKind::DigitalOutput => board.start_digital_output_sample(handles, count, single),
        }
        board.enter_sampling_mode(mode);
        Ok(())
    }

    /// Fills the scratch list of `kind` from a channel parameter.
    fn resolve<B: Board>(&mut self, kind: ChannelKind, value: &str, board: &B) -> Result<ChannelListType, CommandError> {
        let parsing = self.parsing;
        let result = match kind {
            ChannelKind::AnalogInput => channels::resolve(
                &mut self.analog_inputs,
                value,
                self.layout.analog_inputs,
                parsing,
                |n| board.analog_input(n),
            ),
            ChannelKind::DigitalInput => channels::resolve(
                &mut self.digital_inputs,
                value,
                self.layout.digital_inputs,
                parsing,
                |n| board.digital_input(n),
            ),
            ChannelKind::DigitalOutput => channels::resolve(
                &mut self.digital_outputs,
                value,
                self.layout.digital_outputs,
                parsing,
                |n| board.digital_output(n),
            ),
        };
        result.map_err(|e| {
            debug!("[Command Interpreter] {}.", e);
            CommandError::ParseError
        })
    }

    /// ADD_* and REMOVE_*, refused while the matching hardware samples.
    fn configure<B: Board>(&mut self, command: Command, parameters: &[Parameter], board: &mut B) -> Result<(), CommandError> {
        let busy = match command {
            Command::AddAnalogInput | Command::RemoveAnalogInput => {
                board.is_adc_sampling().then_some(CommandError::AdcInvalidOperation)
            }
            Command::AddDigitalInput | Command::RemoveDigitalInput => {
                board.is_di_sampling().then_some(CommandError::DiInvalidOperation)
            }
            _ => board.is_do_sampling().then_some(CommandError::DoInvalidOperation),
        };
        if let Some(error) = busy {
            return Err(error);
        }
        require_schema(command, parameters)?;
        let result = match command {
            Command::AddAnalogInput => board.create_analog_input(parameters),
            Command::RemoveAnalogInput => board.remove_analog_input(parameters),
            Command::AddDigitalInput => board.create_digital_input(parameters),
            Command::RemoveDigitalInput => board.remove_digital_input(parameters),
            Command::AddDigitalOutput => board.create_digital_output(parameters),
            _ => board.remove_digital_output(parameters),
        };
        result.map_err(|e| self.fail(e))
    }

    fn system_calibration<B: Board, F: Flash>(
        &mut self,
        parameters: &[Parameter],
        board: &mut B,
        calibration: &mut CalibrationTable<F>,
    ) -> Result<(), CommandError> {
        require_schema(Command::SystemCal, parameters)?;
        let (rate, gain, buffer) = adc_settings(parameters).map_err(|e| self.fail(e))?;
        let offset = board
            .calibrate_system(rate, gain, buffer)
            .map_err(|e| self.fail(e))?;
        calibration.set_offset_calibration(offset, rate, gain, buffer);
        info!(
            "[Command Interpreter] System calibration at {}, {}, buffer {}: offset {:#08x}.",
            rate, gain, buffer, offset
        );
        Ok(())
    }

    fn system_gain_calibration<B: Board, F: Flash>(
        &mut self,
        parameters: &[Parameter],
        board: &mut B,
        calibration: &mut CalibrationTable<F>,
    ) -> Result<(), CommandError> {
        require_schema(Command::SystemGcal, parameters)?;
        let (rate, gain, buffer) = adc_settings(parameters).map_err(|e| self.fail(e))?;
        let input = match argument(parameters, PARAMETER_INPUT) {
            Some(value) => value
                .parse::<u8>()
                .map_err(|_| self.fail(FunctionError::AinParseError))?,
            None => 0,
        };
        let value = board
            .calibrate_gain(rate, gain, buffer, input)
            .map_err(|e| self.fail(e))?;
        calibration.set_base_gain(value, rate, gain, buffer);
        info!(
            "[Command Interpreter] Gain calibration on input {} at {}, {}, buffer {}: gain {:#08x}.",
            input, rate, gain, buffer, value
        );
        Ok(())
    }

    fn sample<B: Board>(&mut self, parameters: &[Parameter], board: &mut B) -> Result<(), CommandError> {
        require_schema(Command::Sample, parameters)?;
        let count = sample_count(parameters)?;
        for kind in [ChannelKind::AnalogInput, ChannelKind::DigitalInput, ChannelKind::DigitalOutput] {
            self.resolve(kind, channels::ALL_CHANNELS_STRING, &*board)?;
        }
        board.start_analog_sample(self.analog_inputs.slots(), count, false);
        board.start_digital_input_sample(self.digital_inputs.slots(), count, false);
        board.start_digital_output_sample(self.digital_outputs.slots(), count, false);
        board.enter_sampling_mode(SamplingMode::General);
        Ok(())
    }
}

fn require_schema(command: Command, parameters: &[Parameter]) -> Result<(), CommandError> {
    if check_args(parameters, command.schema()) {
        Ok(())
    } else {
        debug!(
            "[Command Interpreter] Provided arguments are not valid for {}.",
            command.name()
        );
        Err(CommandError::BadParam)
    }
}

/// Reads the optional `NUMBER` key. Absent means 0, which the samplers treat as continuous.
fn sample_count(parameters: &[Parameter]) -> Result<i32, CommandError> {
    let Some(value) = argument(parameters, PARAMETER_NUMBER) else {
        return Ok(0);
    };
    let (count, rest) = scan_int(value);
    if rest.len() == value.len() {
        debug!("[Command Interpreter] Sample count {} is not a number.", value);
        return Err(CommandError::ParseError);
    }
    i32::try_from(count).map_err(|_| CommandError::ParseError)
}

/// Converter settings for the calibration commands, defaulting to x1, 60 SPS, unbuffered.
fn adc_settings(parameters: &[Parameter]) -> Result<(SampleRate, Gain, BufferSetting), FunctionError> {
    fn parse_or<T: std::str::FromStr>(parameters: &[Parameter], key: &str, default: T) -> Result<T, FunctionError> {
        argument(parameters, key)
            .map(|value| value.parse().map_err(|_| FunctionError::AinParseError))
            .unwrap_or(Ok(default))
    }
    Ok((
        parse_or(parameters, PARAMETER_RATE, SampleRate::Sps60)?,
        parse_or(parameters, PARAMETER_GAIN, Gain::X1)?,
        parse_or(parameters, PARAMETER_BUFFER, BufferSetting::Disabled)?,
    ))
}

/// Text of the IDENTIFY response.
pub fn identify<B: Board>(board: &B) -> String {
    let serial = board.serial();
    let serial = if serial.is_empty() { "None".to_string() } else { serial };
    let version = board.firmware_version().to_le_bytes();
    let ip = board.ip().to_le_bytes();
    let mac = board.mac();
    format!(
        "Board Identity\n\r\tSerial Number: {}\n\r\tBoard Revision: {}\n\r\tFirmware Version: {}.{}.{}.{}\n\r\tIP Address: {}.{}.{}.{}\n\r\tMAC Address: {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}\n\r",
        serial,
        char::from(board.board_type()),
        version[0],
        version[1],
        version[2],
        version[3],
        ip[0],
        ip[1],
        ip[2],
        ip[3],
        mac[0],
        mac[1],
        mac[2],
        mac[3],
        mac[4],
        mac[5],
    )
}
