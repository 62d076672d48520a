//! In-memory stand-ins for the board, the calibration flash sector and the
//! connection, used by the console binary and the tests.

use log::{info, warn};

use crate::adc::{BufferSetting, Gain, SampleRate};
use crate::channels::{ChannelHandle, ChannelKind};
use crate::command::{PARAMETER_BUFFER, PARAMETER_GAIN, PARAMETER_INPUT, PARAMETER_NAME, PARAMETER_OUTPUT, PARAMETER_RATE};
use crate::config::BoardLayout;
use crate::error::{FlashError, FunctionError};
use crate::hal::{AdcControl, BoardIdentity, ChannelDirectory, Flash, Sampler, SamplingMode, SystemControl, ThermalHistory, Transport};
use crate::parse::{argument, Parameter};

/// Size of the simulated calibration sector.
pub const DEFAULT_SECTOR_SIZE: usize = 0x4000;

// NOR flash sector: erase sets every byte to `0xFF`, programming can only
// clear bits, and nothing is written while the sector is locked.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    data: Vec<u8>,
    locked: bool,
    programs_left: Option<usize>,
}

impl Default for MemoryFlash {
    fn default() -> Self {
        Self::new(DEFAULT_SECTOR_SIZE)
    }
}

impl MemoryFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            locked: true,
            programs_left: None,
        }
    }

    /// Makes every program operation after the next `count` fail.
    pub fn fail_after(&mut self, count: usize) {
        self.programs_left = Some(count);
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn check_program(&mut self, address: u32, width: usize) -> Result<usize, FlashError> {
        if self.locked {
            warn!("[Flash] Program at {:#06x} refused, sector is locked.", address);
            return Err(FlashError::WriteProtected);
        }
        if let Some(left) = self.programs_left.as_mut() {
            if *left == 0 {
                return Err(FlashError::Program);
            }
            *left -= 1;
        }
        let start = address as usize;
        if start % width != 0 {
            return Err(FlashError::ProgramAlignment);
        }
        if start + width > self.data.len() {
            return Err(FlashError::Operation);
        }
        Ok(start)
    }

    fn program(&mut self, start: usize, bytes: &[u8]) -> Result<(), FlashError> {
        let current = &self.data[start..start + bytes.len()];
        if current.iter().zip(bytes).any(|(old, new)| new & !old != 0) {
            return Err(FlashError::Program);
        }
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Flash for MemoryFlash {
    fn unlock(&mut self) {
        self.locked = false;
    }

    fn lock(&mut self) {
        self.locked = true;
    }

    fn erase_sector(&mut self) -> Result<(), FlashError> {
        if self.locked {
            return Err(FlashError::WriteProtected);
        }
        self.data.iter_mut().for_each(|b| *b = 0xFF);
        Ok(())
    }

    fn program_word(&mut self, address: u32, value: u32) -> Result<(), FlashError> {
        let start = self.check_program(address, 4)?;
        self.program(start, &value.to_le_bytes())
    }

    fn program_byte(&mut self, address: u32, value: u8) -> Result<(), FlashError> {
        let start = self.check_program(address, 1)?;
        self.program(start, &[value])
    }

    fn read_word(&self, address: u32) -> u32 {
        let start = address as usize;
        match self.data.get(start..start + 4) {
            Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => 0xFFFF_FFFF,
        }
    }

    fn read_byte(&self, address: u32) -> u8 {
        self.data.get(address as usize).copied().unwrap_or(0xFF)
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

// Something written to a `RecordingTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Status(String),
    Error(String),
    Raw(String),
}

// Transport that keeps everything written to it, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    pub written: Vec<Written>,
    pub closed: bool,
}

impl RecordingTransport {
    pub fn statuses(&self) -> Vec<&str> {
        self.written
            .iter()
            .filter_map(|w| match w {
                Written::Status(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.written
            .iter()
            .filter_map(|w| match w {
                Written::Error(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<&Written> {
        self.written.last()
    }

    pub fn clear(&mut self) {
        self.written.clear();
    }
}

impl Transport for RecordingTransport {
    fn write_status(&mut self, message: &str) {
        self.written.push(Written::Status(message.to_string()));
    }

    fn write_error(&mut self, message: &str) {
        self.written.push(Written::Error(message.to_string()));
    }

    fn write_raw(&mut self, text: &str) {
        self.written.push(Written::Raw(text.to_string()));
    }

    fn close_connection(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalogInput {
    pub name: String,
    pub rate: SampleRate,
    pub gain: Gain,
    pub buffer: BufferSetting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigitalInput {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigitalOutput {
    pub name: String,
    pub rate: u32,
}

// One call into a sampling state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRequest {
    pub kind: ChannelKind,
    // Channel numbers requested, holes skipped.
    pub channels: Vec<u8>,
    pub count: i32,
    pub single_channel: bool,
}

const ADS1256_REGISTER_NAMES: [&str; 11] = [
    "STATUS", "MUX", "ADCON", "DRATE", "IO", "OFC0", "OFC1", "OFC2", "FSC0", "FSC1", "FSC2",
];
const STATUS: usize = 0;
const ADCON: usize = 2;
const DRATE: usize = 3;
const OFC0: usize = 5;
const FSC0: usize = 8;

// Board with in-memory channel directories, an ADS1256 register file and
// sampling state machines that only record what they were asked to do.
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    // Channel directories, indexed by channel number.
    pub analog_inputs: Vec<Option<AnalogInput>>,
    pub digital_inputs: Vec<Option<DigitalInput>>,
    pub digital_outputs: Vec<Option<DigitalOutput>>,
    pub adc_sampling: bool,
    pub di_sampling: bool,
    pub do_sampling: bool,
    // Every start_*_sample call, oldest first.
    pub sample_requests: Vec<SampleRequest>,
    pub mode: Option<SamplingMode>,
    // ADS1256 register file, STATUS through FSC2
    pub registers: [u8; 11],
    pub registers_readable: bool,
    // Register values the next system and gain calibrations produce
    pub offset_result: u32,
    pub gain_result: u32,
    pub calibration_failure: Option<FunctionError>,
    pub last_gain_calibration_input: Option<u8>,
    // System services
    pub update_flag: bool,
    pub resets: u32,
    // Identity
    pub serial: String,
    pub board_type: u8,
    pub ip: u32,
    pub mac: [u8; 6],
    pub firmware_version: u32,
    // Thermal history since power up, Deg C
    pub min_temperature: f32,
    pub max_temperature: f32,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new(BoardLayout::default())
    }
}

impl SimulatedBoard {
    pub fn new(layout: BoardLayout) -> Self {
        Self {
            analog_inputs: vec![None; layout.analog_inputs],
            digital_inputs: vec![None; layout.digital_inputs],
            digital_outputs: vec![None; layout.digital_outputs],
            adc_sampling: false,
            di_sampling: false,
            do_sampling: false,
            sample_requests: Vec::new(),
            mode: None,
            registers: [0x30, 0x01, 0x20, SampleRate::Sps30000.code(), 0xE1, 0, 0, 0, 0, 0, 0x40],
            registers_readable: true,
            offset_result: 0x0000_0123,
            gain_result: 0x0040_0000,
            calibration_failure: None,
            last_gain_calibration_input: None,
            update_flag: false,
            resets: 0,
            serial: String::new(),
            board_type: b'E',
            ip: u32::from_le_bytes([192, 168, 1, 50]),
            mac: [0x00, 0x80, 0xE1, 0x00, 0x00, 0x01],
            firmware_version: u32::from_le_bytes([1, 0, 0, 0]),
            min_temperature: 20.0,
            max_temperature: 30.0,
        }
    }

    fn apply_settings(&mut self, rate: SampleRate, gain: Gain, buffer: BufferSetting) {
        self.registers[STATUS] = (self.registers[STATUS] & !0x02) | buffer.code();
        self.registers[ADCON] = (self.registers[ADCON] & !0x07) | gain.code();
        self.registers[DRATE] = rate.code();
    }

    fn write_register_triplet(&mut self, first: usize, value: u32) {
        let bytes = value.to_le_bytes();
        self.registers[first..first + 3].copy_from_slice(&bytes[..3]);
    }

    fn record(&mut self, kind: ChannelKind, handles: &[Option<ChannelHandle>], count: i32, single_channel: bool) {
        self.sample_requests.push(SampleRequest {
            kind,
            channels: handles.iter().flatten().map(|h| h.number).collect(),
            count,
            single_channel,
        });
    }
}

/// Parses the channel number under `key`, checking it against the directory size.
fn channel_number(
    parameters: &[Parameter],
    key: &str,
    limit: usize,
    missing: FunctionError,
    malformed: FunctionError,
    out_of_range: FunctionError,
) -> Result<usize, FunctionError> {
    let value = argument(parameters, key).ok_or(missing)?;
    let number: usize = value.parse().map_err(|_| malformed)?;
    if number >= limit {
        return Err(out_of_range);
    }
    Ok(number)
}

fn setting<T: std::str::FromStr>(parameters: &[Parameter], key: &str, default: T, malformed: FunctionError) -> Result<T, FunctionError> {
    match argument(parameters, key) {
        Some(value) => value.parse().map_err(|_| malformed),
        None => Ok(default),
    }
}

fn name(parameters: &[Parameter]) -> String {
    argument(parameters, PARAMETER_NAME).unwrap_or("NONE").to_string()
}

fn handle_at<T>(slots: &[Option<T>], kind: ChannelKind, number: u8) -> Option<ChannelHandle> {
    slots
        .get(number as usize)
        .and_then(Option::as_ref)
        .map(|_| ChannelHandle::new(kind, number))
}

impl ChannelDirectory for SimulatedBoard {
    fn analog_input(&self, number: u8) -> Option<ChannelHandle> {
        handle_at(&self.analog_inputs, ChannelKind::AnalogInput, number)
    }

    fn digital_input(&self, number: u8) -> Option<ChannelHandle> {
        handle_at(&self.digital_inputs, ChannelKind::DigitalInput, number)
    }

    fn digital_output(&self, number: u8) -> Option<ChannelHandle> {
        handle_at(&self.digital_outputs, ChannelKind::DigitalOutput, number)
    }

    fn create_analog_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_INPUT,
            self.analog_inputs.len(),
            FunctionError::AinParseMissingKey,
            FunctionError::AinParseError,
            FunctionError::AinInputOutOfRange,
        )?;
        if self.analog_inputs[number].is_some() {
            return Err(FunctionError::AinInputExists);
        }
        let input = AnalogInput {
            name: name(parameters),
            rate: setting(parameters, PARAMETER_RATE, SampleRate::Sps60, FunctionError::AinParseError)?,
            gain: setting(parameters, PARAMETER_GAIN, Gain::X1, FunctionError::AinParseError)?,
            buffer: setting(parameters, PARAMETER_BUFFER, BufferSetting::Disabled, FunctionError::AinParseError)?,
        };
        info!("[Simulator] Added analog input {}: {:?}", number, input);
        self.analog_inputs[number] = Some(input);
        Ok(())
    }

    fn remove_analog_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_INPUT,
            self.analog_inputs.len(),
            FunctionError::AinParseMissingKey,
            FunctionError::AinParseError,
            FunctionError::AinInputOutOfRange,
        )?;
        self.analog_inputs[number]
            .take()
            .map(|_| ())
            .ok_or(FunctionError::AinInputNotFound)
    }

    fn create_digital_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_INPUT,
            self.digital_inputs.len(),
            FunctionError::DinParseMissingKey,
            FunctionError::DinParseError,
            FunctionError::DinInputOutOfRange,
        )?;
        if self.digital_inputs[number].is_some() {
            return Err(FunctionError::DinInputExists);
        }
        self.digital_inputs[number] = Some(DigitalInput { name: name(parameters) });
        Ok(())
    }

    fn remove_digital_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_INPUT,
            self.digital_inputs.len(),
            FunctionError::DinParseMissingKey,
            FunctionError::DinParseError,
            FunctionError::DinInputOutOfRange,
        )?;
        self.digital_inputs[number]
            .take()
            .map(|_| ())
            .ok_or(FunctionError::DinInputNotFound)
    }

    fn create_digital_output(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_OUTPUT,
            self.digital_outputs.len(),
            FunctionError::DoutParseMissingKey,
            FunctionError::DoutParseError,
            FunctionError::DoutOutputOutOfRange,
        )?;
        if self.digital_outputs[number].is_some() {
            return Err(FunctionError::DoutOutputExists);
        }
        self.digital_outputs[number] = Some(DigitalOutput {
            name: name(parameters),
            rate: 0,
        });
        Ok(())
    }

    fn remove_digital_output(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_OUTPUT,
            self.digital_outputs.len(),
            FunctionError::DoutParseMissingKey,
            FunctionError::DoutParseError,
            FunctionError::DoutOutputOutOfRange,
        )?;
        self.digital_outputs[number]
            .take()
            .map(|_| ())
            .ok_or(FunctionError::DoutOutputNotFound)
    }

    fn set_digital_output(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError> {
        let number = channel_number(
            parameters,
            PARAMETER_OUTPUT,
            self.digital_outputs.len(),
            FunctionError::DoutParseMissingKey,
            FunctionError::DoutParseError,
            FunctionError::DoutOutputOutOfRange,
        )?;
        let rate = setting(parameters, PARAMETER_RATE, 0u32, FunctionError::DoutParseError)?;
        let output = self.digital_outputs[number]
            .as_mut()
            .ok_or(FunctionError::DoutOutputNotFound)?;
        output.rate = rate;
        Ok(())
    }

    fn list_analog_inputs(&self) -> Result<String, FunctionError> {
        Ok(self
            .analog_inputs
            .iter()
            .enumerate()
            .filter_map(|(number, input)| input.as_ref().map(|input| (number, input)))
            .map(|(number, input)| {
                format!(
                    "Analog Input {}: {} (Rate: {}, Gain: {}, Buffer: {})\n\r",
                    number, input.name, input.rate, input.gain, input.buffer
                )
            })
            .collect())
    }

    fn list_digital_inputs(&self) -> Result<String, FunctionError> {
        Ok(self
            .digital_inputs
            .iter()
            .enumerate()
            .filter_map(|(number, input)| input.as_ref().map(|input| format!("Digital Input {}: {}\n\r", number, input.name)))
            .collect())
    }

    fn list_digital_outputs(&self) -> Result<String, FunctionError> {
        Ok(self
            .digital_outputs
            .iter()
            .enumerate()
            .filter_map(|(number, output)| {
                output
                    .as_ref()
                    .map(|output| format!("Digital Output {}: {} (Rate: {})\n\r", number, output.name, output.rate))
            })
            .collect())
    }
}

impl Sampler for SimulatedBoard {
    fn is_adc_sampling(&self) -> bool {
        self.adc_sampling
    }

    fn is_di_sampling(&self) -> bool {
        self.di_sampling
    }

    fn is_do_sampling(&self) -> bool {
        self.do_sampling
    }

    fn start_analog_sample(&mut self, inputs: &[Option<ChannelHandle>], count: i32, single_channel: bool) {
        self.adc_sampling = true;
        self.record(ChannelKind::AnalogInput, inputs, count, single_channel);
    }

    fn start_digital_input_sample(&mut self, inputs: &[Option<ChannelHandle>], count: i32, single_channel: bool) {
        self.di_sampling = true;
        self.record(ChannelKind::DigitalInput, inputs, count, single_channel);
    }

    fn start_digital_output_sample(&mut self, outputs: &[Option<ChannelHandle>], count: i32, single_channel: bool) {
        self.do_sampling = true;
        self.record(ChannelKind::DigitalOutput, outputs, count, single_channel);
    }

    fn halt_all_sampling(&mut self) {
        self.adc_sampling = false;
        self.di_sampling = false;
        self.do_sampling = false;
        self.mode = None;
    }

    fn enter_sampling_mode(&mut self, mode: SamplingMode) {
        self.mode = Some(mode);
    }
}

impl AdcControl for SimulatedBoard {
    fn calibrate_system(&mut self, rate: SampleRate, gain: Gain, buffer: BufferSetting) -> Result<u32, FunctionError> {
        if let Some(error) = self.calibration_failure {
            return Err(error);
        }
        self.apply_settings(rate, gain, buffer);
        self.write_register_triplet(OFC0, self.offset_result);
        Ok(self.offset_result)
    }

    fn calibrate_gain(
        &mut self,
        rate: SampleRate,
        gain: Gain,
        buffer: BufferSetting,
        input: u8,
    ) -> Result<u32, FunctionError> {
        if let Some(error) = self.calibration_failure {
            return Err(error);
        }
        self.apply_settings(rate, gain, buffer);
        self.last_gain_calibration_input = Some(input);
        self.write_register_triplet(FSC0, self.gain_result);
        Ok(self.gain_result)
    }

    fn register_dump(&mut self) -> String {
        if !self.registers_readable {
            return String::new();
        }
        let mut dump = String::from("ADS1256 Registers:\n\r");
        for (name, value) in ADS1256_REGISTER_NAMES.iter().zip(self.registers.iter()) {
            dump.push_str(&format!("\t{}: 0x{:02X}\n\r", name, value));
        }
        dump
    }
}

impl BoardIdentity for SimulatedBoard {
    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn board_type(&self) -> u8 {
        self.board_type
    }

    fn ip(&self) -> u32 {
        self.ip
    }

    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn firmware_version(&self) -> u32 {
        self.firmware_version
    }
}

impl SystemControl for SimulatedBoard {
    fn set_update_flag(&mut self) {
        self.update_flag = true;
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.halt_all_sampling();
    }
}

impl ThermalHistory for SimulatedBoard {
    fn min_board_temperature(&self) -> f32 {
        self.min_temperature
    }

    fn max_board_temperature(&self) -> f32 {
        self.max_temperature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_flash_refuses_writes() {
        let mut flash = MemoryFlash::new(64);
        assert_eq!(flash.program_word(0, 0), Err(FlashError::WriteProtected));
        assert_eq!(flash.erase_sector(), Err(FlashError::WriteProtected));
        flash.unlock();
        assert_eq!(flash.program_word(0, 0x1234_5678), Ok(()));
        assert_eq!(flash.read_word(0), 0x1234_5678);
    }

    #[test]
    fn programming_only_clears_bits() {
        let mut flash = MemoryFlash::new(64);
        flash.unlock();
        flash.program_byte(4, 0x0F).unwrap();
        assert_eq!(flash.program_byte(4, 0xF0), Err(FlashError::Program));
        assert_eq!(flash.program_byte(4, 0x05), Ok(()));
        flash.erase_sector().unwrap();
        assert_eq!(flash.read_byte(4), 0xFF);
    }

    #[test]
    fn misaligned_and_out_of_range_words_fail() {
        let mut flash = MemoryFlash::new(8);
        flash.unlock();
        assert_eq!(flash.program_word(2, 0), Err(FlashError::ProgramAlignment));
        assert_eq!(flash.program_word(8, 0), Err(FlashError::Operation));
        assert_eq!(flash.read_word(6), 0xFFFF_FFFF);
    }

    #[test]
    fn create_and_remove_analog_input() {
        let mut board = SimulatedBoard::default();
        let parameters = vec![
            Parameter::new("INPUT", "3"),
            Parameter::new("RATE", "1000"),
            Parameter::new("GAIN", "X4"),
            Parameter::new("NAME", "SENSOR1"),
        ];
        board.create_analog_input(&parameters).unwrap();
        let input = board.analog_inputs[3].as_ref().unwrap();
        assert_eq!(input.rate, SampleRate::Sps1000);
        assert_eq!(input.gain, Gain::X4);
        assert_eq!(input.buffer, BufferSetting::Disabled);
        assert_eq!(board.create_analog_input(&parameters), Err(FunctionError::AinInputExists));
        assert!(board.analog_input(3).is_some());

        board.remove_analog_input(&[Parameter::new("INPUT", "3")]).unwrap();
        assert_eq!(
            board.remove_analog_input(&[Parameter::new("INPUT", "3")]),
            Err(FunctionError::AinInputNotFound)
        );
    }

    #[test]
    fn directory_reports_parse_failures() {
        let mut board = SimulatedBoard::default();
        assert_eq!(board.create_analog_input(&[]), Err(FunctionError::AinParseMissingKey));
        assert_eq!(
            board.create_digital_input(&[Parameter::new("INPUT", "X")]),
            Err(FunctionError::DinParseError)
        );
        assert_eq!(
            board.create_digital_output(&[Parameter::new("OUTPUT", "16")]),
            Err(FunctionError::DoutOutputOutOfRange)
        );
        assert_eq!(
            board.create_analog_input(&[Parameter::new("INPUT", "0"), Parameter::new("RATE", "7")]),
            Err(FunctionError::AinParseError)
        );
    }

    #[test]
    fn calibration_updates_registers() {
        let mut board = SimulatedBoard::default();
        board.offset_result = 0x00AB_CDEF;
        let offset = board
            .calibrate_system(SampleRate::Sps100, Gain::X8, BufferSetting::Enabled)
            .unwrap();
        assert_eq!(offset, 0x00AB_CDEF);
        assert_eq!(board.registers[DRATE], SampleRate::Sps100.code());
        assert_eq!(board.registers[ADCON] & 0x07, Gain::X8.code());
        assert_eq!(&board.registers[OFC0..OFC0 + 3], &[0xEF, 0xCD, 0xAB]);
        assert!(board.register_dump().contains("DRATE: 0x82"));
    }

    #[test]
    fn halting_clears_every_sampler() {
        let mut board = SimulatedBoard::default();
        board.start_analog_sample(&[Some(ChannelHandle::new(ChannelKind::AnalogInput, 1)), None], 5, false);
        board.enter_sampling_mode(SamplingMode::AnalogInput);
        assert!(board.is_adc_sampling());
        assert_eq!(board.sample_requests[0].channels, vec![1]);
        board.halt_all_sampling();
        assert!(!board.is_adc_sampling());
        assert_eq!(board.mode, None);
    }
}
