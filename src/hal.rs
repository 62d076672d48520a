//! Interfaces to everything outside the interpreter: the connection the
//! commands arrive on, the board's channel directories and sampling state
//! machines, the ADC, identity and system services, and the flash sector
//! holding factory calibration data.

use crate::adc::{BufferSetting, Gain, SampleRate};
use crate::channels::ChannelHandle;
use crate::error::{FlashError, FunctionError};
use crate::parse::Parameter;

/// Connection the command lines arrive on and responses leave through.
pub trait Transport {
    fn write_status(&mut self, message: &str);
    fn write_error(&mut self, message: &str);
    /// Writes text with no status or error framing.
    fn write_raw(&mut self, text: &str);
    fn close_connection(&mut self);
}

// Configured inputs and outputs of the board.
pub trait ChannelDirectory {
    fn analog_input(&self, number: u8) -> Option<ChannelHandle>;
    fn digital_input(&self, number: u8) -> Option<ChannelHandle>;
    fn digital_output(&self, number: u8) -> Option<ChannelHandle>;

    fn create_analog_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;
    fn remove_analog_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;
    fn create_digital_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;
    fn remove_digital_input(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;
    fn create_digital_output(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;
    fn remove_digital_output(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;
    fn set_digital_output(&mut self, parameters: &[Parameter]) -> Result<(), FunctionError>;

    /// Describes every configured analog input, one line each.
    fn list_analog_inputs(&self) -> Result<String, FunctionError>;
    fn list_digital_inputs(&self) -> Result<String, FunctionError>;
    fn list_digital_outputs(&self) -> Result<String, FunctionError>;
}

// Protocol-level state the command handler moves to once sampling starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    AnalogInput,
    DigitalInput,
    DigitalOutput,
    General,
}

// The sampling state machines.
pub trait Sampler {
    fn is_adc_sampling(&self) -> bool;
    fn is_di_sampling(&self) -> bool;
    fn is_do_sampling(&self) -> bool;

    /// Starts sampling `inputs`. Holes in the list are skipped.
    fn start_analog_sample(&mut self, inputs: &[Option<ChannelHandle>], count: i32, single_channel: bool);
    fn start_digital_input_sample(&mut self, inputs: &[Option<ChannelHandle>], count: i32, single_channel: bool);
    fn start_digital_output_sample(&mut self, outputs: &[Option<ChannelHandle>], count: i32, single_channel: bool);
    fn halt_all_sampling(&mut self);
    fn enter_sampling_mode(&mut self, mode: SamplingMode);
}

/// Direct access to the analog to digital converter.
pub trait AdcControl {
    /// Runs a self offset calibration at the given settings and returns the offset register value.
    fn calibrate_system(&mut self, rate: SampleRate, gain: Gain, buffer: BufferSetting) -> Result<u32, FunctionError>;
    /// Runs a gain calibration against the reference on `input` and returns the gain register value.
    fn calibrate_gain(
        &mut self,
        rate: SampleRate,
        gain: Gain,
        buffer: BufferSetting,
        input: u8,
    ) -> Result<u32, FunctionError>;
    /// Human readable dump of the converter registers. Empty when they could not be read.
    fn register_dump(&mut self) -> String;
}

pub trait BoardIdentity {
    /// Factory serial number, empty when the board has none.
    fn serial(&self) -> String;
    fn board_type(&self) -> u8;
    // First octet in the lowest byte.
    fn ip(&self) -> u32;
    fn mac(&self) -> [u8; 6];
    /// Firmware version, major number in the lowest byte.
    fn firmware_version(&self) -> u32;
}

pub trait SystemControl {
    /// Marks a firmware update as pending in the backup register.
    fn set_update_flag(&mut self);
    fn reset(&mut self);
}

// Extremes of the board temperature recorded since power up, in Deg C.
pub trait ThermalHistory {
    fn min_board_temperature(&self) -> f32;
    fn max_board_temperature(&self) -> f32;
}

/// Everything the command handlers reach on the board side.
pub trait Board: ChannelDirectory + Sampler + AdcControl + BoardIdentity + SystemControl + ThermalHistory {}

impl<T> Board for T where T: ChannelDirectory + Sampler + AdcControl + BoardIdentity + SystemControl + ThermalHistory {}

/// The flash sector reserved for calibration data.
///
/// Addresses are byte offsets from the start of the sector. Erasing sets
/// every byte to `0xFF`; programming may only clear bits.
pub trait Flash {
    fn unlock(&mut self);
    fn lock(&mut self);
    fn erase_sector(&mut self) -> Result<(), FlashError>;
    fn program_word(&mut self, address: u32, value: u32) -> Result<(), FlashError>;
    fn program_byte(&mut self, address: u32, value: u8) -> Result<(), FlashError>;
    fn read_word(&self, address: u32) -> u32;
    fn read_byte(&self, address: u32) -> u8;
    /// Size of the sector in bytes.
    fn size(&self) -> u32;
}
