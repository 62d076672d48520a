//! Calibration table engine.
//!
//! Two stores keyed by (rate, gain, buffer):
//!
//! * volatile offset and base gain tables, written freely at run time by the
//!   system calibration commands;
//! * the factory gain table in the calibration flash sector, one cell per
//!   setting per temperature bin, writable only in calibration mode.
//!
//! Sector layout (byte offsets):
//!
//! | Offset | Size | Content |
//! |---|---|---|
//! | `0x00` | 32 | serial number, ASCII |
//! | `0x20` | 4 | lowest calibrated temperature, `f32` |
//! | `0x24` | 4 | highest calibrated temperature, `f32` |
//! | `0x28` | 4 | temperature step, `f32` |
//! | `0x2C` | 4 | number of temperature bins, `u32` |
//! | `0x30` | 1 | valid marker, anything but `0xFF` is valid |
//! | `0x40` | .. | gain cells, `u32`, see [`data_address`] |

use log::{debug, info, warn};

use crate::adc::{BufferSetting, Gain, SampleRate, NUM_BUFFER_SETTINGS, NUM_PGA_SETTINGS, NUM_SAMPLE_RATES};
use crate::error::{CalibrationError, FlashError};
use crate::hal::Flash;

pub const BOARD_SERIAL_NUM_LENGTH: usize = 32;
pub const BOARD_SERIAL_NUM_ADDR: u32 = 0x00;
pub const CAL_TEMP_LOW_ADDR: u32 = 0x20;
pub const CAL_TEMP_HIGH_ADDR: u32 = 0x24;
pub const CAL_TEMP_STEP_ADDR: u32 = 0x28;
pub const CAL_TEMP_CNT_ADDR: u32 = 0x2C;
pub const CAL_VALID_ADDR: u32 = 0x30;
pub const CAL_DATA_START_ADDR: u32 = 0x40;

/// Word every cell is programmed to when calibration mode starts.
pub const CALIBRATION_ERASE_DATA: u32 = 0xFFFF_FFFF;
const CAL_VALID_MARKER: u8 = 0x00;

/// Gain cells per temperature bin.
pub const CELLS_PER_BIN: usize = NUM_SAMPLE_RATES * NUM_PGA_SETTINGS * NUM_BUFFER_SETTINGS;

type SettingTable = [[[u32; NUM_BUFFER_SETTINGS]; NUM_PGA_SETTINGS]; NUM_SAMPLE_RATES];

/// Position of a setting inside one temperature bin.
pub fn cell_index(rate: SampleRate, gain: Gain, buffer: BufferSetting) -> usize {
    (rate.index() * NUM_PGA_SETTINGS + gain.index()) * NUM_BUFFER_SETTINGS + buffer.index()
}

/// Flash address of the gain cell for a setting in temperature bin `bin`.
pub fn data_address(bin: usize, rate: SampleRate, gain: Gain, buffer: BufferSetting) -> u32 {
    let cell = bin * CELLS_PER_BIN + cell_index(rate, gain, buffer);
    CAL_DATA_START_ADDR + 4 * cell as u32
}

/// Temperature axis of the factory gain table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TemperatureAxis {
    pub low: f32,
    pub high: f32,
    pub step: f32,
    pub count: u32,
}

impl TemperatureAxis {
    /// Builds an axis from `low` to `high` inclusive in increments of `step`.
    pub fn new(low: f32, high: f32, step: f32) -> Result<Self, CalibrationError> {
        if !(low.is_finite() && high.is_finite() && step.is_finite()) || high < low || step <= 0.0 {
            return Err(CalibrationError::InvalidRange);
        }
        let count = ((high - low) / step).round() as u32 + 1;
        Ok(Self { low, high, step, count })
    }

    fn is_usable(&self) -> bool {
        self.count > 0
            && self.step > 0.0
            && self.step.is_finite()
            && self.low.is_finite()
            && self.high.is_finite()
            && self.high >= self.low
    }

    /// Whether every gain cell of this axis lies inside a sector of `size` bytes.
    fn fits(&self, size: u32) -> bool {
        let end = u64::from(CAL_DATA_START_ADDR) + 4 * CELLS_PER_BIN as u64 * u64::from(self.count);
        end <= u64::from(size)
    }

    /// Lower bin, upper bin and the fraction of the way from one to the other.
    fn bins(&self, temperature: f32) -> (usize, usize, f32) {
        let last = self.count.saturating_sub(1) as usize;
        let position = (temperature - self.low) / self.step;
        if position >= last as f32 {
            return (last, last, 0.0);
        }
        let lower = position.floor().max(0.0) as usize;
        (lower, lower + 1, position - lower as f32)
    }
}

/// Proof that the caller means to wipe the factory calibration sector.
#[derive(Debug, Clone, Copy)]
pub struct EraseConfirmation {
    _private: (),
}

impl EraseConfirmation {
    pub fn erase_factory_calibration() -> Self {
        Self { _private: () }
    }
}

pub struct CalibrationTable<F: Flash> {
    flash: F,
    offsets: SettingTable,
    base_gains: SettingTable,
    axis: TemperatureAxis,
    valid: bool,
    calibration_mode: bool,
}

impl<F: Flash> CalibrationTable<F> {
    /// Wraps the calibration sector and loads its header.
    pub fn new(flash: F) -> Self {
        let mut table = Self {
            flash,
            offsets: [[[0; NUM_BUFFER_SETTINGS]; NUM_PGA_SETTINGS]; NUM_SAMPLE_RATES],
            base_gains: [[[0; NUM_BUFFER_SETTINGS]; NUM_PGA_SETTINGS]; NUM_SAMPLE_RATES],
            axis: TemperatureAxis::default(),
            valid: false,
            calibration_mode: false,
        };
        table.init();
        table
    }

    /// Reloads the temperature axis and valid marker from flash.
    pub fn init(&mut self) {
        self.axis = self.stored_axis();
        let marked = self.flash.read_byte(CAL_VALID_ADDR) != 0xFF;
        self.valid = marked && self.axis.is_usable() && self.axis.fits(self.flash.size());
        if marked && !self.valid {
            warn!("[Calibration Table] Calibration is marked valid but the temperature header is unusable.");
        }
        debug!(
            "[Calibration Table] Loaded header: {:?}, valid: {}.",
            self.axis, self.valid
        );
    }

    fn stored_axis(&self) -> TemperatureAxis {
        TemperatureAxis {
            low: f32::from_bits(self.flash.read_word(CAL_TEMP_LOW_ADDR)),
            high: f32::from_bits(self.flash.read_word(CAL_TEMP_HIGH_ADDR)),
            step: f32::from_bits(self.flash.read_word(CAL_TEMP_STEP_ADDR)),
            count: self.flash.read_word(CAL_TEMP_CNT_ADDR),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_calibration_mode(&self) -> bool {
        self.calibration_mode
    }

    pub fn temperature_axis(&self) -> TemperatureAxis {
        self.axis
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Gives the sector back, e.g. to hand it to a fresh table after a restart.
    pub fn into_flash(self) -> F {
        self.flash
    }

    pub fn set_base_gain(&mut self, value: u32, rate: SampleRate, gain: Gain, buffer: BufferSetting) {
        self.base_gains[rate.index()][gain.index()][buffer.index()] = value;
    }

    pub fn base_gain(&self, rate: SampleRate, gain: Gain, buffer: BufferSetting) -> u32 {
        self.base_gains[rate.index()][gain.index()][buffer.index()]
    }

    pub fn set_offset_calibration(&mut self, value: u32, rate: SampleRate, gain: Gain, buffer: BufferSetting) {
        self.offsets[rate.index()][gain.index()][buffer.index()] = value;
    }

    pub fn get_offset_calibration(&self, rate: SampleRate, gain: Gain, buffer: BufferSetting) -> u32 {
        self.offsets[rate.index()][gain.index()][buffer.index()]
    }

    /// Gain correction for a setting at a board temperature.
    ///
    /// Without valid factory data this is the base gain alone. Otherwise the
    /// factory value is interpolated between the two bins around
    /// `temperature` and added to the base gain. Temperatures outside the
    /// calibrated range are clamped to it, and NaN reads as the lowest one.
    pub fn get_gain_calibration(&self, rate: SampleRate, gain: Gain, buffer: BufferSetting, temperature: f32) -> u32 {
        let base_gain = self.base_gain(rate, gain, buffer);
        if !self.valid {
            debug!(
                "[Calibration Table] The calibration table is not valid, returning ADC calibration only ({:#x}).",
                base_gain
            );
            return base_gain;
        }

        let axis = self.axis;
        let temperature = if temperature.is_nan() {
            warn!(
                "[Calibration Table] Temperature is not a number, using the lowest calibrated temperature ({} Deg C).",
                axis.low
            );
            axis.low
        } else if temperature < axis.low || temperature > axis.high {
            warn!(
                "[Calibration Table] Temperature {} Deg C is out of range. Allowable range is {} to {} Deg C.",
                temperature, axis.low, axis.high
            );
            temperature.clamp(axis.low, axis.high)
        } else {
            temperature
        };

        let (lower, upper, factor) = axis.bins(temperature);
        let low_value = self.flash.read_word(data_address(lower, rate, gain, buffer));
        let high_value = self.flash.read_word(data_address(upper, rate, gain, buffer));
        base_gain.wrapping_add(interpolate(low_value, high_value, factor))
    }

    /// Erases the factory calibration sector and unlocks it for writing.
    ///
    /// Does nothing when calibration mode is already active. The factory table
    /// stops being used before the erase starts; a flash failure aborts the
    /// erase, locks the sector and leaves calibration mode off.
    pub fn enter_calibration_mode(&mut self, _confirmation: EraseConfirmation) -> Result<(), CalibrationError> {
        if self.calibration_mode {
            info!("[Calibration Table] Calibration mode is already active.");
            return Ok(());
        }
        self.valid = false;
        self.flash.unlock();
        if let Err(e) = self.erase() {
            self.flash.lock();
            warn!("[Calibration Table] Erasing the calibration sector failed: {}.", e);
            return Err(e.into());
        }
        self.calibration_mode = true;
        info!("[Calibration Table] Entered calibration mode, factory data erased.");
        Ok(())
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.flash.erase_sector()?;
        let mut address = 0;
        while address < self.flash.size() {
            self.flash.program_word(address, CALIBRATION_ERASE_DATA)?;
            address += 4;
        }
        Ok(())
    }

    /// Locks the sector again and reloads the header that was written.
    pub fn exit_calibration_mode(&mut self) {
        self.flash.lock();
        self.calibration_mode = false;
        self.init();
        info!("[Calibration Table] Exited calibration mode.");
    }

    fn ensure_writable(&self) -> Result<(), CalibrationError> {
        if self.calibration_mode {
            Ok(())
        } else {
            warn!("[Calibration Table] Refusing to write calibration data outside of calibration mode.");
            Err(CalibrationError::WriteProtected)
        }
    }

    pub fn set_serial_number(&mut self, serial: &str) -> Result<(), CalibrationError> {
        self.ensure_writable()?;
        let bytes = serial.as_bytes();
        if bytes.len() < BOARD_SERIAL_NUM_LENGTH {
            return Err(CalibrationError::SerialTooShort {
                expected: BOARD_SERIAL_NUM_LENGTH,
                actual: bytes.len(),
            });
        }
        for (offset, byte) in bytes.iter().take(BOARD_SERIAL_NUM_LENGTH).enumerate() {
            self.flash.program_byte(BOARD_SERIAL_NUM_ADDR + offset as u32, *byte)?;
        }
        Ok(())
    }

    /// Serial number stored in the sector, empty when none was written.
    pub fn serial_number(&self) -> String {
        (0..BOARD_SERIAL_NUM_LENGTH as u32)
            .map(|offset| self.flash.read_byte(BOARD_SERIAL_NUM_ADDR + offset))
            .take_while(|byte| *byte != 0xFF && *byte != 0x00)
            .map(char::from)
            .collect()
    }

    /// Writes the temperature axis of the factory table.
    pub fn set_calibration_bounds(&mut self, axis: TemperatureAxis) -> Result<(), CalibrationError> {
        self.ensure_writable()?;
        if !axis.is_usable() || !axis.fits(self.flash.size()) {
            return Err(CalibrationError::InvalidRange);
        }
        self.flash.program_word(CAL_TEMP_LOW_ADDR, axis.low.to_bits())?;
        self.flash.program_word(CAL_TEMP_HIGH_ADDR, axis.high.to_bits())?;
        self.flash.program_word(CAL_TEMP_STEP_ADDR, axis.step.to_bits())?;
        self.flash.program_word(CAL_TEMP_CNT_ADDR, axis.count)?;
        Ok(())
    }

    /// Writes one factory gain cell for the bin nearest `temperature`.
    ///
    /// The bounds must have been written first.
    pub fn set_gain_calibration(
        &mut self,
        value: u32,
        rate: SampleRate,
        gain: Gain,
        buffer: BufferSetting,
        temperature: f32,
    ) -> Result<(), CalibrationError> {
        self.ensure_writable()?;
        let axis = self.stored_axis();
        if !axis.is_usable() || !axis.fits(self.flash.size()) {
            return Err(CalibrationError::InvalidRange);
        }
        if temperature.is_nan() || temperature < axis.low || temperature > axis.high {
            return Err(CalibrationError::TemperatureOutOfRange {
                temperature,
                low: axis.low,
                high: axis.high,
            });
        }
        let bin = (((temperature - axis.low) / axis.step).round() as usize).min(axis.count as usize - 1);
        self.flash.program_word(data_address(bin, rate, gain, buffer), value)?;
        Ok(())
    }

    /// Marks the factory data as complete. Takes effect on the next [`Self::init`].
    pub fn set_calibration_valid(&mut self) -> Result<(), CalibrationError> {
        self.ensure_writable()?;
        self.flash.program_byte(CAL_VALID_ADDR, CAL_VALID_MARKER)?;
        Ok(())
    }
}

fn interpolate(low: u32, high: u32, factor: f32) -> u32 {
    let low = f64::from(low);
    let value = low + (f64::from(high) - low) * f64::from(factor);
    value.round() as i64 as u32
}
