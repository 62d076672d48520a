//! # Tekdaqc Command Interpreter Library
//!
//! This library contains the command protocol core of the Tekdaqc data
//! acquisition board. Characters arriving over the connection are buffered
//! into lines, split into a command word and `--KEY=VALUE` arguments,
//! validated against the command's parameter schema and dispatched to the
//! board. Every command answers with a `SUCCESS - ...` status line or a
//! `FAIL - ...` error line.
//!
//! The board itself is reached through the traits in [`hal`]; [`sim`]
//! provides an in-memory board so the interpreter runs on a host.
//!
//! ```
//! use tdq_core::sim::{MemoryFlash, RecordingTransport, SimulatedBoard};
//! use tdq_core::{Config, Interpreter};
//!
//! let config = Config::default();
//! let mut interpreter = Interpreter::new(
//!     config,
//!     SimulatedBoard::new(config.layout),
//!     RecordingTransport::default(),
//!     MemoryFlash::default(),
//! );
//! interpreter.feed("ADD_ANALOG_INPUT --INPUT=0 --RATE=1000 --GAIN=x1 --NAME=Sensor1\r");
//! assert_eq!(
//!     interpreter.transport().statuses(),
//!     vec!["SUCCESS - The command was executed successfully"]
//! );
//! ```

pub mod adc;
pub mod calibration;
pub mod channels;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hal;
pub mod interpreter;
pub mod parse;
pub mod response;
pub mod sim;

pub use calibration::{CalibrationTable, EraseConfirmation, TemperatureAxis};
pub use command::Command;
pub use config::{BoardLayout, CalibrationBounds, Config, Limits};
pub use error::{CalibrationError, CommandError, FlashError, FunctionError};
pub use interpreter::Interpreter;
pub use parse::Parameter;
