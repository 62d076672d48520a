//! The character-feed entry point.
//!
//! [`Interpreter`] buffers characters until a line terminator and then runs
//! the whole pipeline synchronously: tokenize, resolve the command word,
//! parse the key/value arguments, dispatch, and write the response. One
//! interpreter must only ever be fed from one place at a time.

use log::debug;

use crate::calibration::CalibrationTable;
use crate::channels::NumberParsing;
use crate::command::{to_upper_text, Command};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{CommandError, FunctionError};
use crate::hal::{Board, Flash, Transport};
use crate::parse::{parse_key_value_pairs, tokenize, LineBuffer, Overflow};
use crate::response;

pub struct Interpreter<B: Board, T: Transport, F: Flash> {
    config: Config,
    buffer: LineBuffer,
    dispatcher: Dispatcher,
    board: B,
    transport: T,
    calibration: CalibrationTable<F>,
}

impl<B: Board, T: Transport, F: Flash> Interpreter<B, T, F> {
    /// Creates an interpreter with an empty line buffer.
    ///
    /// The calibration header is loaded from `flash` right away.
    pub fn new(config: Config, board: B, transport: T, flash: F) -> Self {
        let parsing = if config.silent_drops {
            NumberParsing::Lenient
        } else {
            NumberParsing::Strict
        };
        Self {
            config,
            buffer: LineBuffer::new(config.limits.max_line_length),
            dispatcher: Dispatcher::new(config.layout, config.bounds, parsing),
            board,
            transport,
            calibration: CalibrationTable::new(flash),
        }
    }

    /// Feeds one character. A CR or LF runs the buffered line, if any.
    pub fn add_char(&mut self, c: u8) {
        if let Some(line) = self.buffer.push(c) {
            self.process_line(&line);
        }
    }

    /// Feeds every byte of `text` in order.
    pub fn feed(&mut self, text: &str) {
        for c in text.bytes() {
            self.add_char(c);
        }
    }

    /// Drops whatever has been buffered so far.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    fn process_line(&mut self, line: &str) {
        debug!("[Command Interpreter] Parsing command: {}", line);
        let overflow = if self.config.silent_drops {
            Overflow::Truncate
        } else {
            Overflow::Reject
        };
        let tokenized = match tokenize(line, &self.config.limits, overflow) {
            Ok(tokenized) => tokenized,
            Err(e) => {
                debug!("[Command Interpreter] {}, ignoring.", e);
                if !self.config.silent_drops {
                    response::report(&mut self.transport, &Err(CommandError::ParseError));
                }
                return;
            }
        };

        let mut word = tokenized.command;
        to_upper_text(&mut word);
        let command = Command::resolve(&word);
        debug!("[Command Interpreter] Determined command to be: {}", command.name());

        let (parameters, malformed) = parse_key_value_pairs(&tokenized.raw_args);
        if !malformed.is_empty() && !self.config.silent_drops {
            debug!("[Command Interpreter] {}.", malformed[0]);
            response::report(&mut self.transport, &Err(CommandError::ParseError));
            return;
        }

        let result = self.dispatcher.execute(
            command,
            &parameters,
            &mut self.board,
            &mut self.transport,
            &mut self.calibration,
        );
        response::report(&mut self.transport, &result);
    }

    /// Returns the reason of the last failed collaborator call and clears it.
    pub fn take_last_function_error(&mut self) -> Option<FunctionError> {
        self.dispatcher.take_last_function_error()
    }

    /// Whether the board stayed inside the calibrated temperature window.
    pub fn is_calibration_valid(&self) -> bool {
        self.dispatcher.is_calibration_valid(&self.board)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The calibration tables, also used by the ADC driver for every conversion.
    pub fn calibration(&self) -> &CalibrationTable<F> {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationTable<F> {
        &mut self.calibration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::sim::{MemoryFlash, RecordingTransport, SimulatedBoard, Written};

    type SimInterpreter = Interpreter<SimulatedBoard, RecordingTransport, MemoryFlash>;

    fn interpreter(config: Config) -> SimInterpreter {
        let _ = env_logger::builder().is_test(true).try_init();
        Interpreter::new(
            config,
            SimulatedBoard::new(config.layout),
            RecordingTransport::default(),
            MemoryFlash::default(),
        )
    }

    #[test]
    fn nothing_happens_before_a_terminator() {
        let mut interpreter = interpreter(Config::default());
        interpreter.feed("HALT");
        assert!(interpreter.transport().written.is_empty());
        assert_eq!(interpreter.buffered(), b"HALT");
        interpreter.add_char(b'\r');
        assert_eq!(interpreter.transport().statuses().len(), 1);
        assert!(interpreter.buffered().is_empty());
    }

    #[test]
    fn lowercase_command_resolves() {
        let mut interpreter = interpreter(Config::default());
        interpreter.feed("list_analog_inputs\r");
        assert_eq!(
            interpreter.transport().last(),
            Some(&Written::Status("SUCCESS - The command was executed successfully".to_string()))
        );
    }

    #[test]
    fn oversized_command_is_dropped_silently() {
        let mut interpreter = interpreter(Config::default());
        interpreter.feed(&format!("{}\r", "A".repeat(50)));
        interpreter.feed(&format!("{} --INPUT=1\r", "B".repeat(50)));
        assert!(interpreter.transport().written.is_empty());
        assert!(interpreter.buffered().is_empty());
    }

    #[test]
    fn oversized_command_is_reported_in_strict_mode() {
        let mut interpreter = interpreter(Config::strict());
        interpreter.feed(&format!("{}\r", "A".repeat(50)));
        assert_eq!(
            interpreter.transport().errors(),
            vec!["FAIL - A parse error occurred while processing the command"]
        );
    }

    #[test]
    fn malformed_token_is_ignored_or_reported() {
        let mut interpreter = interpreter(Config::default());
        interpreter.feed("ADD_ANALOG_INPUT INPUT=1 --INPUT=2\r");
        assert!(interpreter.board().analog_inputs[2].is_some());
        assert!(interpreter.board().analog_inputs[1].is_none());

        let mut interpreter = interpreter_strict();
        interpreter.feed("ADD_ANALOG_INPUT INPUT=1 --INPUT=2\r");
        assert!(interpreter.board().analog_inputs[2].is_none());
        assert_eq!(interpreter.transport().errors().len(), 1);
    }

    fn interpreter_strict() -> SimInterpreter {
        interpreter(Config::strict())
    }

    #[test]
    fn too_many_arguments_respects_the_limit() {
        let config = Config {
            limits: Limits {
                max_arguments: 1,
                ..Limits::default()
            },
            ..Config::default()
        };
        let mut interpreter = interpreter(config);
        // The surplus --NUMBER is ignored, so the read still succeeds.
        interpreter.feed("READ_ANALOG_INPUT --INPUT=ALL --NUMBER=X\r");
        assert_eq!(interpreter.transport().errors().len(), 0);
        assert_eq!(interpreter.board().sample_requests.len(), 1);
    }

    #[test]
    fn function_error_slot_is_exposed() {
        let mut interpreter = interpreter(Config::default());
        interpreter.feed("REMOVE_DIGITAL_INPUT --INPUT=3\r");
        assert_eq!(
            interpreter.take_last_function_error(),
            Some(FunctionError::DinInputNotFound)
        );
        assert_eq!(interpreter.take_last_function_error(), None);
    }

    #[test]
    fn calibration_validity_reads_thermal_history() {
        let mut interpreter = interpreter(Config::default());
        assert!(interpreter.is_calibration_valid());
        interpreter.board_mut().min_temperature = -5.0;
        assert!(!interpreter.is_calibration_valid());
    }
}
