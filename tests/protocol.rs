use tdq_core::adc::{BufferSetting, Gain, SampleRate};
use tdq_core::calibration::{cell_index, CELLS_PER_BIN};
use tdq_core::channels::ChannelKind;
use tdq_core::command::Command;
use tdq_core::hal::SamplingMode;
use tdq_core::parse::{check_args, parse_key_value_pairs, tokenize, Overflow};
use tdq_core::sim::{MemoryFlash, RecordingTransport, SimulatedBoard, Written};
use tdq_core::{
    BoardLayout, CalibrationError, CalibrationTable, Config, EraseConfirmation, FunctionError, Interpreter, Limits,
    TemperatureAxis,
};

type SimInterpreter = Interpreter<SimulatedBoard, RecordingTransport, MemoryFlash>;

const SUCCESS: &str = "SUCCESS - The command was executed successfully";

fn interpreter_with(config: Config) -> SimInterpreter {
    let _ = env_logger::builder().is_test(true).try_init();
    Interpreter::new(
        config,
        SimulatedBoard::new(config.layout),
        RecordingTransport::default(),
        MemoryFlash::default(),
    )
}

fn interpreter() -> SimInterpreter {
    interpreter_with(Config::default())
}

/// Interpreter for a board with only four analog inputs, all configured.
fn four_input_interpreter() -> SimInterpreter {
    let config = Config {
        layout: BoardLayout {
            analog_inputs: 4,
            ..BoardLayout::default()
        },
        ..Config::default()
    };
    let mut interpreter = interpreter_with(config);
    for input in 0..4 {
        interpreter.feed(&format!("ADD_ANALOG_INPUT --INPUT={}\r", input));
    }
    interpreter.transport_mut().clear();
    interpreter
}

fn resolved(interpreter: &SimInterpreter) -> Vec<Option<u8>> {
    interpreter
        .dispatcher()
        .channel_list(ChannelKind::AnalogInput)
        .slots()
        .iter()
        .map(|slot| slot.map(|handle| handle.number))
        .collect()
}

#[test]
fn add_analog_input_line_is_tokenized_validated_and_executed() {
    let line = "ADD_ANALOG_INPUT --INPUT=0 --RATE=1000 --GAIN=x1 --BUFFER=ENABLED --NAME=Sensor1";
    let tokenized = tokenize(line, &Limits::default(), Overflow::Truncate).unwrap();
    assert_eq!(Command::resolve(&tokenized.command), Command::AddAnalogInput);
    let (parameters, malformed) = parse_key_value_pairs(&tokenized.raw_args);
    assert!(malformed.is_empty());
    assert_eq!(parameters.len(), 5);
    assert!(check_args(&parameters, Command::AddAnalogInput.schema()));

    let mut interpreter = interpreter();
    interpreter.feed(line);
    interpreter.feed("\r\n");
    assert_eq!(interpreter.transport().statuses(), vec![SUCCESS]);
    let input = interpreter.board().analog_inputs[0].as_ref().unwrap();
    assert_eq!(input.name, "SENSOR1");
    assert_eq!(input.rate, SampleRate::Sps1000);
    assert_eq!(input.gain, Gain::X1);
    assert_eq!(input.buffer, BufferSetting::Enabled);
}

#[test]
fn oversized_command_word_produces_no_response() {
    let mut interpreter = interpreter();
    interpreter.feed(&format!("{}\r", "X".repeat(60)));
    assert!(interpreter.transport().written.is_empty());
    assert!(interpreter.buffered().is_empty());

    // The next line is handled normally.
    interpreter.feed("HALT\r");
    assert_eq!(interpreter.transport().statuses(), vec![SUCCESS]);
}

#[test]
fn command_words_are_case_insensitive() {
    let mut lower = interpreter();
    lower.feed("add_analog_input --INPUT=3\r");
    lower.feed("list_analog_inputs\r");

    let mut upper = interpreter();
    upper.feed("ADD_ANALOG_INPUT --INPUT=3\r");
    upper.feed("LIST_ANALOG_INPUTS\r");

    assert_eq!(lower.transport().written, upper.transport().written);
    assert!(lower.transport().errors().is_empty());
}

#[test]
fn unknown_command_fails() {
    let mut interpreter = interpreter();
    interpreter.feed("FROBNICATE\r");
    interpreter.feed("NONE\r");
    assert_eq!(
        interpreter.transport().errors(),
        vec!["FAIL - The command was not recognized"; 2]
    );
}

#[test]
fn duplicate_keys_overflow_the_schema() {
    let mut interpreter = interpreter();
    interpreter.feed("READ_DIGITAL_INPUT --INPUT=1 --INPUT=2 --NUMBER=5\r");
    assert_eq!(
        interpreter.transport().errors(),
        vec!["FAIL - The provided parameters were invalid."]
    );
    assert!(interpreter.board().sample_requests.is_empty());
}

#[test]
fn all_resolves_every_configured_input_in_order() {
    let mut interpreter = four_input_interpreter();
    interpreter.feed("READ_ANALOG_INPUT --INPUT=ALL --NUMBER=2\r");
    assert_eq!(interpreter.transport().statuses(), vec![SUCCESS]);
    assert_eq!(resolved(&interpreter), vec![Some(0), Some(1), Some(2), Some(3)]);
    let request = &interpreter.board().sample_requests[0];
    assert_eq!(request.channels, vec![0, 1, 2, 3]);
    assert_eq!(request.count, 2);
    assert_eq!(interpreter.board().mode, Some(SamplingMode::AnalogInput));
}

#[test]
fn comma_set_fills_leading_slots() {
    let mut interpreter = four_input_interpreter();
    interpreter.feed("READ_ANALOG_INPUT --INPUT=1,3\r");
    assert_eq!(resolved(&interpreter), vec![Some(1), Some(3), None, None]);
}

#[test]
fn range_is_inclusive() {
    let mut interpreter = interpreter();
    for input in 0..6 {
        interpreter.feed(&format!("ADD_ANALOG_INPUT --INPUT={}\r", input));
    }
    interpreter.feed("READ_ANALOG_INPUT --INPUT=2-4\r");
    assert_eq!(interpreter.board().sample_requests[0].channels, vec![2, 3, 4]);
    assert_eq!(
        interpreter.dispatcher().channel_list(ChannelKind::AnalogInput).populated(),
        3
    );
}

#[test]
fn out_of_range_single_index_resolves_to_nothing() {
    let mut interpreter = four_input_interpreter();
    interpreter.feed("READ_ANALOG_INPUT --INPUT=99\r");
    assert_eq!(interpreter.transport().statuses(), vec![SUCCESS]);
    assert!(resolved(&interpreter).iter().all(Option::is_none));
    assert!(interpreter.board().sample_requests[0].channels.is_empty());
}

#[test]
fn zero_inside_a_set_depends_on_the_compatibility_flag() {
    let mut interpreter = interpreter();
    interpreter.feed("ADD_DIGITAL_INPUT --INPUT=0\r");
    interpreter.feed("ADD_DIGITAL_INPUT --INPUT=2\r");
    interpreter.feed("READ_DIGITAL_INPUT --INPUT=2,0\r");
    assert_eq!(interpreter.board().sample_requests[0].channels, vec![2]);

    let mut strict = interpreter_with(Config::strict());
    strict.feed("ADD_DIGITAL_INPUT --INPUT=0\r");
    strict.feed("ADD_DIGITAL_INPUT --INPUT=2\r");
    strict.feed("READ_DIGITAL_INPUT --INPUT=2,0\r");
    assert_eq!(strict.board().sample_requests[0].channels, vec![2, 0]);
}

#[test]
fn range_from_zero_depends_on_the_compatibility_flag() {
    let mut interpreter = interpreter();
    let mut strict = interpreter_with(Config::strict());
    for input in 0..4 {
        interpreter.feed(&format!("ADD_DIGITAL_OUTPUT --OUTPUT={}\r", input));
        strict.feed(&format!("ADD_DIGITAL_OUTPUT --OUTPUT={}\r", input));
    }
    interpreter.feed("READ_DIGITAL_OUTPUT --OUTPUT=0-3\r");
    strict.feed("READ_DIGITAL_OUTPUT --OUTPUT=0-3\r");
    assert_eq!(interpreter.board().sample_requests[0].channels, vec![0]);
    assert_eq!(strict.board().sample_requests[0].channels, vec![0, 1, 2, 3]);
}

#[test]
fn function_errors_carry_the_reason() {
    let mut interpreter = interpreter();
    interpreter.feed("ADD_ANALOG_INPUT --INPUT=1\r");
    interpreter.feed("ADD_ANALOG_INPUT --INPUT=1\r");
    assert_eq!(
        interpreter.transport().last(),
        Some(&Written::Error(
            "FAIL - A function error occurred while processing the command:\n\r\tFunction Error: The analog input already exists"
                .to_string()
        ))
    );
    assert_eq!(
        interpreter.take_last_function_error(),
        Some(FunctionError::AinInputExists)
    );
}

#[test]
fn configuration_is_refused_while_sampling() {
    let mut interpreter = interpreter();
    interpreter.feed("ADD_ANALOG_INPUT --INPUT=0\r");
    interpreter.feed("READ_ANALOG_INPUT --INPUT=0\r");
    interpreter.feed("REMOVE_ANALOG_INPUT --INPUT=0\r");
    assert_eq!(interpreter.transport().errors().len(), 1);
    assert!(interpreter.board().analog_inputs[0].is_some());

    interpreter.feed("HALT\r");
    interpreter.feed("REMOVE_ANALOG_INPUT --INPUT=0\r");
    assert!(interpreter.board().analog_inputs[0].is_none());
}

#[test]
fn disconnect_closes_the_connection() {
    let mut interpreter = interpreter();
    interpreter.feed("DISCONNECT\r");
    assert!(interpreter.transport().closed);
    assert_eq!(interpreter.transport().statuses(), vec![SUCCESS]);
}

#[test]
fn every_gain_cell_is_distinct_and_in_range() {
    let mut cells = Vec::new();
    for rate in SampleRate::ALL {
        for gain in Gain::ALL {
            for buffer in BufferSetting::ALL {
                cells.push(cell_index(rate, gain, buffer));
            }
        }
    }
    assert!(cells.iter().all(|cell| *cell < CELLS_PER_BIN));
    cells.sort_unstable();
    cells.dedup();
    assert_eq!(cells.len(), CELLS_PER_BIN);
}

/// Factory table over 0..=40 Deg C in 20 degree bins holding 100, 300 and 700.
fn factory_table() -> CalibrationTable<MemoryFlash> {
    let mut table = CalibrationTable::new(MemoryFlash::default());
    table
        .enter_calibration_mode(EraseConfirmation::erase_factory_calibration())
        .unwrap();
    table
        .set_calibration_bounds(TemperatureAxis::new(0.0, 40.0, 20.0).unwrap())
        .unwrap();
    for (temperature, value) in [(0.0, 100), (20.0, 300), (40.0, 700)] {
        table
            .set_gain_calibration(value, SampleRate::Sps60, Gain::X2, BufferSetting::Disabled, temperature)
            .unwrap();
    }
    table.set_calibration_valid().unwrap();
    table.exit_calibration_mode();
    table.set_base_gain(1_000_000, SampleRate::Sps60, Gain::X2, BufferSetting::Disabled);
    table
}

#[test]
fn gain_calibration_hits_the_table_at_the_bounds_and_interpolates_between() {
    let table = factory_table();
    assert!(table.is_valid());
    let gain = |temperature| table.get_gain_calibration(SampleRate::Sps60, Gain::X2, BufferSetting::Disabled, temperature);
    assert_eq!(gain(0.0), 1_000_100);
    assert_eq!(gain(40.0), 1_000_700);
    assert_eq!(gain(10.0), 1_000_200);
    assert_eq!(gain(30.0), 1_000_500);
}

#[test]
fn gain_calibration_clamps_outside_the_table() {
    let table = factory_table();
    let gain = |temperature| table.get_gain_calibration(SampleRate::Sps60, Gain::X2, BufferSetting::Disabled, temperature);
    assert_eq!(gain(-20.0), gain(0.0));
    assert_eq!(gain(85.0), gain(40.0));
}

#[test]
fn base_gain_round_trips_without_a_valid_table() {
    let mut table = CalibrationTable::new(MemoryFlash::default());
    assert!(!table.is_valid());
    table.set_base_gain(0x00AB_CDEF, SampleRate::Sps500, Gain::X16, BufferSetting::Enabled);
    for temperature in [-10.0, 0.0, 37.5, 90.0] {
        assert_eq!(
            table.get_gain_calibration(SampleRate::Sps500, Gain::X16, BufferSetting::Enabled, temperature),
            0x00AB_CDEF
        );
    }
}

#[test]
fn gain_calibration_command_feeds_the_table() {
    let mut interpreter = interpreter();
    interpreter.board_mut().gain_result = 0x0033_0000;
    interpreter.feed("SYSTEM_GCAL --RATE=500 --GAIN=16 --BUFFER=ENABLED --INPUT=7\r");
    assert_eq!(interpreter.transport().statuses(), vec![SUCCESS]);
    assert_eq!(interpreter.board().last_gain_calibration_input, Some(7));
    assert_eq!(
        interpreter
            .calibration()
            .get_gain_calibration(SampleRate::Sps500, Gain::X16, BufferSetting::Enabled, 25.0),
        0x0033_0000
    );
}

#[test]
fn persistent_writes_require_calibration_mode() {
    let mut table = CalibrationTable::new(MemoryFlash::default());
    table
        .enter_calibration_mode(EraseConfirmation::erase_factory_calibration())
        .unwrap();
    table.set_serial_number(&"A".repeat(32)).unwrap();
    table.exit_calibration_mode();

    assert_eq!(
        table.set_serial_number(&"B".repeat(32)),
        Err(CalibrationError::WriteProtected)
    );
    assert_eq!(table.serial_number(), "A".repeat(32));
}
