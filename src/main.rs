use clap::Parser;
use crossterm::style::Stylize;
use serialport::SerialPort;
use std::fmt::Display;
use std::io::{self, Read, Write};
use std::time::Duration;
use tdq_core::config::{MAX_COMMANDLINE_LENGTH, MAX_COMMANDPART_LENGTH, MAX_NUM_ARGUMENTS};
use tdq_core::hal::Transport;
use tdq_core::sim::{MemoryFlash, SimulatedBoard};
use tdq_core::{Config, Interpreter, Limits};

type ConsoleInterpreter = Interpreter<SimulatedBoard, ConsoleTransport, MemoryFlash>;

#[derive(Parser, Debug)]
#[command(version, about = "Tekdaqc command interpreter console", long_about = None)]
struct Args {
    /// Report oversized and malformed input as parse errors instead of dropping it
    #[arg(long)]
    strict: bool,

    /// Maximum number of characters buffered per command line
    #[arg(long, default_value_t = MAX_COMMANDLINE_LENGTH)]
    max_line: usize,

    /// Maximum token length, terminator included
    #[arg(long, default_value_t = MAX_COMMANDPART_LENGTH)]
    max_token: usize,

    /// Maximum number of arguments after the command word
    #[arg(long, default_value_t = MAX_NUM_ARGUMENTS)]
    max_args: usize,

    /// Serial port to listen on directly, skipping the menu
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate used with --port
    #[arg(short, long, default_value_t = 115200)]
    baud: u32,
}

// Echoes every response to the terminal and, when a serial port is attached, to the port as well.
struct ConsoleTransport {
    port: Option<Box<dyn SerialPort>>,
    closed: bool,
}

impl ConsoleTransport {
    fn new() -> Self {
        Self { port: None, closed: false }
    }

    fn send(&mut self, text: &str) {
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.write_all(text.as_bytes()) {
                eprintln!("[ERROR] Failed to write to serial port: {}", e);
            }
        }
    }
}

impl Transport for ConsoleTransport {
    fn write_status(&mut self, message: &str) {
        println!("< {}", message.green());
        self.send(&format!("{}\n\r", message));
    }

    fn write_error(&mut self, message: &str) {
        println!("< {}", message.red());
        self.send(&format!("{}\n\r", message));
    }

    fn write_raw(&mut self, text: &str) {
        print!("{}", text);
        self.send(text);
    }

    fn close_connection(&mut self) {
        println!("{}", "[INFO] Connection closed.".yellow());
        self.closed = true;
    }
}

// The main entry point for the command-line console application.
fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = Config {
        limits: Limits {
            max_line_length: args.max_line,
            max_token_length: args.max_token,
            max_arguments: args.max_args,
        },
        silent_drops: !args.strict,
        ..Config::default()
    };

    println!("=================================");
    println!("  Tekdaqc Command Interpreter  ");
    println!("=================================");

    let mut interpreter = Interpreter::new(
        config,
        SimulatedBoard::new(config.layout),
        ConsoleTransport::new(),
        MemoryFlash::default(),
    );

    println!(
        "Interpreter started ({} mode).",
        if config.silent_drops { "compatible" } else { "strict" }
    );

    if let Some(port_name) = args.port {
        listen(&mut interpreter, &port_name, args.baud);
        return;
    }

    loop {
        println!("\nSelect mode:");
        println!("  1. Type commands");
        println!("  2. Serve a serial port");
        println!("  3. Quit");
        let Some(choice) = prompt("> ") else {
            break;
        };
        match choice.trim() {
            "1" => run_manual_mode(&mut interpreter),
            "2" => run_serial_mode(&mut interpreter),
            "3" => break,
            other => eprintln!("[ERROR] Unknown mode '{}'. Enter 1, 2 or 3.", other),
        }
    }
}

// Prints `text` and reads one line from stdin. `None` at end of input.
fn prompt(text: &str) -> Option<String> {
    print!("{}", text);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(e) => {
            eprintln!("[ERROR] Could not read from stdin: {}", e);
            None
        }
    }
}

// Each typed line is fed as if it had arrived over the wire, CR included.
fn run_manual_mode(interpreter: &mut ConsoleInterpreter) {
    println!("\n--- Manual Mode ---");
    println!("Type a command per line, or 'back' for the menu.");
    while let Some(line) = prompt("> ") {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim() == "back" {
            break;
        }
        interpreter.feed(line);
        interpreter.add_char(b'\r');
        report_board_events(interpreter);
    }
}

// Asks for a serial port and baud rate, then listens until the client disconnects.
fn run_serial_mode(interpreter: &mut ConsoleInterpreter) {
    println!("\n--- Serial Mode ---");

    let ports = match serialport::available_ports() {
        Ok(ports) if !ports.is_empty() => ports,
        Ok(_) => {
            eprintln!("[ERROR] No serial ports found.");
            return;
        }
        Err(e) => {
            eprintln!("[ERROR] Could not enumerate serial ports: {}", e);
            return;
        }
    };
    let names: Vec<&str> = ports.iter().map(|port| port.port_name.as_str()).collect();
    let Some(port_index) = choose("serial port", &names) else {
        return;
    };

    const BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 115200, 230400];
    let Some(baud_index) = choose("baud rate", &BAUD_RATES) else {
        return;
    };

    listen(interpreter, names[port_index], BAUD_RATES[baud_index]);
}

// Lists `options` and reads the index of one of them from stdin.
fn choose<T: Display>(what: &str, options: &[T]) -> Option<usize> {
    println!("Available {}s:", what);
    for (i, option) in options.iter().enumerate() {
        println!("  {}: {}", i, option);
    }
    print!("Select a {} (number): ", what);
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if let Err(e) = io::stdin().read_line(&mut answer) {
        eprintln!("[ERROR] Could not read the selection: {}", e);
        return None;
    }
    match answer.trim().parse::<usize>() {
        Ok(i) if i < options.len() => Some(i),
        _ => {
            eprintln!("[ERROR] Invalid {} selection.", what);
            None
        }
    }
}

// Feeds every byte received on the port into the interpreter until the client disconnects.
fn listen(interpreter: &mut ConsoleInterpreter, port_name: &str, baud_rate: u32) {
    let mut port = match serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(10))
        .open()
    {
        Ok(port) => port,
        Err(e) => {
            eprintln!("[ERROR] Cannot open '{}' at {} baud: {}", port_name, baud_rate, e);
            return;
        }
    };
    match port.try_clone() {
        Ok(writer) => interpreter.transport_mut().port = Some(writer),
        Err(e) => {
            eprintln!("[ERROR] Failed to clone port '{}' for writing: {}", port_name, e);
            return;
        }
    }
    interpreter.transport_mut().closed = false;

    println!(
        "\nServing {} at {} baud until the client sends DISCONNECT.",
        port_name, baud_rate
    );

    let mut incoming = [0u8; 128];
    while !interpreter.transport().closed {
        match port.read(&mut incoming) {
            Ok(count) => {
                incoming[..count].iter().for_each(|&c| interpreter.add_char(c));
                report_board_events(interpreter);
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                eprintln!("[ERROR] Lost serial port '{}': {}", port_name, e);
                break;
            }
        }
    }

    interpreter.transport_mut().port = None;
    interpreter.clear_buffer();
}

// Prints side effects of the last command that the simulated board cannot show by itself.
fn report_board_events(interpreter: &mut ConsoleInterpreter) {
    let board = interpreter.board_mut();
    if board.update_flag && board.resets > 0 {
        println!("{}", "[INFO] Update flag set, board reset.".yellow());
        board.update_flag = false;
        board.resets = 0;
    }
    if let Some(error) = interpreter.take_last_function_error() {
        eprintln!("[ERROR] Last function error: {}", error);
    }
}
