//! Turns the outcome of a command into the line sent back to the client.

use crate::error::CommandError;
use crate::hal::Transport;

pub const SUCCESS_PREFIX: &str = "SUCCESS - ";
pub const FAIL_PREFIX: &str = "FAIL - ";
pub const ERROR_PREFIX: &str = "ERROR - ";

/// Description reported with a successful command.
pub const SUCCESS_DESCRIPTION: &str = "The command was executed successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Status,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub channel: Channel,
    pub text: String,
}

/// Formats a command outcome.
///
/// Success goes to the status channel, everything else to the error channel.
/// A function error carries the collaborator's reason on a second, indented line.
pub fn format(result: &Result<(), CommandError>) -> Response {
    let error = match result {
        Ok(()) => {
            return Response {
                channel: Channel::Status,
                text: format!("{}{}", SUCCESS_PREFIX, SUCCESS_DESCRIPTION),
            }
        }
        Err(error) => error,
    };
    let text = match error {
        CommandError::BadParam => format!("{}{}.", FAIL_PREFIX, error),
        CommandError::Function(function_error) => {
            format!("{}{}:\n\r\tFunction Error: {}", FAIL_PREFIX, error, function_error)
        }
        CommandError::Unknown => format!("{}{}", ERROR_PREFIX, error),
        _ => format!("{}{}", FAIL_PREFIX, error),
    };
    Response {
        channel: Channel::Error,
        text,
    }
}

/// Formats a command outcome and writes it to `transport`.
pub fn report<T: Transport>(transport: &mut T, result: &Result<(), CommandError>) {
    let response = format(result);
    match response.channel {
        Channel::Status => transport.write_status(&response.text),
        Channel::Error => transport.write_error(&response.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FunctionError;
    use crate::sim::{RecordingTransport, Written};

    #[test]
    fn success_goes_to_status_channel() {
        let response = format(&Ok(()));
        assert_eq!(response.channel, Channel::Status);
        assert_eq!(response.text, "SUCCESS - The command was executed successfully");
    }

    #[test]
    fn bad_param_ends_with_a_period() {
        let response = format(&Err(CommandError::BadParam));
        assert_eq!(response.channel, Channel::Error);
        assert_eq!(response.text, "FAIL - The provided parameters were invalid.");
    }

    #[test]
    fn function_error_appends_the_reason() {
        let response = format(&Err(CommandError::Function(FunctionError::AinInputExists)));
        assert_eq!(
            response.text,
            "FAIL - A function error occurred while processing the command:\n\r\tFunction Error: The analog input already exists"
        );
    }

    #[test]
    fn every_failure_is_prefixed() {
        for error in [
            CommandError::BadCommand,
            CommandError::ParseError,
            CommandError::AdcInvalidOperation,
            CommandError::DiInvalidOperation,
            CommandError::DoInvalidOperation,
        ] {
            let response = format(&Err(error));
            assert!(response.text.starts_with(FAIL_PREFIX), "{}", response.text);
            assert!(response.text.ends_with(&error.to_string()));
        }
        assert_eq!(format(&Err(CommandError::Unknown)).text, "ERROR - An unknown error occurred");
    }

    #[test]
    fn report_picks_the_transport_channel() {
        let mut transport = RecordingTransport::default();
        report(&mut transport, &Ok(()));
        report(&mut transport, &Err(CommandError::BadCommand));
        assert!(matches!(transport.written[0], Written::Status(_)));
        assert_eq!(
            transport.written[1],
            Written::Error("FAIL - The command was not recognized".to_string())
        );
    }
}
