//! Command line parser.

use crate::error::ProtocolError;

/// A parsed command, borrowed from the line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    /// Command name as typed; compare case-insensitively.
    pub name: &'a str,
    /// Text after the name with its inner whitespace preserved; may be empty.
    pub argument: &'a str,
    /// The whole line after trimming its outer whitespace.
    pub input: &'a str,
}

/// Parse one line (without its delimiter) into a command.
///
/// The name ends at the first run of whitespace. Everything after that run
/// is the argument, trimmed only at its outer ends.
pub fn parse_line(line: &str) -> Result<Command<'_>, ProtocolError> {
    let input = line.trim();
    if input.is_empty() {
        return Err(ProtocolError::EmptyCommand);
    }

    let (name, argument) = match input.find(char::is_whitespace) {
        Some(pos) => (&input[..pos], input[pos..].trim_start()),
        None => (input, ""),
    };

    Ok(Command {
        name,
        argument,
        input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_only() {
        let cmd = parse_line("PING").unwrap();
        assert_eq!(cmd.name, "PING");
        assert_eq!(cmd.argument, "");
        assert_eq!(cmd.input, "PING");
    }

    #[test]
    fn test_parse_name_and_argument() {
        let cmd = parse_line("car BMW").unwrap();
        assert_eq!(cmd.name, "car");
        assert_eq!(cmd.argument, "BMW");
    }

    #[test]
    fn test_parse_extra_spaces() {
        let cmd = parse_line("  CAR   BMW  ").unwrap();
        assert_eq!(cmd.name, "CAR");
        assert_eq!(cmd.argument, "BMW");
        assert_eq!(cmd.input, "CAR   BMW");
    }

    #[test]
    fn test_parse_preserves_inner_argument_whitespace() {
        let cmd = parse_line("CAR  Alfa   Romeo Giulia ").unwrap();
        assert_eq!(cmd.argument, "Alfa   Romeo Giulia");

        let cmd = parse_line("CAR\tLand\t Rover").unwrap();
        assert_eq!(cmd.name, "CAR");
        assert_eq!(cmd.argument, "Land\t Rover");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_line(""), Err(ProtocolError::EmptyCommand));
        assert_eq!(parse_line("   "), Err(ProtocolError::EmptyCommand));
        assert_eq!(parse_line("\t \r"), Err(ProtocolError::EmptyCommand));
    }

    #[test]
    fn test_parse_trailing_whitespace_only_argument() {
        let cmd = parse_line("CAR    ").unwrap();
        assert_eq!(cmd.name, "CAR");
        assert_eq!(cmd.argument, "");
    }
}
