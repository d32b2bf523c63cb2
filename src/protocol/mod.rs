//! Command protocol.
//!
//! One command per `\n`-terminated line, one response line per command:
//!
//! ```text
//! Request:  PING            Response: PONG
//! Request:  CAR BMW         Response: CAR INFO: BMW - Founded: 1916, Country: Germany
//! Request:  CAR             Response: ERROR MissingBrand
//! Request:  FOO bar         Response: ERROR UnknownCommand: FOO bar
//! Request:  LOGOUT          Response: OK Goodbye   (connection closes)
//! ```

pub mod dispatcher;
pub mod parser;

pub use dispatcher::{BrandArgument, Dispatcher};

/// Recognized command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Ping,
    Logout,
    Car,
}

impl Verb {
    /// Case-insensitive lookup of a command name.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("PING") {
            Some(Verb::Ping)
        } else if name.eq_ignore_ascii_case("LOGOUT") {
            Some(Verb::Logout)
        } else if name.eq_ignore_ascii_case("CAR") {
            Some(Verb::Car)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Ping => "PING",
            Verb::Logout => "LOGOUT",
            Verb::Car => "CAR",
        }
    }
}
