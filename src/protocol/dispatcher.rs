//! Command dispatch.
//!
//! Maps a parsed line to a [`Response`]. Every failure inside dispatch is
//! turned into an `ERROR` response; nothing here can end a session except
//! an explicit `LOGOUT`.

use futures::FutureExt;
use serde::Deserialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::parser::{parse_line, Command};
use super::Verb;
use crate::error::ProtocolError;
use crate::lookup::Lookup;

/// Which part of the `CAR` argument is passed to the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum BrandArgument {
    /// The whole argument, inner whitespace included (`Alfa Romeo`).
    #[default]
    Full,
    /// Only the first whitespace-separated token.
    FirstToken,
}

impl BrandArgument {
    fn select<'a>(&self, argument: &'a str) -> &'a str {
        match self {
            BrandArgument::Full => argument,
            BrandArgument::FirstToken => argument.split_whitespace().next().unwrap_or(""),
        }
    }
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Pong,
    Goodbye,
    CarInfo(String),
    Error(ProtocolError),
}

impl Response {
    /// Whether the session closes after sending this response.
    pub fn terminates(&self) -> bool {
        matches!(self, Response::Goodbye)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Pong => f.write_str("PONG"),
            Response::Goodbye => f.write_str("OK Goodbye"),
            Response::CarInfo(text) => f.write_str(text),
            Response::Error(e) => write!(f, "ERROR {e}"),
        }
    }
}

/// Stateless command dispatcher shared by all sessions.
#[derive(Clone)]
pub struct Dispatcher {
    lookup: Arc<dyn Lookup>,
    lookup_timeout: Duration,
    brand_argument: BrandArgument,
}

impl Dispatcher {
    pub fn new(lookup: Arc<dyn Lookup>, lookup_timeout: Duration) -> Self {
        Self {
            lookup,
            lookup_timeout,
            brand_argument: BrandArgument::default(),
        }
    }

    pub fn with_brand_argument(mut self, brand_argument: BrandArgument) -> Self {
        self.brand_argument = brand_argument;
        self
    }

    /// Parse and execute one raw line.
    ///
    /// `cancel` aborts a pending lookup, which then reports `InternalError`.
    pub async fn dispatch(&self, line: &str, cancel: &CancellationToken) -> Response {
        match parse_line(line) {
            Ok(command) => self.execute(command, cancel).await,
            Err(e) => Response::Error(e),
        }
    }

    async fn execute(&self, command: Command<'_>, cancel: &CancellationToken) -> Response {
        match Verb::from_name(command.name) {
            Some(Verb::Ping) => Response::Pong,
            Some(Verb::Logout) => Response::Goodbye,
            Some(Verb::Car) => self.car(command.argument, cancel).await,
            None => Response::Error(ProtocolError::UnknownCommand(command.input.to_string())),
        }
    }

    async fn car(&self, argument: &str, cancel: &CancellationToken) -> Response {
        let brand = self.brand_argument.select(argument);
        if brand.is_empty() {
            return Response::Error(ProtocolError::MissingBrand);
        }

        debug!(brand, "Resolving car brand");

        // A panicking backend must not take the session down with it.
        let lookup = AssertUnwindSafe(self.lookup.resolve(brand)).catch_unwind();

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(brand, "Lookup cancelled");
                Response::Error(ProtocolError::InternalError)
            }

            result = tokio::time::timeout(self.lookup_timeout, lookup) => match result {
                Ok(Ok(Ok(text))) => Response::CarInfo(single_line(text)),
                Ok(Ok(Err(e))) => {
                    warn!(brand, error = %e, "Lookup failed");
                    Response::Error(ProtocolError::InternalError)
                }
                Ok(Err(_)) => {
                    warn!(brand, "Lookup panicked");
                    Response::Error(ProtocolError::InternalError)
                }
                Err(_) => {
                    warn!(brand, timeout = ?self.lookup_timeout, "Lookup timed out");
                    Response::Error(ProtocolError::InternalError)
                }
            },
        }
    }
}

/// Collapse embedded line breaks so the text stays one wire line.
fn single_line(text: String) -> String {
    let is_break = |c: char| c == '\r' || c == '\n';
    if text.contains(is_break) {
        text.replace("\r\n", " ").replace(is_break, " ")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const BMW_INFO: &str = "CAR INFO: BMW - Founded: 1916, Country: Germany";

    /// Records every brand it is asked for and answers from a fixed script.
    struct StubLookup {
        calls: Mutex<Vec<String>>,
        reply: fn(&str) -> Result<String, LookupError>,
        delay: Duration,
    }

    impl StubLookup {
        fn new(reply: fn(&str) -> Result<String, LookupError>) -> Arc<Self> {
            Self::slow(reply, Duration::ZERO)
        }

        fn slow(reply: fn(&str) -> Result<String, LookupError>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
                delay,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Lookup for StubLookup {
        async fn resolve(&self, brand: &str) -> Result<String, LookupError> {
            self.calls.lock().unwrap().push(brand.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.reply)(brand)
        }
    }

    fn bmw(_: &str) -> Result<String, LookupError> {
        Ok(BMW_INFO.to_string())
    }

    fn failing(_: &str) -> Result<String, LookupError> {
        Err(LookupError::NotConfigured("stub"))
    }

    fn panicking(_: &str) -> Result<String, LookupError> {
        panic!("lookup backend exploded")
    }

    fn multi_line(_: &str) -> Result<String, LookupError> {
        Ok("CAR INFO: BMW\r\nFounded: 1916\nCountry: Germany".to_string())
    }

    fn dispatcher(lookup: Arc<StubLookup>) -> Dispatcher {
        Dispatcher::new(lookup, Duration::from_millis(200))
    }

    async fn run(dispatcher: &Dispatcher, line: &str) -> Response {
        dispatcher.dispatch(line, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_ping_any_case() {
        let d = dispatcher(StubLookup::new(bmw));
        for line in ["PING", "ping", "PiNg", "  ping  ", "PING extra"] {
            let response = run(&d, line).await;
            assert_eq!(response, Response::Pong);
            assert_eq!(response.to_string(), "PONG");
            assert!(!response.terminates());
        }
    }

    #[tokio::test]
    async fn test_logout_terminates() {
        let d = dispatcher(StubLookup::new(bmw));
        for line in ["LOGOUT", "logout", "LogOut "] {
            let response = run(&d, line).await;
            assert_eq!(response.to_string(), "OK Goodbye");
            assert!(response.terminates());
        }
    }

    #[tokio::test]
    async fn test_empty_command() {
        let lookup = StubLookup::new(bmw);
        let d = dispatcher(lookup.clone());
        for line in ["", " ", "\t\t"] {
            assert_eq!(run(&d, line).await.to_string(), "ERROR EmptyCommand");
        }
        assert!(lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_echoes_trimmed_input() {
        let d = dispatcher(StubLookup::new(bmw));
        assert_eq!(
            run(&d, "UNKNOWN").await.to_string(),
            "ERROR UnknownCommand: UNKNOWN"
        );
        assert_eq!(
            run(&d, "  hello   there  ").await.to_string(),
            "ERROR UnknownCommand: hello   there"
        );
        assert_eq!(
            run(&d, "PINGPONG").await.to_string(),
            "ERROR UnknownCommand: PINGPONG"
        );
    }

    #[tokio::test]
    async fn test_car_without_brand() {
        let lookup = StubLookup::new(bmw);
        let d = dispatcher(lookup.clone());
        for line in ["CAR", "car   ", " Car\t"] {
            assert_eq!(run(&d, line).await.to_string(), "ERROR MissingBrand");
        }
        assert!(lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn test_car_with_brand() {
        let lookup = StubLookup::new(bmw);
        let d = dispatcher(lookup.clone());

        assert_eq!(run(&d, "CAR BMW").await.to_string(), BMW_INFO);
        assert_eq!(run(&d, "car BMW").await.to_string(), BMW_INFO);
        assert_eq!(run(&d, "  CAR   BMW  ").await.to_string(), BMW_INFO);
        assert_eq!(lookup.calls(), vec!["BMW", "BMW", "BMW"]);
    }

    #[tokio::test]
    async fn test_car_full_argument_is_brand() {
        let lookup = StubLookup::new(bmw);
        let d = dispatcher(lookup.clone());

        assert_eq!(run(&d, "CAR BMW Extra Words").await.to_string(), BMW_INFO);
        assert_eq!(run(&d, "CAR Alfa   Romeo").await.to_string(), BMW_INFO);
        assert_eq!(lookup.calls(), vec!["BMW Extra Words", "Alfa   Romeo"]);
    }

    #[tokio::test]
    async fn test_car_first_token_mode() {
        let lookup = StubLookup::new(bmw);
        let d = dispatcher(lookup.clone()).with_brand_argument(BrandArgument::FirstToken);

        assert_eq!(
            run(&d, "CAR BMW Additional Arguments").await.to_string(),
            BMW_INFO
        );
        assert_eq!(lookup.calls(), vec!["BMW"]);
    }

    #[tokio::test]
    async fn test_car_lookup_failure() {
        let d = dispatcher(StubLookup::new(failing));
        assert_eq!(run(&d, "CAR BMW").await.to_string(), "ERROR InternalError");
    }

    #[tokio::test]
    async fn test_car_lookup_panic() {
        let d = dispatcher(StubLookup::new(panicking));
        assert_eq!(run(&d, "CAR BMW").await.to_string(), "ERROR InternalError");
        // The dispatcher stays usable afterwards.
        assert_eq!(run(&d, "PING").await, Response::Pong);
    }

    #[tokio::test]
    async fn test_car_lookup_timeout() {
        let lookup = StubLookup::slow(bmw, Duration::from_secs(30));
        let d = Dispatcher::new(lookup, Duration::from_millis(20));
        assert_eq!(run(&d, "CAR BMW").await.to_string(), "ERROR InternalError");
    }

    #[tokio::test]
    async fn test_car_lookup_cancelled() {
        let lookup = StubLookup::slow(bmw, Duration::from_secs(30));
        let d = Dispatcher::new(lookup, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        assert_eq!(
            d.dispatch("CAR BMW", &cancel).await.to_string(),
            "ERROR InternalError"
        );
    }

    #[tokio::test]
    async fn test_car_multi_line_text_is_flattened() {
        let d = dispatcher(StubLookup::new(multi_line));
        assert_eq!(
            run(&d, "CAR BMW").await.to_string(),
            "CAR INFO: BMW Founded: 1916 Country: Germany"
        );
    }
}
