//! Connection runtime.
//!
//! - `codec`: newline framing over bytes
//! - `channel`: line reads and flushed line writes over a stream
//! - `session`: the per-connection read-dispatch-write state machine

pub mod channel;
pub mod codec;
pub mod session;

pub use channel::{LineChannel, LineReader, LineWriter};
pub use codec::MAX_LINE_LENGTH;
pub use session::{CloseReason, Session};
