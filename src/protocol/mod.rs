//! apt method protocol handling.
//!
//! apt talks to its transport methods over the method's stdin/stdout using
//! RFC822-style messages: a `<code> <description>` header, `Name: value`
//! fields, and a blank line terminator.
//!
//! - `codec`: bounded line framing that yields trimmed
//!   [`Line`](codec::Line)s.
//! - `message`: the [`Message`](message::Message) model, its canonical
//!   serialization, and constructors for every outbound status.
//! - `reader`: assembles inbound lines into messages.
//! - `writer`: writes outbound messages.

pub mod codec;
pub mod message;
pub mod reader;
pub mod writer;

pub use message::{code, DoneOutcome, Message, UriDone};
pub use reader::MessageReader;
pub use writer::MessageWriter;
