//! Modbus TCP client library for the chaser PLC controller
//!
//! The wire protocol allows exactly one outstanding request per connection,
//! correlated by transaction identifier. [`ModbusTransport`] therefore owns
//! the socket exclusively and serializes every caller through a single
//! request/response round trip. Frame and bit-field codecs are pure
//! functions with no I/O.

pub mod bits;
pub mod error;
pub mod frame;
pub mod transport;

pub use error::{ModbusError, Result};
pub use frame::{FunctionCode, MbapHeader, Request, Response};
pub use transport::ModbusTransport;

/// MBAP session header length in bytes
pub const MBAP_HEADER_LEN: usize = 7;

/// Protocol identifier carried in every MBAP header (always 0 for Modbus)
pub const PROTOCOL_ID: u16 = 0;

/// Maximum value of the MBAP length field: 1 (unit id) + 253 (PDU)
pub const MAX_MBAP_LENGTH: usize = 254;
