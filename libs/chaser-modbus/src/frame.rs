//! Frame codec: MBAP session headers and function-specific PDUs
//!
//! Stateless encode/decode only; the transport layer owns all I/O. Requests
//! encode to `[function code][payload]`, responses decode against the
//! request that produced them (the PDU alone does not carry enough context
//! to know how many bits were asked for).

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::bits;
use crate::error::{ModbusError, Result};
use crate::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN, PROTOCOL_ID};

/// Modbus function codes used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteMultipleCoils = 0x0F,
}

impl FunctionCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs
    pub fn description(self) -> &'static str {
        match self {
            FunctionCode::ReadCoils => "Read Coils",
            FunctionCode::ReadDiscreteInputs => "Read Discrete Inputs",
            FunctionCode::ReadInputRegisters => "Read Input Registers",
            FunctionCode::WriteSingleCoil => "Write Single Coil",
            FunctionCode::WriteMultipleCoils => "Write Multiple Coils",
        }
    }
}

/// MBAP header: transaction id, protocol id, length, unit id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Remaining frame bytes after the length field: PDU length + 1 (unit id)
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Build the header for a request PDU of `pdu_len` bytes
    pub fn for_request(transaction_id: u16, unit_id: u8, pdu_len: usize) -> Self {
        Self {
            transaction_id,
            protocol_id: PROTOCOL_ID,
            length: (pdu_len + 1) as u16,
            unit_id,
        }
    }

    pub fn encode(&self) -> [u8; MBAP_HEADER_LEN] {
        let mut buf = [0u8; MBAP_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6] = self.unit_id;
        buf
    }

    /// Decode and validate a response header
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MBAP_HEADER_LEN {
            return Err(ModbusError::protocol(format!(
                "MBAP header truncated: {} bytes",
                data.len()
            )));
        }

        let header = Self {
            transaction_id: u16::from_be_bytes([data[0], data[1]]),
            protocol_id: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            unit_id: data[6],
        };

        if header.protocol_id != PROTOCOL_ID {
            return Err(ModbusError::protocol(format!(
                "Invalid protocol ID: expected 0, got {}",
                header.protocol_id
            )));
        }
        if header.length == 0 || header.length as usize > MAX_MBAP_LENGTH {
            return Err(ModbusError::protocol(format!(
                "Invalid MBAP length: {}",
                header.length
            )));
        }

        Ok(header)
    }
}

/// A request PDU, one variant per supported function code
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
}

impl Request {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Request::ReadCoils { .. } => FunctionCode::ReadCoils,
            Request::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Request::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Request::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Request::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
        }
    }

    /// Encode the function-specific PDU
    pub fn encode_pdu(&self) -> Vec<u8> {
        let mut pdu = BytesMut::with_capacity(8);
        pdu.put_u8(self.function_code().to_u8());

        match self {
            Request::ReadCoils { address, quantity }
            | Request::ReadDiscreteInputs { address, quantity }
            | Request::ReadInputRegisters { address, quantity } => {
                pdu.put_u16(*address);
                pdu.put_u16(*quantity);
            },
            Request::WriteSingleCoil { address, value } => {
                pdu.put_u16(*address);
                pdu.put_u16(if *value { 0xFF00 } else { 0x0000 });
            },
            Request::WriteMultipleCoils { address, values } => {
                let packed = bits::pack_bits(values);
                pdu.put_u16(*address);
                pdu.put_u16(values.len() as u16);
                pdu.put_u8(packed.len() as u8);
                pdu.put_slice(&packed);
            },
        }

        debug!(
            "Encoded PDU: FC={:02X} ({}), len={}",
            self.function_code().to_u8(),
            self.function_code().description(),
            pdu.len()
        );
        pdu.to_vec()
    }

    /// Decode the response PDU this request expects
    pub fn decode_response(&self, pdu: &[u8]) -> Result<Response> {
        let fc = self.function_code().to_u8();

        let &[resp_fc, ref rest @ ..] = pdu else {
            return Err(ModbusError::protocol("Empty response PDU"));
        };

        if resp_fc == fc | 0x80 {
            let code = rest.first().copied().unwrap_or(0);
            return Err(ModbusError::protocol(format!(
                "Exception response for {}: {:#04x} ({})",
                self.function_code().description(),
                code,
                exception_description(code)
            )));
        }
        if resp_fc != fc {
            return Err(ModbusError::protocol(format!(
                "Function code mismatch: expected {fc:#04x}, got {resp_fc:#04x}"
            )));
        }

        match self {
            Request::ReadCoils { quantity, .. } | Request::ReadDiscreteInputs { quantity, .. } => {
                let (byte_count, data) = split_byte_count(rest)?;
                if byte_count < (*quantity as usize).div_ceil(8) {
                    return Err(ModbusError::protocol(format!(
                        "Short bit payload: {byte_count} bytes for {quantity} bits"
                    )));
                }
                Ok(Response::Bits(bits::unpack_bits(data, *quantity as usize)))
            },
            Request::ReadInputRegisters { quantity, .. } => {
                let (byte_count, data) = split_byte_count(rest)?;
                if byte_count != *quantity as usize * 2 {
                    return Err(ModbusError::protocol(format!(
                        "Register payload of {byte_count} bytes for {quantity} registers"
                    )));
                }
                let registers = data
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Ok(Response::Registers(registers))
            },
            Request::WriteSingleCoil { .. } | Request::WriteMultipleCoils { .. } => {
                // Write responses echo address + value/quantity
                if rest.len() < 4 {
                    return Err(ModbusError::protocol(format!(
                        "Truncated write echo: {} bytes",
                        rest.len()
                    )));
                }
                Ok(Response::WriteAck)
            },
        }
    }
}

/// A decoded response payload
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Unpacked coil or discrete-input states
    Bits(Vec<bool>),
    /// Big-endian input-register values
    Registers(Vec<u16>),
    /// Successful write echo
    WriteAck,
}

impl Response {
    /// Extract a bit vector, failing on any other payload shape
    pub fn into_bits(self) -> Result<Vec<bool>> {
        match self {
            Response::Bits(bits) => Ok(bits),
            other => Err(ModbusError::protocol(format!(
                "Expected bit payload, got {other:?}"
            ))),
        }
    }

    /// Extract register values, failing on any other payload shape
    pub fn into_registers(self) -> Result<Vec<u16>> {
        match self {
            Response::Registers(regs) => Ok(regs),
            other => Err(ModbusError::protocol(format!(
                "Expected register payload, got {other:?}"
            ))),
        }
    }
}

/// Split a byte-count-prefixed payload, validating the declared count
fn split_byte_count(rest: &[u8]) -> Result<(usize, &[u8])> {
    let &[byte_count, ref data @ ..] = rest else {
        return Err(ModbusError::protocol("Missing byte count"));
    };
    let byte_count = byte_count as usize;
    if data.len() < byte_count {
        return Err(ModbusError::protocol(format!(
            "Payload truncated: declared {byte_count} bytes, got {}",
            data.len()
        )));
    }
    Ok((byte_count, &data[..byte_count]))
}

/// Standard Modbus exception descriptions
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}
