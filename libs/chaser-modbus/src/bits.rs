//! Bit-field and register value codecs
//!
//! Coil and discrete-input blocks travel as packed bit strings: bit `i` of
//! the logical sequence maps to bit `i % 8` of byte `i / 8`. Input registers
//! carry scaled analog readings from the PLC's 0..27648 range.

/// Pack a boolean sequence into Modbus coil bytes
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack `count` booleans from packed coil bytes, zero-padding past the end
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            bytes
                .get(i / 8)
                .is_some_and(|byte| byte & (1 << (i % 8)) != 0)
        })
        .collect()
}

/// Decode a raw input-register value into degrees Celsius
///
/// Scaling per the transmitter datasheet: `(raw / 27648) * 120 - 40`.
/// Readings outside the physical range of the sensor decode to `None`.
pub fn decode_temperature(raw: u16) -> Option<f64> {
    let celsius = (f64::from(raw) / 27648.0) * 120.0 - 40.0;
    (-40.0..=80.0).contains(&celsius).then_some(celsius)
}

/// Decode a raw input-register value into percent relative humidity
///
/// Scaling: `(raw / 27648) * 100`, valid over 0..=100 %RH.
pub fn decode_humidity(raw: u16) -> Option<f64> {
    let percent = (f64::from(raw) / 27648.0) * 100.0;
    (0.0..=100.0).contains(&percent).then_some(percent)
}
