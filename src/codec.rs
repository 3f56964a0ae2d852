//! # Stage: Interface Codec
//!
//! ## Responsibility
//! Encode an [`Interface`] into a fixed-width [`BitVector`] for the transform
//! and decode the transform's output back into an interface of the same shape.
//!
//! ## Layout
//! Fields occupy consecutive slots in canonical key order. With `n` fields in
//! a register of width `W`, each slot is `min(W / n, MAX_SLOT_BITS)` bits wide;
//! trailing bits are zero.
//!
//! - `Number(v)`, `v` normal: `|v| = 2^e * (1 + f)`; the slot holds
//!   `round(f * (2^k - 1))` MSB-first. Decoding keeps the original sign and
//!   exponent, so every decoded number stays in its octave `[2^e, 2^(e+1))`.
//! - `Number(0.0)` and subnormals: all-zero slot, decoded as `0.0`.
//! - `Bool` / `Text`: the slot holds low bits of a BLAKE3 digest of the value;
//!   decoding restores the original value.
//!
//! ## NOT Responsible For
//! - Sampling (that belongs to `transform`)
//! - Consensus merge or rescaling (that belongs to `engine`)

use tracing::debug;

use crate::interface::{Interface, Value};
use crate::transform::BitVector;
use crate::OptimizerError;

/// Narrowest slot that still carries a meaningful search range.
pub const MIN_SLOT_BITS: usize = 4;
/// Widest slot used per field.
pub const MAX_SLOT_BITS: usize = 16;

const EXPONENT_SIGN_MASK: u64 = 0xFFF0_0000_0000_0000;
const MANTISSA_BITS: u32 = 52;
const MANTISSA_MASK: u64 = (1 << MANTISSA_BITS) - 1;

/// How a single field is reconstructed from its slot.
#[derive(Debug, Clone, PartialEq)]
enum SlotKind {
    /// Normal number: sign and biased exponent bits of the original value.
    Number { sign_exponent: u64 },
    /// Zero or subnormal magnitude.
    Zero,
    /// Non-numeric value carried through unchanged.
    Opaque(Value),
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    key: String,
    kind: SlotKind,
}

/// Result of [`InterfaceCodec::encode`]: the bits plus the layout needed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedInterface {
    bits: BitVector,
    slot_bits: usize,
    slots: Vec<Slot>,
}

impl EncodedInterface {
    /// The encoded register contents.
    pub fn bits(&self) -> &BitVector {
        &self.bits
    }

    /// Width of each field's slot.
    pub fn slot_bits(&self) -> usize {
        self.slot_bits
    }

    /// Number of encoded fields.
    pub fn field_count(&self) -> usize {
        self.slots.len()
    }
}

/// Fixed-width interface ⇄ bit-vector codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceCodec {
    width: usize,
}

impl InterfaceCodec {
    /// Create a codec for a register of `width` bits.
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Register width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Largest number of fields this codec can represent.
    pub fn max_fields(&self) -> usize {
        self.width / MIN_SLOT_BITS
    }

    /// Slot width for `fields` fields.
    ///
    /// # Errors
    /// Returns [`OptimizerError::Encoding`] when the slot would be narrower
    /// than [`MIN_SLOT_BITS`].
    pub fn slot_bits(&self, fields: usize) -> Result<usize, OptimizerError> {
        if fields == 0 {
            return Ok(0);
        }
        let slot = (self.width / fields).min(MAX_SLOT_BITS);
        if slot < MIN_SLOT_BITS {
            return Err(OptimizerError::Encoding(format!(
                "{fields} fields need at least {} bits, register holds {}",
                fields * MIN_SLOT_BITS,
                self.width
            )));
        }
        Ok(slot)
    }

    /// Encode an interface into the register.
    ///
    /// # Errors
    /// Returns [`OptimizerError::Encoding`] if the interface has too many
    /// fields for the width or holds a non-finite number.
    pub fn encode(&self, interface: &Interface) -> Result<EncodedInterface, OptimizerError> {
        let slot_bits = self.slot_bits(interface.len())?;
        let mut bits = BitVector::zeros(self.width);
        let mut slots = Vec::with_capacity(interface.len());

        for (index, (key, value)) in interface.iter().enumerate() {
            let (kind, code) = match value {
                Value::Number(n) => encode_number(key, *n, slot_bits)?,
                other => (SlotKind::Opaque(other.clone()), opaque_code(other, slot_bits)),
            };
            write_code(&mut bits, index * slot_bits, slot_bits, code);
            slots.push(Slot {
                key: key.clone(),
                kind,
            });
        }

        debug!(fields = slots.len(), slot_bits, width = self.width, "interface encoded");
        Ok(EncodedInterface {
            bits,
            slot_bits,
            slots,
        })
    }

    /// Decode transform output using the layout captured at encode time.
    ///
    /// # Errors
    /// Returns [`OptimizerError::Encoding`] if `bits` is not exactly the
    /// register width.
    pub fn decode(
        &self,
        encoded: &EncodedInterface,
        bits: &BitVector,
    ) -> Result<Interface, OptimizerError> {
        if bits.len() != self.width {
            return Err(OptimizerError::Encoding(format!(
                "expected {} bits from transform, got {}",
                self.width,
                bits.len()
            )));
        }

        let slot_bits = encoded.slot_bits;
        let mut out = Interface::new();
        for (index, slot) in encoded.slots.iter().enumerate() {
            let value = match &slot.kind {
                SlotKind::Number { sign_exponent } => {
                    let code = read_code(bits, index * slot_bits, slot_bits);
                    Value::Number(decode_number(*sign_exponent, code, slot_bits))
                }
                SlotKind::Zero => Value::Number(0.0),
                SlotKind::Opaque(v) => v.clone(),
            };
            out.insert(slot.key.clone(), value);
        }
        Ok(out)
    }
}

fn max_code(slot_bits: usize) -> u64 {
    (1u64 << slot_bits) - 1
}

fn encode_number(key: &str, n: f64, slot_bits: usize) -> Result<(SlotKind, u64), OptimizerError> {
    if !n.is_finite() {
        return Err(OptimizerError::Encoding(format!(
            "field '{key}' holds non-finite number {n}"
        )));
    }
    if !n.is_normal() {
        return Ok((SlotKind::Zero, 0));
    }
    let raw = n.to_bits();
    let fraction = (raw & MANTISSA_MASK) as f64 / (1u64 << MANTISSA_BITS) as f64;
    let code = (fraction * max_code(slot_bits) as f64).round() as u64;
    Ok((
        SlotKind::Number {
            sign_exponent: raw & EXPONENT_SIGN_MASK,
        },
        code.min(max_code(slot_bits)),
    ))
}

fn decode_number(sign_exponent: u64, code: u64, slot_bits: usize) -> f64 {
    let fraction = code as f64 / max_code(slot_bits) as f64;
    let mantissa = ((fraction * (1u64 << MANTISSA_BITS) as f64).round() as u64).min(MANTISSA_MASK);
    f64::from_bits(sign_exponent | mantissa)
}

fn opaque_code(value: &Value, slot_bits: usize) -> u64 {
    let mut bytes = Vec::new();
    value.write_canonical(&mut bytes);
    let digest = blake3::hash(&bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head) & max_code(slot_bits)
}

fn write_code(bits: &mut BitVector, offset: usize, slot_bits: usize, code: u64) {
    for i in 0..slot_bits {
        let bit = (code >> (slot_bits - 1 - i)) & 1 == 1;
        bits.set(offset + i, bit);
    }
}

fn read_code(bits: &BitVector, offset: usize, slot_bits: usize) -> u64 {
    (0..slot_bits).fold(0u64, |acc, i| (acc << 1) | u64::from(bits.get(offset + i)))
}
