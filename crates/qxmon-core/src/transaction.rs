//! Signed Qubic transaction decoding.
//!
//! Signing is out of scope; this module only reads an already-signed
//! transaction so the submitter can learn its target tick and the QX
//! order it carries.
//!
//! # Layout (little-endian)
//!
//! | offset | size | field              |
//! |--------|------|--------------------|
//! | 0      | 32   | source public key  |
//! | 32     | 32   | destination key    |
//! | 64     | 8    | amount (i64)       |
//! | 72     | 4    | tick (u32)         |
//! | 76     | 2    | input type (u16)   |
//! | 78     | 2    | input size (u16)   |
//! | 80     | n    | payload            |
//! | 80 + n | 64   | signature          |

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};
use crate::order::OrderAction;
use crate::tick::Tick;

const HEADER_LEN: usize = 80;
const SIGNATURE_LEN: usize = 64;
const QX_ORDER_PAYLOAD_LEN: usize = 56;

/// Decoded fixed-size transaction header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    pub source: [u8; 32],
    pub destination: [u8; 32],
    pub amount: i64,
    pub tick: Tick,
    pub input_type: u16,
    pub input_size: u16,
}

/// Decoded QX order payload (add/remove bid/ask).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QxOrderPayload {
    pub action: OrderAction,
    pub issuer: [u8; 32],
    pub asset_name: String,
    pub price: Price,
    pub quantity: Quantity,
}

impl QxOrderPayload {
    /// Issuer public key as lowercase hex.
    pub fn issuer_hex(&self) -> String {
        hex::encode(self.issuer)
    }
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    bytes: Vec<u8>,
    header: TransactionHeader,
}

impl SignedTransaction {
    /// Decode from raw bytes, validating the total length.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_LEN + SIGNATURE_LEN {
            return Err(CoreError::TransactionDecode(format!(
                "too short: {} bytes",
                bytes.len()
            )));
        }

        let header = TransactionHeader {
            source: array_at(&bytes, 0),
            destination: array_at(&bytes, 32),
            amount: i64::from_le_bytes(array_at(&bytes, 64)),
            tick: Tick::from(u32::from_le_bytes(array_at(&bytes, 72))),
            input_type: u16::from_le_bytes(array_at(&bytes, 76)),
            input_size: u16::from_le_bytes(array_at(&bytes, 78)),
        };

        let expected = HEADER_LEN + usize::from(header.input_size) + SIGNATURE_LEN;
        if bytes.len() != expected {
            return Err(CoreError::TransactionDecode(format!(
                "length {} does not match header (expected {expected})",
                bytes.len()
            )));
        }

        Ok(Self { bytes, header })
    }

    /// Decode from the base64 form used by the broadcast endpoint.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CoreError::TransactionDecode(format!("invalid base64: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Base64 encoding for broadcast.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn header(&self) -> &TransactionHeader {
        &self.header
    }

    /// Tick the transaction targets; it is invalid after this tick.
    pub fn tick(&self) -> Tick {
        self.header.tick
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..HEADER_LEN + usize::from(self.header.input_size)]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the QX order payload.
    ///
    /// Fails if the input type is not one of the four order procedures or
    /// the payload has the wrong size.
    pub fn qx_order(&self) -> Result<QxOrderPayload> {
        let action = OrderAction::from_input_type(self.header.input_type).ok_or_else(|| {
            CoreError::TransactionDecode(format!(
                "input type {} is not a QX order",
                self.header.input_type
            ))
        })?;

        let payload = self.payload();
        if payload.len() != QX_ORDER_PAYLOAD_LEN {
            return Err(CoreError::TransactionDecode(format!(
                "QX order payload must be {QX_ORDER_PAYLOAD_LEN} bytes, got {}",
                payload.len()
            )));
        }

        let name_bytes: [u8; 8] = array_at(payload, 32);
        let name_len = name_bytes.iter().position(|b| *b == 0).unwrap_or(8);
        let asset_name = std::str::from_utf8(&name_bytes[..name_len])
            .map_err(|e| CoreError::TransactionDecode(format!("asset name: {e}")))?
            .to_string();

        Ok(QxOrderPayload {
            action,
            issuer: array_at(payload, 0),
            asset_name,
            price: Price::from_units(i64::from_le_bytes(array_at(payload, 40))),
            quantity: Quantity::from_units(i64::from_le_bytes(array_at(payload, 48))),
        })
    }
}

/// Copy `N` bytes starting at `offset`. Callers check bounds first.
fn array_at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
