//! # Canonical Serialization — The Signature Basis
//!
//! Defines [`CanonicalBytes`], the byte-exact serialized form a manifest
//! is signed over. The authority re-derives the same bytes to verify the
//! signature, so two renderings of the same logical document must match
//! byte for byte.
//!
//! ## Invariant
//!
//! The `CanonicalBytes` newtype has a private inner field. The only way
//! to construct it is [`CanonicalBytes::new()`], which rejects floats and
//! then serializes with RFC 8785 (JSON Canonicalization Scheme): sorted
//! keys, compact separators, deterministic number rendering. Any code
//! that needs bytes for digesting or signing must accept
//! `&CanonicalBytes`, which makes a non-canonical signature basis
//! unrepresentable.
//!
//! ## Why floats are rejected
//!
//! Cargo values and weights are fiscal amounts. Serialized floats have
//! locale- and implementation-dependent edge cases that would make the
//! canonical form unstable, so amounts travel as integers in minor units
//! (centavos, grams) and rendering a float into the canonical form is a
//! hard error rather than a silent approximation.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization with the fiscal
/// type rules (no floats, string keys, UTC timestamps).
///
/// # Invariants
///
/// - The only constructor is [`CanonicalBytes::new()`].
/// - Monetary and weight values are integers or strings, never floats.
/// - Serialization uses sorted keys with compact separators (RFC 8785).
///
/// The inner `Vec<u8>` is private; downstream code cannot violate these
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// This is the ONLY way to produce `CanonicalBytes`. Every digest and
    /// signature in the stack is computed over bytes that came through
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalizationError::FloatRejected`] if the value
    /// contains a non-integer number anywhere in its tree, and
    /// [`CanonicalizationError::SerializationFailed`] if JCS
    /// serialization fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Reconstruct canonical bytes from a previously frozen byte sequence.
    ///
    /// Used when loading a stored document whose canonical form was
    /// produced by [`CanonicalBytes::new()`] earlier in its life. The
    /// bytes are checked to be valid JSON; canonical key order is NOT
    /// re-verified — the store is trusted to return what was put in,
    /// and signature verification catches any corruption.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalizationError::SerializationFailed`] if the
    /// bytes are not valid JSON.
    pub fn from_frozen(bytes: Vec<u8>) -> Result<Self, CanonicalizationError> {
        let _: Value = serde_json::from_slice(&bytes)?;
        Ok(Self(bytes))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Walk a JSON value tree and reject any non-integer number.
///
/// Integers (representable as i64/u64) pass; everything `is_f64`-only is
/// refused. Objects and arrays are recursed. Strings, booleans, and null
/// pass through untouched.
fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() && !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(arr) => arr.iter().try_for_each(reject_floats),
    }
}
