//! # Access Key Codec
//!
//! Builds and validates the 44-digit access key that uniquely identifies
//! a fiscal transport manifest. The key is the system-wide idempotency
//! key: the authority must never see two different submissions under the
//! same key, and the lifecycle engine serializes all work on it.
//!
//! ## Layout
//!
//! ```text
//! cUF  AAMM  CNPJ            mod serie nMDF       tpEmis cMDF      cDV
//! 2    4     14              2   3     9          1      8         1
//! ```
//!
//! - `cUF` — IBGE code of the issuing state.
//! - `AAMM` — two-digit year + month of emission.
//! - `CNPJ` — issuer tax id.
//! - `mod` — document model, fixed `58` for transport manifests.
//! - `serie`/`nMDF` — series and document number.
//! - `tpEmis` — emission type.
//! - `cMDF` — numeric entropy code distinguishing re-emissions.
//! - `cDV` — modulo-11 check digit over the preceding 43 digits.
//!
//! ## Check digit
//!
//! Weights cycle 2..9 starting from the rightmost of the 43 body digits.
//! The weighted sum is reduced modulo 11; a remainder below 2 maps to
//! digit 0, anything else to `11 - remainder`. Flipping any single digit
//! of a valid key changes the weighted sum by a non-multiple of 11, so
//! transcription corruption is always caught.
//!
//! [`AccessKey::parse()`] applies the same validation to keys received
//! from external documents (linked NF-e keys use the identical layout
//! with a different model code), not only to keys this system builds.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidFieldError;
use crate::identity::{Cnpj, Uf};
use crate::temporal::Timestamp;

/// Document model code for transport manifests.
pub const MANIFEST_MODEL: &str = "58";

/// Total key length including the check digit.
const KEY_LEN: usize = 44;

/// How a manifest was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmissionType {
    /// Normal emission against the live authority service.
    Normal,
    /// Contingency emission while the authority service is down.
    Contingency,
}

impl EmissionType {
    /// The single-digit wire code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::Contingency => 2,
        }
    }

    /// Resolve from the single-digit wire code.
    pub fn from_code(code: u8) -> Result<Self, InvalidFieldError> {
        match code {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Contingency),
            other => Err(InvalidFieldError::OutOfRange {
                field: "emission type",
                reason: format!("unknown code {other}"),
            }),
        }
    }
}

/// The fields an access key is deterministically built from.
#[derive(Debug, Clone)]
pub struct AccessKeyFields {
    /// Issuing state.
    pub uf: Uf,
    /// Emission instant — supplies the AAMM component.
    pub emitted_at: Timestamp,
    /// Issuer tax id.
    pub issuer: Cnpj,
    /// Document series (0-999).
    pub series: u16,
    /// Document number (1-999999999).
    pub number: u32,
    /// Emission type.
    pub emission_type: EmissionType,
    /// Numeric entropy code (0-99999999), distinguishes re-emissions of
    /// the same series/number.
    pub entropy_code: u32,
}

/// A validated 44-digit access key.
///
/// Immutable once constructed: the only constructors are
/// [`AccessKey::build()`] and [`AccessKey::parse()`], and both guarantee
/// the check digit holds. Serializes as the plain 44-digit string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey(String);

impl AccessKey {
    /// Deterministically build a manifest access key from its fields.
    ///
    /// Concatenates the fixed-width fields, computes the modulo-11 check
    /// digit, and appends it. Two calls with identical fields produce
    /// identical keys.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFieldError::Overflow`] if `series`, `number`, or
    /// `entropy_code` exceed their fixed widths, and
    /// [`InvalidFieldError::OutOfRange`] for a zero document number.
    pub fn build(fields: &AccessKeyFields) -> Result<Self, InvalidFieldError> {
        if fields.series > 999 {
            return Err(InvalidFieldError::Overflow {
                field: "series",
                width: 3,
                value: fields.series.to_string(),
            });
        }
        if fields.number == 0 {
            return Err(InvalidFieldError::OutOfRange {
                field: "number",
                reason: "document numbers start at 1".to_string(),
            });
        }
        if fields.number > 999_999_999 {
            return Err(InvalidFieldError::Overflow {
                field: "number",
                width: 9,
                value: fields.number.to_string(),
            });
        }
        if fields.entropy_code > 99_999_999 {
            return Err(InvalidFieldError::Overflow {
                field: "entropy code",
                width: 8,
                value: fields.entropy_code.to_string(),
            });
        }

        let body = format!(
            "{:02}{:02}{:02}{}{}{:03}{:09}{}{:08}",
            fields.uf.code(),
            fields.emitted_at.year_two_digit(),
            fields.emitted_at.month(),
            fields.issuer.as_str(),
            MANIFEST_MODEL,
            fields.series,
            fields.number,
            fields.emission_type.code(),
            fields.entropy_code,
        );
        debug_assert_eq!(body.len(), KEY_LEN - 1);

        let dv = check_digit(&body);
        Ok(Self(format!("{body}{dv}")))
    }

    /// Parse and validate a 44-digit access key.
    ///
    /// Verifies total length, digit-only composition, and the trailing
    /// check digit against the recomputed value. Applies equally to keys
    /// built here and to keys transcribed from external documents.
    pub fn parse(key: &str) -> Result<Self, InvalidFieldError> {
        if !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidFieldError::NotNumeric {
                field: "access key",
                value: key.to_string(),
            });
        }
        if key.len() != KEY_LEN {
            return Err(InvalidFieldError::WrongLength {
                field: "access key",
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let (body, dv) = key.split_at(KEY_LEN - 1);
        let expected = check_digit(body);
        let found = dv.as_bytes()[0] - b'0';
        if expected != found {
            return Err(InvalidFieldError::CheckDigitMismatch { expected, found });
        }
        Ok(Self(key.to_string()))
    }

    /// Whether a string is a valid access key.
    pub fn is_valid(key: &str) -> bool {
        Self::parse(key).is_ok()
    }

    /// The 44-digit string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Issuing state, decoded from the leading IBGE code.
    pub fn uf(&self) -> Result<Uf, InvalidFieldError> {
        // Slice indices are safe: the constructor guarantees 44 ASCII digits.
        let code: u8 = self.0[0..2].parse().map_err(|_| InvalidFieldError::NotNumeric {
            field: "uf",
            value: self.0[0..2].to_string(),
        })?;
        Uf::from_code(code)
    }

    /// Issuer tax id embedded in the key.
    pub fn issuer(&self) -> Result<Cnpj, InvalidFieldError> {
        Cnpj::new(&self.0[6..20])
    }

    /// Document model code (e.g. `58` for manifests, `55` for linked
    /// NF-e keys).
    pub fn model(&self) -> &str {
        &self.0[20..22]
    }

    /// Document series.
    pub fn series(&self) -> u16 {
        self.0[22..25].parse().unwrap_or(0)
    }

    /// Document number.
    pub fn number(&self) -> u32 {
        self.0[25..34].parse().unwrap_or(0)
    }
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AccessKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccessKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Modulo-11 check digit over an all-digit body.
///
/// Weights cycle 2..9 from the rightmost digit; remainder < 2 maps to 0,
/// otherwise `11 - remainder`.
fn check_digit(body: &str) -> u8 {
    let mut weight = 2u32;
    let mut sum = 0u32;
    for b in body.bytes().rev() {
        sum += u32::from(b - b'0') * weight;
        weight = if weight == 9 { 2 } else { weight + 1 };
    }
    let rem = sum % 11;
    if rem < 2 {
        0
    } else {
        (11 - rem) as u8
    }
}
