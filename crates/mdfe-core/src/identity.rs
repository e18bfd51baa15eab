//! # Fiscal Identifier Newtypes
//!
//! Newtype wrappers for the fiscal identifiers that flow through the
//! stack. You cannot pass a [`Cpf`] where a [`Cnpj`] is expected, and a
//! malformed identifier cannot be constructed at all — every type here
//! validates in its constructor.
//!
//! Validation covers width and digit-only composition. The checksum the
//! system is responsible for is the access-key check digit
//! ([`crate::access_key`]); issuer registration numbers are validated
//! against the registry by the authority, not locally.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidFieldError;

// ─── CNPJ ────────────────────────────────────────────────────────────

/// Issuer tax identifier (CNPJ): exactly 14 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cnpj(String);

impl Cnpj {
    /// Validate and wrap a 14-digit CNPJ.
    pub fn new(value: &str) -> Result<Self, InvalidFieldError> {
        require_digits("cnpj", value)?;
        if value.len() != 14 {
            return Err(InvalidFieldError::WrongLength {
                field: "cnpj",
                expected: 14,
                actual: value.len(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// The canonical 14-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── CPF ─────────────────────────────────────────────────────────────

/// Driver identifier (CPF): exactly 11 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpf(String);

impl Cpf {
    /// Validate and wrap an 11-digit CPF.
    pub fn new(value: &str) -> Result<Self, InvalidFieldError> {
        require_digits("cpf", value)?;
        if value.len() != 11 {
            return Err(InvalidFieldError::WrongLength {
                field: "cpf",
                expected: 11,
                actual: value.len(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// The canonical 11-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── UF ──────────────────────────────────────────────────────────────

/// Federative unit (state) with its IBGE numeric code.
///
/// The numeric code is the first access-key field; the two-letter
/// abbreviation is what route endpoints carry in the manifest body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms, missing_docs)]
pub enum Uf {
    RO, AC, AM, RR, PA, AP, TO,
    MA, PI, CE, RN, PB, PE, AL, SE, BA,
    MG, ES, RJ, SP,
    PR, SC, RS,
    MS, MT, GO, DF,
}

impl Uf {
    /// The IBGE numeric code embedded in access keys.
    pub fn code(&self) -> u8 {
        match self {
            Self::RO => 11, Self::AC => 12, Self::AM => 13, Self::RR => 14,
            Self::PA => 15, Self::AP => 16, Self::TO => 17,
            Self::MA => 21, Self::PI => 22, Self::CE => 23, Self::RN => 24,
            Self::PB => 25, Self::PE => 26, Self::AL => 27, Self::SE => 28,
            Self::BA => 29,
            Self::MG => 31, Self::ES => 32, Self::RJ => 33, Self::SP => 35,
            Self::PR => 41, Self::SC => 42, Self::RS => 43,
            Self::MS => 50, Self::MT => 51, Self::GO => 52, Self::DF => 53,
        }
    }

    /// Resolve a UF from its IBGE numeric code.
    pub fn from_code(code: u8) -> Result<Self, InvalidFieldError> {
        ALL_UFS
            .iter()
            .find(|uf| uf.code() == code)
            .copied()
            .ok_or(InvalidFieldError::OutOfRange {
                field: "uf",
                reason: format!("unknown IBGE code {code}"),
            })
    }

    /// Parse a two-letter abbreviation (case-insensitive).
    pub fn parse(s: &str) -> Result<Self, InvalidFieldError> {
        let upper = s.trim().to_uppercase();
        ALL_UFS
            .iter()
            .find(|uf| uf.as_str() == upper)
            .copied()
            .ok_or(InvalidFieldError::OutOfRange {
                field: "uf",
                reason: format!("unknown abbreviation {s:?}"),
            })
    }

    /// The two-letter abbreviation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RO => "RO", Self::AC => "AC", Self::AM => "AM", Self::RR => "RR",
            Self::PA => "PA", Self::AP => "AP", Self::TO => "TO",
            Self::MA => "MA", Self::PI => "PI", Self::CE => "CE", Self::RN => "RN",
            Self::PB => "PB", Self::PE => "PE", Self::AL => "AL", Self::SE => "SE",
            Self::BA => "BA",
            Self::MG => "MG", Self::ES => "ES", Self::RJ => "RJ", Self::SP => "SP",
            Self::PR => "PR", Self::SC => "SC", Self::RS => "RS",
            Self::MS => "MS", Self::MT => "MT", Self::GO => "GO", Self::DF => "DF",
        }
    }
}

const ALL_UFS: [Uf; 27] = [
    Uf::RO, Uf::AC, Uf::AM, Uf::RR, Uf::PA, Uf::AP, Uf::TO,
    Uf::MA, Uf::PI, Uf::CE, Uf::RN, Uf::PB, Uf::PE, Uf::AL, Uf::SE, Uf::BA,
    Uf::MG, Uf::ES, Uf::RJ, Uf::SP,
    Uf::PR, Uf::SC, Uf::RS,
    Uf::MS, Uf::MT, Uf::GO, Uf::DF,
];

impl std::fmt::Display for Uf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Protocol Number ─────────────────────────────────────────────────

/// Authority-issued authorization protocol number: 15 digits.
///
/// Exactly one transmission attempt per document may carry this — it is
/// the proof of authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolNumber(String);

impl ProtocolNumber {
    /// Validate and wrap a 15-digit protocol number.
    pub fn new(value: &str) -> Result<Self, InvalidFieldError> {
        require_digits("protocol number", value)?;
        if value.len() != 15 {
            return Err(InvalidFieldError::WrongLength {
                field: "protocol number",
                expected: 15,
                actual: value.len(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// The canonical 15-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProtocolNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Municipality Code ───────────────────────────────────────────────

/// IBGE municipality code: 7 digits. Carried by closure events to name
/// where the transport ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MunicipalityCode(String);

impl MunicipalityCode {
    /// Validate and wrap a 7-digit municipality code.
    pub fn new(value: &str) -> Result<Self, InvalidFieldError> {
        require_digits("municipality code", value)?;
        if value.len() != 7 {
            return Err(InvalidFieldError::WrongLength {
                field: "municipality code",
                expected: 7,
                actual: value.len(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// The canonical 7-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── Shared helpers & serde ──────────────────────────────────────────

/// Require an all-digit, non-empty string.
fn require_digits(field: &'static str, value: &str) -> Result<(), InvalidFieldError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidFieldError::NotNumeric {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

macro_rules! impl_string_serde {
    ($type:ty, $ctor:expr) => {
        impl Serialize for $type {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $ctor(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_string_serde!(Cnpj, Cnpj::new);
impl_string_serde!(Cpf, Cpf::new);
impl_string_serde!(Uf, Uf::parse);
impl_string_serde!(ProtocolNumber, ProtocolNumber::new);
impl_string_serde!(MunicipalityCode, MunicipalityCode::new);

impl std::fmt::Display for Cnpj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for Cpf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
