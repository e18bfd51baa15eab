//! # mdfe-core — Foundational Types for the MDF-e Stack
//!
//! This crate is the bedrock of the MDF-e stack. It defines the
//! type-system primitives every other crate builds on; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for fiscal primitives.** [`AccessKey`], [`Cnpj`],
//!    [`Cpf`], [`Uf`], [`ProtocolNumber`] — all newtypes with validated
//!    constructors. No bare strings for identifiers.
//!
//! 2. **`CanonicalBytes` newtype.** The byte sequence a manifest is signed
//!    over is produced exclusively by [`CanonicalBytes::new()`]. There is no
//!    second serialization path, so the signature basis and the stored
//!    document can never diverge.
//!
//! 3. **Checked access keys.** An [`AccessKey`] cannot exist without a
//!    valid modulo-11 check digit — neither built nor parsed.
//!
//! 4. **UTC-only timestamps.** [`Timestamp`] enforces UTC with Z suffix
//!    and seconds precision, matching the canonicalization rules.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `mdfe-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod access_key;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use access_key::{AccessKey, AccessKeyFields, EmissionType, MANIFEST_MODEL};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, InvalidFieldError, MdfeError};
pub use identity::{Cnpj, Cpf, MunicipalityCode, ProtocolNumber, Uf};
pub use temporal::Timestamp;
