//! # mdfe-crypto — Signature Engine for the MDF-e Stack
//!
//! Signs the canonical form of a manifest and verifies signatures on
//! read-back. Three modules:
//!
//! - [`ed25519`] — key and signature newtypes over `ed25519-dalek`.
//!   Signing input is `&CanonicalBytes`, never raw bytes.
//! - [`credential`] — the signing credential handle: an encrypted seed
//!   file unlocked by password, with holder identity and expiry. Fails
//!   closed: no credential, wrong password, or an expired certificate is
//!   a [`CryptoError`], never a fabricated placeholder.
//! - [`envelope`] — [`SignedEnvelope`], the unit the transmission layer
//!   carries: the frozen canonical form plus signature metadata.
//!   Verification always recomputes the digest from the embedded form.

pub mod credential;
pub mod ed25519;
pub mod envelope;
pub mod error;

pub use credential::{CertificateFingerprint, CredentialFile, SigningCredential};
pub use ed25519::{Ed25519PublicKey, Ed25519Signature};
pub use envelope::SignedEnvelope;
pub use error::CryptoError;
