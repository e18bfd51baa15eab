//! # Signing Credential
//!
//! The opaque credential handle the signature engine operates with: an
//! Ed25519 seed encrypted at rest in a small JSON file, unlocked by a
//! password, carrying the holder's tax id and the certificate validity
//! window.
//!
//! ## Envelope scheme
//!
//! The seed is stored XOR-encrypted under `SHA-256(password)`. Loading
//! decrypts, rebuilds the key pair, and compares the recomputed public
//! key fingerprint with the fingerprint recorded in the file — a wrong
//! password yields a different seed and therefore a different
//! fingerprint, surfacing as [`CryptoError::PasswordMismatch`] instead
//! of a key that signs garbage.
//!
//! ## Fail closed
//!
//! There is no fallback credential. A missing file, an unreadable file,
//! a wrong password, or an expired certificate all return a
//! [`CryptoError`]; nothing is fabricated for the sake of proceeding.
//!
//! Decrypted seed material is zeroized when the credential is dropped.

use std::path::Path;

use mdfe_core::{CanonicalBytes, Cnpj, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::ed25519::{hex_decode, hex_encode, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

/// SHA-256 fingerprint of a signing certificate's public key, hex-encoded.
///
/// Embedded in every signed envelope so verification can confirm which
/// certificate produced a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateFingerprint(String);

impl CertificateFingerprint {
    /// Compute the fingerprint of a public key.
    pub fn of(public_key: &Ed25519PublicKey) -> Self {
        let digest = Sha256::digest(public_key.as_bytes());
        Self(hex_encode(&digest))
    }

    /// The hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CertificateFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk layout of a credential file.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialFile {
    /// Seed XOR-encrypted under SHA-256 of the password, hex-encoded.
    pub cipher_hex: String,
    /// Fingerprint of the public key the seed must decrypt to.
    pub fingerprint: CertificateFingerprint,
    /// Tax id of the certificate holder.
    pub holder: Cnpj,
    /// End of the certificate validity window.
    pub not_after: Timestamp,
}

/// A loaded, unlocked signing credential.
///
/// Loaded once per signing session and shared immutably; the key pair is
/// never replaced in place while in use. The decrypted seed is retained
/// (zeroized on drop) so the credential can be re-encrypted to a file.
pub struct SigningCredential {
    keypair: Ed25519KeyPair,
    seed: Zeroizing<[u8; 32]>,
    fingerprint: CertificateFingerprint,
    holder: Cnpj,
    not_after: Timestamp,
}

impl SigningCredential {
    /// Load and unlock a credential file.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::NotConfigured`] — the file does not exist.
    /// - [`CryptoError::CredentialUnreadable`] — unreadable or malformed.
    /// - [`CryptoError::PasswordMismatch`] — decrypted seed does not
    ///   reproduce the recorded fingerprint.
    ///
    /// Expiry is checked at signing time, not load time, so a credential
    /// loaded shortly before midnight does not sign past its window.
    pub fn load(path: &Path, password: &str) -> Result<Self, CryptoError> {
        if !path.exists() {
            return Err(CryptoError::NotConfigured(format!(
                "credential file {} does not exist",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CryptoError::CredentialUnreadable(format!("{}: {e}", path.display())))?;
        let file: CredentialFile = serde_json::from_str(&raw)
            .map_err(|e| CryptoError::CredentialUnreadable(format!("{}: {e}", path.display())))?;
        Self::unlock(&file, password)
    }

    /// Unlock a parsed credential file with a password.
    pub fn unlock(file: &CredentialFile, password: &str) -> Result<Self, CryptoError> {
        let cipher = hex_decode(&file.cipher_hex).map_err(CryptoError::CredentialUnreadable)?;
        let cipher: [u8; 32] = cipher.try_into().map_err(|_| {
            CryptoError::CredentialUnreadable("cipher must be 32 bytes".to_string())
        })?;

        let seed = Zeroizing::new(xor_with_password(&cipher, password));
        let keypair = Ed25519KeyPair::from_seed(&seed);
        let fingerprint = CertificateFingerprint::of(&keypair.public_key());
        if fingerprint != file.fingerprint {
            return Err(CryptoError::PasswordMismatch);
        }

        Ok(Self {
            keypair,
            seed,
            fingerprint,
            holder: file.holder.clone(),
            not_after: file.not_after,
        })
    }

    /// Generate a fresh credential (key pair included) for the given
    /// holder and validity window.
    pub fn generate(holder: Cnpj, not_after: Timestamp) -> Self {
        use rand::RngCore;
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut seed[..]);
        let keypair = Ed25519KeyPair::from_seed(&seed);
        let fingerprint = CertificateFingerprint::of(&keypair.public_key());
        Self {
            keypair,
            seed,
            fingerprint,
            holder,
            not_after,
        }
    }

    /// Encrypt this credential under a password for storage.
    pub fn to_file(&self, password: &str) -> CredentialFile {
        CredentialFile {
            cipher_hex: hex_encode(&xor_with_password(&self.seed, password)),
            fingerprint: self.fingerprint.clone(),
            holder: self.holder.clone(),
            not_after: self.not_after,
        }
    }

    /// Sign canonical bytes, enforcing the validity window.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CertificateExpired`] when the current time
    /// is past `not_after`.
    pub fn sign(&self, data: &CanonicalBytes) -> Result<Ed25519Signature, CryptoError> {
        if Timestamp::now() > self.not_after {
            return Err(CryptoError::CertificateExpired {
                not_after: self.not_after.to_iso8601(),
            });
        }
        Ok(self.keypair.sign(data))
    }

    /// The certificate fingerprint.
    pub fn fingerprint(&self) -> &CertificateFingerprint {
        &self.fingerprint
    }

    /// The public key for verification.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// The certificate holder's tax id.
    pub fn holder(&self) -> &Cnpj {
        &self.holder
    }

    /// End of the validity window.
    pub fn not_after(&self) -> Timestamp {
        self.not_after
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("fingerprint", &self.fingerprint.as_str())
            .field("holder", &self.holder.as_str())
            .field("not_after", &self.not_after.to_iso8601())
            .finish_non_exhaustive()
    }
}

/// XOR a 32-byte block with the SHA-256 of a password.
fn xor_with_password(block: &[u8; 32], password: &str) -> [u8; 32] {
    let key = Sha256::digest(password.as_bytes());
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = block[i] ^ key[i];
    }
    out
}
