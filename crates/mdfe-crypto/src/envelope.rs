//! # Signed Envelope
//!
//! Wraps a document's frozen canonical form together with its signature
//! metadata. The envelope is what the transmission layer carries: the
//! same envelope bytes are retransmitted on every retry, so the
//! authority can never observe two distinct signed documents for one
//! access key.
//!
//! ## Invariants
//!
//! - The embedded canonical form is private and immutable; the envelope
//!   is constructed whole and never patched.
//! - [`SignedEnvelope::verify()`] recomputes the digest from the
//!   embedded form and checks the signature and the certificate
//!   fingerprint. It never trusts the stored digest alone.

use mdfe_core::{sha256_digest, CanonicalBytes, ContentDigest, Timestamp};
use serde::{Deserialize, Serialize};

use crate::credential::{CertificateFingerprint, SigningCredential};
use crate::ed25519::{verify as ed25519_verify, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

/// A signed canonical form with its signature metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    canonical_form: CanonicalBytes,
    digest: ContentDigest,
    signature: Ed25519Signature,
    signer_public_key: Ed25519PublicKey,
    certificate_fingerprint: CertificateFingerprint,
    signed_at: Timestamp,
}

impl SignedEnvelope {
    /// Sign a canonical form with a credential.
    ///
    /// Computes the content digest, signs the canonical bytes, and embeds
    /// the certificate fingerprint and signing timestamp. Signing is the
    /// last time the form is touched — from here on the envelope is
    /// carried as-is.
    ///
    /// # Errors
    ///
    /// Propagates [`CryptoError::CertificateExpired`] and other
    /// credential failures from [`SigningCredential::sign()`].
    pub fn sign(
        canonical_form: CanonicalBytes,
        credential: &SigningCredential,
    ) -> Result<Self, CryptoError> {
        let digest = sha256_digest(&canonical_form);
        let signature = credential.sign(&canonical_form)?;
        Ok(Self {
            canonical_form,
            digest,
            signature,
            signer_public_key: credential.public_key(),
            certificate_fingerprint: credential.fingerprint().clone(),
            signed_at: Timestamp::now(),
        })
    }

    /// Verify this envelope.
    ///
    /// Recomputes the digest from the embedded canonical form, checks it
    /// against the recorded digest, verifies the Ed25519 signature over
    /// the form, and confirms the certificate fingerprint matches the
    /// embedded public key. Any mutation of the form after signing fails
    /// here.
    pub fn verify(&self) -> Result<(), CryptoError> {
        let recomputed = sha256_digest(&self.canonical_form);
        if recomputed != self.digest {
            return Err(CryptoError::VerificationFailed(format!(
                "digest mismatch: recorded {}, recomputed {}",
                self.digest.to_hex(),
                recomputed.to_hex()
            )));
        }
        if CertificateFingerprint::of(&self.signer_public_key) != self.certificate_fingerprint {
            return Err(CryptoError::VerificationFailed(
                "certificate fingerprint does not match signer public key".to_string(),
            ));
        }
        ed25519_verify(&self.canonical_form, &self.signature, &self.signer_public_key)
    }

    /// The embedded canonical form.
    pub fn canonical_form(&self) -> &CanonicalBytes {
        &self.canonical_form
    }

    /// The content digest recorded at signing time.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// The certificate fingerprint of the signer.
    pub fn certificate_fingerprint(&self) -> &CertificateFingerprint {
        &self.certificate_fingerprint
    }

    /// When the envelope was signed.
    pub fn signed_at(&self) -> Timestamp {
        self.signed_at
    }
}

/// Wire/storage representation of an envelope.
///
/// The canonical form travels as its JSON text (it is valid UTF-8 by
/// construction); rehydration re-freezes it without re-canonicalizing.
#[derive(Serialize, Deserialize)]
struct EnvelopeRepr {
    canonical_form: String,
    digest: ContentDigest,
    signature: Ed25519Signature,
    signer_public_key: Ed25519PublicKey,
    certificate_fingerprint: CertificateFingerprint,
    signed_at: Timestamp,
}

impl Serialize for SignedEnvelope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let form = std::str::from_utf8(self.canonical_form.as_bytes())
            .map_err(serde::ser::Error::custom)?;
        EnvelopeRepr {
            canonical_form: form.to_string(),
            digest: self.digest,
            signature: self.signature.clone(),
            signer_public_key: self.signer_public_key.clone(),
            certificate_fingerprint: self.certificate_fingerprint.clone(),
            signed_at: self.signed_at,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SignedEnvelope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = EnvelopeRepr::deserialize(deserializer)?;
        let canonical_form = CanonicalBytes::from_frozen(repr.canonical_form.into_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(Self {
            canonical_form,
            digest: repr.digest,
            signature: repr.signature,
            signer_public_key: repr.signer_public_key,
            certificate_fingerprint: repr.certificate_fingerprint,
            signed_at: repr.signed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdfe_core::Cnpj;
    use serde_json::json;

    fn credential() -> SigningCredential {
        SigningCredential::generate(
            Cnpj::new("12345678000190").unwrap(),
            Timestamp::parse("2099-12-31T23:59:59Z").unwrap(),
        )
    }

    fn sample_form() -> CanonicalBytes {
        CanonicalBytes::new(&json!({
            "chave": "35260812345678000190580010000000421123456780",
            "emit": {"CNPJ": "12345678000190"},
            "valor_centavos": 1500000
        }))
        .unwrap()
    }

    #[test]
    fn sign_then_verify() {
        let envelope = SignedEnvelope::sign(sample_form(), &credential()).unwrap();
        envelope.verify().expect("fresh envelope must verify");
    }

    #[test]
    fn mutating_the_form_breaks_verification() {
        let cred = credential();
        let envelope = SignedEnvelope::sign(sample_form(), &cred).unwrap();

        // Rebuild the envelope through serde with one byte of the form changed.
        let mut value = serde_json::to_value(&envelope).unwrap();
        let form = value["canonical_form"].as_str().unwrap().to_string();
        let tampered_form = form.replacen("1500000", "1500001", 1);
        assert_ne!(form, tampered_form);
        value["canonical_form"] = serde_json::Value::String(tampered_form);

        let tampered: SignedEnvelope = serde_json::from_value(value).unwrap();
        assert!(tampered.verify().is_err());
    }

    #[test]
    fn swapped_public_key_breaks_fingerprint_check() {
        let envelope = SignedEnvelope::sign(sample_form(), &credential()).unwrap();
        let mut value = serde_json::to_value(&envelope).unwrap();
        let other = credential();
        value["signer_public_key"] =
            serde_json::Value::String(other.public_key().to_hex());
        let tampered: SignedEnvelope = serde_json::from_value(value).unwrap();
        let err = tampered.verify().unwrap_err();
        assert!(matches!(err, CryptoError::VerificationFailed(_)));
    }

    #[test]
    fn digest_matches_canonical_form() {
        let form = sample_form();
        let expected = sha256_digest(&form);
        let envelope = SignedEnvelope::sign(form, &credential()).unwrap();
        assert_eq!(envelope.digest(), &expected);
    }

    #[test]
    fn serde_roundtrip_preserves_verification() {
        let envelope = SignedEnvelope::sign(sample_form(), &credential()).unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: SignedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
        back.verify().expect("roundtripped envelope must verify");
    }

    #[test]
    fn expired_credential_cannot_produce_envelope() {
        let cred = SigningCredential::generate(
            Cnpj::new("12345678000190").unwrap(),
            Timestamp::parse("2020-01-01T00:00:00Z").unwrap(),
        );
        let err = SignedEnvelope::sign(sample_form(), &cred).unwrap_err();
        assert!(matches!(err, CryptoError::CertificateExpired { .. }));
    }
}
