//! Signature engine error types.

use thiserror::Error;

/// Errors from credential loading and signing operations.
///
/// All of these are operator-visible and fatal for the attempt that hit
/// them: a document stays in its current lifecycle state when signing
/// fails, and nothing is retried until the credential problem is fixed.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// No credential is configured where one is required.
    #[error("signing credential not configured: {0}")]
    NotConfigured(String),

    /// The credential file could not be read or parsed.
    #[error("credential file unreadable: {0}")]
    CredentialUnreadable(String),

    /// The supplied password does not unlock the credential.
    #[error("credential password mismatch")]
    PasswordMismatch,

    /// The signing certificate is past its validity window.
    #[error("signing certificate expired at {not_after}")]
    CertificateExpired {
        /// End of the certificate's validity window.
        not_after: String,
    },

    /// Key generation or parsing failed.
    #[error("key error: {0}")]
    KeyError(String),

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
}
