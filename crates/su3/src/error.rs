use crate::wire::SigType;

/// Errors from the SU3 container layer.
#[derive(Debug, thiserror::Error)]
pub enum Su3Error {
    #[error("bad magic (expected \"I2Psu3\")")]
    BadMagic,

    #[error("file truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown signature type: {0}")]
    UnknownSigType(u16),

    #[error("signature length {got} does not match type {sig_type:?} (expected {expected})")]
    SignatureLength {
        sig_type: SigType,
        expected: usize,
        got: usize,
    },

    #[error("operation not supported for signature type {0:?}")]
    UnsupportedSigType(SigType),

    #[error("signature verification failed")]
    BadSignature,

    #[error("malformed certificate: {0}")]
    BadCertificate(String),

    #[error("RSA key rejected: {0}")]
    Key(#[from] rsa::Error),
}
