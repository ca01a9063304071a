//! SU3 container framing: fixed 40-byte header + variable tail, big-endian.
//!
//! Byte layout (offsets):
//!   [0..6]   magic "I2Psu3"
//!   [6]      reserved          [7]  format
//!   [8..10]  signature type    [10..12] signature length
//!   [12]     reserved          [13] version length
//!   [14]     reserved          [15] signer-id length
//!   [16..24] content length (u64)
//!   [24]     reserved          [25] file type
//!   [26]     reserved          [27] content type
//!   [28..40] reserved
//!   [40..]   version | signer id | content | signature
//!
//! The signature covers everything up to but excluding itself. The version
//! field is NUL-padded on the right to at least 16 bytes. Signature length
//! is a function of the signature type alone; a header that disagrees with
//! the table is rejected.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Su3Error;

pub const MAGIC: &[u8; 6] = b"I2Psu3";
pub const HEADER_LEN: usize = 40;
pub const MIN_VERSION_LENGTH: usize = 16;

pub const FILE_TYPE_ZIP: u8 = 0;
pub const FILE_TYPE_XML: u8 = 1;
pub const FILE_TYPE_HTML: u8 = 2;
pub const FILE_TYPE_XMLGZ: u8 = 3;

pub const CONTENT_TYPE_UNKNOWN: u8 = 0;
pub const CONTENT_TYPE_ROUTER: u8 = 1;
pub const CONTENT_TYPE_PLUGIN: u8 = 2;
pub const CONTENT_TYPE_RESEED: u8 = 3;
pub const CONTENT_TYPE_NEWS: u8 = 4;

/// SU3 signature types. The code doubles as the wire value.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigType {
    DsaSha1 = 0,
    EcdsaSha256 = 1,
    EcdsaSha384 = 2,
    EcdsaSha512 = 3,
    RsaSha256 = 4,
    RsaSha384 = 5,
    RsaSha512 = 6,
}

impl SigType {
    pub fn from_code(code: u16) -> Result<Self, Su3Error> {
        match code {
            0 => Ok(Self::DsaSha1),
            1 => Ok(Self::EcdsaSha256),
            2 => Ok(Self::EcdsaSha384),
            3 => Ok(Self::EcdsaSha512),
            4 => Ok(Self::RsaSha256),
            5 => Ok(Self::RsaSha384),
            6 => Ok(Self::RsaSha512),
            other => Err(Su3Error::UnknownSigType(other)),
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Wire length of a signature of this type, in bytes.
    pub fn sig_len(self) -> usize {
        match self {
            Self::DsaSha1 => 40,
            Self::EcdsaSha256 => 64,
            Self::EcdsaSha384 => 96,
            Self::EcdsaSha512 => 132,
            Self::RsaSha256 => 256,
            Self::RsaSha384 => 384,
            Self::RsaSha512 => 512,
        }
    }

    pub fn is_rsa(self) -> bool {
        matches!(self, Self::RsaSha256 | Self::RsaSha384 | Self::RsaSha512)
    }

    /// The RSA signature type whose wire length matches a key of the given
    /// modulus size, since a PKCS#1 v1.5 signature is exactly as long as
    /// the modulus.
    pub fn for_rsa_key_bits(bits: usize) -> Option<Self> {
        match bits {
            2048 => Some(Self::RsaSha256),
            3072 => Some(Self::RsaSha384),
            4096 => Some(Self::RsaSha512),
            _ => None,
        }
    }
}

/// A parsed or under-construction SU3 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Su3File {
    pub format: u8,
    pub signature_type: SigType,
    pub file_type: u8,
    pub content_type: u8,

    pub version: Vec<u8>,
    pub signer_id: Vec<u8>,
    pub content: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Su3File {
    /// A fresh file with the version set to the current Unix epoch
    /// (decimal ASCII) and the strongest RSA signature type.
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Su3File {
            format: 0,
            signature_type: SigType::RsaSha512,
            file_type: FILE_TYPE_ZIP,
            content_type: CONTENT_TYPE_UNKNOWN,
            version: epoch.to_string().into_bytes(),
            signer_id: Vec::new(),
            content: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// The version field as it appears on the wire: NUL-padded on the
    /// right to at least 16 bytes.
    pub fn padded_version(&self) -> Vec<u8> {
        let mut v = self.version.clone();
        if v.len() < MIN_VERSION_LENGTH {
            v.resize(MIN_VERSION_LENGTH, 0);
        }
        v
    }

    /// Everything the signature covers: header, version, signer id and
    /// content, i.e. byte 0 up to the start of the signature.
    pub fn body_bytes(&self) -> Vec<u8> {
        let version = self.padded_version();
        let sig_len = self.signature_type.sig_len();

        let mut out = Vec::with_capacity(
            HEADER_LEN + version.len() + self.signer_id.len() + self.content.len(),
        );

        out.extend_from_slice(MAGIC);
        out.push(0);
        out.push(self.format);
        out.extend_from_slice(&self.signature_type.code().to_be_bytes());
        out.extend_from_slice(&(sig_len as u16).to_be_bytes());
        out.push(0);
        out.push(version.len() as u8);
        out.push(0);
        out.push(self.signer_id.len() as u8);
        out.extend_from_slice(&(self.content.len() as u64).to_be_bytes());
        out.push(0);
        out.push(self.file_type);
        out.push(0);
        out.push(self.content_type);
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&version);
        out.extend_from_slice(&self.signer_id);
        out.extend_from_slice(&self.content);

        out
    }

    /// Serialize the whole file. Fails if the signature does not have the
    /// exact length its type requires.
    pub fn encode(&self) -> Result<Vec<u8>, Su3Error> {
        let expected = self.signature_type.sig_len();
        if self.signature.len() != expected {
            return Err(Su3Error::SignatureLength {
                sig_type: self.signature_type,
                expected,
                got: self.signature.len(),
            });
        }

        let mut out = self.body_bytes();
        out.extend_from_slice(&self.signature);
        Ok(out)
    }

    /// Parse an SU3 file. Rejects bad magic, unknown signature types,
    /// header/table disagreement, and truncation. Trailing bytes beyond
    /// the signature are ignored, as with the reference reader.
    pub fn decode(bytes: &[u8]) -> Result<Su3File, Su3Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Su3Error::Truncated {
                need: HEADER_LEN,
                have: bytes.len(),
            });
        }
        if &bytes[0..6] != MAGIC {
            return Err(Su3Error::BadMagic);
        }

        let format = bytes[7];
        let sig_code = u16::from_be_bytes([bytes[8], bytes[9]]);
        let signature_type = SigType::from_code(sig_code)?;
        let sig_len = u16::from_be_bytes([bytes[10], bytes[11]]) as usize;
        if sig_len != signature_type.sig_len() {
            return Err(Su3Error::SignatureLength {
                sig_type: signature_type,
                expected: signature_type.sig_len(),
                got: sig_len,
            });
        }

        let version_len = bytes[13] as usize;
        let signer_len = bytes[15] as usize;
        let content_len = u64::from_be_bytes([
            bytes[16], bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22],
            bytes[23],
        ]);
        let file_type = bytes[25];
        let content_type = bytes[27];

        // Widened so a hostile content length cannot overflow the sum.
        let need = (HEADER_LEN + version_len + signer_len + sig_len) as u128 + content_len as u128;
        if (bytes.len() as u128) < need {
            return Err(Su3Error::Truncated {
                need: need.min(usize::MAX as u128) as usize,
                have: bytes.len(),
            });
        }
        let content_len = content_len as usize;

        let mut at = HEADER_LEN;
        let version = bytes[at..at + version_len].to_vec();
        at += version_len;
        let signer_id = bytes[at..at + signer_len].to_vec();
        at += signer_len;
        let content = bytes[at..at + content_len].to_vec();
        at += content_len;
        let signature = bytes[at..at + sig_len].to_vec();

        Ok(Su3File {
            format,
            signature_type,
            file_type,
            content_type,
            version,
            signer_id,
            content,
            signature,
        })
    }
}

impl Default for Su3File {
    fn default() -> Self {
        Self::new()
    }
}
