//! Signing-key and reseeder-certificate material.
//!
//! The signing key is an RSA private key in PEM, either PKCS#8 or the
//! older PKCS#1 `RSA PRIVATE KEY` framing. Reseeder certificates live
//! under `reseed/` in the certificate directory, named after the signer ID
//! with `@` mapped to `_at_`, the layout the router's certificate bundle
//! ships with.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} does not contain an RSA private key")]
    BadKey(PathBuf),

    #[error("{0} does not contain a certificate")]
    BadCert(PathBuf),
}

/// Load an RSA signing key from a PEM file.
pub fn load_signing_key(path: &Path) -> Result<RsaPrivateKey, KeyError> {
    let pem = fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_owned(),
        source,
    })?;

    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|_| KeyError::BadKey(path.to_owned()))
}

/// `signer@mail.i2p` → `signer_at_mail.i2p.crt`.
pub fn signer_filename(signer_id: &str) -> String {
    format!("{}.crt", signer_id.replacen('@', "_at_", 2))
}

/// Read-only view of a certificate directory in the router's layout.
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        KeyStore { path: path.into() }
    }

    /// The DER certificate for a signer ID, for verifying SU3 files it
    /// signed.
    pub fn reseeder_certificate(&self, signer_id: &str) -> Result<Vec<u8>, KeyError> {
        let path = self.path.join("reseed").join(signer_filename(signer_id));
        let pem = fs::read(&path).map_err(|source| KeyError::Io {
            path: path.clone(),
            source,
        })?;

        let cert = rustls_pemfile::certs(&mut &pem[..])
            .next()
            .and_then(|c| c.ok())
            .ok_or_else(|| KeyError::BadCert(path.clone()))?;

        Ok(cert.as_ref().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use rsa::pkcs8::EncodePrivateKey;

    use super::*;

    static KEY: LazyLock<RsaPrivateKey> =
        LazyLock::new(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap());

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "seedbank-test-keystore-{label}-{}",
            rand::random::<u64>()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn signer_filename_mapping() {
        assert_eq!(
            signer_filename("reseed@example.i2p"),
            "reseed_at_example.i2p.crt"
        );
        assert_eq!(signer_filename("no-at-sign"), "no-at-sign.crt");
    }

    #[test]
    fn loads_pkcs8_pem_key() {
        let dir = temp_dir("pkcs8");
        let path = dir.join("signer.pem");
        let pem = KEY.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        fs::write(&path, pem.as_bytes()).unwrap();

        let loaded = load_signing_key(&path).unwrap();
        assert_eq!(loaded.to_public_key(), KEY.to_public_key());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rejects_non_key_pem() {
        let dir = temp_dir("junk");
        let path = dir.join("signer.pem");
        fs::write(&path, "-----BEGIN GARBAGE-----\nAAAA\n-----END GARBAGE-----\n").unwrap();
        assert!(matches!(load_signing_key(&path), Err(KeyError::BadKey(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_key_file_reports_path() {
        let err = load_signing_key(Path::new("/nonexistent/signer.pem")).unwrap_err();
        assert!(matches!(err, KeyError::Io { .. }));
    }

    #[test]
    fn finds_reseeder_certificate() {
        let dir = temp_dir("certs");
        fs::create_dir_all(dir.join("reseed")).unwrap();

        let pem = KEY.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let key_pair =
            rcgen::KeyPair::from_pkcs8_pem_and_sign_algo(pem.as_str(), &rcgen::PKCS_RSA_SHA256)
                .unwrap();
        let cert = rcgen::CertificateParams::new(vec!["reseed.example.i2p".into()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();
        fs::write(
            dir.join("reseed").join("reseed_at_example.i2p.crt"),
            cert.pem(),
        )
        .unwrap();

        let store = KeyStore::new(&dir);
        let der = store.reseeder_certificate("reseed@example.i2p").unwrap();
        assert_eq!(der, cert.der().as_ref());

        assert!(matches!(
            store.reseeder_certificate("unknown@example.i2p"),
            Err(KeyError::Io { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
