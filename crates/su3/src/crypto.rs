//! SU3 signing and verification.
//!
//! The signature is a PKCS#1 v1.5 RSA signature over the *raw* body
//! digest, with no DigestInfo prefix. That convention comes from the Java
//! router and every interoperating implementation follows it, so both
//! directions here use the unprefixed padding scheme.
//!
//! Only the RSA signature types are supported for signing and verifying;
//! reseed signers are RSA keys in practice. DSA/ECDSA files still decode,
//! but crypto operations on them report the type as unsupported.

use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::Su3Error;
use crate::wire::{SigType, Su3File};

/// Hash a signature body with the digest the signature type calls for.
pub fn body_digest(sig_type: SigType, body: &[u8]) -> Vec<u8> {
    match sig_type {
        SigType::DsaSha1 => Sha1::digest(body).to_vec(),
        SigType::EcdsaSha256 | SigType::RsaSha256 => Sha256::digest(body).to_vec(),
        SigType::EcdsaSha384 | SigType::RsaSha384 => Sha384::digest(body).to_vec(),
        SigType::EcdsaSha512 | SigType::RsaSha512 => Sha512::digest(body).to_vec(),
    }
}

impl Su3File {
    /// Sign the body with an RSA key, storing the signature in place.
    ///
    /// The key's modulus size must match the signature type's wire length
    /// (2048 bits for RSA-SHA256, 3072 for RSA-SHA384, 4096 for
    /// RSA-SHA512), since a PKCS#1 v1.5 signature is exactly one modulus
    /// long.
    pub fn sign(&mut self, key: &RsaPrivateKey) -> Result<(), Su3Error> {
        if !self.signature_type.is_rsa() {
            return Err(Su3Error::UnsupportedSigType(self.signature_type));
        }

        let expected = self.signature_type.sig_len();
        if key.size() != expected {
            return Err(Su3Error::SignatureLength {
                sig_type: self.signature_type,
                expected,
                got: key.size(),
            });
        }

        let digest = body_digest(self.signature_type, &self.body_bytes());
        self.signature = key.sign(Pkcs1v15Sign::new_unprefixed(), &digest)?;
        Ok(())
    }

    /// Verify the signature against an RSA public key.
    pub fn verify_with_key(&self, key: &RsaPublicKey) -> Result<(), Su3Error> {
        if !self.signature_type.is_rsa() {
            return Err(Su3Error::UnsupportedSigType(self.signature_type));
        }

        let digest = body_digest(self.signature_type, &self.body_bytes());
        key.verify(Pkcs1v15Sign::new_unprefixed(), &digest, &self.signature)
            .map_err(|_| Su3Error::BadSignature)
    }

    /// Verify the signature against a DER-encoded X.509 certificate,
    /// typically one looked up by this file's signer ID.
    pub fn verify(&self, cert_der: &[u8]) -> Result<(), Su3Error> {
        let key = rsa_key_from_cert(cert_der)?;
        self.verify_with_key(&key)
    }
}

/// Pull the RSA public key out of a DER certificate.
fn rsa_key_from_cert(cert_der: &[u8]) -> Result<RsaPublicKey, Su3Error> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| Su3Error::BadCertificate(e.to_string()))?;

    match cert.public_key().parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(pk)) => {
            let n = BigUint::from_bytes_be(pk.modulus);
            let e = BigUint::from_bytes_be(pk.exponent);
            Ok(RsaPublicKey::new(n, e)?)
        }
        Ok(_) => Err(Su3Error::BadCertificate(
            "certificate does not hold an RSA key".into(),
        )),
        Err(e) => Err(Su3Error::BadCertificate(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use rsa::pkcs8::EncodePrivateKey;

    use super::*;
    use crate::wire::{CONTENT_TYPE_RESEED, FILE_TYPE_ZIP, HEADER_LEN};

    // 2048-bit keygen is slow enough that the tests share one key.
    static KEY: LazyLock<RsaPrivateKey> = LazyLock::new(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap()
    });

    fn signed_sample() -> Su3File {
        let mut file = Su3File::new();
        file.signature_type = SigType::RsaSha256;
        file.file_type = FILE_TYPE_ZIP;
        file.content_type = CONTENT_TYPE_RESEED;
        file.signer_id = b"reseed@example.i2p".to_vec();
        file.content = b"payload bytes go here".to_vec();
        file.sign(&KEY).unwrap();
        file
    }

    #[test]
    fn sign_then_verify() {
        let file = signed_sample();
        assert_eq!(file.signature.len(), 256);
        file.verify_with_key(&KEY.to_public_key()).unwrap();
    }

    #[test]
    fn verify_survives_roundtrip() {
        let file = signed_sample();
        let decoded = Su3File::decode(&file.encode().unwrap()).unwrap();
        decoded.verify_with_key(&KEY.to_public_key()).unwrap();
    }

    #[test]
    fn any_body_mutation_breaks_verification() {
        let file = signed_sample();
        let encoded = file.encode().unwrap();
        let body_len = encoded.len() - file.signature.len();

        // A sample of offsets across header, version, signer id, content.
        for at in [7, 25, 27, HEADER_LEN, HEADER_LEN + 17, body_len - 1] {
            let mut tampered = encoded.clone();
            tampered[at] ^= 0x01;
            let decoded = Su3File::decode(&tampered).unwrap();
            assert!(
                decoded.verify_with_key(&KEY.to_public_key()).is_err(),
                "mutation at {at} not caught"
            );
        }
    }

    #[test]
    fn tampered_signature_rejected() {
        let mut file = signed_sample();
        file.signature[0] ^= 0xFF;
        assert!(matches!(
            file.verify_with_key(&KEY.to_public_key()),
            Err(Su3Error::BadSignature)
        ));
    }

    #[test]
    fn wrong_key_rejected() {
        let file = signed_sample();
        let other = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        assert!(file.verify_with_key(&other.to_public_key()).is_err());
    }

    #[test]
    fn non_rsa_types_unsupported() {
        let mut file = Su3File::new();
        file.signature_type = SigType::EcdsaSha256;
        assert!(matches!(
            file.sign(&KEY),
            Err(Su3Error::UnsupportedSigType(SigType::EcdsaSha256))
        ));
        file.signature = vec![0u8; 64];
        assert!(matches!(
            file.verify_with_key(&KEY.to_public_key()),
            Err(Su3Error::UnsupportedSigType(SigType::EcdsaSha256))
        ));
    }

    #[test]
    fn key_size_must_match_signature_type() {
        let mut file = Su3File::new();
        file.signature_type = SigType::RsaSha512; // wants a 4096-bit key
        assert!(matches!(
            file.sign(&KEY),
            Err(Su3Error::SignatureLength { expected: 512, got: 256, .. })
        ));
    }

    #[test]
    fn verify_against_certificate() {
        let file = signed_sample();

        let pem = KEY.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let key_pair =
            rcgen::KeyPair::from_pkcs8_pem_and_sign_algo(pem.as_str(), &rcgen::PKCS_RSA_SHA256)
                .unwrap();
        let params = rcgen::CertificateParams::new(vec!["reseed.example.i2p".into()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        file.verify(cert.der().as_ref()).unwrap();

        let mut tampered = file.clone();
        tampered.content.push(0);
        assert!(matches!(
            tampered.verify(cert.der().as_ref()),
            Err(Su3Error::BadSignature)
        ));
    }

    #[test]
    fn garbage_certificate_rejected() {
        let file = signed_sample();
        assert!(matches!(
            file.verify(b"not a certificate"),
            Err(Su3Error::BadCertificate(_))
        ));
    }
}
