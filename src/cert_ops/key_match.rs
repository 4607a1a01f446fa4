//! Private key inspection and certificate/key pair matching
//!
//! Supports RSA, EC P-256, and EC P-384 keys in PKCS#8 form, which is the
//! only form a PKCS#12 key bag carries.

use crate::utils::KeyMatchError;
use pkcs8::{DecodePrivateKey, ObjectIdentifier, PrivateKeyInfo};
use x509_parser::prelude::*;

const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Public half derived from a private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPublicKey {
    /// The SubjectPublicKeyInfo bytes derived from the private key
    pub spki: Vec<u8>,
    /// Key type description, e.g. "RSA 2048" or "EC P-256"
    pub algorithm: String,
}

/// Derive the SubjectPublicKeyInfo of a PKCS#8 DER-encoded private key
pub fn public_key_of(pkcs8_der: &[u8]) -> Result<DerivedPublicKey, KeyMatchError> {
    let info = PrivateKeyInfo::try_from(pkcs8_der).map_err(|e| KeyMatchError::InvalidKey {
        message: format!("Not a PKCS#8 PrivateKeyInfo: {}", e),
    })?;

    let algorithm = info.algorithm.oid;
    if algorithm == OID_RSA_ENCRYPTION {
        return rsa_public_key(pkcs8_der);
    }
    if algorithm != OID_EC_PUBLIC_KEY {
        return Err(KeyMatchError::UnsupportedKeyAlgorithm {
            oid: algorithm.to_string(),
        });
    }

    let curve = info
        .algorithm
        .parameters_oid()
        .map_err(|e| KeyMatchError::InvalidKey {
            message: format!("EC key without a named curve: {}", e),
        })?;
    if curve == OID_SECP256R1 {
        p256_public_key(pkcs8_der)
    } else if curve == OID_SECP384R1 {
        p384_public_key(pkcs8_der)
    } else {
        Err(KeyMatchError::UnsupportedKeyAlgorithm {
            oid: format!("{} (curve {})", OID_EC_PUBLIC_KEY, curve),
        })
    }
}

fn rsa_public_key(der: &[u8]) -> Result<DerivedPublicKey, KeyMatchError> {
    use rsa::pkcs8::EncodePublicKey;
    use rsa::traits::PublicKeyParts;

    let rsa_key = rsa::RsaPrivateKey::from_pkcs8_der(der).map_err(|e| KeyMatchError::InvalidKey {
        message: format!("Failed to parse RSA key: {}", e),
    })?;
    let public_key = rsa::RsaPublicKey::from(&rsa_key);
    let spki = public_key
        .to_public_key_der()
        .map_err(|e| KeyMatchError::InvalidKey {
            message: format!("Failed to encode RSA public key: {}", e),
        })?;

    Ok(DerivedPublicKey {
        spki: spki.as_ref().to_vec(),
        algorithm: format!("RSA {}", public_key.size() * 8),
    })
}

fn p256_public_key(der: &[u8]) -> Result<DerivedPublicKey, KeyMatchError> {
    use p256::pkcs8::EncodePublicKey;

    let ec_key = p256::SecretKey::from_pkcs8_der(der).map_err(|e| KeyMatchError::InvalidKey {
        message: format!("Failed to parse EC P-256 key: {}", e),
    })?;
    let spki = ec_key
        .public_key()
        .to_public_key_der()
        .map_err(|e| KeyMatchError::InvalidKey {
            message: format!("Failed to encode EC P-256 public key: {}", e),
        })?;

    Ok(DerivedPublicKey {
        spki: spki.as_ref().to_vec(),
        algorithm: "EC P-256".to_string(),
    })
}

fn p384_public_key(der: &[u8]) -> Result<DerivedPublicKey, KeyMatchError> {
    use p384::pkcs8::EncodePublicKey;

    let ec_key = p384::SecretKey::from_pkcs8_der(der).map_err(|e| KeyMatchError::InvalidKey {
        message: format!("Failed to parse EC P-384 key: {}", e),
    })?;
    let spki = ec_key
        .public_key()
        .to_public_key_der()
        .map_err(|e| KeyMatchError::InvalidKey {
            message: format!("Failed to encode EC P-384 public key: {}", e),
        })?;

    Ok(DerivedPublicKey {
        spki: spki.as_ref().to_vec(),
        algorithm: "EC P-384".to_string(),
    })
}

/// Parse a DER certificate, mapping parser errors into `KeyMatchError`
pub fn parse_certificate(cert_der: &[u8]) -> Result<X509Certificate<'_>, KeyMatchError> {
    let (_, cert) =
        X509Certificate::from_der(cert_der).map_err(|e| KeyMatchError::CertificateParse {
            message: format!("{:?}", e),
        })?;
    Ok(cert)
}

/// Check if a certificate carries the given SubjectPublicKeyInfo
pub fn cert_matches(cert_der: &[u8], spki: &[u8]) -> Result<bool, KeyMatchError> {
    let cert = parse_certificate(cert_der)?;

    // Extract the raw SPKI bytes from the certificate
    Ok(cert.public_key().raw == spki)
}
