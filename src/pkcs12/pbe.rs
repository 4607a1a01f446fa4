//! Password-based encryption schemes found in PKCS#12 containers
//!
//! Covers the legacy PKCS#12 PBE family (RFC 7292 Appendix C) and PBES2 with
//! PBKDF2 (RFC 8018). Algorithm identifiers are read raw by the parser and
//! interpreted here, so an unknown OID surfaces as
//! [`Pkcs12Error::UnsupportedAlgorithm`] instead of a framing error.

use super::kdf::{self, KdfPurpose};
use crate::utils::Pkcs12Error;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use yasna::models::ObjectIdentifier;
use yasna::{ASN1Result, BERReader};
use zeroize::Zeroizing;

// PKCS#12 PBE (1.2.840.113549.1.12.1.x)
const OID_PBE_SHA1_RC4_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 1];
const OID_PBE_SHA1_RC4_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 2];
const OID_PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
const OID_PBE_SHA1_2DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 4];
const OID_PBE_SHA1_RC2_128: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 5];
const OID_PBE_SHA1_RC2_40: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 6];

// PKCS#5
const OID_PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
const OID_PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];

// PBKDF2 PRFs
const OID_HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
const OID_HMAC_SHA224: &[u64] = &[1, 2, 840, 113549, 2, 8];
const OID_HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];
const OID_HMAC_SHA384: &[u64] = &[1, 2, 840, 113549, 2, 10];
const OID_HMAC_SHA512: &[u64] = &[1, 2, 840, 113549, 2, 11];

// PBES2 ciphers
const OID_AES_128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
const OID_AES_192_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 22];
const OID_AES_256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];
const OID_DES_EDE3_CBC: &[u64] = &[1, 2, 840, 113549, 3, 7];

// Message digests named by MacData
const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_SHA224: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 4];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_SHA384: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 2];
const OID_SHA512: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 3];

/// Upper bound on KDF iteration counts read from a container
pub(super) const MAX_ITERATIONS: u32 = 10_000_000;

/// Rejects zero and counts above [`MAX_ITERATIONS`] before any hashing.
pub(super) fn checked_iterations(iterations: u32, context: &'static str) -> Result<u32, Pkcs12Error> {
    if iterations == 0 || iterations > MAX_ITERATIONS {
        tracing::debug!(iterations, context, "iteration count out of range");
        return Err(Pkcs12Error::invalid(context));
    }
    Ok(iterations)
}

pub(super) fn is(oid: &ObjectIdentifier, components: &[u64]) -> bool {
    oid.components().as_slice() == components
}

/// An `AlgorithmIdentifier` with its parameters kept as raw encoded bytes.
#[derive(Debug, Clone)]
pub struct AlgorithmIdentifier {
    pub oid: ObjectIdentifier,
    pub params: Option<Vec<u8>>,
}

impl AlgorithmIdentifier {
    pub fn read(r: BERReader) -> ASN1Result<Self> {
        r.read_sequence(|r| {
            let oid = r.next().read_oid()?;
            let params = r.read_optional(|r| r.read_der())?;
            Ok(AlgorithmIdentifier { oid, params })
        })
    }

    fn params(&self) -> Result<&[u8], Pkcs12Error> {
        self.params
            .as_deref()
            .ok_or_else(|| Pkcs12Error::invalid("algorithm parameters"))
    }
}

/// Hash functions usable for the integrity MAC and as PBKDF2 PRFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Resolves a MacData digest algorithm.
    pub fn from_digest_oid(oid: &ObjectIdentifier) -> Result<Self, Pkcs12Error> {
        Ok(if is(oid, OID_SHA1) {
            HashAlgorithm::Sha1
        } else if is(oid, OID_SHA224) {
            HashAlgorithm::Sha224
        } else if is(oid, OID_SHA256) {
            HashAlgorithm::Sha256
        } else if is(oid, OID_SHA384) {
            HashAlgorithm::Sha384
        } else if is(oid, OID_SHA512) {
            HashAlgorithm::Sha512
        } else {
            return Err(Pkcs12Error::unsupported(oid));
        })
    }

    fn from_hmac_oid(oid: &ObjectIdentifier) -> Result<Self, Pkcs12Error> {
        Ok(if is(oid, OID_HMAC_SHA1) {
            HashAlgorithm::Sha1
        } else if is(oid, OID_HMAC_SHA224) {
            HashAlgorithm::Sha224
        } else if is(oid, OID_HMAC_SHA256) {
            HashAlgorithm::Sha256
        } else if is(oid, OID_HMAC_SHA384) {
            HashAlgorithm::Sha384
        } else if is(oid, OID_HMAC_SHA512) {
            HashAlgorithm::Sha512
        } else {
            return Err(Pkcs12Error::unsupported(oid));
        })
    }

    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// PKCS#12 KDF keyed by this hash.
    pub fn pkcs12_kdf(
        self,
        purpose: KdfPurpose,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        len: usize,
    ) -> Zeroizing<Vec<u8>> {
        match self {
            HashAlgorithm::Sha1 => kdf::derive::<Sha1>(purpose, password, salt, iterations, len),
            HashAlgorithm::Sha224 => {
                kdf::derive::<Sha224>(purpose, password, salt, iterations, len)
            }
            HashAlgorithm::Sha256 => {
                kdf::derive::<Sha256>(purpose, password, salt, iterations, len)
            }
            HashAlgorithm::Sha384 => {
                kdf::derive::<Sha384>(purpose, password, salt, iterations, len)
            }
            HashAlgorithm::Sha512 => {
                kdf::derive::<Sha512>(purpose, password, salt, iterations, len)
            }
        }
    }

    pub fn hmac_verify(self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<(), Pkcs12Error> {
        match self {
            HashAlgorithm::Sha1 => kdf::hmac_verify::<Sha1>(key, data, tag),
            HashAlgorithm::Sha224 => kdf::hmac_verify::<Sha224>(key, data, tag),
            HashAlgorithm::Sha256 => kdf::hmac_verify::<Sha256>(key, data, tag),
            HashAlgorithm::Sha384 => kdf::hmac_verify::<Sha384>(key, data, tag),
            HashAlgorithm::Sha512 => kdf::hmac_verify::<Sha512>(key, data, tag),
        }
    }

    fn pbkdf2(self, password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) {
        match self {
            HashAlgorithm::Sha1 => pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, rounds, out),
            HashAlgorithm::Sha224 => pbkdf2::pbkdf2_hmac::<Sha224>(password, salt, rounds, out),
            HashAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, out),
            HashAlgorithm::Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(password, salt, rounds, out),
            HashAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, rounds, out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCipher {
    TripleDes,
    TwoKeyTripleDes,
    Rc2With128BitKey,
    Rc2With40BitKey,
}

impl LegacyCipher {
    fn key_len(self) -> usize {
        match self {
            LegacyCipher::TripleDes => 24,
            LegacyCipher::TwoKeyTripleDes => 16,
            LegacyCipher::Rc2With128BitKey => 16,
            LegacyCipher::Rc2With40BitKey => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes2Cipher {
    Aes128,
    Aes192,
    Aes256,
    DesEde3,
}

impl Pbes2Cipher {
    fn key_len(self) -> usize {
        match self {
            Pbes2Cipher::Aes128 => 16,
            Pbes2Cipher::Aes192 | Pbes2Cipher::DesEde3 => 24,
            Pbes2Cipher::Aes256 => 32,
        }
    }
}

/// The password in both encodings a container may need.
///
/// The PKCS#12 KDF consumes the BMPString form; PBKDF2 consumes UTF-8.
pub struct PasswordForms<'a> {
    pub utf8: &'a [u8],
    pub bmp: &'a [u8],
}

/// A resolved password-based encryption scheme.
#[derive(Debug)]
pub enum EncryptionScheme {
    Pkcs12Pbe {
        cipher: LegacyCipher,
        salt: Vec<u8>,
        iterations: u32,
    },
    Pbes2 {
        prf: HashAlgorithm,
        salt: Vec<u8>,
        iterations: u32,
        cipher: Pbes2Cipher,
        iv: Vec<u8>,
    },
}

impl EncryptionScheme {
    pub fn from_algorithm(alg: &AlgorithmIdentifier) -> Result<Self, Pkcs12Error> {
        let oid = &alg.oid;
        let legacy = if is(oid, OID_PBE_SHA1_3DES) {
            Some(LegacyCipher::TripleDes)
        } else if is(oid, OID_PBE_SHA1_2DES) {
            Some(LegacyCipher::TwoKeyTripleDes)
        } else if is(oid, OID_PBE_SHA1_RC2_128) {
            Some(LegacyCipher::Rc2With128BitKey)
        } else if is(oid, OID_PBE_SHA1_RC2_40) {
            Some(LegacyCipher::Rc2With40BitKey)
        } else {
            None
        };

        if let Some(cipher) = legacy {
            let (salt, iterations) = yasna::parse_ber(alg.params()?, |r| {
                r.read_sequence(|r| {
                    let salt = r.next().read_bytes()?;
                    let iterations = r.next().read_u32()?;
                    Ok((salt, iterations))
                })
            })
            .map_err(|_| Pkcs12Error::invalid("PKCS#12 PBE parameters"))?;
            return Ok(EncryptionScheme::Pkcs12Pbe {
                cipher,
                salt,
                iterations: checked_iterations(iterations, "PBE iteration count")?,
            });
        }

        if is(oid, OID_PBES2) {
            return Self::pbes2_from_params(alg.params()?);
        }

        if is(oid, OID_PBE_SHA1_RC4_128) || is(oid, OID_PBE_SHA1_RC4_40) {
            tracing::debug!("RC4-based PKCS#12 PBE is not supported");
        }
        Err(Pkcs12Error::unsupported(oid))
    }

    fn pbes2_from_params(params: &[u8]) -> Result<Self, Pkcs12Error> {
        let (kdf, scheme) = yasna::parse_ber(params, |r| {
            r.read_sequence(|r| {
                let kdf = AlgorithmIdentifier::read(r.next())?;
                let scheme = AlgorithmIdentifier::read(r.next())?;
                Ok((kdf, scheme))
            })
        })
        .map_err(|_| Pkcs12Error::invalid("PBES2 parameters"))?;

        if !is(&kdf.oid, OID_PBKDF2) {
            return Err(Pkcs12Error::unsupported(&kdf.oid));
        }

        let (salt, iterations, key_length, prf) = yasna::parse_ber(kdf.params()?, |r| {
            r.read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u32()?;
                let key_length = r.read_optional(|r| r.read_u32())?;
                let prf = r.read_optional(AlgorithmIdentifier::read)?;
                Ok((salt, iterations, key_length, prf))
            })
        })
        .map_err(|_| Pkcs12Error::invalid("PBKDF2 parameters"))?;
        let iterations = checked_iterations(iterations, "PBKDF2 iteration count")?;

        let prf = match prf {
            Some(alg) => HashAlgorithm::from_hmac_oid(&alg.oid)?,
            None => HashAlgorithm::Sha1,
        };

        let cipher = if is(&scheme.oid, OID_AES_128_CBC) {
            Pbes2Cipher::Aes128
        } else if is(&scheme.oid, OID_AES_192_CBC) {
            Pbes2Cipher::Aes192
        } else if is(&scheme.oid, OID_AES_256_CBC) {
            Pbes2Cipher::Aes256
        } else if is(&scheme.oid, OID_DES_EDE3_CBC) {
            Pbes2Cipher::DesEde3
        } else {
            return Err(Pkcs12Error::unsupported(&scheme.oid));
        };

        if let Some(len) = key_length {
            if len as usize != cipher.key_len() {
                return Err(Pkcs12Error::invalid("PBKDF2 key length"));
            }
        }

        let iv = yasna::parse_ber(scheme.params()?, |r| r.read_bytes())
            .map_err(|_| Pkcs12Error::invalid("PBES2 cipher IV"))?;

        Ok(EncryptionScheme::Pbes2 {
            prf,
            salt,
            iterations,
            cipher,
            iv,
        })
    }

    /// Decrypts `ciphertext`, returning the unpadded plaintext.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        password: &PasswordForms<'_>,
        what: &'static str,
    ) -> Result<Zeroizing<Vec<u8>>, Pkcs12Error> {
        match self {
            EncryptionScheme::Pkcs12Pbe {
                cipher,
                salt,
                iterations,
            } => {
                let sha1 = HashAlgorithm::Sha1;
                let key =
                    sha1.pkcs12_kdf(KdfPurpose::Key, password.bmp, salt, *iterations, cipher.key_len());
                let iv = sha1.pkcs12_kdf(KdfPurpose::Iv, password.bmp, salt, *iterations, 8);
                match cipher {
                    LegacyCipher::TripleDes => {
                        kdf::cbc_decrypt::<des::TdesEde3>(&key, &iv, ciphertext, what)
                    }
                    LegacyCipher::TwoKeyTripleDes => {
                        kdf::cbc_decrypt::<des::TdesEde2>(&key, &iv, ciphertext, what)
                    }
                    LegacyCipher::Rc2With128BitKey | LegacyCipher::Rc2With40BitKey => {
                        kdf::cbc_decrypt::<rc2::Rc2>(&key, &iv, ciphertext, what)
                    }
                }
            }
            EncryptionScheme::Pbes2 {
                prf,
                salt,
                iterations,
                cipher,
                iv,
            } => {
                let mut key = Zeroizing::new(vec![0u8; cipher.key_len()]);
                prf.pbkdf2(password.utf8, salt, *iterations, &mut key);
                match cipher {
                    Pbes2Cipher::Aes128 => kdf::cbc_decrypt::<aes::Aes128>(&key, iv, ciphertext, what),
                    Pbes2Cipher::Aes192 => kdf::cbc_decrypt::<aes::Aes192>(&key, iv, ciphertext, what),
                    Pbes2Cipher::Aes256 => kdf::cbc_decrypt::<aes::Aes256>(&key, iv, ciphertext, what),
                    Pbes2Cipher::DesEde3 => {
                        kdf::cbc_decrypt::<des::TdesEde3>(&key, iv, ciphertext, what)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alg(components: &[u64], params: Option<Vec<u8>>) -> AlgorithmIdentifier {
        AlgorithmIdentifier {
            oid: ObjectIdentifier::from_slice(components),
            params,
        }
    }

    fn pbe_params(salt: &[u8], iterations: u32) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_bytes(salt);
                w.next().write_u32(iterations);
            })
        })
    }

    #[test]
    fn test_rc4_is_unsupported() {
        let err = EncryptionScheme::from_algorithm(&alg(
            OID_PBE_SHA1_RC4_128,
            Some(pbe_params(b"salt", 1)),
        ))
        .unwrap_err();
        match err {
            Pkcs12Error::UnsupportedAlgorithm { oid } => {
                assert_eq!(oid, "1.2.840.113549.1.12.1.1")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_legacy_scheme_parameters() {
        let scheme =
            EncryptionScheme::from_algorithm(&alg(OID_PBE_SHA1_RC2_40, Some(pbe_params(b"NaCl", 2048))))
                .unwrap();
        match scheme {
            EncryptionScheme::Pkcs12Pbe {
                cipher,
                salt,
                iterations,
            } => {
                assert_eq!(cipher, LegacyCipher::Rc2With40BitKey);
                assert_eq!(salt, b"NaCl");
                assert_eq!(iterations, 2048);
            }
            other => panic!("unexpected scheme: {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameters_is_structure_error() {
        let err = EncryptionScheme::from_algorithm(&alg(OID_PBE_SHA1_3DES, None)).unwrap_err();
        assert!(matches!(err, Pkcs12Error::Structure { .. }));
    }

    fn pbes2_params(iterations: u32) -> Vec<u8> {
        yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_sequence(|w| {
                    w.next().write_oid(&ObjectIdentifier::from_slice(OID_PBKDF2));
                    w.next().write_sequence(|w| {
                        w.next().write_bytes(b"saltsalt");
                        w.next().write_u32(iterations);
                    });
                });
                w.next().write_sequence(|w| {
                    w.next().write_oid(&ObjectIdentifier::from_slice(OID_AES_128_CBC));
                    w.next().write_bytes(&[0u8; 16]);
                });
            })
        })
    }

    #[test]
    fn test_pbes2_defaults_to_hmac_sha1() {
        let params = pbes2_params(1000);
        let scheme = EncryptionScheme::from_algorithm(&alg(OID_PBES2, Some(params))).unwrap();
        match scheme {
            EncryptionScheme::Pbes2 { prf, cipher, .. } => {
                assert_eq!(prf, HashAlgorithm::Sha1);
                assert_eq!(cipher, Pbes2Cipher::Aes128);
            }
            other => panic!("unexpected scheme: {other:?}"),
        }
    }

    #[test]
    fn test_iteration_counts_are_capped() {
        for iterations in [0, MAX_ITERATIONS + 1, u32::MAX] {
            let err = EncryptionScheme::from_algorithm(&alg(
                OID_PBE_SHA1_3DES,
                Some(pbe_params(b"salt", iterations)),
            ))
            .unwrap_err();
            assert!(matches!(
                err,
                Pkcs12Error::Structure {
                    context: "PBE iteration count",
                    ..
                }
            ));

            let err = EncryptionScheme::from_algorithm(&alg(OID_PBES2, Some(pbes2_params(iterations))))
                .unwrap_err();
            assert!(matches!(
                err,
                Pkcs12Error::Structure {
                    context: "PBKDF2 iteration count",
                    ..
                }
            ));
        }

        assert!(EncryptionScheme::from_algorithm(&alg(
            OID_PBE_SHA1_3DES,
            Some(pbe_params(b"salt", MAX_ITERATIONS)),
        ))
        .is_ok());
    }

    #[test]
    fn test_digest_oid_lookup() {
        let sha384 = ObjectIdentifier::from_slice(OID_SHA384);
        assert_eq!(
            HashAlgorithm::from_digest_oid(&sha384).unwrap(),
            HashAlgorithm::Sha384
        );
        let md5 = ObjectIdentifier::from_slice(&[1, 2, 840, 113549, 2, 5]);
        assert!(HashAlgorithm::from_digest_oid(&md5).is_err());
    }
}
