//! BER parsing of PKCS#12 structures (RFC 7292)
//!
//! `yasna::parse_ber` is used throughout since containers exported by
//! Windows and Java use indefinite lengths and constructed OCTET STRINGs.

use super::kdf::{self, KdfPurpose};
use super::pbe::{
    checked_iterations, is, AlgorithmIdentifier, EncryptionScheme, HashAlgorithm, PasswordForms,
};
use super::{BagAttributes, CertEntry, KeyEntry, Pkcs12Contents};
use crate::utils::Pkcs12Error;
use tracing::debug;
use yasna::models::ObjectIdentifier;
use yasna::{ASN1ErrorKind, ASN1Result, BERReader, BERReaderSeq, Tag};

// Content types (PKCS#7)
const OID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

// Bag types (PKCS#12)
const OID_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 1];
const OID_PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
const OID_CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];
const OID_SAFE_CONTENTS_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 6];

// Certificate type
const OID_X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];

// Bag attributes (PKCS#9)
const OID_FRIENDLY_NAME: &[u64] = &[1, 2, 840, 113549, 1, 9, 20];
const OID_LOCAL_KEY_ID: &[u64] = &[1, 2, 840, 113549, 1, 9, 21];

const MAX_NESTING: usize = 8;

// ── Parsed structures ──────────────────────────────────────────────────────

struct MacData {
    digest: AlgorithmIdentifier,
    tag: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
}

struct Pfx {
    auth_safe: Vec<u8>,
    mac: Option<MacData>,
}

enum ContentInfo {
    Data(Vec<u8>),
    EncryptedData {
        algorithm: AlgorithmIdentifier,
        ciphertext: Vec<u8>,
    },
    Other(ObjectIdentifier),
}

enum BagValue {
    Key(Vec<u8>),
    ShroudedKey {
        algorithm: AlgorithmIdentifier,
        ciphertext: Vec<u8>,
    },
    Certificate(Vec<u8>),
    NonX509Certificate(ObjectIdentifier),
    SafeContents(Vec<u8>),
    Other(ObjectIdentifier),
}

struct SafeBag {
    value: BagValue,
    attributes: BagAttributes,
}

#[derive(Default)]
struct Collected {
    keys: Vec<KeyEntry>,
    certificates: Vec<CertEntry>,
}

// ── Top-level parser ───────────────────────────────────────────────────────

/// Parses and decrypts a PKCS#12 container.
///
/// The MAC, when present, is checked before anything is decrypted. With an
/// empty password both the `00 00` BMPString and the zero-length encoding are
/// accepted; the one that verifies is then used for PKCS#12 PBE.
pub fn parse_pfx(data: &[u8], password: &str) -> Result<Pkcs12Contents, Pkcs12Error> {
    let pfx = read_pfx(data)?;
    debug!(
        auth_safe_len = pfx.auth_safe.len(),
        has_mac = pfx.mac.is_some(),
        "parsed PFX framing"
    );

    let bmp = kdf::password_to_bmp(password);
    let mut candidates: Vec<&[u8]> = vec![bmp.as_slice()];
    if password.is_empty() {
        candidates.push(&[]);
    }

    let mac_verified = pfx.mac.is_some();
    if let Some(mac) = &pfx.mac {
        let accepted = verify_mac(mac, &pfx.auth_safe, &candidates)?;
        debug!("MAC verified");
        candidates = vec![accepted];
    }

    let mut first_error = None;
    for bmp_form in candidates {
        let password = PasswordForms {
            utf8: password.as_bytes(),
            bmp: bmp_form,
        };
        match read_auth_safe(&pfx.auth_safe, &password) {
            Ok(collected) => {
                debug!(
                    keys = collected.keys.len(),
                    certificates = collected.certificates.len(),
                    "extracted safe bags"
                );
                return Ok(Pkcs12Contents {
                    keys: collected.keys,
                    certificates: collected.certificates,
                    mac_verified,
                });
            }
            Err(Pkcs12Error::Structure { context, .. }) => {
                first_error.get_or_insert(Pkcs12Error::Structure {
                    context,
                    authenticated: mac_verified,
                });
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.unwrap_or(Pkcs12Error::invalid("authenticated safe")))
}

fn read_pfx(data: &[u8]) -> Result<Pfx, Pkcs12Error> {
    let framing = |kind: ASN1ErrorKind| Pkcs12Error::Framing { kind };

    let (version, content_type, content, mac) = yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            let version = r.next().read_u64()?;
            let (content_type, content) = r.next().read_sequence(|r| {
                let content_type = r.next().read_oid()?;
                let content = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
                Ok((content_type, content))
            })?;
            let mac = r.read_optional(read_mac_data)?;
            Ok((version, content_type, content, mac))
        })
    })
    .map_err(|e| framing(e.kind()))?;

    if version != 3 {
        return Err(Pkcs12Error::UnsupportedVersion { version });
    }
    // Public-key integrity mode (signedData) is not handled.
    if !is(&content_type, OID_DATA) {
        return Err(framing(ASN1ErrorKind::Invalid));
    }

    let auth_safe = yasna::parse_ber(&content, |r| r.read_bytes()).map_err(|e| framing(e.kind()))?;
    Ok(Pfx { auth_safe, mac })
}

// ── MAC verification ───────────────────────────────────────────────────────

fn read_mac_data(r: BERReader) -> ASN1Result<MacData> {
    r.read_sequence(|r| {
        let (digest, tag) = r.next().read_sequence(|r| {
            let digest = AlgorithmIdentifier::read(r.next())?;
            let tag = r.next().read_bytes()?;
            Ok((digest, tag))
        })?;
        let salt = r.next().read_bytes()?;
        let iterations = r.read_optional(|r| r.read_u32())?.unwrap_or(1);
        Ok(MacData {
            digest,
            tag,
            salt,
            iterations,
        })
    })
}

/// Returns the password encoding that produced a matching MAC.
fn verify_mac<'p>(
    mac: &MacData,
    auth_safe: &[u8],
    candidates: &[&'p [u8]],
) -> Result<&'p [u8], Pkcs12Error> {
    let hash = HashAlgorithm::from_digest_oid(&mac.digest.oid)?;
    let iterations = checked_iterations(mac.iterations, "MAC iteration count")?;
    debug!(?hash, iterations, "verifying MAC");

    for &candidate in candidates {
        let key = hash.pkcs12_kdf(
            KdfPurpose::Mac,
            candidate,
            &mac.salt,
            iterations,
            hash.output_len(),
        );
        if hash.hmac_verify(&key, auth_safe, &mac.tag).is_ok() {
            return Ok(candidate);
        }
    }
    Err(Pkcs12Error::MacMismatch)
}

// ── AuthenticatedSafe ──────────────────────────────────────────────────────

fn read_auth_safe(auth_safe: &[u8], password: &PasswordForms<'_>) -> Result<Collected, Pkcs12Error> {
    let content_infos = yasna::parse_ber(auth_safe, |r| r.collect_sequence_of(read_content_info))
        .map_err(|_| Pkcs12Error::invalid("authenticated safe"))?;
    debug!(content_infos = content_infos.len(), "read authenticated safe");

    let mut collected = Collected::default();
    for info in content_infos {
        match info {
            ContentInfo::Data(safe_contents) => {
                collect_bags(&safe_contents, password, &mut collected, 0)?;
            }
            ContentInfo::EncryptedData {
                algorithm,
                ciphertext,
            } => {
                let scheme = EncryptionScheme::from_algorithm(&algorithm)?;
                let safe_contents = scheme.decrypt(&ciphertext, password, "safe contents")?;
                collect_bags(&safe_contents, password, &mut collected, 0)?;
            }
            ContentInfo::Other(content_type) => {
                return Err(Pkcs12Error::unsupported(content_type));
            }
        }
    }
    Ok(collected)
}

fn read_content_info(r: BERReader) -> ASN1Result<ContentInfo> {
    r.read_sequence(|r| {
        let content_type = r.next().read_oid()?;

        if is(&content_type, OID_DATA) {
            let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
            Ok(ContentInfo::Data(data))
        } else if is(&content_type, OID_ENCRYPTED_DATA) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let _version = r.next().read_u64()?;
                    let info = r.next().read_sequence(|r| {
                        let _content_type = r.next().read_oid()?;
                        let algorithm = AlgorithmIdentifier::read(r.next())?;
                        let ciphertext = r
                            .next()
                            .read_tagged_implicit(Tag::context(0), |r| r.read_bytes())?;
                        Ok(ContentInfo::EncryptedData {
                            algorithm,
                            ciphertext,
                        })
                    })?;
                    // unprotectedAttrs
                    let _ = r.read_optional(|r| r.read_der())?;
                    Ok(info)
                })
            })
        } else {
            let _ = r.read_optional(|r| r.read_der())?;
            Ok(ContentInfo::Other(content_type))
        }
    })
}

// ── SafeContents ───────────────────────────────────────────────────────────

fn collect_bags(
    safe_contents: &[u8],
    password: &PasswordForms<'_>,
    collected: &mut Collected,
    depth: usize,
) -> Result<(), Pkcs12Error> {
    if depth > MAX_NESTING {
        return Err(Pkcs12Error::invalid("safe contents nesting"));
    }

    let bags = yasna::parse_ber(safe_contents, |r| r.collect_sequence_of(read_safe_bag))
        .map_err(|_| Pkcs12Error::invalid("safe contents"))?;

    for bag in bags {
        match bag.value {
            BagValue::Key(pkcs8) => {
                collected.keys.push(KeyEntry {
                    pkcs8: pkcs8.into(),
                    attributes: bag.attributes,
                });
            }
            BagValue::ShroudedKey {
                algorithm,
                ciphertext,
            } => {
                let scheme = EncryptionScheme::from_algorithm(&algorithm)?;
                let pkcs8 = scheme.decrypt(&ciphertext, password, "private key")?;
                collected.keys.push(KeyEntry {
                    pkcs8,
                    attributes: bag.attributes,
                });
            }
            BagValue::Certificate(der) => {
                collected.certificates.push(CertEntry {
                    der,
                    attributes: bag.attributes,
                });
            }
            BagValue::SafeContents(inner) => {
                collect_bags(&inner, password, collected, depth + 1)?;
            }
            BagValue::NonX509Certificate(cert_type) => {
                debug!(%cert_type, "skipping non-X.509 certificate bag");
            }
            BagValue::Other(bag_type) => {
                debug!(%bag_type, "skipping safe bag");
            }
        }
    }
    Ok(())
}

fn read_safe_bag(r: BERReader) -> ASN1Result<SafeBag> {
    r.read_sequence(|r| {
        let bag_type = r.next().read_oid()?;

        let value = if is(&bag_type, OID_KEY_BAG) {
            BagValue::Key(r.next().read_tagged(Tag::context(0), |r| r.read_der())?)
        } else if is(&bag_type, OID_PKCS8_SHROUDED_KEY_BAG) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let algorithm = AlgorithmIdentifier::read(r.next())?;
                    let ciphertext = r.next().read_bytes()?;
                    Ok(BagValue::ShroudedKey {
                        algorithm,
                        ciphertext,
                    })
                })
            })?
        } else if is(&bag_type, OID_CERT_BAG) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let cert_type = r.next().read_oid()?;
                    if is(&cert_type, OID_X509_CERTIFICATE) {
                        let der = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
                        Ok(BagValue::Certificate(der))
                    } else {
                        let _ = r.next().read_der()?;
                        Ok(BagValue::NonX509Certificate(cert_type))
                    }
                })
            })?
        } else if is(&bag_type, OID_SAFE_CONTENTS_BAG) {
            BagValue::SafeContents(r.next().read_tagged(Tag::context(0), |r| r.read_der())?)
        } else {
            let _ = r.next().read_der()?;
            BagValue::Other(bag_type)
        };

        let attributes = read_bag_attributes(r)?;
        Ok(SafeBag { value, attributes })
    })
}

fn read_bag_attributes(r: &mut BERReaderSeq) -> ASN1Result<BagAttributes> {
    let mut attributes = BagAttributes::default();
    r.read_optional(|r| {
        r.read_set_of(|r| {
            r.read_sequence(|r| {
                let attr_type = r.next().read_oid()?;
                r.next().read_set_of(|r| {
                    if is(&attr_type, OID_LOCAL_KEY_ID) {
                        attributes.local_key_id = Some(r.read_bytes()?);
                    } else if is(&attr_type, OID_FRIENDLY_NAME) {
                        attributes.friendly_name = Some(r.read_bmp_string()?);
                    } else {
                        r.read_der()?;
                    }
                    Ok(())
                })
            })
        })
    })?;
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AES_BUNDLE: &[u8] = include_bytes!("../../tests/fixtures/bundle-aes.pfx");
    const NO_MAC_BUNDLE: &[u8] = include_bytes!("../../tests/fixtures/no-mac.pfx");
    const PASSWORD: &str = "correct horse";

    #[test]
    fn test_parse_aes_bundle_in_container_order() {
        let contents = parse_pfx(AES_BUNDLE, PASSWORD).unwrap();
        assert!(contents.mac_verified);
        assert_eq!(contents.keys.len(), 1);
        assert_eq!(contents.certificates.len(), 3);
        assert!(contents.keys[0].attributes.local_key_id.is_some());
        assert_eq!(
            contents.keys[0].attributes.local_key_id,
            contents.certificates[0].attributes.local_key_id
        );
    }

    #[test]
    fn test_wrong_password_is_mac_mismatch() {
        let err = parse_pfx(AES_BUNDLE, "battery staple").unwrap_err();
        assert!(matches!(err, Pkcs12Error::MacMismatch));
    }

    #[test]
    fn test_garbage_is_framing_error() {
        let err = parse_pfx(b"definitely not a pfx", PASSWORD).unwrap_err();
        assert!(matches!(err, Pkcs12Error::Framing { .. }));
    }

    #[test]
    fn test_wrong_version() {
        let data = yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u32(2);
                w.next().write_sequence(|w| {
                    w.next().write_oid(&ObjectIdentifier::from_slice(OID_DATA));
                    w.next()
                        .write_tagged(Tag::context(0), |w| w.write_bytes(&[0x30, 0x00]));
                });
            })
        });
        let err = parse_pfx(&data, PASSWORD).unwrap_err();
        assert!(matches!(err, Pkcs12Error::UnsupportedVersion { version: 2 }));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut data = AES_BUNDLE.to_vec();
        data.extend_from_slice(&[0, 0, 0]);
        let err = parse_pfx(&data, PASSWORD).unwrap_err();
        assert!(matches!(err, Pkcs12Error::Framing { .. }));
    }

    #[test]
    fn test_huge_mac_iteration_count_is_rejected() {
        let mac = MacData {
            digest: AlgorithmIdentifier {
                oid: ObjectIdentifier::from_slice(&[2, 16, 840, 1, 101, 3, 4, 2, 1]),
                params: None,
            },
            tag: vec![0; 32],
            salt: b"saltsalt".to_vec(),
            iterations: u32::MAX,
        };
        let password: &[u8] = b"\0\0";
        let err = verify_mac(&mac, b"auth safe", &[password]).unwrap_err();
        assert!(matches!(
            err,
            Pkcs12Error::Structure {
                context: "MAC iteration count",
                authenticated: false,
            }
        ));
    }

    #[test]
    fn test_no_mac_container() {
        let contents = parse_pfx(NO_MAC_BUNDLE, PASSWORD).unwrap();
        assert!(!contents.mac_verified);
        assert_eq!(contents.keys.len(), 1);
        assert!(!contents.certificates.is_empty());
    }

    #[test]
    fn test_empty_safe_is_accepted() {
        let data = yasna::construct_der(|w| {
            w.write_sequence(|w| {
                w.next().write_u32(3);
                w.next().write_sequence(|w| {
                    w.next().write_oid(&ObjectIdentifier::from_slice(OID_DATA));
                    w.next()
                        .write_tagged(Tag::context(0), |w| w.write_bytes(&[0x30, 0x00]));
                });
            })
        });
        let contents = parse_pfx(&data, PASSWORD).unwrap();
        assert!(contents.keys.is_empty());
        assert!(contents.certificates.is_empty());
        assert!(!contents.mac_verified);
    }
}
