//! PKCS#12 to PEM conversion
//!
//! [`convert`] turns container bytes and a password into a
//! [`CredentialBundle`]: one unencrypted private key, the leaf certificate
//! that pairs with it, and the remaining certificates as the chain. It never
//! touches the filesystem; writing the artifacts is the operator's job.

use crate::cert_ops::key_match::{self, DerivedPublicKey};
use crate::pkcs12::{self, CertEntry, KeyEntry, Pkcs12Contents};
use crate::utils::{ConvertError, KeyMatchError, Pkcs12Error};
use serde::Serialize;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// PEM block label for an unencrypted PKCS#8 key
const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Which output file a PEM artifact belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    PrivateKey,
    Certificate,
    Chain,
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactRole::PrivateKey => write!(f, "private key"),
            ArtifactRole::Certificate => write!(f, "certificate"),
            ArtifactRole::Chain => write!(f, "certificate chain"),
        }
    }
}

/// One text artifact derived from a bundle field
#[derive(Clone, Copy)]
pub struct PemArtifact<'a> {
    pub role: ArtifactRole,
    pub contents: &'a [u8],
}

impl std::fmt::Debug for PemArtifact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PemArtifact")
            .field("role", &self.role)
            .field("len", &self.contents.len())
            .finish()
    }
}

/// The decrypted contents of a container, already PEM-encoded
pub struct CredentialBundle {
    key_pem: Zeroizing<Vec<u8>>,
    cert_pem: Vec<u8>,
    chain_pem: Vec<u8>,
    chain_len: usize,
    key_algorithm: String,
    leaf_subject: String,
}

impl CredentialBundle {
    /// Unencrypted PKCS#8 `PRIVATE KEY` block
    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }

    /// Leaf `CERTIFICATE` block
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    /// Chain blocks in container order; empty when there are no intermediates
    pub fn chain_pem(&self) -> &[u8] {
        &self.chain_pem
    }

    pub fn chain_len(&self) -> usize {
        self.chain_len
    }

    pub fn key_algorithm(&self) -> &str {
        &self.key_algorithm
    }

    pub fn leaf_subject(&self) -> &str {
        &self.leaf_subject
    }

    /// The three artifacts, key first
    pub fn artifacts(&self) -> [PemArtifact<'_>; 3] {
        [
            PemArtifact {
                role: ArtifactRole::PrivateKey,
                contents: self.key_pem(),
            },
            PemArtifact {
                role: ArtifactRole::Certificate,
                contents: self.cert_pem(),
            },
            PemArtifact {
                role: ArtifactRole::Chain,
                contents: self.chain_pem(),
            },
        ]
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("key_pem", &"<redacted>")
            .field("leaf_subject", &self.leaf_subject)
            .field("key_algorithm", &self.key_algorithm)
            .field("chain_len", &self.chain_len)
            .finish()
    }
}

/// Convert PKCS#12 container bytes into a [`CredentialBundle`]
pub fn convert(container: &[u8], password: &str) -> Result<CredentialBundle, ConvertError> {
    let contents = pkcs12::parse_pfx(container, password).map_err(classify_reader_error)?;
    debug!(
        keys = contents.keys.len(),
        certificates = contents.certificates.len(),
        mac_verified = contents.mac_verified,
        "container decoded"
    );
    bundle_from_contents(contents)
}

/// Maps reader failures onto the converter taxonomy.
///
/// A structure error behind a verified MAC means the container really is
/// malformed; without a MAC it is indistinguishable from a wrong key.
fn classify_reader_error(err: Pkcs12Error) -> ConvertError {
    match err {
        Pkcs12Error::Framing { .. } | Pkcs12Error::UnsupportedVersion { .. } => {
            ConvertError::MalformedContainer {
                reason: err.to_string(),
            }
        }
        Pkcs12Error::Structure {
            authenticated: true,
            ..
        } => ConvertError::MalformedContainer {
            reason: err.to_string(),
        },
        Pkcs12Error::MacMismatch
        | Pkcs12Error::Decryption { .. }
        | Pkcs12Error::Structure { .. } => ConvertError::AuthenticationOrCorruption { source: err },
        Pkcs12Error::UnsupportedAlgorithm { .. } => ConvertError::unexpected(err),
    }
}

/// How the bundle's key is recognised among the certificates
enum KeyIdentity {
    Spki(DerivedPublicKey),
    Opaque(KeyMatchError),
}

fn bundle_from_contents(contents: Pkcs12Contents) -> Result<CredentialBundle, ConvertError> {
    let Pkcs12Contents {
        keys,
        certificates,
        mac_verified,
    } = contents;

    let mut keys = keys.into_iter();
    let key = keys.next().ok_or_else(|| ConvertError::IncompleteBundle {
        reason: "container holds no private key".to_string(),
    })?;
    let ignored = keys.count();
    if ignored > 0 {
        warn!(ignored, "container holds more than one private key; using the first");
    }

    if certificates.is_empty() {
        return Err(ConvertError::IncompleteBundle {
            reason: "container holds no certificates".to_string(),
        });
    }

    let identity = match key_match::public_key_of(&key.pkcs8) {
        Ok(derived) => KeyIdentity::Spki(derived),
        Err(e @ KeyMatchError::UnsupportedKeyAlgorithm { .. }) => {
            debug!(error = %e, "falling back to localKeyId pairing");
            KeyIdentity::Opaque(e)
        }
        Err(e) if mac_verified => return Err(ConvertError::unexpected(e)),
        Err(_) => {
            return Err(ConvertError::AuthenticationOrCorruption {
                source: Pkcs12Error::invalid("decrypted private key"),
            })
        }
    };

    let leaf_index = find_leaf(&key, &identity, &certificates)?;
    debug!(
        leaf_index,
        chain_len = certificates.len() - 1,
        "selected leaf certificate"
    );

    let leaf = &certificates[leaf_index];
    let leaf_subject = key_match::parse_certificate(&leaf.der)
        .map(|cert| cert.subject().to_string())
        .map_err(ConvertError::unexpected)?;

    let chain_pem: Vec<u8> = certificates
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != leaf_index)
        .flat_map(|(_, cert)| encode_pem(CERTIFICATE_TAG, &cert.der))
        .collect();

    Ok(CredentialBundle {
        key_pem: Zeroizing::new(encode_pem(PRIVATE_KEY_TAG, &key.pkcs8)),
        cert_pem: encode_pem(CERTIFICATE_TAG, &leaf.der),
        chain_pem,
        chain_len: certificates.len() - 1,
        key_algorithm: match identity {
            KeyIdentity::Spki(derived) => derived.algorithm,
            KeyIdentity::Opaque(_) => "unrecognised".to_string(),
        },
        leaf_subject,
    })
}

/// Picks the certificate that pairs with the key.
///
/// Every certificate is parsed as X.509 first, so an unreadable bag is
/// reported even when it would not have been the leaf.
fn find_leaf(
    key: &KeyEntry,
    identity: &KeyIdentity,
    certificates: &[CertEntry],
) -> Result<usize, ConvertError> {
    let mut leaf = None;
    for (index, cert) in certificates.iter().enumerate() {
        let matches = match identity {
            KeyIdentity::Spki(derived) => key_match::cert_matches(&cert.der, &derived.spki),
            KeyIdentity::Opaque(_) => key_match::parse_certificate(&cert.der).map(|_| false),
        }
        .map_err(ConvertError::unexpected)?;
        if matches && leaf.is_none() {
            leaf = Some(index);
        }
    }

    match (leaf, identity) {
        (Some(index), _) => Ok(index),
        (None, KeyIdentity::Spki(_)) => Err(ConvertError::IncompleteBundle {
            reason: "no certificate matches the private key".to_string(),
        }),
        (None, KeyIdentity::Opaque(unsupported)) => {
            let paired = key.attributes.local_key_id.as_deref().and_then(|key_id| {
                certificates
                    .iter()
                    .position(|cert| cert.attributes.local_key_id.as_deref() == Some(key_id))
            });
            paired.ok_or_else(|| ConvertError::UnexpectedFailure {
                source: unsupported.to_string().into(),
            })
        }
    }
}

/// PEM with LF line endings and 64-column base64 lines
pub fn encode_pem(tag: &str, der: &[u8]) -> Vec<u8> {
    let block = ::pem::Pem::new(tag, der.to_vec());
    ::pem::encode_config(
        &block,
        ::pem::EncodeConfig::new().set_line_ending(::pem::LineEnding::LF),
    )
    .into_bytes()
}
