//! PKCS#12 (PFX) container reader
//!
//! Parses the BER-encoded container, verifies its integrity MAC before any
//! decryption, decrypts password-protected safe contents and key bags, and
//! hands back keys and certificates in the order the container holds them.
//! Pure: no I/O, no logging of secret material.

mod kdf;
mod parse;
mod pbe;

pub use parse::parse_pfx;

use zeroize::Zeroizing;

/// Bag attributes retained from the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagAttributes {
    /// `localKeyId` (PKCS#9), pairs a key bag with its certificate
    pub local_key_id: Option<Vec<u8>>,
    /// `friendlyName` (PKCS#9)
    pub friendly_name: Option<String>,
}

/// A decrypted private key bag
pub struct KeyEntry {
    /// Unencrypted PKCS#8 `PrivateKeyInfo`
    pub pkcs8: Zeroizing<Vec<u8>>,
    pub attributes: BagAttributes,
}

impl std::fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEntry")
            .field("pkcs8", &format_args!("<{} bytes redacted>", self.pkcs8.len()))
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// An X.509 certificate bag
#[derive(Debug, Clone)]
pub struct CertEntry {
    /// DER-encoded certificate
    pub der: Vec<u8>,
    pub attributes: BagAttributes,
}

/// Everything extracted from a container
#[derive(Debug)]
pub struct Pkcs12Contents {
    pub keys: Vec<KeyEntry>,
    pub certificates: Vec<CertEntry>,
    /// Whether integrity was established by a verified MAC
    pub mac_verified: bool,
}
