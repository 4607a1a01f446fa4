//! Key derivation and symmetric decryption for PKCS#12 containers
//!
//! Two derivation paths are needed:
//! 1. The PKCS#12 KDF (RFC 7292 Appendix B), used for the integrity MAC key
//!    and for the legacy `pbeWithSHAAnd*` schemes.
//! 2. PBKDF2 (RFC 8018), used by PBES2 and invoked from `pbe.rs`.

use crate::utils::Pkcs12Error;
use cipher::{block_padding::Pkcs7, BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use hmac::digest::core_api::BlockSizeUser;
use hmac::{Mac, SimpleHmac};
use sha2::Digest;
use zeroize::Zeroizing;

/// Diversifier bytes of the PKCS#12 KDF (RFC 7292 B.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfPurpose {
    Key = 1,
    Iv = 2,
    Mac = 3,
}

/// PKCS#12 KDF over the hash `D`.
///
/// `password` must already be in its BMPString form. `u` and `v` are taken
/// from the digest's output and block sizes, so SHA-384/512 use 128-byte blocks.
pub fn derive<D>(
    purpose: KdfPurpose,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Zeroizing<Vec<u8>>
where
    D: Digest + BlockSizeUser,
{
    let u = <D as Digest>::output_size();
    let v = D::block_size();

    let diversifier = vec![purpose as u8; v];
    let mut i_block = Zeroizing::new(Vec::new());
    i_block.extend_from_slice(&fill_to_multiple(salt, v));
    i_block.extend_from_slice(&fill_to_multiple(password, v));

    let blocks = output_len.div_ceil(u);
    let mut out = Zeroizing::new(Vec::with_capacity(blocks * u));

    for index in 0..blocks {
        let mut hasher = D::new();
        Digest::update(&mut hasher, &diversifier);
        Digest::update(&mut hasher, i_block.as_slice());
        let mut a = hasher.finalize();
        for _ in 1..iterations.max(1) {
            a = D::digest(&a);
        }
        out.extend_from_slice(&a);

        if index + 1 < blocks {
            let b = fill_to_multiple(&a, v);
            for chunk in i_block.chunks_mut(v) {
                add_with_carry(chunk, &b);
            }
        }
    }

    out.truncate(output_len);
    out
}

/// Repeats `data` until it fills the smallest multiple of `v` that holds it.
/// Empty input stays empty.
fn fill_to_multiple(data: &[u8], v: usize) -> Zeroizing<Vec<u8>> {
    if data.is_empty() {
        return Zeroizing::new(Vec::new());
    }
    let len = data.len().div_ceil(v) * v;
    Zeroizing::new(data.iter().copied().cycle().take(len).collect())
}

/// `block = (block + b + 1) mod 2^(8v)`
fn add_with_carry(block: &mut [u8], b: &[u8]) {
    let mut carry: u16 = 1;
    for (x, y) in block.iter_mut().rev().zip(b.iter().rev()) {
        let sum = *x as u16 + *y as u16 + carry;
        *x = sum as u8;
        carry = sum >> 8;
    }
}

/// Encodes a password as a NUL-terminated BMPString (UTF-16BE plus `00 00`).
pub fn password_to_bmp(password: &str) -> Zeroizing<Vec<u8>> {
    let mut bmp = Zeroizing::new(Vec::with_capacity(password.len() * 2 + 2));
    for unit in password.encode_utf16() {
        bmp.extend_from_slice(&unit.to_be_bytes());
    }
    bmp.extend_from_slice(&[0, 0]);
    bmp
}

/// Verifies an HMAC tag in constant time.
pub fn hmac_verify<D>(key: &[u8], data: &[u8], expected: &[u8]) -> Result<(), Pkcs12Error>
where
    D: Digest + BlockSizeUser,
{
    let mut mac = <SimpleHmac<D> as KeyInit>::new_from_slice(key)
        .map_err(|_| Pkcs12Error::MacMismatch)?;
    Mac::update(&mut mac, data);
    mac.verify_slice(expected)
        .map_err(|_| Pkcs12Error::MacMismatch)
}

/// CBC decryption with PKCS#7 unpadding.
///
/// Wrong key/IV sizes are a structural problem of the parameters; a padding
/// failure is what a wrong password looks like.
pub fn cbc_decrypt<C>(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    what: &'static str,
) -> Result<Zeroizing<Vec<u8>>, Pkcs12Error>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Pkcs12Error::invalid("cipher parameters"))?;

    let mut buf = Zeroizing::new(ciphertext.to_vec());
    let len = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| Pkcs12Error::Decryption { what })?
        .len();
    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::Sha1;
    use sha2::{Sha256, Sha512};

    #[test]
    fn test_password_to_bmp() {
        assert_eq!(password_to_bmp("").as_slice(), &[0, 0]);
        assert_eq!(password_to_bmp("A").as_slice(), &[0x00, 0x41, 0x00, 0x00]);
        assert_eq!(
            password_to_bmp("é").as_slice(),
            &[0x00, 0xe9, 0x00, 0x00]
        );
    }

    // RFC 7292 test vector as published with OpenSSL's pkcs12 KDF tests:
    // password "smeg", salt 0A58CF64530D823F, ID 1, 1 iteration, SHA-1.
    #[test]
    fn test_kdf_sha1_known_vector() {
        let password = password_to_bmp("smeg");
        let salt = [0x0a, 0x58, 0xcf, 0x64, 0x53, 0x0d, 0x82, 0x3f];
        let key = derive::<Sha1>(KdfPurpose::Key, &password, &salt, 1, 24);
        assert_eq!(
            key.as_slice(),
            &[
                0x8a, 0xaa, 0xe6, 0x29, 0x7b, 0x6c, 0xb0, 0x46, 0x42, 0xab, 0x5b, 0x07, 0x78,
                0x51, 0x28, 0x4e, 0xb7, 0x12, 0x8f, 0x1a, 0x2a, 0x7f, 0xbc, 0xa3,
            ]
        );
    }

    #[test]
    fn test_kdf_is_deterministic_and_purpose_bound() {
        let password = password_to_bmp("test");
        let salt = b"saltsalt";
        let a = derive::<Sha256>(KdfPurpose::Key, &password, salt, 2048, 48);
        let b = derive::<Sha256>(KdfPurpose::Key, &password, salt, 2048, 48);
        let iv = derive::<Sha256>(KdfPurpose::Iv, &password, salt, 2048, 16);
        assert_eq!(a.len(), 48);
        assert_eq!(a, b);
        assert_ne!(&a[..16], iv.as_slice());
    }

    #[test]
    fn test_kdf_wide_block_digest() {
        let password = password_to_bmp("pw");
        let key = derive::<Sha512>(KdfPurpose::Mac, &password, b"salt", 1, 64);
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn test_add_with_carry_wraps() {
        let mut block = [0xff, 0xff];
        add_with_carry(&mut block, &[0x00, 0x00]);
        assert_eq!(block, [0x00, 0x00]);
    }

    #[test]
    fn test_hmac_verify_rejects_wrong_tag() {
        let err = hmac_verify::<Sha256>(b"key", b"data", &[0u8; 32]).unwrap_err();
        assert!(matches!(err, Pkcs12Error::MacMismatch));
    }

    #[test]
    fn test_cbc_decrypt_bad_padding_is_decryption_error() {
        let key = [0x11u8; 16];
        let iv = [0u8; 16];
        // Not a whole number of blocks.
        let result = cbc_decrypt::<aes::Aes128>(&key, &iv, &[0u8; 15], "test");
        assert!(matches!(result, Err(Pkcs12Error::Decryption { .. })));
    }
}
