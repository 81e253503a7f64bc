//! `aes128gcm` content encoding for Web Push messages (RFC 8188 / RFC 8291).

use aes_gcm::{aead::Aead, Aes128Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use p256::{ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use sha2::Sha256;

use super::PushError;

/// Record size advertised in the header. A single record must hold the whole message.
pub(crate) const RECORD_SIZE: u32 = 4096;

const TAG_LEN: usize = 16;
const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";
// Padding delimiter marking the last (and only) record
const LAST_RECORD: u8 = 0x02;

/// Encrypts `payload` for the browser holding `ua_public` / `auth_secret`.
pub fn encrypt(payload: &[u8], ua_public: &[u8], auth_secret: &[u8]) -> Result<Vec<u8>, PushError> {
    let salt: [u8; 16] = rand::random();
    encrypt_with(payload, ua_public, auth_secret, &ephemeral_key(), salt)
}

pub(crate) fn ephemeral_key() -> SecretKey {
    loop {
        let bytes: [u8; 32] = rand::random();
        // Out-of-range scalars are astronomically rare; draw again
        if let Ok(key) = SecretKey::from_slice(&bytes) {
            return key;
        }
    }
}

fn encrypt_with(
    payload: &[u8],
    ua_public: &[u8],
    auth_secret: &[u8],
    as_secret: &SecretKey,
    salt: [u8; 16],
) -> Result<Vec<u8>, PushError> {
    if payload.len() + 1 + TAG_LEN > RECORD_SIZE as usize {
        return Err(PushError::PayloadTooLarge);
    }

    let ua_key =
        PublicKey::from_sec1_bytes(ua_public).map_err(|_| PushError::InvalidSubscriptionKey)?;
    let ua_point = ua_key.to_encoded_point(false);
    let as_point = as_secret.public_key().to_encoded_point(false);
    let shared = diffie_hellman(as_secret.to_nonzero_scalar(), ua_key.as_affine());

    let mut key_info =
        Vec::with_capacity(KEY_INFO_PREFIX.len() + ua_point.len() + as_point.len());
    key_info.extend_from_slice(KEY_INFO_PREFIX);
    key_info.extend_from_slice(ua_point.as_bytes());
    key_info.extend_from_slice(as_point.as_bytes());

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), shared.raw_secret_bytes().as_slice())
        .expand(&key_info, &mut ikm)
        .map_err(|_| PushError::Encryption)?;

    let (cek, nonce) = derive_content_keys(&salt, &ikm)?;

    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    plaintext.push(LAST_RECORD);

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| PushError::Encryption)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| PushError::Encryption)?;

    // salt || rs || idlen || keyid || ciphertext
    let mut body = Vec::with_capacity(16 + 4 + 1 + as_point.len() + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(as_point.len() as u8);
    body.extend_from_slice(as_point.as_bytes());
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

fn derive_content_keys(salt: &[u8], ikm: &[u8]) -> Result<([u8; 16], [u8; 12]), PushError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut cek = [0u8; 16];
    let mut nonce = [0u8; 12];
    hk.expand(CEK_INFO, &mut cek)
        .map_err(|_| PushError::Encryption)?;
    hk.expand(NONCE_INFO, &mut nonce)
        .map_err(|_| PushError::Encryption)?;
    Ok((cek, nonce))
}
