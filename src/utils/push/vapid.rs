use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::{elliptic_curve::sec1::ToEncodedPoint, pkcs8::EncodePrivateKey, SecretKey};
use serde::{Deserialize, Serialize};

use super::PushError;

/// Lifetime of a signed VAPID token; push services reject anything above 24h
const TOKEN_LIFETIME_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct VapidClaims {
    pub aud: String,
    pub exp: i64,
    pub sub: String,
}

/// Decodes base64url with or without padding, as browsers and key tools disagree
pub(crate) fn decode_b64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim().trim_end_matches('='))
}

/// Signs the per-request `Authorization: vapid` header
pub struct VapidSigner {
    encoding_key: EncodingKey,
    public_key: String,
    subject: String,
}

impl VapidSigner {
    /// Builds a signer from the raw private scalar and the advertised public key.
    ///
    /// Fails if the public key is not the one derived from the private key, so a
    /// mismatched pair is caught at boot rather than by every push service.
    pub fn new(private_key: &str, public_key: &str, subject: &str) -> Result<Self, PushError> {
        let raw = decode_b64url(private_key)
            .map_err(|e| PushError::InvalidVapidKey(format!("private key: {e}")))?;
        let secret = SecretKey::from_slice(&raw)
            .map_err(|_| PushError::InvalidVapidKey("private key is not a P-256 scalar".into()))?;

        let derived = secret.public_key().to_encoded_point(false);
        let advertised = decode_b64url(public_key)
            .map_err(|e| PushError::InvalidVapidKey(format!("public key: {e}")))?;
        if derived.as_bytes() != advertised.as_slice() {
            return Err(PushError::InvalidVapidKey(
                "public key does not match private key".into(),
            ));
        }

        let der = secret
            .to_pkcs8_der()
            .map_err(|e| PushError::InvalidVapidKey(e.to_string()))?;

        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(der.as_bytes()),
            public_key: URL_SAFE_NO_PAD.encode(derived.as_bytes()),
            subject: subject.to_owned(),
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Header value authorizing a request to `endpoint`, issued at `now` (unix seconds)
    pub fn authorization(&self, endpoint: &str, now: i64) -> Result<String, PushError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| PushError::InvalidEndpoint(e.to_string()))?;
        let claims = VapidClaims {
            aud: url.origin().ascii_serialization(),
            exp: now + TOKEN_LIFETIME_SECS,
            sub: self.subject.clone(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.encoding_key)?;
        Ok(format!("vapid t={token}, k={}", self.public_key))
    }
}
