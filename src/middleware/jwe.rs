//! Encrypted session cookies.
//!
//! The identity layer stores its session as a compact JWE with direct key
//! agreement (`alg: dir`) and AES-256-GCM content encryption. The content
//! key is derived from the shared auth secret with HKDF-SHA256.
//!
//! Compact form: `header.encrypted_key.iv.ciphertext.tag`, base64url
//! without padding. With `dir` the encrypted key segment is empty, and the
//! ASCII of the header segment is the additional authenticated data.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::middleware::token::{TokenVerifier, VerifyError};
use crate::models::session::SessionToken;

type HmacSha256 = Hmac<Sha256>;

/// HKDF `info` the identity layer uses for its session encryption key.
pub const SESSION_KEY_INFO: &str = "NextAuth.js Generated Encryption Key";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
    #[serde(default)]
    zip: Option<String>,
}

fn hmac_sha256(key: &[u8], msg: &[&[u8]]) -> Zeroizing<Vec<u8>> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    for part in msg {
        mac.update(part);
    }
    Zeroizing::new(mac.finalize().into_bytes().to_vec())
}

/// HKDF-SHA256 (RFC 5869) for a single 32-byte output block.
/// extract: PRK = HMAC(salt, ikm), expand: T(1) = HMAC(PRK, info || 0x01).
pub fn derive_encryption_key(secret: &[u8], salt: &[u8], info: &[u8]) -> Zeroizing<[u8; 32]> {
    let prk = hmac_sha256(salt, &[secret]);
    let block = hmac_sha256(&prk, &[info, &[1u8][..]]);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&block[..32]);
    key
}

/// Decrypts `dir` + `A256GCM` session cookies and checks `exp`.
pub struct JweVerifier {
    cipher: Aes256Gcm,
}

impl JweVerifier {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Key derived the way the identity layer derives it from the shared
    /// secret (empty salt, [`SESSION_KEY_INFO`]).
    pub fn from_secret(secret: &[u8]) -> Self {
        let key = derive_encryption_key(secret, b"", SESSION_KEY_INFO.as_bytes());
        Self::new(&key)
    }

    fn decrypt(&self, raw: &str) -> Result<Vec<u8>, VerifyError> {
        let parts: Vec<&str> = raw.split('.').collect();
        let [header_b64, encrypted_key, iv, ciphertext, tag] = parts[..] else {
            return Err(VerifyError::Malformed);
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| VerifyError::Malformed)?;
        let header: ProtectedHeader =
            serde_json::from_slice(&header_json).map_err(|_| VerifyError::Malformed)?;
        if header.alg != "dir" || !encrypted_key.is_empty() {
            return Err(VerifyError::Unsupported(format!("alg {}", header.alg)));
        }
        if header.enc != "A256GCM" {
            return Err(VerifyError::Unsupported(format!("enc {}", header.enc)));
        }
        if let Some(zip) = header.zip {
            return Err(VerifyError::Unsupported(format!("zip {}", zip)));
        }

        let iv = URL_SAFE_NO_PAD.decode(iv).map_err(|_| VerifyError::Malformed)?;
        let mut sealed = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|_| VerifyError::Malformed)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| VerifyError::Malformed)?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(VerifyError::Malformed);
        }
        sealed.extend_from_slice(&tag);

        self.cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|_| VerifyError::Undecryptable)
    }
}

#[async_trait]
impl TokenVerifier for JweVerifier {
    async fn verify(&self, raw: &str) -> Result<SessionToken, VerifyError> {
        let plaintext = Zeroizing::new(self.decrypt(raw)?);
        let token: SessionToken =
            serde_json::from_slice(&plaintext).map_err(|_| VerifyError::Malformed)?;
        if token.exp < chrono::Utc::now().timestamp() {
            return Err(VerifyError::Expired);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &[u8] = b"unit-test-secret";

    fn seal(claims: &serde_json::Value, key: &[u8; 32], header: &serde_json::Value) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let iv = [7u8; IV_LEN];
        let cipher = Aes256Gcm::new(key.into());
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: claims.to_string().as_bytes(),
                    aad: header_b64.as_bytes(),
                },
            )
            .unwrap();
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        format!(
            "{}..{}.{}.{}",
            header_b64,
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(ciphertext),
            URL_SAFE_NO_PAD.encode(tag)
        )
    }

    fn encrypt(claims: serde_json::Value, secret: &[u8]) -> String {
        let key = derive_encryption_key(secret, b"", SESSION_KEY_INFO.as_bytes());
        seal(&claims, &key, &json!({"alg": "dir", "enc": "A256GCM"}))
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_hkdf_matches_rfc5869_case_1() {
        // RFC 5869 A.1, first 32 bytes of OKM
        let ikm = [0x0bu8; 22];
        let salt: Vec<u8> = (0x00u8..=0x0c).collect();
        let info: Vec<u8> = (0xf0u8..=0xf9).collect();
        let key = derive_encryption_key(&ikm, &salt, &info);
        let expected = [
            0x3c, 0xb2, 0x5f, 0x25, 0xfa, 0xac, 0xd5, 0x7a, 0x90, 0x43, 0x4f, 0x64, 0xd0, 0x36,
            0x2f, 0x2a, 0x2d, 0x2d, 0x0a, 0x90, 0xcf, 0x1a, 0x5a, 0x4c, 0x5d, 0xb0, 0x2d, 0x56,
            0xec, 0xc4, 0xc5, 0xbf,
        ];
        assert_eq!(*key, expected);
    }

    #[tokio::test]
    async fn test_decrypts_valid_session() {
        let raw = encrypt(
            json!({"sub": "u1", "accessToken": "at", "exp": future_exp(), "jti": "abc"}),
            SECRET,
        );
        let token = JweVerifier::from_secret(SECRET).verify(&raw).await.unwrap();
        assert_eq!(token.sub.as_deref(), Some("u1"));
        assert_eq!(token.access_token.as_deref(), Some("at"));
    }

    #[tokio::test]
    async fn test_wrong_secret_is_undecryptable() {
        let raw = encrypt(json!({"sub": "u1", "exp": future_exp()}), b"other-secret");
        let err = JweVerifier::from_secret(SECRET).verify(&raw).await.unwrap_err();
        assert!(matches!(err, VerifyError::Undecryptable));
    }

    #[tokio::test]
    async fn test_tampered_header_is_undecryptable() {
        let raw = encrypt(json!({"sub": "u1", "exp": future_exp()}), SECRET);
        let (_, rest) = raw.split_once('.').unwrap();
        let forged = URL_SAFE_NO_PAD.encode(r#"{"enc":"A256GCM","alg":"dir"}"#);
        let err = JweVerifier::from_secret(SECRET)
            .verify(&format!("{}.{}", forged, rest))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Undecryptable));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let raw = encrypt(json!({"sub": "u1", "exp": 1_000_000_000}), SECRET);
        let err = JweVerifier::from_secret(SECRET).verify(&raw).await.unwrap_err();
        assert!(matches!(err, VerifyError::Expired));
    }

    #[tokio::test]
    async fn test_other_content_encryption_is_unsupported() {
        let key = derive_encryption_key(SECRET, b"", SESSION_KEY_INFO.as_bytes());
        let raw = seal(
            &json!({"sub": "u1", "exp": future_exp()}),
            &key,
            &json!({"alg": "dir", "enc": "A256CBC-HS512"}),
        );
        let err = JweVerifier::from_secret(SECRET).verify(&raw).await.unwrap_err();
        assert!(matches!(err, VerifyError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_signed_token_is_malformed_here() {
        let err = JweVerifier::from_secret(SECRET)
            .verify("eyJhbGciOiJIUzI1NiJ9.e30.sig")
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Malformed));
    }
}
