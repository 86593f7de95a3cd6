//! Signed pagination cursors for the CRM list endpoints
//!
//! A cursor is `base64(json).base64(hmac_sha256(base64(json)))`. The payload
//! names the last row of the previous page by `(created_at, id)`, which is the
//! list sort key.

use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Position after which the next page starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub created_at: i64,
    pub id: i64,
}

#[derive(Clone)]
pub struct CursorSigner {
    key: Vec<u8>,
}

impl CursorSigner {
    /// Without a secret a random key is generated and cursors do not survive restarts.
    pub fn new(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                tracing::warn!("CURSOR_HMAC_SECRET not set, using an ephemeral cursor key");
                rand::random::<[u8; 32]>().to_vec()
            }
        };
        Self { key }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, data: &CursorData) -> Result<String> {
        let json = serde_json::to_vec(data)?;
        let payload = BASE64_URL_SAFE_NO_PAD.encode(json);
        let signature = self.mac(&payload)?.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            payload,
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    pub fn verify(&self, cursor: &str) -> Result<CursorData> {
        let (payload, signature_b64) = cursor
            .split_once('.')
            .filter(|(_, sig)| !sig.contains('.'))
            .ok_or_else(|| anyhow!("Invalid cursor format"))?;

        let provided = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| anyhow!("Invalid cursor signature encoding"))?;
        let expected = self.mac(payload)?.finalize().into_bytes();

        if !bool::from(expected.as_slice().ct_eq(&provided)) {
            return Err(anyhow!("Cursor signature verification failed"));
        }

        let json = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| anyhow!("Invalid cursor payload encoding"))?;
        serde_json::from_slice(&json).map_err(|_| anyhow!("Invalid cursor data"))
    }
}
