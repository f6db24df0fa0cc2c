//! Signed visitor identity cookie.
//!
//! A visitor id is 16 random bytes, URL-safe base64 encoded. The cookie value
//! is `<id>.<signature>` where the signature is an HMAC-SHA256 of the id.

use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Visitor resolved for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
    pub id: String,
    /// True when the id was minted for this request and the cookie must be set
    pub fresh: bool,
}

pub struct VisitorSigner {
    key: Vec<u8>,
    cookie_name: String,
}

impl VisitorSigner {
    /// Create a signer. Without a secret a random key is generated, so
    /// cookies issued by this process won't verify after a restart.
    pub fn new(secret: Option<&str>, cookie_name: impl Into<String>) -> Self {
        let key = match secret {
            Some(s) => s.as_bytes().to_vec(),
            None => {
                tracing::warn!("VISITOR_SECRET not set, visitor cookies will not survive restarts");
                rand::random::<[u8; 32]>().to_vec()
            }
        };

        Self {
            key,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Generate a new visitor id
    pub fn mint_id() -> String {
        BASE64_URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>())
    }

    fn mac(&self, id: &str) -> Result<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
        mac.update(id.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Produce the signed cookie value for a visitor id
    pub fn sign(&self, id: &str) -> Result<String> {
        let signature = BASE64_URL_SAFE_NO_PAD.encode(self.mac(id)?);
        Ok(format!("{}.{}", id, signature))
    }

    /// Verify a signed cookie value and return the visitor id
    pub fn verify(&self, signed: &str) -> Result<String> {
        let (id, signature_b64) = signed
            .rsplit_once('.')
            .ok_or_else(|| anyhow!("Invalid visitor cookie format"))?;

        if id.is_empty() {
            return Err(anyhow!("Empty visitor id"));
        }

        let provided = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| anyhow!("Invalid visitor cookie signature encoding"))?;
        let expected = self.mac(id)?;

        if expected.ct_eq(&provided[..]).into() {
            Ok(id.to_string())
        } else {
            Err(anyhow!("Visitor cookie signature verification failed"))
        }
    }

    /// Resolve the visitor from a `Cookie` header, minting a fresh id when the
    /// cookie is absent or fails verification.
    pub fn resolve(&self, cookie_header: Option<&str>) -> Visitor {
        let signed = cookie_header.and_then(|header| {
            header.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == self.cookie_name).then_some(value)
            })
        });

        if let Some(signed) = signed {
            match self.verify(signed) {
                Ok(id) => return Visitor { id, fresh: false },
                Err(e) => tracing::warn!(error = %e, "rejecting visitor cookie"),
            }
        }

        Visitor {
            id: Self::mint_id(),
            fresh: true,
        }
    }

    /// `Set-Cookie` header value carrying the signed id
    pub fn set_cookie(&self, id: &str) -> Result<String> {
        Ok(format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name,
            self.sign(id)?
        ))
    }
}
