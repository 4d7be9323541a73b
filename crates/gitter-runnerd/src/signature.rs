//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("webhook secret cannot key HMAC-SHA256")]
    InvalidKey,
}

fn mac(secret: &[u8], body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(mac)
}

/// Header value GitHub would send for `body`: `sha256=<lowercase hex>`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac(secret, body)?.finalize().into_bytes();
    Ok(format!("{PREFIX}{}", hex::encode(digest)))
}

/// Check `header` against the HMAC of `body`, in constant time.
pub fn verify(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let digest = header
        .trim()
        .strip_prefix(PREFIX)
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;
    mac(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // Example from GitHub's webhook validation docs.
        assert_eq!(
            sign(b"It's a Secret to Everybody", b"Hello, World!").unwrap(),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_accepts_own_signature() {
        let header = sign(b"s3cret", b"{}").unwrap();
        assert_eq!(verify(b"s3cret", b"{}", Some(&header)), Ok(()));
    }

    #[test]
    fn test_rejections() {
        let header = sign(b"s3cret", b"{}").unwrap();
        assert_eq!(verify(b"s3cret", b"{}", None), Err(SignatureError::Missing));
        assert_eq!(
            verify(b"s3cret", b"{}", Some("sha1=abcd")),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(b"s3cret", b"{}", Some("sha256=zz")),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(b"other", b"{}", Some(&header)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify(b"s3cret", b"{ }", Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }
}
