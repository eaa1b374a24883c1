//! HMAC-SHA256 signing of webhook deliveries.
//!
//! A webhook registered with a secret receives every delivery with
//!
//! ```text
//! Hub-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{timestamp}.{json_body}", secret)`.
//! Webhooks without a secret are delivered unsigned.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Hub-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for bodies that can be signed with [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A signed body: typed payload, the exact JSON that was signed, the
/// signing timestamp and the raw HMAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Serialize `body` and sign it with the current time.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        Self::new_at(body, key, now)
    }

    fn new_at(body: T, key: &[u8], timestamp: i64) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let signature = sign(&json, timestamp, key);
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Rebuild from a received header and raw body. Does not verify.
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp,
            json: body_json,
            signature,
        })
    }

    /// Verify the HMAC and timestamp freshness, returning the payload.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
            data.as_bytes(),
            self.signature.as_ref(),
        )?;
        check_timestamp(self.timestamp)?;
        Ok(self.body)
    }

    /// `{timestamp}.{base64}` value for [`SIGNATURE_HEADER`].
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

fn sign(json: &str, timestamp: i64, key: &[u8]) -> Box<[u8]> {
    let data = format!("{timestamp}.{json}");
    let signature = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
    );
    signature.as_ref().to_owned().into_boxed_slice()
}

/// Parse `{timestamp}.{base64}` into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Verify and deserialize an incoming signed webhook delivery.
pub fn verify_webhook<T: Signature>(
    signature_header: &str,
    body: &str,
    secret: &[u8],
) -> Result<T, SignatureError> {
    SignedObject::<T>::from_header_and_body(signature_header, body.to_owned())?.verify(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::WebhookPayload;

    fn payload() -> WebhookPayload {
        WebhookPayload::items("hook", vec!["http://hub/channel/a/2024/01/01/00/00/00/000/x".into()])
    }

    #[test]
    fn test_signed_delivery_verifies() {
        let signed = SignedObject::new(payload(), b"secret").unwrap();
        let header = signed.to_header();
        let verified: WebhookPayload = verify_webhook(&header, &signed.json, b"secret").unwrap();
        assert_eq!(verified, payload());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signed = SignedObject::new(payload(), b"secret").unwrap();
        let result = verify_webhook::<WebhookPayload>(&signed.to_header(), &signed.json, b"other");
        assert!(matches!(result, Err(SignatureError::SignatureMismatch)));
    }

    #[test]
    fn test_stale_signature_rejected() {
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 10;
        let signed = SignedObject::new_at(payload(), b"secret", old).unwrap();
        let result = verify_webhook::<WebhookPayload>(&signed.to_header(), &signed.json, b"secret");
        assert!(matches!(result, Err(SignatureError::Expired)));
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            parse_signature_header("no-dot-here"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("123.@@@"),
            Err(SignatureError::InvalidBase64)
        ));
    }
}
