use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature header was absent, or not of the
    /// `<algorithm>=<hexdigest>` shape with a supported algorithm.
    #[error("signature header missing or malformed")]
    MissingSignature,
    #[error("signature does not match request body")]
    SignatureMismatch,
}

/// Verify a webhook delivery against the account's shared secret.
///
/// An empty secret disables verification entirely (unsecured mode); the
/// header is not even inspected. Otherwise the header must carry an
/// `<algorithm>=<hexdigest>` signature, and the digest must equal the HMAC
/// of `body` under `secret` with the declared algorithm.
///
/// `body` must be the raw request bytes as received on the wire. The MAC is
/// sensitive to the exact byte representation, so callers must buffer the
/// body before any JSON decoding and pass the same buffer here.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Ok(());
    }
    let header = header.ok_or(SignatureError::MissingSignature)?;
    let (algorithm, digest) = header.split_once('=').ok_or(SignatureError::MissingSignature)?;
    let digest = hex::decode(digest).map_err(|_| SignatureError::MissingSignature)?;
    // verify_slice compares in constant time
    let matches = match algorithm {
        "sha1" => {
            let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(body);
            mac.verify_slice(&digest).is_ok()
        }
        "sha256" => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(body);
            mac.verify_slice(&digest).is_ok()
        }
        _ => return Err(SignatureError::MissingSignature),
    };
    if matches { Ok(()) } else { Err(SignatureError::SignatureMismatch) }
}

/// Compute the `sha1=<hexdigest>` header value for a payload.
pub fn sign_sha1(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Compute the `sha256=<hexdigest>` header value for a payload.
pub fn sign_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
