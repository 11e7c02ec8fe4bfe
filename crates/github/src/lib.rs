//! Webhook protocol support: payload shapes, signature verification, and
//! event classification. Everything in this crate is a pure function of the
//! request; all I/O stays with the caller.

pub mod event;
pub mod signature;

/// Header naming the event kind ("push", "pull_request", ...).
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Legacy signature header, `sha1=<hexdigest>`.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Current signature header, `sha256=<hexdigest>`.
pub const SIGNATURE_HEADER_SHA256: &str = "X-Hub-Signature-256";
