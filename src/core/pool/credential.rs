use sha2::{Digest, Sha256};

/// Derives the deterministic per-address credential embedded in endpoint URLs.
#[derive(Debug, Clone)]
pub struct CredentialSigner {
    secret: String,
    fallback_identity: String,
    enabled: bool,
}

impl CredentialSigner {
    pub fn new(
        secret: impl Into<String>,
        fallback_identity: impl Into<String>,
        enabled: bool,
    ) -> Self {
        Self {
            secret: secret.into(),
            fallback_identity: fallback_identity.into(),
            enabled,
        }
    }

    /// Userinfo fragment for `address`, formatted `user:pass@`, or the empty
    /// string when credential embedding is disabled. An empty address is
    /// signed with the configured fallback identity instead.
    pub fn credential(&self, address: &str) -> String {
        if !self.enabled {
            return String::new();
        }
        let subject = if address.is_empty() {
            self.fallback_identity.as_str()
        } else {
            address
        };
        let digest = digest32(subject, &self.secret);
        format!("{}:{}@", &digest[..10], &digest[10..])
    }
}

/// 32-hex-character digest of `subject + secret`.
fn digest32(subject: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        use std::fmt::Write;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
