//! Stored password transform shared by configuration tooling and HTTP auth.

/// Default realm for HTTP authentication challenges.
pub const DEFAULT_REALM: &str = "MIG Secure Zone";

/// Lowercase hex MD5 of `input`.
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// One-way transform applied to passwords before they are stored.
///
/// The result equals the HTTP Digest `HA1` value (`MD5(user:realm:password)`),
/// so a single stored secret serves both Basic and Digest authentication.
pub fn password_digest(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{username}:{realm}:{password}"))
}
