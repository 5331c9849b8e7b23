//! HTTP Basic and Digest authentication.
//!
//! Stored passwords are `MD5(user:realm:password)` hex digests, see
//! [`mig_core::credentials::password_digest`]. The same stored value verifies
//! Basic credentials (by hashing the supplied password) and Digest responses
//! (as the `HA1` term). Nonces are random per challenge and not tracked.
//! The Digest `realm` and `uri` fields are taken as sent: neither is compared
//! with the configured realm or the request path, and `uri` only feeds `HA2`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mig_core::credentials::{md5_hex, password_digest};
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Resolves a user name to its stored password digest.
pub type UserLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Authentication scheme required by the HTTP gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    #[default]
    None,
    Basic,
    Digest,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "digest" => Ok(Self::Digest),
            other => Err(format!("unknown authentication mode '{}'", other)),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::Basic => "Basic",
            Self::Digest => "Digest",
        })
    }
}

/// Verifies `Authorization` headers and builds challenges.
#[derive(Clone)]
pub struct Authenticator {
    mode: AuthMode,
    realm: String,
    users: UserLookup,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("mode", &self.mode)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(mode: AuthMode, realm: impl Into<String>, users: UserLookup) -> Self {
        Self {
            mode,
            realm: realm.into(),
            users,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Whether a request with `authorization` may proceed.
    pub fn verify(&self, method: &str, authorization: Option<&str>) -> bool {
        if self.mode == AuthMode::None {
            return true;
        }
        let Some(header) = authorization else {
            return false;
        };
        let Some((scheme, credentials)) = header.trim().split_once(' ') else {
            return false;
        };

        match (self.mode, scheme.to_ascii_lowercase().as_str()) {
            (AuthMode::Basic, "basic") => self.verify_basic(credentials.trim()),
            (AuthMode::Digest, "digest") => self.verify_digest(method, credentials),
            _ => false,
        }
    }

    /// `WWW-Authenticate` value for a 401 response.
    pub fn challenge(&self) -> String {
        match self.mode {
            AuthMode::Digest => format!(
                r#"Digest realm="{}", qop="auth", nonce="{}", opaque="{}""#,
                self.realm,
                random_hex(),
                random_hex()
            ),
            _ => format!(r#"Basic realm="{}""#, self.realm),
        }
    }

    fn verify_basic(&self, encoded: &str) -> bool {
        let Ok(decoded) = STANDARD.decode(encoded) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((user, password)) = decoded.split_once(':') else {
            return false;
        };
        match (self.users)(user) {
            Some(stored) => password_digest(user, &self.realm, password) == stored,
            None => {
                debug!(user, "basic auth for unknown user");
                false
            }
        }
    }

    fn verify_digest(&self, method: &str, credentials: &str) -> bool {
        let params = parse_digest_params(credentials);
        let field = |name: &str| params.get(name).map(String::as_str);

        let (Some(user), Some(uri), Some(nonce), Some(response)) = (
            field("username"),
            field("uri"),
            field("nonce"),
            field("response"),
        ) else {
            return false;
        };
        let Some(ha1) = (self.users)(user) else {
            debug!(user, "digest auth for unknown user");
            return false;
        };

        let ha2 = md5_hex(&format!("{}:{}", method, uri));
        let expected = match field("qop") {
            Some(qop) => {
                let (Some(nc), Some(cnonce)) = (field("nc"), field("cnonce")) else {
                    return false;
                };
                md5_hex(&format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2))
            }
            None => md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2)),
        };

        expected.eq_ignore_ascii_case(response)
    }
}

/// Parse `key=value, key="quoted, value"` pairs. Keys are lowercased;
/// malformed pairs are skipped.
pub fn parse_digest_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().trim_start_matches(',').trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    value = quoted[..end].to_string();
                    rest = &quoted[end + 1..];
                }
                None => {
                    value = quoted.to_string();
                    rest = "";
                }
            }
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[end..];
        }

        rest = rest.trim_start().trim_start_matches(',').trim_start();
        if !key.is_empty() {
            params.insert(key, value);
        }
    }

    params
}

fn random_hex() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REALM: &str = "testrealm@host.com";

    fn authenticator(mode: AuthMode) -> Authenticator {
        let stored = password_digest("Mufasa", REALM, "Circle Of Life");
        Authenticator::new(
            mode,
            REALM,
            Arc::new(move |user: &str| (user == "Mufasa").then(|| stored.clone())),
        )
    }

    // RFC 2617 section 3.5
    const RFC_HEADER: &str = r#"Digest username="Mufasa", realm="testrealm@host.com", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", uri="/dir/index.html", qop=auth, nc=00000001, cnonce="0a4f113b", response="6629fae49393a05397450978507c4ef1", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    #[test]
    fn test_digest_accepts_rfc_example() {
        assert!(authenticator(AuthMode::Digest).verify("GET", Some(RFC_HEADER)));
    }

    #[test]
    fn test_digest_rejects_single_bit_flip() {
        // '6' (0x36) -> '7' (0x37) in the first response digit
        let tampered = RFC_HEADER.replace(
            "response=\"6629fae4",
            "response=\"7629fae4",
        );
        assert_ne!(tampered, RFC_HEADER);
        assert!(!authenticator(AuthMode::Digest).verify("GET", Some(&tampered)));
        assert!(!authenticator(AuthMode::Digest).verify("POST", Some(RFC_HEADER)));
    }

    #[test]
    fn test_digest_rejects_unknown_user_and_missing_fields() {
        let auth = authenticator(AuthMode::Digest);
        let other = RFC_HEADER.replace("Mufasa", "Scar");
        assert!(!auth.verify("GET", Some(&other)));
        assert!(!auth.verify("GET", Some(r#"Digest username="Mufasa""#)));
        assert!(!auth.verify("GET", None));
    }

    #[test]
    fn test_digest_realm_is_not_compared() {
        // The stored HA1 already fixes the realm
        let other_realm = RFC_HEADER.replace("realm=\"testrealm@host.com\"", "realm=\"elsewhere\"");
        assert!(authenticator(AuthMode::Digest).verify("GET", Some(&other_realm)));
    }

    #[test]
    fn test_basic() {
        let auth = authenticator(AuthMode::Basic);
        let good = format!("Basic {}", STANDARD.encode("Mufasa:Circle Of Life"));
        let bad = format!("Basic {}", STANDARD.encode("Mufasa:circle of life"));
        assert!(auth.verify("GET", Some(&good)));
        assert!(!auth.verify("GET", Some(&bad)));
        assert!(!auth.verify("GET", Some("Basic !!!")));
        assert!(!auth.verify("GET", Some(RFC_HEADER)));
    }

    #[test]
    fn test_none_accepts_everything() {
        assert!(authenticator(AuthMode::None).verify("GET", None));
    }

    #[test]
    fn test_challenges() {
        assert_eq!(
            authenticator(AuthMode::Basic).challenge(),
            r#"Basic realm="testrealm@host.com""#
        );

        let auth = authenticator(AuthMode::Digest);
        let first = parse_digest_params(auth.challenge().trim_start_matches("Digest "));
        let second = parse_digest_params(auth.challenge().trim_start_matches("Digest "));
        assert_eq!(first["realm"], REALM);
        assert_eq!(first["qop"], "auth");
        assert_eq!(first["nonce"].len(), 32);
        assert_ne!(first["nonce"], second["nonce"]);
    }

    #[test]
    fn test_parse_digest_params_is_permissive() {
        let params = parse_digest_params(r#" Username = "a, b" ,nc=01,, qop=auth , broken"#);
        assert_eq!(params["username"], "a, b");
        assert_eq!(params["nc"], "01");
        assert_eq!(params["qop"], "auth");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_auth_mode_parsing() {
        assert_eq!("digest".parse::<AuthMode>().unwrap(), AuthMode::Digest);
        assert_eq!("Basic".parse::<AuthMode>().unwrap(), AuthMode::Basic);
        assert_eq!("".parse::<AuthMode>().unwrap(), AuthMode::None);
        assert!("ntlm".parse::<AuthMode>().is_err());
    }
}
