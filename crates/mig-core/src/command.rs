//! Routing string parsing.
//!
//! A routing string has the form `domain/address/command[/opt1/.../optN]`.
//! Each segment is percent-escaped by the sender so that it may embed `/`.

use std::borrow::Cow;
use std::fmt;
use tracing::warn;

/// First segment that marks a request for static content rather than an API call.
pub const STATIC_CONTENT_PREFIX: &str = "html";

/// A command parsed from a routing string.
///
/// Parsing is best effort and never fails: a string that cannot be parsed
/// yields a command with empty structured fields, and the original string is
/// always kept for fallback matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    domain: String,
    address: String,
    command: String,
    options: Vec<String>,
    original: String,
    static_request: bool,
}

impl Command {
    /// Parse a routing string.
    pub fn parse(request: impl Into<String>) -> Self {
        let original = request.into();
        let mut parsed = Self {
            original,
            ..Default::default()
        };

        let trimmed = parsed.original.trim_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();

        if segments.len() < 2 {
            if !trimmed.is_empty() {
                warn!(request = %parsed.original, "unparsable routing string");
            }
            return parsed;
        }

        if segments[0] == STATIC_CONTENT_PREFIX {
            parsed.static_request = true;
            return parsed;
        }

        parsed.domain = segments[0].to_string();
        parsed.address = segments[1].to_string();
        if let Some(command) = segments.get(2) {
            parsed.command = command.to_string();
        }
        parsed.options = segments.iter().skip(3).map(|s| s.to_string()).collect();

        parsed
    }

    /// Command domain (segment 0).
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Target address (segment 1).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Command name (segment 2).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The unparsed routing string as received.
    pub fn original_request(&self) -> &str {
        &self.original
    }

    /// Whether the routing string addressed static content.
    pub fn is_static_request(&self) -> bool {
        self.static_request
    }

    /// Whether the routing string yielded at least a domain and an address.
    pub fn is_valid(&self) -> bool {
        !self.domain.is_empty() && !self.address.is_empty()
    }

    /// Number of option segments.
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// Percent-decoded option at `index`, or an empty string when out of range.
    ///
    /// Decoding happens on each call; options that are never read are never decoded.
    pub fn option(&self, index: usize) -> Cow<'_, str> {
        let Some(raw) = self.options.get(index) else {
            return Cow::Borrowed("");
        };
        match urlencoding::decode(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(option = %raw, error = %e, "failed to decode command option");
                Cow::Borrowed(raw.as_str())
            }
        }
    }

    /// Option at `index` exactly as received.
    pub fn option_raw(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }

    /// Raw options from `start` onwards joined with `/`.
    pub fn options_from(&self, start: usize) -> String {
        self.options
            .iter()
            .skip(start)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The `domain/address/command` routing key used for exact handler lookup.
    pub fn routing_key(&self) -> String {
        format!("{}/{}/{}", self.domain, self.address, self.command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command() {
        let cmd = Command::parse("HomeAutomation.X10/A1/Control.Level/50/fast");
        assert_eq!(cmd.domain(), "HomeAutomation.X10");
        assert_eq!(cmd.address(), "A1");
        assert_eq!(cmd.command(), "Control.Level");
        assert_eq!(cmd.option_count(), 2);
        assert_eq!(cmd.option(0), "50");
        assert_eq!(cmd.option(1), "fast");
        assert!(cmd.is_valid());
    }

    #[test]
    fn test_parse_trims_separators() {
        let cmd = Command::parse("/Media.Player/1/Play/");
        assert_eq!(cmd.domain(), "Media.Player");
        assert_eq!(cmd.address(), "1");
        assert_eq!(cmd.command(), "Play");
        assert_eq!(cmd.option_count(), 0);
        assert_eq!(cmd.original_request(), "/Media.Player/1/Play/");
    }

    #[test]
    fn test_rejoin_reconstructs_structure() {
        let input = "Dom.Ain/addr/Cmd.Do/o1/o%2F2/o3";
        let cmd = Command::parse(input);
        let mut parts = vec![
            cmd.domain().to_string(),
            cmd.address().to_string(),
            cmd.command().to_string(),
        ];
        for i in 0..cmd.option_count() {
            parts.push(cmd.option_raw(i).unwrap().to_string());
        }
        assert_eq!(parts.join("/"), input);
        assert_eq!(Command::parse(parts.join("/")), cmd);
    }

    #[test]
    fn test_single_segment_is_unparsable() {
        let cmd = Command::parse("Lonely");
        assert!(cmd.domain().is_empty());
        assert!(cmd.address().is_empty());
        assert!(!cmd.is_valid());
        assert_eq!(cmd.original_request(), "Lonely");
    }

    #[test]
    fn test_two_segments_have_no_command() {
        let cmd = Command::parse("Dom/addr");
        assert_eq!(cmd.domain(), "Dom");
        assert_eq!(cmd.address(), "addr");
        assert!(cmd.command().is_empty());
    }

    #[test]
    fn test_static_request_short_circuits() {
        let cmd = Command::parse("html/pages/index.html");
        assert!(cmd.is_static_request());
        assert!(cmd.domain().is_empty());
        assert_eq!(cmd.original_request(), "html/pages/index.html");
    }

    #[test]
    fn test_option_decoding_is_lazy_and_lossless() {
        let cmd = Command::parse("Dom/addr/Cmd/hello%20world/a%2Fb/%E0%A4%A");
        assert_eq!(cmd.option_raw(0), Some("hello%20world"));
        assert_eq!(cmd.option(0), "hello world");
        assert_eq!(cmd.option(1), "a/b");
        // Invalid UTF-8 after decoding falls back to the raw segment
        assert_eq!(cmd.option(2), "%E0%A4%A");
        assert_eq!(cmd.option(9), "");
    }

    #[test]
    fn test_options_from_and_routing_key() {
        let cmd = Command::parse("MIGService.Interfaces/X10/Options.Set/Port/%2Fdev%2FttyUSB0");
        assert_eq!(cmd.routing_key(), "MIGService.Interfaces/X10/Options.Set");
        assert_eq!(cmd.options_from(1), "%2Fdev%2FttyUSB0");
        assert_eq!(cmd.option(1), "/dev/ttyUSB0");
    }
}
