use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse a Discord version from \"{0}\"")]
pub struct VersionParseError(pub String);

/// How two version strings are ordered when checking for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrdering {
    /// Numeric major.minor.patch comparison.
    #[default]
    Semantic,
    /// Plain string comparison of the trimmed version strings.
    Lexicographic,
}

impl VersionOrdering {
    pub fn compare(self, a: &str, b: &str) -> Result<Ordering, VersionParseError> {
        match self {
            VersionOrdering::Semantic => Ok(parse_version(a)?.cmp(&parse_version(b)?)),
            VersionOrdering::Lexicographic => Ok(a.trim().cmp(b.trim())),
        }
    }
}

fn leading_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)").expect("static regex"))
}

fn url_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\d+)\.(\d+)\.(\d+)/").expect("static regex"))
}

fn from_captures(caps: &regex::Captures<'_>, input: &str) -> Result<Version, VersionParseError> {
    let part = |i: usize| -> Result<u64, VersionParseError> {
        caps[i]
            .parse()
            .map_err(|_| VersionParseError(input.to_string()))
    };
    Ok(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Parse the leading `major.minor.patch` of a version string.
///
/// Anything after the third number is ignored, matching how Discord's
/// `build_info.json` is read.
pub fn parse_version(s: &str) -> Result<Version, VersionParseError> {
    let trimmed = s.trim();
    let caps = leading_version_regex()
        .captures(trimmed)
        .ok_or_else(|| VersionParseError(s.to_string()))?;
    from_captures(&caps, s)
}

/// Extract the version from a download URL such as
/// `https://dl.discordapp.net/apps/linux/0.0.45/discord-0.0.45.tar.gz`.
pub fn version_from_download_url(url: &str) -> Result<Version, VersionParseError> {
    let caps = url_version_regex()
        .captures(url)
        .ok_or_else(|| VersionParseError(url.to_string()))?;
    from_captures(&caps, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_info_version() {
        assert_eq!(parse_version("0.0.45").unwrap(), Version::new(0, 0, 45));
        assert_eq!(parse_version(" 1.2.3-beta\n").unwrap(), Version::new(1, 2, 3));
        assert!(parse_version("v1.2").is_err());
    }

    #[test]
    fn extracts_version_from_url() {
        let url = "https://dl.discordapp.net/apps/linux/0.0.71/discord-0.0.71.tar.gz";
        assert_eq!(version_from_download_url(url).unwrap(), Version::new(0, 0, 71));
        assert!(version_from_download_url("https://discord.com/download").is_err());
    }

    #[test]
    fn semantic_ordering_is_numeric() {
        let ord = VersionOrdering::Semantic;
        assert_eq!(ord.compare("0.0.9", "0.0.10").unwrap(), Ordering::Less);
        assert_eq!(ord.compare("0.1.0", "0.1.0").unwrap(), Ordering::Equal);
        assert_eq!(ord.compare("1.0.0", "0.99.99").unwrap(), Ordering::Greater);
    }

    #[test]
    fn lexicographic_ordering_compares_strings() {
        let ord = VersionOrdering::Lexicographic;
        assert_eq!(ord.compare("0.0.9", "0.0.10").unwrap(), Ordering::Greater);
        assert_eq!(ord.compare("anything", "anything").unwrap(), Ordering::Equal);
    }

    #[test]
    fn semantic_ordering_rejects_garbage() {
        assert!(VersionOrdering::Semantic.compare("latest", "0.0.1").is_err());
    }
}
