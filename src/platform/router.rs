//! # Platform Router
//!
//! Maps a target URL to the AI platform it belongs to. Detection is total:
//! anything that matches no known platform, including strings that do not
//! parse as URLs, resolves to [`PlatformId::GenericWeb`].
//!
//! Matching order:
//! 1. hostname equal to, or a subdomain of, a platform's known domain
//! 2. regex match of the full URL against the platform's patterns
//! 3. `generic-web`

use crate::models::BackendSpecialization;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// Known automation target platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformId {
    #[serde(rename = "chatgpt")]
    ChatGpt,
    Claude,
    Gemini,
    Perplexity,
    Lovable,
    GenericWeb,
}

impl PlatformId {
    pub const ALL: [PlatformId; 6] = [
        PlatformId::ChatGpt,
        PlatformId::Claude,
        PlatformId::Gemini,
        PlatformId::Perplexity,
        PlatformId::Lovable,
        PlatformId::GenericWeb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Perplexity => "perplexity",
            Self::Lovable => "lovable",
            Self::GenericWeb => "generic-web",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
            Self::Perplexity => "Perplexity",
            Self::Lovable => "Lovable",
            Self::GenericWeb => "Generic Web Platform",
        }
    }

    /// Backend specialization this platform is routed to first
    pub fn preferred_specialization(&self) -> BackendSpecialization {
        match self {
            Self::ChatGpt | Self::Claude | Self::Lovable => BackendSpecialization::Python,
            Self::Gemini | Self::Perplexity | Self::GenericWeb => BackendSpecialization::Nodejs,
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|platform| platform.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown platform: {s}"))
    }
}

struct PlatformRule {
    platform: PlatformId,
    domains: &'static [&'static str],
    patterns: Vec<Regex>,
}

fn routing_table() -> &'static [PlatformRule] {
    static TABLE: OnceLock<Vec<PlatformRule>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let rule = |platform: PlatformId,
                    domains: &'static [&'static str],
                    patterns: &[&str]| PlatformRule {
            platform,
            domains,
            // Patterns are literals; an invalid one is skipped rather than panicking
            patterns: patterns.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        };

        vec![
            rule(
                PlatformId::ChatGpt,
                &["chat.openai.com", "chatgpt.com"],
                &[
                    r"^https?://(chat\.)?openai\.com(?:[:/?#]|$)",
                    r"^https?://(www\.)?chatgpt\.com(?:[:/?#]|$)",
                ],
            ),
            rule(
                PlatformId::Claude,
                &["claude.ai"],
                &[r"^https?://(www\.)?claude\.ai(?:[:/?#]|$)"],
            ),
            rule(
                PlatformId::Gemini,
                &["gemini.google.com", "bard.google.com"],
                &[r"^https?://(gemini|bard)\.google\.com(?:[:/?#]|$)"],
            ),
            rule(
                PlatformId::Perplexity,
                &["perplexity.ai"],
                &[r"^https?://(www\.)?perplexity\.ai(?:[:/?#]|$)"],
            ),
            rule(
                PlatformId::Lovable,
                &["lovable.dev", "lovable.app"],
                &[
                    r"^https?://[^/]*\.lovable\.(dev|app)(?:[:/?#]|$)",
                    r"^https?://lovable\.(dev|app)(?:[:/?#]|$)",
                ],
            ),
        ]
    })
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Resolve the platform for a target URL. Never fails.
pub fn detect_platform(target: &str) -> PlatformId {
    let Ok(url) = Url::parse(target.trim()) else {
        return PlatformId::GenericWeb;
    };

    if let Some(host) = url.host_str() {
        let host = host.to_ascii_lowercase();
        if let Some(rule) = routing_table()
            .iter()
            .find(|rule| rule.domains.iter().any(|domain| host_matches(&host, domain)))
        {
            return rule.platform;
        }
    }

    let normalized = url.as_str();
    routing_table()
        .iter()
        .find(|rule| rule.patterns.iter().any(|pattern| pattern.is_match(normalized)))
        .map(|rule| rule.platform)
        .unwrap_or(PlatformId::GenericWeb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_domains() {
        assert_eq!(detect_platform("https://chat.openai.com/c/123"), PlatformId::ChatGpt);
        assert_eq!(detect_platform("https://chatgpt.com/"), PlatformId::ChatGpt);
        assert_eq!(detect_platform("https://claude.ai/new"), PlatformId::Claude);
        assert_eq!(detect_platform("https://gemini.google.com/app"), PlatformId::Gemini);
        assert_eq!(detect_platform("https://bard.google.com"), PlatformId::Gemini);
        assert_eq!(detect_platform("https://perplexity.ai/search"), PlatformId::Perplexity);
        assert_eq!(detect_platform("https://lovable.dev/projects/1"), PlatformId::Lovable);
    }

    #[test]
    fn test_subdomains_and_case() {
        assert_eq!(detect_platform("https://www.perplexity.ai"), PlatformId::Perplexity);
        assert_eq!(detect_platform("https://my-app.lovable.app/"), PlatformId::Lovable);
        assert_eq!(detect_platform("HTTPS://CLAUDE.AI/chat"), PlatformId::Claude);
    }

    #[test]
    fn test_lookalike_domains_do_not_match() {
        assert_eq!(detect_platform("https://notclaude.ai"), PlatformId::GenericWeb);
        assert_eq!(detect_platform("https://claude.ai.evil.com"), PlatformId::GenericWeb);
    }

    #[test]
    fn test_pattern_fallback() {
        // openai.com root is only covered by the regex, not the domain list
        assert_eq!(detect_platform("https://openai.com/chat"), PlatformId::ChatGpt);
    }

    #[test]
    fn test_generic_and_unparsable() {
        assert_eq!(detect_platform("https://example.com"), PlatformId::GenericWeb);
        assert_eq!(detect_platform("not a url"), PlatformId::GenericWeb);
        assert_eq!(detect_platform(""), PlatformId::GenericWeb);
        assert_eq!(detect_platform("/home/me/site"), PlatformId::GenericWeb);
    }

    #[test]
    fn test_platform_metadata() {
        assert_eq!(PlatformId::GenericWeb.to_string(), "generic-web");
        assert_eq!("chatgpt".parse::<PlatformId>().unwrap(), PlatformId::ChatGpt);
        assert_eq!(
            serde_json::to_string(&PlatformId::GenericWeb).unwrap(),
            "\"generic-web\""
        );
        assert_eq!(
            serde_json::to_string(&PlatformId::ChatGpt).unwrap(),
            "\"chatgpt\""
        );
        assert_eq!(PlatformId::Lovable.display_name(), "Lovable");
        assert_eq!(
            PlatformId::Claude.preferred_specialization(),
            BackendSpecialization::Python
        );
        assert_eq!(
            PlatformId::Gemini.preferred_specialization(),
            BackendSpecialization::Nodejs
        );
    }
}
