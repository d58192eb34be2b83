//! Proptest strategies for URL routing.

use proptest::prelude::*;

pub const KNOWN_HOSTS: [&str; 9] = [
    "chat.openai.com",
    "chatgpt.com",
    "claude.ai",
    "gemini.google.com",
    "bard.google.com",
    "perplexity.ai",
    "www.perplexity.ai",
    "lovable.dev",
    "lovable.app",
];

pub fn scheme_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("http"), Just("https")]
}

pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9]{1,8}", 0..4).prop_map(|parts| {
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    })
}

pub fn known_url_strategy() -> impl Strategy<Value = String> {
    (
        scheme_strategy(),
        prop::sample::select(KNOWN_HOSTS.to_vec()),
        path_strategy(),
    )
        .prop_map(|(scheme, host, path)| format!("{scheme}://{host}{path}"))
}

/// Hosts under a reserved TLD that no routing rule can match
pub fn unknown_url_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{3,12}", path_strategy())
        .prop_map(|(label, path)| format!("https://{label}.example{path}"))
}
