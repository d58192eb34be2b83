mod common;

use autopromptr_core::platform::{detect_platform, PlatformId};
use common::strategies::*;
use proptest::prelude::*;

proptest! {
    /// Property: any http(s) URL on a known host routes to a specific platform
    #[test]
    fn known_hosts_never_route_to_generic(url in known_url_strategy()) {
        prop_assert_ne!(detect_platform(&url), PlatformId::GenericWeb, "url: {}", url);
    }

    /// Property: routing ignores host case
    #[test]
    fn routing_is_case_insensitive_on_host(url in known_url_strategy()) {
        let (scheme, rest) = url.split_once("://").unwrap();
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        let shouted = format!("{}://{}/{}", scheme, host.to_ascii_uppercase(), path);
        prop_assert_eq!(detect_platform(&shouted), detect_platform(&url));
    }

    /// Property: hosts outside the routing table fall back to generic-web
    #[test]
    fn unknown_hosts_route_to_generic(url in unknown_url_strategy()) {
        prop_assert_eq!(detect_platform(&url), PlatformId::GenericWeb);
    }

    /// Property: detection is total, arbitrary input never panics
    #[test]
    fn detection_is_total(input in ".*") {
        let platform = detect_platform(&input);
        prop_assert!(PlatformId::ALL.contains(&platform));
    }
}
