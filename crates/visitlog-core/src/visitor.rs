use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute an anonymized visitor fingerprint from IP and User-Agent.
///
/// Formula: sha256(ip + user_agent)[0..8] encoded as 16 hex chars.
///
/// Unlike a salted visitor ID this does not rotate: the same pair always maps
/// to the same fingerprint, which is what the session tracker keys on.
pub fn fingerprint(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    let hash = hasher.finalize();
    // First 8 bytes → 16 hex characters.
    hex::encode(&hash[..8])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Desktop, DeviceType::Mobile, DeviceType::Tablet];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }

    /// Lenient parse used when reading stored rows; unknown values fall back
    /// to desktop.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "mobile" => DeviceType::Mobile,
            "tablet" => DeviceType::Tablet,
            _ => DeviceType::Desktop,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed User-Agent fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UaInfo {
    pub device_type: DeviceType,
    pub browser: &'static str,
    pub os: &'static str,
}

/// Best-effort User-Agent classification by substring matching.
///
/// Checks run in a fixed order and the first match wins; tokens overlap
/// (Chrome on iOS also says "Safari", Edge also says "Chrome"), so the order
/// is part of the contract.
pub fn classify(user_agent: &str) -> UaInfo {
    let ua = user_agent.to_lowercase();
    UaInfo {
        device_type: device_type(&ua),
        browser: browser(&ua),
        os: os(&ua),
    }
}

fn device_type(ua: &str) -> DeviceType {
    if ua.contains("mobile") || ua.contains("android") {
        DeviceType::Mobile
    } else if ua.contains("tablet") || ua.contains("ipad") {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    }
}

fn browser(ua: &str) -> &'static str {
    if ua.contains("chrome") && !ua.contains("edg") {
        "chrome"
    } else if ua.contains("firefox") {
        "firefox"
    } else if ua.contains("safari") && !ua.contains("chrome") {
        "safari"
    } else if ua.contains("edg") {
        "edge"
    } else if ua.contains("opera") || ua.contains("opr") {
        "opera"
    } else {
        "unknown"
    }
}

fn os(ua: &str) -> &'static str {
    if ua.contains("windows") {
        "windows"
    } else if ua.contains("macintosh") || ua.contains("mac os") {
        "macos"
    } else if ua.contains("linux") && !ua.contains("android") {
        "linux"
    } else if ua.contains("iphone") {
        "ios"
    } else if ua.contains("ipad") {
        "ipados"
    } else if ua.contains("android") {
        "android"
    } else {
        "unknown"
    }
}

const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "crawling",
    "slurp",
    "googlebot",
    "bingbot",
    "duckduckbot",
    "yandexbot",
    "baiduspider",
    "ahrefsbot",
    "semrushbot",
    "mj12bot",
    "facebookexternalhit",
    "bytespider",
    "petalbot",
    "applebot",
    "headlesschrome",
    "phantomjs",
    "lighthouse",
    "python-requests",
    "curl/",
    "wget/",
    "go-http-client",
    "libwww-perl",
    "urllib",
    "httpclient",
];

/// Return `true` when the User-Agent looks automated. An empty UA is always a
/// bot; bot traffic must be dropped before an event is built.
pub fn is_bot(user_agent: &str) -> bool {
    if user_agent.trim().is_empty() {
        return true;
    }
    let ua = user_agent.to_lowercase();
    BOT_SIGNATURES.iter().any(|sig| ua.contains(sig))
}

const EXCLUDED_PREFIXES: &[&str] = &["/api/", "/_", "/static/", "/assets/", "/.well-known/"];

const EXCLUDED_FILES: &[&str] = &["/favicon.ico", "/robots.txt", "/sitemap.xml"];

const EXCLUDED_SUFFIXES: &[&str] = &[
    ".css", ".js", ".map", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".avif",
    ".woff", ".woff2", ".ttf", ".otf", ".eot",
];

/// Return `true` for paths that are never tracked: API and framework routes,
/// well-known files, and static assets.
pub fn should_exclude(path: &str) -> bool {
    let path = path.to_lowercase();
    if path == "/api" || EXCLUDED_FILES.contains(&path.as_str()) {
        return true;
    }
    if EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    EXCLUDED_SUFFIXES.iter().any(|s| path.ends_with(s))
}

/// Internal framework asset paths. Kept out of the page tally and the recent
/// visit list even if an older row slipped past [`should_exclude`].
pub fn is_internal_asset(path: &str) -> bool {
    path.starts_with("/_")
}

/// Campaign parameters read from a request URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utm {
    pub source: String,
    pub medium: String,
    pub campaign: String,
}

/// Read `utm_source`, `utm_medium` and `utm_campaign` from a full URL, a path
/// with a query, or a bare query string. Missing parameters are empty.
pub fn extract_utm(url: &str) -> Utm {
    let query = match url.split_once('?') {
        Some((_, q)) => q,
        None if url.contains('=') => url,
        None => return Utm::default(),
    };
    let query = query.split('#').next().unwrap_or(query);

    let mut utm = Utm::default();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let slot = match key.as_ref() {
            "utm_source" => &mut utm.source,
            "utm_medium" => &mut utm.medium,
            "utm_campaign" => &mut utm.campaign,
            _ => continue,
        };
        if slot.is_empty() {
            *slot = value.into_owned();
        }
    }
    utm
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS_CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IPAD_SAFARI: &str = "Mozilla/5.0 (iPad; CPU OS 17_1 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

    #[test]
    fn fingerprint_is_16_hex_chars() {
        let id = fingerprint("1.2.3.4", "Mozilla/5.0 Chrome/120");
        assert_eq!(id.len(), 16, "fingerprint must be exactly 16 hex characters");
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(
            fingerprint("1.2.3.4", WINDOWS_CHROME),
            fingerprint("1.2.3.4", WINDOWS_CHROME)
        );
    }

    #[test]
    fn fingerprint_differs_by_ip() {
        assert_ne!(
            fingerprint("1.2.3.4", WINDOWS_CHROME),
            fingerprint("1.2.3.5", WINDOWS_CHROME)
        );
    }

    #[test]
    fn fingerprint_of_empty_inputs_is_stable() {
        let a = fingerprint("", "");
        assert!(!a.is_empty());
        assert_eq!(a, fingerprint("", ""));
    }

    #[test]
    fn classify_windows_chrome() {
        let info = classify(WINDOWS_CHROME);
        assert_eq!(info.device_type, DeviceType::Desktop);
        assert_eq!(info.browser, "chrome");
        assert_eq!(info.os, "windows");
    }

    #[test]
    fn classify_ipad_safari_hits_mobile_and_macos_first() {
        let info = classify(IPAD_SAFARI);
        assert_eq!(info.device_type, DeviceType::Mobile);
        assert_eq!(info.browser, "safari");
        assert_eq!(info.os, "macos");
    }

    #[test]
    fn classify_ipad_without_mobile_token_is_tablet() {
        let info = classify("Mozilla/5.0 (iPad; CPU OS 12_0) AppleWebKit/605.1.15 Safari/604.1");
        assert_eq!(info.device_type, DeviceType::Tablet);
        assert_eq!(info.os, "ipados");
    }

    #[test]
    fn classify_edge_is_not_chrome() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
        assert_eq!(classify(ua).browser, "edge");
    }

    #[test]
    fn classify_android_firefox() {
        let ua = "Mozilla/5.0 (Android 14; Mobile; rv:121.0) Gecko/121.0 Firefox/121.0";
        let info = classify(ua);
        assert_eq!(info.device_type, DeviceType::Mobile);
        assert_eq!(info.browser, "firefox");
        assert_eq!(info.os, "android");
    }

    #[test]
    fn classify_linux_firefox() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        let info = classify(ua);
        assert_eq!(info.device_type, DeviceType::Desktop);
        assert_eq!(info.os, "linux");
    }

    #[test]
    fn classify_empty_is_unknown_desktop() {
        let info = classify("");
        assert_eq!(info.device_type, DeviceType::Desktop);
        assert_eq!(info.browser, "unknown");
        assert_eq!(info.os, "unknown");
    }

    #[test]
    fn empty_user_agent_is_bot() {
        assert!(is_bot(""));
        assert!(is_bot("   "));
    }

    #[test]
    fn crawler_user_agents_are_bots() {
        assert!(is_bot(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        ));
        assert!(is_bot("curl/8.4.0"));
        assert!(is_bot("python-requests/2.31"));
        assert!(!is_bot(WINDOWS_CHROME));
    }

    #[test]
    fn excluded_paths() {
        assert!(should_exclude("/api/users"));
        assert!(should_exclude("/favicon.ico"));
        assert!(should_exclude("/styles/site.css"));
        assert!(should_exclude("/img/logo.PNG"));
        assert!(should_exclude("/_app/immutable/entry.js"));
        assert!(!should_exclude("/about"));
        assert!(!should_exclude("/"));
        assert!(!should_exclude("/apiary"));
    }

    #[test]
    fn utm_from_full_url() {
        let utm = extract_utm(
            "https://example.com/landing?utm_source=newsletter&utm_medium=email&utm_campaign=launch%202024",
        );
        assert_eq!(utm.source, "newsletter");
        assert_eq!(utm.medium, "email");
        assert_eq!(utm.campaign, "launch 2024");
    }

    #[test]
    fn utm_from_bare_query_with_missing_params() {
        let utm = extract_utm("utm_source=twitter&ref=abc");
        assert_eq!(utm.source, "twitter");
        assert_eq!(utm.medium, "");
        assert_eq!(utm.campaign, "");
    }

    #[test]
    fn utm_absent_is_empty() {
        assert_eq!(extract_utm("/pricing"), Utm::default());
        assert_eq!(extract_utm(""), Utm::default());
    }
}
