//! Platform detection: URL patterns first (cheap), then HTML content
//! signatures. The registry is ordered and the first match wins, so the more
//! specific embedded variant sits above the plain storefront rule.

use regex::Regex;

use budwatch_common::SourcePlatform;

struct DetectRule {
    platform: SourcePlatform,
    url_patterns: Vec<Regex>,
    html_signatures: Vec<&'static str>,
}

pub struct PlatformDetector {
    rules: Vec<DetectRule>,
}

impl Default for PlatformDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformDetector {
    pub fn new() -> Self {
        let rules = vec![
            DetectRule {
                platform: SourcePlatform::DutchieEmbedded,
                url_patterns: vec![
                    Regex::new(r"dutchie\.com/embedded-menu").unwrap(),
                    Regex::new(r"/embedded-menu/").unwrap(),
                ],
                html_signatures: vec![
                    "dutchie.com/embedded-menu",
                    "id=\"dutchie--embed",
                ],
            },
            DetectRule {
                platform: SourcePlatform::Dutchie,
                url_patterns: vec![Regex::new(r"dutchie\.com/(stores|dispensary)/").unwrap()],
                html_signatures: vec!["__NEXT_DATA__"],
            },
            DetectRule {
                platform: SourcePlatform::Leafbridge,
                url_patterns: vec![Regex::new(r"leafbridge").unwrap()],
                html_signatures: vec!["data-leafbridge", "leafbridge-menu"],
            },
        ];
        Self { rules }
    }

    /// Detect by URL alone.
    pub fn detect_url(&self, url: &str) -> Option<SourcePlatform> {
        for rule in &self.rules {
            if rule.url_patterns.iter().any(|p| p.is_match(url)) {
                return Some(rule.platform);
            }
        }
        None
    }

    /// Detect by URL, falling back to HTML signatures when provided.
    pub fn detect(&self, url: &str, html: Option<&str>) -> Option<SourcePlatform> {
        if let Some(platform) = self.detect_url(url) {
            return Some(platform);
        }
        let html = html?;
        for rule in &self.rules {
            if rule.html_signatures.iter().any(|sig| html.contains(sig)) {
                return Some(rule.platform);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_menu_url_wins_over_plain_dutchie() {
        let detector = PlatformDetector::new();
        assert_eq!(
            detector.detect_url("https://dutchie.com/embedded-menu/green-door"),
            Some(SourcePlatform::DutchieEmbedded)
        );
        assert_eq!(
            detector.detect_url("https://dutchie.com/stores/green-door"),
            Some(SourcePlatform::Dutchie)
        );
    }

    #[test]
    fn leafbridge_detected_by_url_or_html() {
        let detector = PlatformDetector::new();
        assert_eq!(
            detector.detect_url("https://shop.leafbridge.io/store/42"),
            Some(SourcePlatform::Leafbridge)
        );
        assert_eq!(
            detector.detect("https://example.com/menu", Some("<div data-leafbridge='1'>")),
            Some(SourcePlatform::Leafbridge)
        );
    }

    #[test]
    fn html_signature_fallback_finds_ssr_payload() {
        let detector = PlatformDetector::new();
        let html = r#"<script id="__NEXT_DATA__" type="application/json">{}</script>"#;
        assert_eq!(
            detector.detect("https://example.com/shop", Some(html)),
            Some(SourcePlatform::Dutchie)
        );
    }

    #[test]
    fn unknown_targets_detect_nothing() {
        let detector = PlatformDetector::new();
        assert_eq!(detector.detect("https://example.com", Some("<html></html>")), None);
    }
}
