//! Cloudflare / Turnstile challenge detection. Runs before any extraction;
//! a blocked page fails the location with kind `blocked` rather than
//! producing an empty (and misleading) item list.

/// Signatures that only appear in challenge interstitials.
const HTML_SIGNATURES: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "cf-turnstile",
    "challenges.cloudflare.com",
    "Error 1015",
    "Error 1020",
];

const TITLE_SIGNATURES: &[&str] = &["Just a moment", "Attention Required"];

/// A Ray ID on a tiny page is a challenge shell, not a menu.
const RAY_ID_PAGE_LIMIT: usize = 5 * 1024;

/// Returns the matched signature when the page looks like a bot challenge.
pub fn challenge_reason(html: &str, title: &str) -> Option<String> {
    for sig in HTML_SIGNATURES {
        if html.contains(sig) {
            return Some(format!("challenge signature '{sig}' in page"));
        }
    }
    for sig in TITLE_SIGNATURES {
        if title.contains(sig) {
            return Some(format!("challenge title '{sig}'"));
        }
    }
    if html.len() < RAY_ID_PAGE_LIMIT && html.contains("Ray ID") {
        return Some("Ray ID on undersized page".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turnstile_markup_is_blocked() {
        let html = r#"<div class="cf-turnstile" data-sitekey="x"></div>"#;
        assert!(challenge_reason(html, "").is_some());
    }

    #[test]
    fn challenge_titles_are_blocked() {
        assert!(challenge_reason("<html></html>", "Just a moment...").is_some());
        assert!(challenge_reason("<html></html>", "Attention Required! | Cloudflare").is_some());
    }

    #[test]
    fn ray_id_only_counts_on_small_pages() {
        let small = "<html>Ray ID: 8abc</html>";
        assert!(challenge_reason(small, "").is_some());

        let mut big = "x".repeat(10 * 1024);
        big.push_str("Ray ID: 8abc");
        assert!(challenge_reason(&big, "").is_none());
    }

    #[test]
    fn normal_menus_pass() {
        let html = "<html><body><div class='product-card'>Blue Dream</div></body></html>";
        assert!(challenge_reason(html, "Green Door Menu").is_none());
    }
}
