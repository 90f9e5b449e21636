//! Lure rendering
//!
//! Rewrites the call-to-action link in a template body to the per-target
//! tracking URL, converts markdown links to HTML anchors, and appends the
//! tracking pixel.

use phishnet_common::types::{CampaignId, TrackingToken};
use regex::{Captures, Regex};

/// A rendered lure body in both transports
#[derive(Debug, Clone)]
pub struct RenderedLure {
    pub html: String,
    pub text: String,
}

/// Renders campaign bodies into per-target tracked lures
#[derive(Clone)]
pub struct LureRenderer {
    /// Public base URL for portal links and pixels
    base_url: String,
    /// Markdown links whose text reads as a call to action
    cta_link: Regex,
    /// Any markdown link
    md_link: Regex,
    /// Bare call-to-action phrases that should become links
    cta_phrase: Regex,
}

impl LureRenderer {
    /// Create a new renderer
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            cta_link: Regex::new(
                r"(?i)\[([^\]]*(?:click|verify|login|sign in)[^\]]*)\]\([^)]*\)",
            )
            .unwrap(),
            md_link: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap(),
            cta_phrase: Regex::new(
                r"(?i)(click here|click the link|verify your credentials|login)",
            )
            .unwrap(),
        }
    }

    /// Click-tracking URL embedded as the call-to-action link target
    pub fn tracking_url(&self, campaign_id: CampaignId, token: TrackingToken) -> String {
        format!("{}/track/click/{}/{}", self.base_url, campaign_id, token)
    }

    /// Portal URL the click endpoint redirects to
    pub fn portal_url(&self, campaign_id: CampaignId, token: TrackingToken) -> String {
        format!("{}/portal/{}/{}", self.base_url, campaign_id, token)
    }

    /// Tracking pixel URL for the same correlation key
    pub fn pixel_url(&self, campaign_id: CampaignId, token: TrackingToken) -> String {
        format!("{}/track/pixel/{}/{}", self.base_url, campaign_id, token)
    }

    /// Untracked portal URL used as the link placeholder in stored drafts
    pub fn generic_portal_url(&self) -> String {
        format!("{}/portal", self.base_url)
    }

    /// Make sure a draft body carries a call-to-action link.
    ///
    /// Bodies from the drafting service are asked to contain a markdown
    /// call-to-action link already; when one is missing, the first bare
    /// call-to-action phrase is turned into a link to the generic portal.
    /// Applied once at campaign creation; dispatch rewrites the link target
    /// per recipient.
    pub fn ensure_call_to_action(&self, body: &str) -> String {
        if self.cta_link.is_match(body) {
            return body.to_string();
        }
        let portal = self.generic_portal_url();
        self.cta_phrase
            .replacen(body, 1, |caps: &Captures| {
                format!("[{}]({})", &caps[1], portal)
            })
            .to_string()
    }

    /// Render one per-target lure.
    ///
    /// The text part keeps markdown; the HTML part gets anchors and the
    /// tracking pixel.
    pub fn render(&self, body: &str, campaign_id: CampaignId, token: TrackingToken) -> RenderedLure {
        let tracked = self.tracking_url(campaign_id, token);

        let text = self
            .cta_link
            .replace_all(body, |caps: &Captures| {
                format!("[{}]({})", &caps[1], tracked)
            })
            .to_string();

        let mut html = self
            .md_link
            .replace_all(&text, |caps: &Captures| {
                format!(
                    r#"<a href="{}" style="color: #007bff; text-decoration: none;">{}</a>"#,
                    &caps[2], &caps[1]
                )
            })
            .to_string();

        html.push_str(&format!(
            r#"<img src="{}" width="1" height="1" style="display:none" />"#,
            self.pixel_url(campaign_id, token)
        ));

        RenderedLure { html, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn renderer() -> LureRenderer {
        LureRenderer::new("https://awareness.example.com/")
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let token = TrackingToken::generate();
        let id = Uuid::new_v4();
        assert_eq!(
            renderer().tracking_url(id, token),
            format!("https://awareness.example.com/track/click/{}/{}", id, token)
        );
        assert_eq!(
            renderer().portal_url(id, token),
            format!("https://awareness.example.com/portal/{}/{}", id, token)
        );
    }

    #[test]
    fn test_render_rewrites_cta_link_to_tracking_url() {
        let token = TrackingToken::generate();
        let id = Uuid::new_v4();
        let body = "Please [Click Here](https://old.example.com/login) today.";

        let rendered = renderer().render(body, id, token);
        let tracked = renderer().tracking_url(id, token);

        assert!(rendered.text.contains(&format!("[Click Here]({})", tracked)));
        assert!(!rendered.text.contains("old.example.com"));
    }

    #[test]
    fn test_render_converts_links_and_appends_pixel() {
        let token = TrackingToken::generate();
        let id = Uuid::new_v4();
        let body = "Please [verify your credentials](https://x.example) now.";

        let rendered = renderer().render(body, id, token);

        assert!(rendered.html.contains("<a href="));
        assert!(rendered.html.contains(">verify your credentials</a>"));
        assert!(rendered
            .html
            .contains(&renderer().pixel_url(id, token)));
        // text part stays markdown, no pixel
        assert!(!rendered.text.contains("<img"));
    }

    #[test]
    fn test_ensure_call_to_action_linkifies_bare_phrase() {
        let body = "Suspicious activity detected. Please click here to review.";
        let fixed = renderer().ensure_call_to_action(body);
        assert!(fixed.contains("[click here](https://awareness.example.com/portal)"));

        // already linked bodies are left alone
        let linked = "Do [click here](https://somewhere.example) now.";
        assert_eq!(renderer().ensure_call_to_action(linked), linked);
    }
}
