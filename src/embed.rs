//! Embed directive
//!
//! Parses `[splat id=.. width=.. height=.. animate class=.. style=..]` and
//! renders the viewer element for the resolved asset. Rendering never fails:
//! any resolution error becomes an inline notice.

use askama::Template;
use tracing::{error, warn};

use crate::resolver::{SplatDescriptor, SplatResolver};

/// Directive names accepted as the first token
const DIRECTIVE_NAMES: &[&str] = &["splat", "splat_shortcode"];

const DEFAULT_WIDTH: &str = "100%";
const DEFAULT_HEIGHT: &str = "100dvh";

const INVALID_ID_NOTICE: &str = "No valid Splat ID provided.";
const FETCH_FAILED_NOTICE: &str = "Error fetching Splat data.";

/// Parsed directive attributes
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedAttributes {
    /// Asset ID; 0 when missing or not a positive integer
    pub id: u64,
    pub width: String,
    pub height: String,
    pub animate: bool,
    pub class: String,
    pub style: String,
}

impl Default for EmbedAttributes {
    fn default() -> Self {
        Self {
            id: 0,
            width: DEFAULT_WIDTH.to_string(),
            height: DEFAULT_HEIGHT.to_string(),
            animate: false,
            class: String::new(),
            style: String::new(),
        }
    }
}

impl EmbedAttributes {
    /// Attributes for a bare ID with defaults everywhere else
    #[cfg(test)]
    pub fn for_id(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Parse a directive such as `[splat id='3' animate class="hero"]`.
    /// The surrounding brackets and directive name are optional; unknown
    /// attributes are ignored.
    pub fn parse(directive: &str) -> Self {
        let inner = directive
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']');

        let mut attrs = Self::default();
        for (index, (key, value)) in tokenize(inner).into_iter().enumerate() {
            if index == 0 && value.is_none() && DIRECTIVE_NAMES.contains(&key.as_str()) {
                continue;
            }
            match (key.to_ascii_lowercase().as_str(), value) {
                ("id", Some(v)) => attrs.id = parse_id(&v),
                ("width", Some(v)) if !v.is_empty() => attrs.width = v,
                ("height", Some(v)) if !v.is_empty() => attrs.height = v,
                ("animate", None) => attrs.animate = true,
                ("animate", Some(v)) => attrs.animate = is_truthy(&v),
                ("class", Some(v)) => attrs.class = v,
                ("style", Some(v)) => attrs.style = v,
                (other, _) => warn!(attribute = other, "Ignoring unknown embed attribute"),
            }
        }
        attrs
    }
}

/// Split attribute text into `(key, value)` pairs; bare flags have no value
fn tokenize(input: &str) -> Vec<(String, Option<String>)> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }

        if chars.next_if_eq(&'=').is_none() {
            tokens.push((key, None));
            continue;
        }

        let mut value = String::new();
        match chars.next_if(|c| *c == '"' || *c == '\'') {
            Some(quote) => {
                for c in chars.by_ref() {
                    if c == quote {
                        break;
                    }
                    value.push(c);
                }
            }
            None => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }
        tokens.push((key, Some(value)));
    }

    tokens
}

/// Leading digits as a positive integer; anything else is 0
fn parse_id(value: &str) -> u64 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on" | "animate"
    )
}

#[derive(Template)]
#[template(path = "embed.html")]
struct EmbedTemplate<'a> {
    src: &'a str,
    thumbnail: &'a str,
    title: &'a str,
    width: &'a str,
    height: &'a str,
    class: &'a str,
    style: &'a str,
    animate: bool,
}

#[derive(Template)]
#[template(path = "notice.html")]
struct NoticeTemplate<'a> {
    message: &'a str,
}

/// Inline error notice
pub fn notice(message: &str) -> String {
    NoticeTemplate { message }.render().unwrap_or_else(|e| {
        error!(error = %e, "Failed to render notice");
        String::new()
    })
}

/// Viewer markup for a resolved descriptor
pub fn viewer(descriptor: &SplatDescriptor, attrs: &EmbedAttributes) -> String {
    let template = EmbedTemplate {
        src: &descriptor.src,
        thumbnail: &descriptor.thumbnail_url,
        title: &descriptor.title,
        width: &attrs.width,
        height: &attrs.height,
        class: &attrs.class,
        style: &attrs.style,
        animate: descriptor.animate,
    };
    template.render().unwrap_or_else(|e| {
        error!(error = %e, "Failed to render splat viewer");
        notice(FETCH_FAILED_NOTICE)
    })
}

/// Resolve and render an embed
pub async fn render(resolver: &SplatResolver, attrs: &EmbedAttributes) -> String {
    if attrs.id == 0 {
        return notice(INVALID_ID_NOTICE);
    }
    match resolver.resolve(attrs.id, attrs.animate).await {
        Ok(descriptor) => viewer(&descriptor, attrs),
        Err(e) => {
            warn!(id = attrs.id, error = %e, "Embed could not be resolved");
            notice(FETCH_FAILED_NOTICE)
        }
    }
}

/// Parse a directive and render it
pub async fn render_directive(resolver: &SplatResolver, directive: &str) -> String {
    render(resolver, &EmbedAttributes::parse(directive)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SplatBackend;
    use crate::cache::{CacheStore, MemoryCacheStore, MirrorStore};
    use crate::config::CacheConfig;
    use crate::testing::{record, FakeBackend};
    use std::sync::Arc;
    use std::time::Duration;

    fn resolver_with(backend: Arc<FakeBackend>, dir: &std::path::Path) -> SplatResolver {
        let config = CacheConfig {
            mirror_dir: dir.join("splats"),
            public_url: "https://site.example/splats".to_string(),
            metadata_ttl: Duration::from_secs(60),
            mirror_ttl: Duration::from_secs(60),
        };
        let mirror = MirrorStore::new(config.mirror_dir.clone(), &config.public_url).unwrap();
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let backend: Arc<dyn SplatBackend> = backend;
        SplatResolver::new(backend, store, mirror, &config)
    }

    #[test]
    fn test_parse_full_directive() {
        let attrs = EmbedAttributes::parse(
            r#"[splat id='12' width="640px" height=480px animate class="hero wide" style="border: 0"]"#,
        );
        assert_eq!(attrs.id, 12);
        assert_eq!(attrs.width, "640px");
        assert_eq!(attrs.height, "480px");
        assert!(attrs.animate);
        assert_eq!(attrs.class, "hero wide");
        assert_eq!(attrs.style, "border: 0");
    }

    #[test]
    fn test_parse_defaults_and_legacy_name() {
        let attrs = EmbedAttributes::parse("[splat_shortcode id=\"5\"]");
        assert_eq!(attrs, EmbedAttributes::for_id(5));
        assert_eq!(attrs.width, "100%");
        assert_eq!(attrs.height, "100dvh");
        assert!(!attrs.animate);
    }

    #[test]
    fn test_parse_invalid_ids() {
        assert_eq!(EmbedAttributes::parse("[splat]").id, 0);
        assert_eq!(EmbedAttributes::parse("[splat id='abc']").id, 0);
        assert_eq!(EmbedAttributes::parse("[splat id='-4']").id, 0);
        assert_eq!(EmbedAttributes::parse("[splat id='7px']").id, 7);
    }

    #[test]
    fn test_parse_animate_values() {
        assert!(!EmbedAttributes::parse("[splat id=1 animate=false]").animate);
        assert!(!EmbedAttributes::parse("[splat id=1 animate='0']").animate);
        assert!(EmbedAttributes::parse("[splat id=1 animate=true]").animate);
    }

    #[test]
    fn test_viewer_escapes_attributes() {
        let descriptor = SplatDescriptor::assemble(
            "https://site.example/splats/splat_1.splat",
            r#"Garden "at night" <b>"#,
            None,
            true,
        );
        let html = viewer(&descriptor, &EmbedAttributes::for_id(1));

        assert!(html.contains("<gv-splat-viewer"));
        assert!(html.contains("splat_1.splat"));
        assert!(html.contains(" animate>"));
        assert!(html.contains("&quot;at night&quot;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_notice_markup() {
        assert_eq!(
            notice("Error fetching Splat data.").trim_end(),
            r#"<div class="notice notice-error">Error fetching Splat data.</div>"#
        );
    }

    #[tokio::test]
    async fn test_render_invalid_id_makes_no_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        let resolver = resolver_with(backend.clone(), dir.path());

        let html = render_directive(&resolver, "[splat id='0']").await;

        assert!(html.contains("No valid Splat ID provided."));
        assert_eq!(backend.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_render_resolved_and_failed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new());
        backend.add_splat(record(3), b"scene-3");
        let resolver = resolver_with(backend.clone(), dir.path());

        let html = render_directive(&resolver, "[splat id=3 class=hero]").await;
        assert!(html.contains("gv-splat hero"));
        assert!(html.contains("splat_3.splat"));
        assert!(html.contains("thumb_3.png"));

        let html = render_directive(&resolver, "[splat id=99]").await;
        assert!(html.contains("Error fetching Splat data."));
    }
}
