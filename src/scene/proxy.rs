//! Reversible mapping between canonical storage URLs and locally fetchable
//! editor URLs.
//!
//! Interactive viewers cannot always fetch cross-origin image bytes
//! directly, so editing sessions rewrite image sources to a local
//! access-proxy form. Everything that leaves the session (persisted
//! snapshots, server-side rasterization, layered export) must see the
//! canonical remote URL again. The mapping is injected as a resolver object
//! so the core never pattern-matches URL strings itself.

use crate::scene::model::SceneDocument;

/// Bidirectional URL mapping between the canonical (storage) form and the
/// editor-local form.
pub trait UrlResolver: Send + Sync {
    /// Canonical -> locally fetchable.
    fn to_editor(&self, canonical: &str) -> String;
    /// Locally fetchable -> canonical. Must invert [`UrlResolver::to_editor`]
    /// and pass already-canonical URLs through unchanged.
    fn to_canonical(&self, url: &str) -> String;
}

/// No-op resolver for sessions that fetch storage URLs directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityResolver;

impl UrlResolver for IdentityResolver {
    fn to_editor(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    fn to_canonical(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Resolver that prepends a fixed local prefix to the canonical URL.
///
/// The editor form is plain concatenation, which keeps the mapping
/// trivially bijective: stripping the prefix recovers the canonical URL
/// byte-for-byte.
#[derive(Clone, Debug)]
pub struct PrefixProxy {
    prefix: String,
}

impl PrefixProxy {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl UrlResolver for PrefixProxy {
    fn to_editor(&self, canonical: &str) -> String {
        if canonical.starts_with(&self.prefix) {
            return canonical.to_string();
        }
        format!("{}{}", self.prefix, canonical)
    }

    fn to_canonical(&self, url: &str) -> String {
        url.strip_prefix(&self.prefix).unwrap_or(url).to_string()
    }
}

/// Rewrite every image source in `doc` to its canonical form.
pub fn canonicalize_sources(doc: &mut SceneDocument, resolver: &dyn UrlResolver) {
    doc.for_each_src_mut(|src| *src = resolver.to_canonical(src));
}

/// Rewrite every image source in `doc` to its editor-local form.
pub fn editor_sources(doc: &mut SceneDocument, resolver: &dyn UrlResolver) {
    doc.for_each_src_mut(|src| *src = resolver.to_editor(src));
}

/// Canonicalize one source URL through an optional resolver.
pub fn canonical_src(src: &str, resolver: Option<&dyn UrlResolver>) -> String {
    match resolver {
        Some(r) => r.to_canonical(src),
        None => src.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::model::{ImageLayer, Layer, LayerBase, SceneDocument};

    const CANONICAL: &str = "https://cdn.example/assets/bg.png";

    #[test]
    fn prefix_proxy_is_bijective() {
        let proxy = PrefixProxy::new("local://proxy/");
        let editor = proxy.to_editor(CANONICAL);
        assert_eq!(editor, format!("local://proxy/{CANONICAL}"));
        assert_eq!(proxy.to_canonical(&editor), CANONICAL);
        // Already-canonical and already-proxied URLs pass through.
        assert_eq!(proxy.to_canonical(CANONICAL), CANONICAL);
        assert_eq!(proxy.to_editor(&editor), editor);
    }

    #[test]
    fn document_rewrite_touches_only_image_sources() {
        let proxy = PrefixProxy::new("local://proxy/");
        let mut doc = SceneDocument::new();
        doc.objects.push(Layer::Image(ImageLayer {
            base: LayerBase::at(0.0, 0.0),
            src: Some(CANONICAL.to_string()),
            width: None,
            height: None,
        }));

        editor_sources(&mut doc, &proxy);
        let Layer::Image(img) = &doc.objects[0] else {
            unreachable!()
        };
        assert!(img.src.as_deref().unwrap().starts_with("local://proxy/"));

        canonicalize_sources(&mut doc, &proxy);
        let Layer::Image(img) = &doc.objects[0] else {
            unreachable!()
        };
        assert_eq!(img.src.as_deref(), Some(CANONICAL));
    }
}
