//! Front-loaded image preparation.
//!
//! All external I/O for a render or export happens here, before any pixel
//! is painted: every image layer's source is canonicalized, fetched and
//! decoded up front (concurrently, since fetches have no ordering dependency),
//! so the paint pass itself stays strictly sequential, deterministic and
//! I/O-free. A layer whose source cannot be fetched or decoded is recorded
//! as absent and later skipped with a log line; it never aborts the other
//! layers.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::warn;

use crate::{
    assets::decode::{PreparedImage, decode_image},
    assets::fetch::FetchSource,
    scene::model::{Layer, SceneDocument},
    scene::proxy::{UrlResolver, canonical_src},
};

/// Immutable store of decoded images keyed by canonical source URL.
#[derive(Debug, Default)]
pub struct PreparedImageStore {
    images: HashMap<String, PreparedImage>,
}

impl PreparedImageStore {
    /// An empty store (documents with no image layers).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fetch and decode every image referenced by a visible image layer of
    /// `doc`.
    ///
    /// Sources are canonicalized through `resolver` before fetching, so
    /// editor-proxied documents render against the real remote bytes.
    /// Failures are logged and leave the URL unprepared.
    pub fn prepare(
        doc: &SceneDocument,
        source: &dyn FetchSource,
        resolver: Option<&dyn UrlResolver>,
    ) -> Self {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();
        for layer in &doc.objects {
            let Layer::Image(img) = layer else { continue };
            if !img.base.visible {
                continue;
            }
            let Some(src) = &img.src else { continue };
            let canonical = canonical_src(src, resolver);
            if seen.insert(canonical.clone()) {
                urls.push(canonical);
            }
        }

        let fetched: Vec<(String, Option<PreparedImage>)> = urls
            .into_par_iter()
            .map(|url| {
                let prepared = source.fetch(&url).and_then(|bytes| decode_image(&bytes));
                match prepared {
                    Ok(img) => (url, Some(img)),
                    Err(e) => {
                        warn!(url = %url, error = %e, "failed to prepare image layer source");
                        (url, None)
                    }
                }
            })
            .collect();

        let mut images = HashMap::new();
        for (url, prepared) in fetched {
            if let Some(img) = prepared {
                images.insert(url, img);
            }
        }
        Self { images }
    }

    /// Lookup by canonical source URL.
    pub fn get(&self, canonical_url: &str) -> Option<&PreparedImage> {
        self.images.get(canonical_url)
    }

    /// Number of successfully prepared images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether nothing was prepared.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Insert a pre-decoded image under a canonical URL (tests and callers
    /// that already hold pixels).
    pub fn insert(&mut self, canonical_url: impl Into<String>, image: PreparedImage) {
        self.images.insert(canonical_url.into(), image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::{SceneError, SceneResult};
    use crate::scene::model::{ImageLayer, LayerBase};

    struct MapSource(HashMap<String, Vec<u8>>);

    impl FetchSource for MapSource {
        fn fetch(&self, url: &str) -> SceneResult<Vec<u8>> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| SceneError::layer(format!("no such url '{url}'")))
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255]));
        let mut out = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut out),
            image::ImageFormat::Png,
        )
        .unwrap();
        out
    }

    fn image_layer(src: &str, visible: bool) -> Layer {
        let mut base = LayerBase::at(0.0, 0.0);
        base.visible = visible;
        Layer::Image(ImageLayer {
            base,
            src: Some(src.to_string()),
            width: None,
            height: None,
        })
    }

    #[test]
    fn prepares_reachable_and_skips_unreachable() {
        let mut doc = SceneDocument::new();
        doc.objects.push(image_layer("mem://ok.png", true));
        doc.objects.push(image_layer("mem://missing.png", true));

        let mut bytes = HashMap::new();
        bytes.insert("mem://ok.png".to_string(), png_bytes());
        let store = PreparedImageStore::prepare(&doc, &MapSource(bytes), None);

        assert_eq!(store.len(), 1);
        assert!(store.get("mem://ok.png").is_some());
        assert!(store.get("mem://missing.png").is_none());
    }

    #[test]
    fn invisible_layers_are_not_fetched() {
        let mut doc = SceneDocument::new();
        doc.objects.push(image_layer("mem://hidden.png", false));

        let mut bytes = HashMap::new();
        bytes.insert("mem://hidden.png".to_string(), png_bytes());
        let store = PreparedImageStore::prepare(&doc, &MapSource(bytes), None);
        assert!(store.is_empty());
    }

    #[test]
    fn proxied_sources_are_canonicalized_before_fetch() {
        use crate::scene::proxy::PrefixProxy;

        let mut doc = SceneDocument::new();
        doc.objects
            .push(image_layer("local://proxy/mem://ok.png", true));

        let mut bytes = HashMap::new();
        bytes.insert("mem://ok.png".to_string(), png_bytes());
        let proxy = PrefixProxy::new("local://proxy/");
        let store = PreparedImageStore::prepare(&doc, &MapSource(bytes), Some(&proxy));

        assert!(store.get("mem://ok.png").is_some());
    }
}
