//! Bounded-concurrency rendering of many documents.
//!
//! Bulk generation renders one document per aspect ratio (or per variant),
//! and each render decodes full-canvas images; an unbounded fan-out would
//! balloon memory. A dedicated rayon pool caps in-flight renders, with one
//! rasterizer per worker so font caches are not shared across threads.

use std::path::PathBuf;

use rayon::prelude::*;

use crate::{
    assets::store::PreparedImageStore,
    foundation::core::{CanvasSize, FrameRgba},
    foundation::error::{SceneError, SceneResult},
    render::raster::Rasterizer,
    scene::model::SceneDocument,
    scene::proxy::UrlResolver,
};

/// One document to flatten at one size.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub doc: SceneDocument,
    pub size: CanvasSize,
}

/// Batch tuning knobs.
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Worker cap; `None` uses rayon's default.
    pub threads: Option<usize>,
    /// Extra font directory registered into each worker's rasterizer.
    pub fonts_dir: Option<PathBuf>,
}

/// Render every job, each against the shared prepared-image store.
///
/// Per-document failures are reported per slot; one failing document never
/// aborts the batch.
pub fn render_documents(
    jobs: &[RenderJob],
    store: &PreparedImageStore,
    resolver: Option<&dyn UrlResolver>,
    opts: &BatchOptions,
) -> SceneResult<Vec<SceneResult<FrameRgba>>> {
    let pool = build_thread_pool(opts.threads)?;
    let fonts_dir = opts.fonts_dir.clone();

    let results = pool.install(|| {
        jobs.par_iter()
            .map_init(
                || match &fonts_dir {
                    Some(dir) => Rasterizer::with_fonts_dir(dir),
                    None => Rasterizer::new(),
                },
                |rasterizer, job| rasterizer.render(&job.doc, job.size, store, resolver),
            )
            .collect::<Vec<_>>()
    });

    Ok(results)
}

fn build_thread_pool(threads: Option<usize>) -> SceneResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(SceneError::validation(
            "batch 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| SceneError::render(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        let opts = BatchOptions {
            threads: Some(0),
            fonts_dir: None,
        };
        let store = PreparedImageStore::empty();
        assert!(render_documents(&[], &store, None, &opts).is_err());
    }
}
