use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "adscene", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an initial scene document from generation parameters.
    Build(BuildArgs),
    /// Flatten a scene document to a PNG.
    Raster(RasterArgs),
    /// Convert a scene document to a layered PSD.
    ExportPsd(ExportPsdArgs),
}

#[derive(Parser, Debug)]
struct BuildArgs {
    /// Input parameters JSON.
    #[arg(long)]
    params: PathBuf,

    /// Output scene document path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RasterArgs {
    /// Input scene document JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Aspect-ratio label (1:1, 9:16 or 16:9).
    #[arg(long)]
    ratio: String,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Directory of extra font files to register (e.g. Noto Sans CJK).
    #[arg(long)]
    fonts_dir: Option<PathBuf>,

    /// Resolve image sources against this directory instead of HTTP.
    #[arg(long)]
    assets_root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ExportPsdArgs {
    /// Input scene document JSON.
    #[arg(long)]
    scene: PathBuf,

    /// Aspect-ratio label (1:1, 9:16 or 16:9).
    #[arg(long)]
    ratio: String,

    /// Output PSD path.
    #[arg(long)]
    out: PathBuf,

    /// Directory of extra font files to register (e.g. Noto Sans CJK).
    #[arg(long)]
    fonts_dir: Option<PathBuf>,

    /// Resolve image sources against this directory instead of HTTP.
    #[arg(long)]
    assets_root: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Build(args) => cmd_build(args),
        Command::Raster(args) => cmd_raster(args),
        Command::ExportPsd(args) => cmd_export_psd(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).with_context(|| format!("parse {what} JSON"))
}

fn parse_ratio(label: &str) -> anyhow::Result<adscene::AspectRatio> {
    adscene::AspectRatio::parse(label)
        .ok_or_else(|| anyhow::anyhow!("unsupported aspect ratio '{label}' (expected 1:1, 9:16 or 16:9)"))
}

fn make_source(assets_root: Option<&Path>) -> anyhow::Result<Box<dyn adscene::FetchSource>> {
    match assets_root {
        Some(root) => Ok(Box::new(adscene::FileSource::new(root))),
        None => Ok(Box::new(adscene::HttpSource::new()?)),
    }
}

fn make_rasterizer(fonts_dir: Option<&Path>) -> adscene::Rasterizer {
    match fonts_dir {
        Some(dir) => adscene::Rasterizer::with_fonts_dir(dir),
        None => adscene::Rasterizer::new(),
    }
}

fn write_out(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}

fn cmd_build(args: BuildArgs) -> anyhow::Result<()> {
    let params: adscene::SceneParams = read_json(&args.params, "parameters")?;
    let doc = adscene::build_scene(&params);
    doc.validate()?;

    let json = serde_json::to_string_pretty(&doc).context("serialize scene document")?;
    write_out(&args.out, json.as_bytes())?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_raster(args: RasterArgs) -> anyhow::Result<()> {
    let doc: adscene::SceneDocument = read_json(&args.scene, "scene document")?;
    let size = parse_ratio(&args.ratio)?.dimensions();

    let source = make_source(args.assets_root.as_deref())?;
    let store = adscene::PreparedImageStore::prepare(&doc, source.as_ref(), None);

    let mut rasterizer = make_rasterizer(args.fonts_dir.as_deref());
    let png = rasterizer.render_png(&doc, size, &store, None)?;

    write_out(&args.out, &png)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export_psd(args: ExportPsdArgs) -> anyhow::Result<()> {
    let doc: adscene::SceneDocument = read_json(&args.scene, "scene document")?;
    let size = parse_ratio(&args.ratio)?.dimensions();

    let source = make_source(args.assets_root.as_deref())?;
    let store = adscene::PreparedImageStore::prepare(&doc, source.as_ref(), None);

    let mut rasterizer = make_rasterizer(args.fonts_dir.as_deref());
    let psd = adscene::export_psd(&doc, size, &store, &mut rasterizer, None)?;

    write_out(&args.out, &psd)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
