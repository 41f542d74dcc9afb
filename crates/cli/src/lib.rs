use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pageview_core::{OverlayRegion, Rotation, Viewer, ViewerConfig};
use pageview_engine::LinkTarget;
use pageview_render::{ImageBackend, RegionStyle, RenderBackend};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pageview")]
#[command(about = "Page viewer core: rasterize pages, map links, prerender")]
pub struct Cli {
    /// TOML configuration file. PAGEVIEW_* variables override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print page count, page sizes and link counts as JSON.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the clickable regions of one page as JSON.
    Links {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        view: ViewArgs,
        /// Clockwise display rotation in degrees.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rotation: i32,
        /// On-screen page box as WIDTHxHEIGHT, instead of the computed one.
        #[arg(long, value_parser = parse_size)]
        display: Option<(f32, f32)>,
    },
    /// Rasterize one page to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        view: ViewArgs,
        /// Outline link regions on top of the raster.
        #[arg(long)]
        show_links: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Prerender every page, printing progress and a JSON report.
    Prerender {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
        /// Pages rendered at once.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Write every page thumbnail as PNG.
    Thumbs {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Zoom percentage, clamped to 25..=300.
    #[arg(long)]
    zoom: Option<u16>,
    /// Container box as WIDTHxHEIGHT logical pixels.
    #[arg(long, value_parser = parse_size)]
    container: Option<(f32, f32)>,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageOutput>,
    annotation_failures: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    width_pt: Option<f32>,
    height_pt: Option<f32>,
    links: usize,
}

#[derive(Debug, Serialize)]
struct LinksOutput {
    page: u32,
    zoom_percent: u16,
    rotation: u16,
    display_box: Option<SizeOutput>,
    regions: Vec<RegionOutput>,
}

#[derive(Debug, Serialize)]
struct SizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct RegionOutput {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    target: LinkTarget,
}

impl From<&OverlayRegion> for RegionOutput {
    fn from(region: &OverlayRegion) -> Self {
        Self {
            left: region.rect.left,
            top: region.rect.top,
            width: region.rect.width,
            height: region.rect.height,
            target: region.target.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ThumbsOutput {
    pages: u32,
    written: Vec<String>,
    failed: Vec<u32>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let config = || -> Result<ViewerConfig> {
        ViewerConfig::load(cli.config.as_deref()).context("failed to load configuration")
    };

    match cli.command {
        Commands::Info { ref file } => run_info(file, config()?),
        Commands::Links { ref file, page, ref view, rotation, display } => {
            run_links(file, config()?, page, view, rotation, display)
        }
        Commands::Render { ref file, page, ref view, show_links, ref output } => {
            run_render(file, config()?, page, view, show_links, output.as_deref())
        }
        Commands::Prerender { ref file, ref view, concurrency } => {
            let mut config = config()?;
            if let Some(concurrency) = concurrency {
                config = config.with_concurrency(concurrency);
            }
            run_prerender(file, config, view)
        }
        Commands::Thumbs { ref file, ref out_dir } => run_thumbs(file, config()?, out_dir),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable. `RUST_LOG` wins
/// over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "pageview=debug" } else { "pageview=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_viewer(file: &Path, config: ViewerConfig) -> Result<Viewer> {
    ensure_pdf_exists(file)?;
    Viewer::open(file, config).context("failed to open PDF")
}

fn apply_view(viewer: &mut Viewer, view: &ViewArgs) {
    if let Some((width, height)) = view.container {
        viewer.set_container_size(width, height);
    }
    if let Some(zoom) = view.zoom {
        viewer.set_zoom(zoom);
    }
}

fn goto(viewer: &mut Viewer, page: u32) -> Result<()> {
    if page == 0 || page > viewer.page_count() {
        anyhow::bail!("--page must be within 1..={}", viewer.page_count());
    }
    viewer.goto_page(page);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn run_info(file: &Path, config: ViewerConfig) -> Result<()> {
    let viewer = open_viewer(file, config)?;
    let annotations = viewer.annotations();

    let pages = (1..=viewer.page_count())
        .map(|page| {
            let size = viewer.rasterizer().page_size(page).ok();
            PageOutput {
                page,
                width_pt: size.map(|s| s.width_pt),
                height_pt: size.map(|s| s.height_pt),
                links: annotations.links(page).len(),
            }
        })
        .collect();

    print_json(&InfoOutput {
        path: file.display().to_string(),
        page_count: viewer.page_count(),
        pages,
        annotation_failures: annotations.failed_pages().to_vec(),
    })
}

fn run_links(
    file: &Path,
    config: ViewerConfig,
    page: u32,
    view: &ViewArgs,
    rotation: i32,
    display: Option<(f32, f32)>,
) -> Result<()> {
    let rotation = Rotation::from_degrees(rotation)
        .with_context(|| format!("--rotation must be a multiple of 90, got {rotation}"))?;

    let mut viewer = open_viewer(file, config)?;
    goto(&mut viewer, page)?;
    apply_view(&mut viewer, view);
    viewer.set_rotation(rotation);
    if let Some((width, height)) = display {
        viewer.set_display_box(width, height);
    }

    let viewport = viewer.viewport();
    print_json(&LinksOutput {
        page: viewport.current_page,
        zoom_percent: viewport.zoom_percent,
        rotation: viewport.rotation.degrees(),
        display_box: viewer.display_box().map(|display| SizeOutput {
            width: display.width,
            height: display.height,
        }),
        regions: viewer.overlay_regions().iter().map(RegionOutput::from).collect(),
    })
}

fn run_render(
    file: &Path,
    config: ViewerConfig,
    page: u32,
    view: &ViewArgs,
    show_links: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mut viewer = open_viewer(file, config)?;
    goto(&mut viewer, page)?;
    apply_view(&mut viewer, view);

    let raster = viewer
        .render_current()
        .with_context(|| format!("failed to render page {page}"))?;

    let image = if show_links {
        // Map links straight into raster pixels.
        viewer.set_display_box(raster.pixel_width() as f32, raster.pixel_height() as f32);

        let mut backend = ImageBackend::new();
        let surface = backend.create_surface(raster.pixel_width(), raster.pixel_height());
        backend.draw_raster(surface, &raster.image)?;
        for region in viewer.overlay_regions() {
            backend.draw_region(surface, region.rect, RegionStyle::LINK)?;
        }
        backend
            .take_surface(surface)
            .context("rendering surface disappeared")?
    } else {
        raster.image.clone()
    };

    let output = output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_page_output(file, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_prerender(file: &Path, config: ViewerConfig, view: &ViewArgs) -> Result<()> {
    let mut viewer = open_viewer(file, config)?;
    apply_view(&mut viewer, view);

    let progress = viewer.subscribe_progress();
    let report = viewer.run_prerender().context("prerender failed")?;

    for percent in progress.try_iter() {
        println!("progress: {percent}");
    }
    print_json(&report)
}

fn run_thumbs(file: &Path, config: ViewerConfig, out_dir: &Path) -> Result<()> {
    let mut viewer = open_viewer(file, config)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    viewer.start_thumbnails()?;
    let report = match viewer.wait_for_thumbnails() {
        Some(result) => result.context("thumbnail generation failed")?,
        None => anyhow::bail!("thumbnail generation did not start"),
    };

    let mut written = Vec::new();
    for page in 1..=report.pages {
        let Some(thumbnail) = viewer.thumbnail(page) else {
            continue;
        };
        let path = out_dir.join(format!("page-{page:04}.png"));
        thumbnail
            .image
            .save(&path)
            .with_context(|| format!("failed to write image to {}", path.display()))?;
        written.push(path.display().to_string());
    }

    print_json(&ThumbsOutput {
        pages: report.pages,
        written,
        failed: report.failed,
    })
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn parse_size(value: &str) -> Result<(f32, f32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;

    let parse = |part: &str| {
        part.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| format!("'{part}' is not a positive number"))
    };
    Ok((parse(width)?, parse(height)?))
}

fn default_page_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_container_sizes() {
        assert_eq!(parse_size("850x1100"), Ok((850.0, 1100.0)));
        assert_eq!(parse_size("612.5X792"), Ok((612.5, 792.0)));
        assert!(parse_size("850").is_err());
        assert!(parse_size("0x100").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn default_output_sits_next_to_the_document() {
        let path = default_page_output(Path::new("/tmp/docs/report.pdf"), 3);
        assert_eq!(path, PathBuf::from("/tmp/docs/report-page-3.png"));
    }
}
