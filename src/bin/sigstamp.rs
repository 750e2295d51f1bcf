//! sigstamp CLI tool
//!
//! A command-line tool for copying PDF signature appearances onto other PDFs.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process;

use sigstamp::{
    CopyOptions, Fractions, Limits, PageRasterizer, PageTarget, Placement, PlacementSpec, Rect,
    StampAllOptions, Stamper, DEFAULT_DPI,
};

/// sigstamp - Copy the visible appearance of a PDF signature onto other PDFs
#[derive(Parser)]
#[command(name = "sigstamp")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # List the signature fields of a signed PDF
    sigstamp inspect signed.pdf

    # Copy the signature on page 2 to the same spot on page 1 of another PDF
    sigstamp copy --source signed.pdf --source-page 2 --target contract.pdf -o out.pdf

    # Put the signature on every page of several handouts
    sigstamp stamp-all --source signed.pdf \"handouts/*.pdf\" -o stamped/

    # Place an existing PNG in the lower right corner of every page
    sigstamp place contract.pdf --image sig.png --relative 0.7 0.05 0.25 0.08 --all-pages -o out.pdf")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Directory containing the Pdfium shared library (falls back to the system library)
    #[arg(long, global = true, value_name = "DIR")]
    pdfium_lib: Option<String>,

    /// Rendering resolution for signature appearances
    #[arg(long, global = true, default_value_t = DEFAULT_DPI)]
    dpi: f32,

    /// Refuse target documents with more pages than this
    #[arg(long, global = true)]
    max_pages: Option<usize>,

    /// Refuse rendering resolutions above this
    #[arg(long, global = true)]
    max_dpi: Option<f32>,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the signature widgets of a PDF
    Inspect {
        /// PDF file to inspect
        input: PathBuf,
    },

    /// Render a signature field's appearance to PNG
    Render {
        /// Signed PDF file
        input: PathBuf,

        /// Fully qualified field name (defaults to the first signature field)
        #[arg(long)]
        field: Option<String>,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Copy a signature appearance onto one page of another PDF
    Copy {
        /// Signed PDF holding the signature widget
        #[arg(long)]
        source: PathBuf,

        /// PDF to stamp
        #[arg(long)]
        target: PathBuf,

        /// Page of the source PDF holding the widget
        #[arg(long, default_value_t = 1)]
        source_page: usize,

        /// Page of the target PDF to stamp
        #[arg(long, default_value_t = 1)]
        target_page: usize,

        /// Region to crop when the source page has no signature widget
        #[arg(long, num_args = 4, value_names = ["X", "Y", "W", "H"], allow_negative_numbers = true)]
        src: Option<Vec<f32>>,

        /// Destination rectangle (defaults to the widget's own position)
        #[arg(long, num_args = 4, value_names = ["X", "Y", "W", "H"], allow_negative_numbers = true)]
        dst: Option<Vec<f32>>,

        /// Measure --src and --dst y coordinates from the top of the page
        #[arg(long)]
        coords_from_top: bool,

        /// Draw a border around the stamp
        #[arg(long)]
        debug_border: bool,

        /// Ignore --dst and reuse the widget's position
        #[arg(long)]
        use_original_location: bool,

        /// Keep the widget's absolute position instead of scaling it to the target page
        #[arg(long)]
        no_normalize: bool,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Stamp a signature appearance on every page of one or more PDFs
    StampAll {
        /// Signed PDF holding the signature widget
        #[arg(long)]
        source: PathBuf,

        /// Page of the source PDF holding the widget
        #[arg(long, default_value_t = 1)]
        source_page: usize,

        /// PDFs to stamp. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        targets: Vec<String>,

        /// Output PDF path, or a directory when stamping several files
        #[arg(short, long)]
        output: PathBuf,

        /// Draw a border around each stamp
        #[arg(long)]
        debug_border: bool,
    },

    /// Place a PNG image on a PDF
    Place {
        /// PDF to stamp
        input: PathBuf,

        /// PNG image to place
        #[arg(long)]
        image: PathBuf,

        /// Absolute rectangle in points
        #[arg(long, num_args = 4, value_names = ["X", "Y", "W", "H"], conflicts_with = "relative")]
        rect: Option<Vec<f32>>,

        /// Rectangle as fractions (0..1) of the page size
        #[arg(long, num_args = 4, value_names = ["RX", "RY", "RW", "RH"])]
        relative: Option<Vec<f32>>,

        /// Page to stamp
        #[arg(long, default_value_t = 1, conflicts_with = "all_pages")]
        page: usize,

        /// Stamp every page
        #[arg(long)]
        all_pages: bool,

        /// Measure --rect y from the top of the page
        #[arg(long)]
        coords_from_top: bool,

        /// Draw a border around the stamp
        #[arg(long)]
        debug_border: bool,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.global.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Inspect { input } => cmd_inspect(input),
        Commands::Render { input, field, output } => cmd_render(&cli.global, input, field, output),
        Commands::Copy {
            source, target, source_page, target_page, src, dst,
            coords_from_top, debug_border, use_original_location, no_normalize, output, open,
        } => {
            let options = CopyOptions {
                source_page,
                target_page,
                manual_source: src.as_deref().map(rect_from_args).unwrap_or_default(),
                destination: dst.as_deref().map(rect_from_args).unwrap_or_default(),
                coords_from_top,
                debug_border,
                use_original_location,
                normalize_to_target: !no_normalize,
            };
            cmd_copy(&cli.global, source, target, &options, output, open)
        }
        Commands::StampAll { source, source_page, targets, output, debug_border } => {
            let options = StampAllOptions { source_page, debug_border };
            cmd_stamp_all(&cli.global, source, targets, output, &options)
        }
        Commands::Place {
            input, image, rect, relative, page, all_pages, coords_from_top, debug_border, output,
        } => cmd_place(
            &cli.global, input, image, rect, relative, page, all_pages, coords_from_top, debug_border, output,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// clap guarantees four values for X Y W H arguments
fn rect_from_args(values: &[f32]) -> Rect {
    match values {
        [x, y, w, h] => Rect::new(*x, *y, *w, *h),
        _ => Rect::default(),
    }
}

fn limits(global: &GlobalArgs) -> Limits {
    let defaults = Limits::default();
    Limits {
        max_dpi: global.max_dpi.unwrap_or(defaults.max_dpi),
        max_pages: global.max_pages.unwrap_or(defaults.max_pages),
        ..defaults
    }
}

#[cfg(feature = "pdfium")]
fn rasterizer(global: &GlobalArgs) -> Result<Box<dyn PageRasterizer>> {
    let dir = global.pdfium_lib.as_deref().unwrap_or("./");
    Ok(Box::new(sigstamp::PdfiumRasterizer::with_library_dir(dir)?))
}

#[cfg(not(feature = "pdfium"))]
fn rasterizer(_global: &GlobalArgs) -> Result<Box<dyn PageRasterizer>> {
    bail!("this build has no page renderer; rebuild with the `pdfium` feature")
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => warn!("glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                bail!("No files matched pattern: {}", pattern);
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    paths.sort();
    Ok(paths)
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// List signature widgets
fn cmd_inspect(input: PathBuf) -> Result<()> {
    let bytes = read_pdf(&input)?;
    let doc = sigstamp::PdfDocument::load(&bytes)?;
    let locations = sigstamp::pdf::list_signatures(&doc)?;

    println!("File: {}", input.display());
    println!("Pages: {}", doc.page_count());
    if locations.is_empty() {
        println!("No signature fields");
        return Ok(());
    }

    for location in &locations {
        let r = location.upright;
        println!(
            "{}: page {}, rotation {}, at ({:.1}, {:.1}) size {:.1} x {:.1} (y from top)",
            location.field_name,
            location.page,
            location.rotation.degrees(),
            r.x,
            r.y,
            r.width,
            r.height
        );
    }
    Ok(())
}

/// Render a signature appearance to PNG
fn cmd_render(global: &GlobalArgs, input: PathBuf, field: Option<String>, output: PathBuf) -> Result<()> {
    let source = read_pdf(&input)?;
    let rasterizer = rasterizer(global)?;
    let stamper = Stamper::new(rasterizer.as_ref()).with_limits(limits(global));

    eprintln!("Rendering signature at {} dpi...", global.dpi);
    let image = stamper.render_signature(&source, field.as_deref(), global.dpi)?;
    write_output(&output, image.png_bytes())?;

    eprintln!("Output: {} ({}x{} px)", output.display(), image.width, image.height);
    Ok(())
}

/// Copy a signature appearance onto one page
fn cmd_copy(
    global: &GlobalArgs,
    source: PathBuf,
    target: PathBuf,
    options: &CopyOptions,
    output: PathBuf,
    open: bool,
) -> Result<()> {
    let source_bytes = read_pdf(&source)?;
    let target_bytes = read_pdf(&target)?;
    let rasterizer = rasterizer(global)?;
    let stamper = Stamper::new(rasterizer.as_ref())
        .with_limits(limits(global))
        .with_dpi(global.dpi);

    eprintln!("Copying signature from page {} to page {}...", options.source_page, options.target_page);
    let stamped = stamper.copy_signature_appearance(&source_bytes, &target_bytes, options)?;
    write_output(&output, stamped.as_bytes())?;

    eprintln!("Output: {}", output.display());

    if open {
        open_file(&output)?;
    }
    Ok(())
}

/// Stamp every page of each target
fn cmd_stamp_all(
    global: &GlobalArgs,
    source: PathBuf,
    targets: Vec<String>,
    output: PathBuf,
    options: &StampAllOptions,
) -> Result<()> {
    let targets = expand_globs(targets)?;
    debug!("Expanded targets: {:?}", targets);
    let source_bytes = read_pdf(&source)?;
    let rasterizer = rasterizer(global)?;
    let stamper = Stamper::new(rasterizer.as_ref())
        .with_limits(limits(global))
        .with_dpi(global.dpi);

    let several = targets.len() > 1;
    if several {
        std::fs::create_dir_all(&output)
            .with_context(|| format!("failed to create {}", output.display()))?;
    }

    eprintln!("Stamping {} PDF file(s)...", targets.len());
    for target in &targets {
        let target_bytes = read_pdf(target)?;
        let stamped = stamper
            .stamp_all_pages(&source_bytes, &target_bytes, options)
            .with_context(|| format!("failed to stamp {}", target.display()))?;

        let destination = if several {
            let stem = target.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            output.join(format!("{}-stamped.pdf", stem))
        } else {
            output.clone()
        };
        write_output(&destination, stamped.as_bytes())?;
        eprintln!("  {} -> {}", target.display(), destination.display());
    }
    Ok(())
}

/// Place a PNG on one or all pages
#[allow(clippy::too_many_arguments)]
fn cmd_place(
    global: &GlobalArgs,
    input: PathBuf,
    image: PathBuf,
    rect: Option<Vec<f32>>,
    relative: Option<Vec<f32>>,
    page: usize,
    all_pages: bool,
    coords_from_top: bool,
    debug_border: bool,
    output: PathBuf,
) -> Result<()> {
    let placement = match (rect, relative) {
        (Some(rect), _) => Placement::Absolute {
            rect: rect_from_args(&rect),
            coords_from_top,
        },
        (None, Some(fractions)) => {
            let r = rect_from_args(&fractions);
            let fractions = Fractions::new(r.x, r.y, r.width, r.height);
            if !fractions.is_within_unit() {
                bail!("--relative values must lie between 0 and 1");
            }
            Placement::Relative(fractions)
        }
        (None, None) => bail!("one of --rect or --relative is required"),
    };
    let spec = PlacementSpec {
        placement,
        target: if all_pages { PageTarget::AllPages } else { PageTarget::Page(page) },
        debug_border,
    };

    let target_bytes = read_pdf(&input)?;
    let png = std::fs::read(&image).with_context(|| format!("failed to read {}", image.display()))?;

    // Placing a ready-made image needs no renderer
    let rasterizer = NoRenderer;
    let stamper = Stamper::new(&rasterizer).with_limits(limits(global));

    eprintln!("Placing {}...", image.display());
    let stamped = stamper.place_image(&target_bytes, &png, &spec)?;
    write_output(&output, stamped.as_bytes())?;

    eprintln!("Output: {}", output.display());
    Ok(())
}

struct NoRenderer;

impl PageRasterizer for NoRenderer {
    fn render_page(&self, _pdf: &[u8], _page_index: usize, _dpi: f32) -> sigstamp::Result<image::DynamicImage> {
        Err(sigstamp::Error::RendererUnavailable("no renderer configured".to_string()))
    }
}
