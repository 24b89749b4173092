//! j2krecon CLI - inspect and exercise the JPEG 2000 reconstruction chain.
//!
//! `layout` prints the tile grid and subband trees of a codestream geometry. `flat` runs the
//! whole chain over all-zero code-blocks, which reconstructs the DC level of every component.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use jpegexp_recon::jpeg2000::subband::{Subband, synthesis_tree};
use jpegexp_recon::{
    CodeBlockStore, ColorMapping, DataKind, DecoderSpecs, ImageGeometry, J2kComponentInfo,
    J2kReconstructor, QuantizationParams, QuantizationType, ReconstructedImage,
    ReconstructionOptions, TileContext, WaveletFilter,
};

/// JPEG 2000 reconstruction core: ROI de-scaling, dequantization, inverse DWT and colour
#[derive(Parser)]
#[command(name = "j2krecon")]
#[command(version)]
#[command(about = "Inspect and run the JPEG 2000 sample reconstruction chain", long_about = None)]
#[command(after_help = "EXAMPLES:
    j2krecon layout -w 640 -H 480 --tile-width 256 --tile-height 256 -l 3
    j2krecon flat -w 64 -H 64 -n 3 --mct -o grey.ppm -f pnm
    J2K_DEBUG=1 j2krecon flat -w 16 -H 16 --filter irreversible -o out.raw")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tile grid and the subband tree of every tile-component
    #[command(visible_alias = "l")]
    Layout {
        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Reconstruct an image whose code-blocks are all zero
    #[command(visible_alias = "f")]
    Flat {
        #[command(flatten)]
        geometry: GeometryArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format: raw (interleaved 8-bit samples) or pnm (PGM/PPM)
        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,

        /// Resolution level to reconstruct (default: full resolution)
        #[arg(short, long)]
        resolution: Option<u8>,

        /// Map sYCC to sRGB after the component transform
        #[arg(long)]
        sycc: bool,

        /// Leave the samples centred on zero
        #[arg(long)]
        no_level_shift: bool,

        /// Skip the inverse component transform
        #[arg(long)]
        no_component_transform: bool,
    },
}

#[derive(Args)]
struct GeometryArgs {
    /// Image width on the reference grid
    #[arg(short, long)]
    width: u32,

    /// Image height on the reference grid
    #[arg(short = 'H', long)]
    height: u32,

    /// Image origin on the reference grid
    #[arg(long, default_value = "0")]
    x_origin: u32,

    #[arg(long, default_value = "0")]
    y_origin: u32,

    /// Nominal tile size (default: one tile)
    #[arg(long)]
    tile_width: Option<u32>,

    #[arg(long)]
    tile_height: Option<u32>,

    /// Number of components
    #[arg(short = 'n', long, default_value = "1")]
    components: usize,

    /// Component bit depth
    #[arg(short, long, default_value = "8")]
    depth: u8,

    /// Components are signed
    #[arg(long)]
    signed: bool,

    /// Horizontal and vertical subsampling of components after the first
    #[arg(long, default_value = "1")]
    subsampling: u8,

    /// Decomposition levels
    #[arg(short, long, default_value = "5")]
    levels: u8,

    /// Wavelet filter
    #[arg(long, default_value = "reversible", value_enum)]
    filter: FilterArg,

    /// Code-block width and height exponent
    #[arg(long, default_value = "6")]
    code_block: u8,

    /// Signal the multiple component transform in every tile
    #[arg(long)]
    mct: bool,

    /// ROI maximum shift for every component
    #[arg(long)]
    roi_shift: Option<u8>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    /// 5-3 reversible filter
    Reversible,
    /// 9-7 irreversible filter
    Irreversible,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Raw interleaved 8-bit samples
    Raw,
    /// Portable GrayMap / PixMap
    Pnm,
}

impl GeometryArgs {
    fn geometry(&self) -> ImageGeometry {
        let components = (0..self.components)
            .map(|c| {
                let info = J2kComponentInfo::new(self.depth, self.signed);
                if c == 0 {
                    info
                } else {
                    info.with_subsampling(self.subsampling, self.subsampling)
                }
            })
            .collect();
        let mut geometry = ImageGeometry::single_tile(self.width, self.height, components);
        geometry.x_origin = self.x_origin;
        geometry.y_origin = self.y_origin;
        geometry.tile_x_origin = 0;
        geometry.tile_y_origin = 0;
        geometry.tile_width = self.tile_width.unwrap_or(self.x_origin + self.width);
        geometry.tile_height = self.tile_height.unwrap_or(self.y_origin + self.height);
        geometry
    }

    fn specs(&self) -> DecoderSpecs {
        let mut specs = match self.filter {
            FilterArg::Reversible => DecoderSpecs::reversible(self.levels, self.depth),
            FilterArg::Irreversible => DecoderSpecs::new(
                WaveletFilter::Irreversible9x7,
                QuantizationType::Derived,
                QuantizationParams::derived(self.depth + 1, 1.0),
                self.levels,
            ),
        };
        specs
            .code_block_size
            .set_default((self.code_block, self.code_block));
        specs.component_transform.set_default(self.mct);
        specs.roi_shift.set_default(self.roi_shift);
        specs
    }
}

static LOGGER: StderrLogger = StderrLogger;

const RESET: &str = "\x1b[0m";

/// Timestamped, coloured log lines on stderr.
struct StderrLogger;

impl StderrLogger {
    fn timestamp() -> String {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs();
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60,
            now.subsec_millis()
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[34m",
            Level::Trace => "\x1b[90m",
        };
        eprintln!(
            "{} | {}{:5}{} | {}",
            Self::timestamp(),
            color,
            record.level(),
            RESET,
            record.args()
        );
    }

    fn flush(&self) {}
}

fn init_logging(verbose: u8) {
    let mut level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if std::env::var("J2K_DEBUG").is_ok() {
        level = level.max(LevelFilter::Debug);
    }
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Layout { geometry } => show_layout(&geometry),
        Commands::Flat {
            geometry,
            output,
            format,
            resolution,
            sycc,
            no_level_shift,
            no_component_transform,
        } => {
            let options = ReconstructionOptions {
                resolution_level: resolution,
                component_transform: !no_component_transform,
                color_mapping: if sycc {
                    ColorMapping::SYcc
                } else {
                    ColorMapping::None
                },
                level_shift: !no_level_shift,
                ..Default::default()
            };
            reconstruct_flat(&geometry, options, &output, format)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn show_layout(args: &GeometryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = args.geometry();
    geometry.validate()?;
    let specs = args.specs();
    let (ntx, nty) = geometry.num_tiles();
    let image = geometry.image_rect();
    println!(
        "Image: {}x{} at ({}, {}), {} components",
        image.width(),
        image.height(),
        image.x0,
        image.y0,
        geometry.num_components()
    );
    println!(
        "Tiles: {}x{} of {}x{}",
        ntx, nty, geometry.tile_width, geometry.tile_height
    );

    for ty in 0..nty {
        for tx in 0..ntx {
            let tile = TileContext {
                index: (ty * ntx + tx) as usize,
                x: tx,
                y: ty,
            };
            let rect = geometry.tile_rect(tx, ty);
            println!(
                "Tile {} ({}, {}): [{}, {}) x [{}, {})",
                tile.index, tx, ty, rect.x0, rect.x1, rect.y0, rect.y1
            );
            for c in 0..geometry.num_components() {
                let tree = synthesis_tree(&geometry, &specs, tile, c)?;
                println!("  Component {}:", c);
                print_subband(&tree, 2);
            }
        }
    }
    Ok(())
}

fn print_subband(sb: &Subband, indent: usize) {
    let info = &sb.info;
    let kind = if sb.is_leaf() {
        format!(
            "{} code-blocks, {} magnitude bits",
            info.code_block_count_total(),
            info.magbits
        )
    } else {
        "node".to_string()
    };
    println!(
        "{:indent$}rl {} {:?} {}x{} at ({}, {}) [{}]",
        "",
        info.res_level,
        info.orientation,
        info.w,
        info.h,
        info.ulx,
        info.uly,
        kind,
        indent = indent * 2
    );
    if let Some(children) = sb.children() {
        for child in children.iter() {
            print_subband(child, indent + 1);
        }
    }
}

fn reconstruct_flat(
    args: &GeometryArgs,
    options: ReconstructionOptions,
    output: &PathBuf,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = CodeBlockStore::new(args.geometry(), Arc::new(args.specs()))?;
    let mut recon = J2kReconstructor::new(store, options)?;
    let kind = recon.data_kind(0)?;
    let image = recon.decode_image(kind)?;

    match format {
        OutputFormat::Raw => fs::write(output, image.to_interleaved_u8()?)?,
        OutputFormat::Pnm => write_pnm(output, &image)?,
    }

    println!(
        "✓ Reconstructed {}x{} image ({} components, {:?} samples) to {:?}",
        image.width,
        image.height,
        image.component_count(),
        kind,
        output
    );
    Ok(())
}

fn write_pnm(path: &PathBuf, image: &ReconstructedImage) -> Result<(), Box<dyn std::error::Error>> {
    let magic = match image.component_count() {
        1 => "P5",
        3 => "P6",
        n => return Err(format!("PNM output needs 1 or 3 components, image has {}", n).into()),
    };
    let pixels = image.to_interleaved_u8()?;
    let first = &image.planes[0];
    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", magic)?;
    writeln!(file, "{} {}", first.width, first.height)?;
    writeln!(file, "255")?;
    file.write_all(&pixels)?;
    Ok(())
}
