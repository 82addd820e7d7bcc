//! # Lamina Slicer Application
//!
//! Command-line interface for slicing 3D models into Marlin G-code.
//!
//! ## Usage
//!
//! ```bash
//! lamina model.stl                          # writes model.gcode
//! lamina -o out.gcode -S layer_height=0.15 model.stl
//! lamina --format svg model.stl             # writes model.svg
//! lamina -f pla,pva --support model.stl     # material presets
//! lamina --help-configs                     # document every option
//! ```
//!
//! Options come from (in order of increasing precedence) the schema
//! defaults, the persisted user config file, `--load-config` files, and
//! `-S` overrides. Invalid option values are warnings, not errors; a
//! missing input file, an unsupported format, or a non-manifold model
//! (without `-n`) ends the run with a nonzero exit code.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lamina_slicer::config::{schema_entry, SlicerConfig};
use lamina_slicer::core::read_mesh;
use lamina_slicer::gcode::{write_svg, GCodeEmitter};
use lamina_slicer::progress::terminal_progress;
use lamina_slicer::{Slicer, SlicerError};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Gcode,
    Svg,
}

/// Lamina - slice triangle meshes into FFF extrusion toolpaths
#[derive(Parser, Debug)]
#[command(name = "lamina")]
#[command(version)]
#[command(about = "Slices 3D models into Marlin G-code", long_about = None)]
struct Cli {
    /// Input model file (STL, OBJ, OFF, or 3MJ)
    infile: Option<PathBuf>,

    /// Output file; defaults to the input name with the format's extension
    #[arg(short, long, value_name = "FILE")]
    outfile: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "gcode")]
    format: OutputFormat,

    /// Skip performing model manifold validation
    #[arg(short = 'n', long)]
    no_validation: bool,

    /// Show sliced paths output in a viewer
    #[arg(short, long)]
    gui_display: bool,

    /// Load a config file of key=value lines (repeatable)
    #[arg(long, value_name = "FILE")]
    load_config: Vec<PathBuf>,

    /// Set a slicing config option (repeatable)
    #[arg(short = 'S', long, value_name = "OPTNAME=VALUE")]
    set_option: Vec<String>,

    /// Display a slicing config option value (repeatable)
    #[arg(short = 'Q', long, value_name = "OPTNAME")]
    query_option: Vec<String>,

    /// Save any changed slicing config options
    #[arg(short = 'w', long)]
    write_configs: bool,

    /// Display help for all slicing options
    #[arg(long)]
    help_configs: bool,

    /// Display values of all slicing options
    #[arg(long)]
    show_configs: bool,

    /// Force adhesion to not be generated
    #[arg(long, conflicts_with_all = ["raft", "brim"])]
    no_raft: bool,

    /// Force raft generation
    #[arg(long)]
    raft: bool,

    /// Force brim generation
    #[arg(long)]
    brim: bool,

    /// Force support structures off
    #[arg(long, conflicts_with_all = ["support", "support_all"])]
    no_support: bool,

    /// Force external support structure generation
    #[arg(long)]
    support: bool,

    /// Force support structure generation everywhere
    #[arg(long)]
    support_all: bool,

    /// Configure extruder(s) for given materials, in order (e.g. pla,pva)
    #[arg(short = 'f', long, value_name = "MATERIAL,...")]
    filament: Option<String>,

    /// Scale the model by a factor or per-axis SX,SY,SZ (repeatable)
    #[arg(long, value_name = "FACTOR")]
    scale: Vec<String>,

    /// Number of worker threads (default: all cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_scale(arg: &str) -> Result<(f64, f64, f64)> {
    let parts: Vec<&str> = arg.split(',').collect();
    let nums: Vec<f64> = parts
        .iter()
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("bad scale factor {:?}", arg))?;
    match nums.as_slice() {
        [s] => Ok((*s, *s, *s)),
        [sx, sy, sz] => Ok((*sx, *sy, *sz)),
        _ => bail!("scale takes one factor or SX,SY,SZ, got {:?}", arg),
    }
}

fn load_configuration(cli: &Cli) -> Result<SlicerConfig> {
    let mut conf = SlicerConfig::new();
    // The persisted user config is best-effort: a broken file degrades to
    // defaults instead of killing the run.
    if let Some(path) = SlicerConfig::default_path() {
        if path.is_file() {
            if let Err(err) = conf.load_file(&path) {
                warn!("ignoring user config {}: {}", path.display(), err);
            }
        }
    }
    for path in &cli.load_config {
        conf.load_file(path)
            .with_context(|| format!("cannot load config file {}", path.display()))?;
    }
    let forced: [(bool, &str, &str); 6] = [
        (cli.no_raft, "adhesion_type", "None"),
        (cli.raft, "adhesion_type", "Raft"),
        (cli.brim, "adhesion_type", "Brim"),
        (cli.no_support, "support_type", "None"),
        (cli.support, "support_type", "External"),
        (cli.support_all, "support_type", "Everywhere"),
    ];
    for (enabled, key, value) in forced {
        if enabled {
            conf.set_lenient(key, value);
        }
    }
    for opt in &cli.set_option {
        match opt.split_once('=') {
            Some((key, value)) => conf.set_lenient(key, value),
            None => warn!("ignoring malformed option {:?} (expected NAME=VALUE)", opt),
        }
    }
    if let Some(filament) = &cli.filament {
        let materials: Vec<String> = filament
            .to_ascii_lowercase()
            .split(',')
            .map(str::to_string)
            .collect();
        conf.apply_materials(&materials)
            .context("cannot apply filament materials")?;
    }
    Ok(conf)
}

fn run(cli: Cli) -> Result<()> {
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("cannot size the worker pool")?;
        info!("using {} worker threads", threads);
    } else {
        info!("using all {} CPU cores", num_cpus::get());
    }

    let conf = load_configuration(&cli)?;

    if cli.write_configs {
        let path = SlicerConfig::default_path()
            .context("no writable config location on this platform")?;
        conf.save_file(&path)?;
    }
    for key in &cli.query_option {
        if schema_entry(key).is_none() {
            warn!("unknown config option: {}", key);
            continue;
        }
        print!("{}", conf.describe(Some(key), true));
    }
    if cli.help_configs {
        print!("{}", conf.describe(None, false));
    }
    if cli.show_configs {
        print!("{}", conf.describe(None, true));
    }

    let Some(infile) = &cli.infile else {
        return Ok(());
    };
    let mut mesh = read_mesh(infile)?;
    let bb = mesh.points.bounds();
    info!(
        "read {} ({} facets, {:.1} x {:.1} x {:.1})",
        infile.display(),
        mesh.triangle_count(),
        bb.maxx - bb.minx,
        bb.maxy - bb.miny,
        bb.maxz - bb.minz,
    );
    for arg in &cli.scale {
        let (sx, sy, sz) = parse_scale(arg)?;
        mesh.scale(sx, sy, sz);
        mesh.relevel();
    }

    if !cli.no_validation {
        if !mesh.check_manifold() {
            return Err(SlicerError::NonManifold {
                dupe_triangles: mesh.dupe_triangles.len(),
                hole_edges: mesh.hole_edges.len(),
                excess_edges: mesh.excess_edges.len(),
            }
            .into());
        }
        info!("{} is manifold", infile.display());
    }

    let extension = match cli.format {
        OutputFormat::Gcode => "gcode",
        OutputFormat::Svg => "svg",
    };
    let outfile = cli
        .outfile
        .clone()
        .unwrap_or_else(|| infile.with_extension(extension));

    let mut slicer = Slicer::new(vec![mesh], conf);
    slicer.set_progress_callback(terminal_progress());
    let start = Instant::now();
    let artifacts = slicer.slice()?;

    info!("writing {} to {}", extension, outfile.display());
    let file = File::create(&outfile)
        .with_context(|| format!("cannot create output file {}", outfile.display()))?;
    let mut writer = BufWriter::new(file);
    let build_time = match cli.format {
        OutputFormat::Gcode => {
            let mut emitter = GCodeEmitter::new(&slicer.conf);
            emitter.emit(&mut writer, &artifacts)?;
            emitter.build_time()
        }
        OutputFormat::Svg => {
            write_svg(&mut writer, &artifacts, &slicer.conf)?;
            0.0
        }
    };
    writer.flush()?;

    eprintln!();
    println!(
        "Slicing complete in {:.1}s.  Estimated build time: {}h {:02}m",
        start.elapsed().as_secs_f64(),
        (build_time / 3600.0) as u64,
        ((build_time % 3600.0) / 60.0) as u64,
    );
    if !artifacts.degenerate_layers.is_empty() {
        warn!(
            "{} layer(s) had incomplete outlines: {:?}",
            artifacts.degenerate_layers.len(),
            artifacts.degenerate_layers
        );
    }
    if cli.gui_display {
        warn!("the slice viewer ships separately; point it at the sliced output");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_basic_invocation() {
        let cli = Cli::parse_from([
            "lamina",
            "-o",
            "out.gcode",
            "-S",
            "layer_height=0.15",
            "-S",
            "infill_density=20",
            "model.stl",
        ]);
        assert_eq!(cli.infile, Some(PathBuf::from("model.stl")));
        assert_eq!(cli.outfile, Some(PathBuf::from("out.gcode")));
        assert_eq!(cli.set_option.len(), 2);
        assert_eq!(cli.format, OutputFormat::Gcode);
    }

    #[test]
    fn cli_parses_svg_format_and_flags() {
        let cli = Cli::parse_from([
            "lamina",
            "--format",
            "svg",
            "--no-validation",
            "-f",
            "pla,pva",
            "model.obj",
        ]);
        assert_eq!(cli.format, OutputFormat::Svg);
        assert!(cli.no_validation);
        assert_eq!(cli.filament.as_deref(), Some("pla,pva"));
    }

    #[test]
    fn scale_specs_parse() {
        assert_eq!(parse_scale("2").unwrap(), (2.0, 2.0, 2.0));
        assert_eq!(parse_scale("1,2,0.5").unwrap(), (1.0, 2.0, 0.5));
        assert!(parse_scale("1,2").is_err());
        assert!(parse_scale("banana").is_err());
    }

    #[test]
    fn support_flags_map_to_options() {
        let cli = Cli::parse_from(["lamina", "--support", "--brim"]);
        let conf = load_configuration(&cli).unwrap();
        assert_eq!(conf.get_str("support_type"), "External");
        assert_eq!(conf.get_str("adhesion_type"), "Brim");
    }

    #[test]
    fn option_overrides_apply_leniently() {
        let cli = Cli::parse_from([
            "lamina",
            "-S",
            "layer_height=0.15",
            "-S",
            "layer_height=9.9",
            "-S",
            "nonsense=1",
        ]);
        let conf = load_configuration(&cli).unwrap();
        // The valid override sticks; the out-of-range and unknown ones are
        // dropped with warnings.
        assert_eq!(conf.get_float("layer_height"), 0.15);
    }
}
