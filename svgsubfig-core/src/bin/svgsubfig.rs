//! SVG Subfig CLI
//!
//! Composes the figure described by a JSON file into a sibling `.svg`,
//! then converts it with Inkscape unless `--noconvert` is given.
//! Outputs a JSON report to stdout.

use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use svgsubfig_core::convert::is_converter_on_path;
use svgsubfig_core::{convert_svg, ConvertOptions, FigureError, SubFigure, ENGINE_VERSION};

#[derive(Parser)]
#[command(name = "svgsubfig", version = ENGINE_VERSION)]
#[command(about = "SVGSubFig generator - one-row labeled figures from SVG, PNG and JPEG")]
struct Cli {
    /// Figure description; `.json` is appended when no suffix is given
    config: PathBuf,

    /// Skip the PDF/PNG/SVG export step
    #[arg(long)]
    noconvert: bool,

    /// Converter executable
    #[arg(long, default_value = svgsubfig_core::convert::DEFAULT_CONVERTER)]
    inkscape: String,

    /// Export resolution
    #[arg(long, default_value_t = svgsubfig_core::convert::DEFAULT_DPI)]
    dpi: u32,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(arg: &Path) -> PathBuf {
    if arg.extension().is_none() {
        arg.with_extension("json")
    } else {
        arg.to_path_buf()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = config_path(&cli.config);
    let svg_path = config.with_extension("svg");

    let report = match SubFigure::from_description_file(&config).and_then(|f| f.save(&svg_path)) {
        Ok(r) => r,
        Err(e) => {
            let output = serde_json::json!({
                "success": false,
                "engine_version": ENGINE_VERSION,
                "error": e.to_string(),
            });
            println!("{output}");
            return ExitCode::FAILURE;
        }
    };

    let mut output = serde_json::json!({
        "success": true,
        "engine_version": ENGINE_VERSION,
        "figure": report,
    });

    if !cli.noconvert {
        let options = ConvertOptions {
            program: cli.inkscape,
            dpi: cli.dpi,
            ..Default::default()
        };
        let converted = if is_converter_on_path(&options.program) {
            convert_svg(&svg_path, &options)
        } else {
            Err(FigureError::Conversion(format!("{} not found on PATH", options.program)))
        };
        if let Err(e) = converted {
            output["conversion_error"] = serde_json::Value::String(e.to_string());
            println!("{output:#}");
            return ExitCode::from(2); // Figure written, export failed
        }
        output["converted"] = serde_json::json!(options.formats);
    }

    println!("{output:#}");
    ExitCode::SUCCESS
}
