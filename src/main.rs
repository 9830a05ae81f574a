//! kfxgen - KFX container generator

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use kfxgen::{CancelFlag, Config, Document, Job, convert_batch_output};

#[derive(Parser)]
#[command(name = "kfxgen")]
#[command(version, about = "Generate Kindle KFX containers from parsed documents", long_about = None)]
#[command(after_help = "EXAMPLES:
    kfxgen -s book.css book.json              Write book.kfx
    kfxgen -s a.css -s b.css -o out/ *.json   Convert many documents into out/
    kfxgen --debug-dump book.json             Also write book.kfx.txt")]
struct Cli {
    /// Document trees (JSON)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Stylesheet applied to every document, in order
    #[arg(short, long = "style", value_name = "CSS")]
    styles: Vec<PathBuf>,

    /// JSON settings overlaid on the built-in defaults
    #[arg(short, long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Output file (single input) or directory
    #[arg(short, long, value_name = "OUT")]
    output: Option<PathBuf>,

    /// Write a text rendering of every fragment beside each output
    #[arg(long)]
    debug_dump: bool,

    /// More log output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Convert every input; `Ok(false)` when any document failed.
fn run(cli: &Cli) -> Result<bool, String> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => Config::default(),
    };
    if cli.debug_dump {
        config.settings.debug_dump = true;
    }

    let stylesheets = cli
        .styles
        .iter()
        .map(|path| std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ok = true;
    let mut jobs = Vec::new();
    let mut outputs = Vec::new();
    for input in &cli.inputs {
        match load_document(input) {
            Ok(doc) => {
                let mut job = Job::new(doc);
                job.stylesheets = stylesheets.clone();
                jobs.push(job);
                outputs.push(output_path(input, cli.output.as_deref(), cli.inputs.len()));
            }
            Err(e) => {
                eprintln!("{}: {e}", input.display());
                ok = false;
            }
        }
    }

    let results = convert_batch_output(&jobs, &config, &CancelFlag::new());
    for ((id, result), path) in results.into_iter().zip(&outputs) {
        match result.and_then(|output| write_output(path, &output)) {
            Ok(()) => log::info!("{id}: wrote {}", path.display()),
            Err(e) => {
                eprintln!("{id}: {e}");
                ok = false;
            }
        }
    }
    Ok(ok)
}

fn load_document(path: &Path) -> kfxgen::Result<Document> {
    let json = std::fs::read_to_string(path)?;
    Document::from_json(&json)
}

/// `book.json` becomes `book.kfx`, next to the input or inside `out`.
///
/// With a single input, an `out` that is not an existing directory is used as
/// the file name itself.
fn output_path(input: &Path, out: Option<&Path>, count: usize) -> PathBuf {
    let file_name = input.with_extension("kfx");
    let file_name = file_name.file_name().map(PathBuf::from).unwrap_or_else(|| "out.kfx".into());
    match out {
        Some(out) if count == 1 && !out.is_dir() => out.to_path_buf(),
        Some(dir) => dir.join(file_name),
        None => input.with_extension("kfx"),
    }
}

fn write_output(path: &Path, output: &kfxgen::Output) -> kfxgen::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &output.bytes)?;
    if let Some(dump) = &output.dump {
        let mut dump_path = path.as_os_str().to_owned();
        dump_path.push(".txt");
        std::fs::write(PathBuf::from(dump_path), dump)?;
    }
    Ok(())
}
