use clap::{Parser, Subcommand};
use simple_press::assemble::{self, Site};
use simple_press::config::{self, SiteConfig};
use simple_press::render::{self, RenderOptions};
use simple_press::shortcode::ShortcodeRegistry;
use simple_press::types::CancelToken;
use simple_press::{generate, output, scan};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(clap::Args, Clone)]
struct BuildArgs {
    /// Ignore the output manifest and rewrite every file
    #[arg(long)]
    no_cache: bool,

    /// Exit non-zero when any document failed to build
    #[arg(long)]
    strict: bool,
}

#[derive(clap::Args, Clone)]
struct CheckArgs {
    /// Exit non-zero when any document has errors
    #[arg(long)]
    strict: bool,
}

#[derive(Parser)]
#[command(name = "simple-press")]
#[command(about = "Static site generator for markdown blogs")]
#[command(long_about = "\
Static site generator for markdown blogs

Your filesystem is the data source. Every markdown file under the content
directory becomes a page; its path becomes its URL.

Content structure:

  content/
  ├── config.toml                        # Site config (optional)
  ├── about.md                           # → /about/
  ├── posts/
  │   ├── 2023-05-01-hello-world.md      # → /posts/hello-world/ (dated 2023-05-01)
  │   └── cad-kernel/
  │       ├── index.md                   # → /posts/cad-kernel/ (page bundle)
  │       └── _notes.md                  # underscore prefix = skipped
  └── .drafts/                           # hidden = skipped

Front matter (YAML between --- or TOML between +++):
  title, date, draft, tags, series, series_weight, summary

Shortcodes:
  {{< video URL >}}  {{< toc >}}  {{< notice tip >}}…{{< /notice >}}
  {{< ref \"slug\" >}}  {{< relref \"slug#section\" >}}

Run 'simple-press gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Log pipeline progress (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: scan → render → assemble → generate
    Build(BuildArgs),
    /// Parse and render every document without writing output
    Check(CheckArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build(args) => build(&cli.source, &cli.output, &args),
        Command::Check(args) => check(&cli.source, &args),
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build(source: &Path, output_dir: &Path, args: &BuildArgs) -> Result<ExitCode, Box<dyn Error>> {
    let cancel = install_cancel_handler()?;
    let (config, site) = run_stages(source, &cancel, false)?;

    if cancel.is_cancelled() {
        output::print_summary(&site.summary());
        eprintln!("==> Build cancelled, nothing written to {}", output_dir.display());
        return Ok(ExitCode::FAILURE);
    }

    println!("==> Stage 4: Generating site → {}", output_dir.display());
    let report = generate::generate(&site, &config, output_dir, !args.no_cache)?;
    output::print_generate_output(&site, &report);

    println!();
    output::print_summary(&site.summary());
    println!("==> Build complete: {}", output_dir.display());

    Ok(exit_code(&site, args.strict))
}

fn check(source: &Path, args: &CheckArgs) -> Result<ExitCode, Box<dyn Error>> {
    let cancel = install_cancel_handler()?;
    let (_, site) = run_stages(source, &cancel, true)?;

    println!();
    output::print_summary(&site.summary());
    if cancel.is_cancelled() {
        eprintln!("==> Check cancelled");
        return Ok(ExitCode::FAILURE);
    }
    if site.failures.is_empty() {
        println!("==> Content is valid");
    }
    Ok(exit_code(&site, args.strict))
}

/// Load config, then scan, render and assemble the content tree.
///
/// Progress events from the parallel stages are printed by a dedicated
/// thread as they arrive.
fn run_stages(
    source: &Path,
    cancel: &CancelToken,
    list_documents: bool,
) -> Result<(SiteConfig, Site), Box<dyn Error>> {
    let config = config::load_config(source)?;
    let registry = ShortcodeRegistry::from_config(&config.shortcodes)?;
    init_thread_pool(&config.processing);

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            for line in output::format_event(&event) {
                println!("{}", line);
            }
        }
    });

    println!("==> Stage 1: Scanning {}", source.display());
    let manifest = scan::scan(source, cancel, Some(&tx))?;
    if list_documents {
        output::print_scan_output(&manifest);
    }

    println!("==> Stage 2: Rendering {} documents", manifest.documents.len());
    let options = RenderOptions::from_config(&config.content);
    let (pages, mut failures) =
        render::render_all(manifest.documents, &registry, &options, cancel, Some(&tx));
    drop(tx);
    printer.join().map_err(|_| "progress printer panicked")?;

    println!("==> Stage 3: Assembling site");
    failures.extend(manifest.failures);
    let site = assemble::assemble(pages, failures);
    Ok((config, site))
}

/// Per-document failures only fail the process under `--strict`.
fn exit_code(site: &Site, strict: bool) -> ExitCode {
    if strict && !site.failures.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Ctrl+C stops new documents from starting; in-flight ones finish.
fn install_cancel_handler() -> Result<CancelToken, ctrlc::Error> {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel())?;
    Ok(cancel)
}

/// `--verbose` enables INFO level, otherwise use RUST_LOG or default to WARN.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
