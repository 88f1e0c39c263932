//! karstgen: blob scene to Wavefront OBJ
//!
//! Reads a blob scene, extracts the isosurface block by block on the GPU and
//! writes every block's mesh to one OBJ file. SIGUSR1 stops the run after the
//! current block; whatever was extracted so far is still exported.

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use karstgen::{export_wavefront_obj, load_scene, Context, KarstConfig, KarstError, Mesher};

/// Set by SIGUSR1
static BAILOUT: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "karstgen")]
#[command(about = "Extract the isosurface of a blob field into a Wavefront OBJ mesh")]
struct Args {
    /// Scene file with the block layout and blob list, `-` for stdin
    #[arg(short = 'i', long = "input", default_value = "-")]
    input: String,

    /// OBJ file to write
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Isovalue override
    #[arg(long = "iso")]
    iso: Option<f32>,

    /// Print per-block progress
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    let filter = if args.debug { "info,karstgen=debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .init();

    if let Err(error) = run(&args) {
        match error.downcast_ref::<KarstError>() {
            Some(karst) => {
                log::error!("{}", karst);
                if let Some(build_log) = karst.build_log() {
                    eprintln!("{}", build_log);
                }
            }
            None => log::error!("{:#}", error),
        }
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => KarstConfig::load(path)?,
        None => KarstConfig::default(),
    };
    if let Some(iso) = args.iso {
        config.extraction.iso_value = iso;
    }
    config.validate()?;

    let scene = load_scene(&args.input).with_context(|| format!("reading {}", args.input))?;
    log::info!(
        "Loaded {} blobs over {} blocks",
        scene.blobs.len(),
        scene.layout.block_count()
    );

    let ctx = Context::new(&config.compute)?;
    let mesher = Mesher::new(&ctx, &config.extraction)?;

    install_bailout_handler();
    let meshes = mesher.run(&scene.blobs, &scene.layout, &BAILOUT)?;

    export_wavefront_obj(&meshes, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    Ok(())
}

#[cfg(unix)]
extern "C" fn on_sigusr1(_signal: libc::c_int) {
    BAILOUT.store(true, Ordering::Relaxed);
}

#[cfg(unix)]
fn install_bailout_handler() {
    let handler = on_sigusr1 as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe
    let previous = unsafe { libc::signal(libc::SIGUSR1, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("Failed to install the SIGUSR1 handler, bailout is unavailable");
    }
}

#[cfg(not(unix))]
fn install_bailout_handler() {
    log::debug!("SIGUSR1 bailout is only available on unix");
}
