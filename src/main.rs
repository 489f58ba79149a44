use anyhow::{Context, Result};
use clap::Parser;
use timeguard::cli::{Cli, OutputFormat};
use timeguard::config::{EngineOptions, TimingConfig};
use timeguard::engine::Engine;
use timeguard::ir::Program;
use timeguard::store::DataFiles;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; warnings always reach stderr
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Cli) -> Result<TimingConfig> {
    let config = match &args.config {
        Some(path) => TimingConfig::from_file(path)?,
        None => {
            let cwd = std::env::current_dir().context("cannot read working directory")?;
            TimingConfig::load_nearest(&cwd)?
        }
    };
    Ok(config)
}

fn engine_options(args: &Cli, config: &TimingConfig) -> EngineOptions {
    let mut options = EngineOptions::for_config(config);
    if args.no_cache {
        options.use_cache = false;
    }
    options.max_arity = usize::from(args.max_arity);
    options.entry_block_name = args.entry_block.clone();
    options
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let options = engine_options(&args, &config);
    let data_dir = args.data_dir.clone().unwrap_or_else(|| config.dir.clone());

    let mut engine = Engine::new(config, options, DataFiles::new(data_dir))?;
    if let Some(phase) = args.phase {
        engine = engine.with_phase(phase);
    }

    let mut program = Program::from_file(&args.program)?;
    let report = engine.run(&mut program)?;

    if let Some(output) = &args.output {
        program
            .write_to(output)
            .with_context(|| format!("failed to write {}", output.display()))?;
    }

    match args.format {
        OutputFormat::Text => report.print_summary(),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(())
}
