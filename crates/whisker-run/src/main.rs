//! whisker-run - compile a Mustache template and render it with JSON data.
//!
//! The engine itself has no value model; this binary supplies one backed by
//! `serde_json::Value` and writes the rendered output to stdout.

mod json;

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whisker_program::Dump;

use crate::json::JsonRender;

#[derive(Parser, Debug)]
#[command(name = "whisker-run")]
#[command(about = "Compile a Mustache template and render it with JSON data")]
struct Cli {
    /// Path to the root template (partials resolve relative to it)
    template: PathBuf,

    /// JSON file providing the root render scope
    #[arg(long)]
    data: Option<PathBuf>,

    /// Print the compiled instruction listing instead of rendering
    #[arg(long)]
    dump: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisker_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let template = cli
        .template
        .to_str()
        .context("template path is not valid UTF-8")?;
    let program = whisker_loader::load_file(template)
        .with_context(|| format!("failed to compile {template}"))?;
    info!(
        "compiled {} template(s), {} instructions",
        program.template_count(),
        program.instructions().len()
    );

    if cli.dump {
        print!("{}", Dump(&program));
        return Ok(());
    }

    let scope = match &cli.data {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("invalid JSON in {}", path.display()))?
        }
        None => serde_json::Value::Null,
    };

    let mut handler = JsonRender::new();
    whisker_vm::render(&program, &mut handler, scope).context("render failed")?;

    std::io::stdout().write_all(handler.output().as_bytes())?;
    Ok(())
}
