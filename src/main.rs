use std::fs;
use std::io::{self, Read};

use anyhow::{anyhow, Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "layout-annotator",
    version,
    about = "Correct document-layout regions and emit a template"
)]
struct Cli {
    /// Template or detection-response JSON (default: stdin)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Merge overlapping detections: off, moderate or aggressive
    #[arg(long = "dedup")]
    dedup: Option<String>,

    /// JSON list of editor commands to replay
    #[arg(short = 's', long = "script")]
    script: Option<String>,

    /// Layout backend base URL (e.g. http://127.0.0.1:8000)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,

    /// Serve collaborator calls from a fixtures JSON file instead of the backend
    #[arg(long = "fixtures", conflicts_with = "backend")]
    fixtures: Option<String>,

    /// Template name for the output
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Template mode for the output: auto or custom
    #[arg(long = "mode")]
    mode: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    layout_annotator::logging::init(cli.verbose)?;

    let input = match cli.data.as_deref() {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input: {}", path))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|err| anyhow!("stdin must be UTF-8 JSON; {}", err))?;
            buffer
        }
    };

    let config = layout_annotator::Config {
        dedup: cli.dedup,
        script_path: cli.script,
        backend_url: cli.backend,
        fixtures_path: cli.fixtures,
        settings_path: cli.read_settings,
        name: cli.name,
        mode: cli.mode,
    };
    let output = layout_annotator::run(config, Some(input)).await?;
    println!("{}", output);
    Ok(())
}
