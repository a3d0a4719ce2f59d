//! coursync command-line entry point.

use anyhow::{Context, Result};
use clap::Parser;
use coursync::{
    asset::AssetSync,
    cli::{Cli, Commands},
    config::ProjectConfig,
    html::HtmlProcessor,
    serve::serve_site,
    watch::watch_site,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ProjectConfig::load(&cli)?;

    match &cli.command {
        Commands::Sync { json } => sync(&config, *json),
        Commands::Watch => watch_site(&config),
        Commands::Serve { .. } => serve_site(&config),
        Commands::Html { input, output } => {
            let processor = HtmlProcessor::new(&config.course)?;
            let input = config.get_root().join(input);
            let output = output.as_ref().map(|o| config.get_root().join(o));
            processor.process_file(&input, output.as_deref())?;
            Ok(())
        }
    }
}

/// Run one synchronization pass, optionally printing the report as JSON.
fn sync(config: &ProjectConfig, json: bool) -> Result<()> {
    let report = AssetSync::from_config(config).run();

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize sync report")?;
        println!("{out}");
    }
    Ok(())
}
