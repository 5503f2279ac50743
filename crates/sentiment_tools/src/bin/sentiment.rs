#![forbid(unsafe_code)]

use std::sync::Arc;

use clap::Parser;
use sentiment_adapter::presenter::ConsolePresenter;
use sentiment_adapter::{init_tracing, AdapterRuntime};
use sentiment_tools::feedback_cli::{execute_feedback_command, Cli};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    init_tracing();
    let config = cli.config()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    rt.block_on(async {
        let runtime = AdapterRuntime::new(config, Arc::new(ConsolePresenter))
            .map_err(|e| e.to_string())?;
        let result = execute_feedback_command(&runtime, &cli.command).await;
        runtime.shutdown().await;
        let output = result?;
        if !output.is_empty() {
            println!("{output}");
        }
        Ok(())
    })
}
