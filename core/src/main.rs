//! Dispatch overhead benchmark CLI

use std::env;

use dispatch_kit::bench::print_report;
use dispatch_kit::{logging, run_all_benchmarks, Config};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let command = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(String::as_str)
        .unwrap_or("benchmark");

    match command {
        "benchmark" => {
            info!("Running dispatch benchmarks...");
            let handle = tokio::runtime::Handle::current();
            let bench = config.bench.clone();
            let queues = config.queues.clone();

            // Scenarios block on channels; keep them off the async workers
            let results = tokio::task::spawn_blocking(move || {
                run_all_benchmarks(&bench, &queues, Some(handle))
            })
            .await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_report(&results);
            }
        }
        "config" => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        other => {
            anyhow::bail!("unknown command '{}', expected 'benchmark' or 'config'", other);
        }
    }

    Ok(())
}
