//! Thin binary entry point: `anvil_cli::run` does all the work, this only
//! owns the process exit code (spec §7, §8 scenario 8).

#[tokio::main]
async fn main() {
    if let Err(err) = anvil_cli::run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
