use anyhow::Result;

use smartcard::cli::commands::run_cli;

fn main() -> Result<()> {
    run_cli()
}
