use anyhow::{Context, Result};
use clap::Parser;
use nestpm::cli::{logging, NestCli};

fn main() {
    if let Err(e) = real_main() {
        eprintln!("nestpm error: {:#}", e);
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let cli = NestCli::parse();
    logging::init(cli.verbose);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(cli.run())
}
