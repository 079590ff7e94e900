use anyhow::Result;
use clap::Parser;
use tmdb_harvest::cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    if let Err(err) = rt.block_on(cli::dispatch(args)) {
        eprintln!("[error] {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
