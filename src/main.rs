#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use admission_gateway::server;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "admission-gateway", about = "Request admission engine for an API gateway")]
struct Cli {
    /// Path to gateway config file (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Admin API listen address; overrides `[admin] listen`
    #[arg(long)]
    admin_listen: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        admin_listen: cli.admin_listen,
    }))
}
