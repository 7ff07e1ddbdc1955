use clap::Parser;
use log::error;

use imdoc::Opts;
use imdoc::cli::SubCommandExtend;
use imdoc::config::SubCommand;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let opts = Opts::parse();

    let result = match &opts.subcmd {
        SubCommand::Index(config) => config.run(&opts).await,
        SubCommand::Export(config) => config.run(&opts).await,
        SubCommand::Hashes(config) => config.run(&opts).await,
        SubCommand::Show(config) => config.run(&opts).await,
        SubCommand::Features(config) => config.run(&opts).await,
        SubCommand::VisualWords(config) => config.run(&opts).await,
    };

    if let Err(e) = result {
        error!("{:?}", e);
        eprintln!("错误: {:#}", e);
        std::process::exit(1);
    }
}
