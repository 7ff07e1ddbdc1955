mod export;
mod features;
mod hashes;
mod index;
mod show;
mod visual_words;

pub use export::*;
pub use features::*;
pub use hashes::*;
pub use index::*;
pub use show::*;
pub use visual_words::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
