use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::document::{hash_field_name, visual_words_field_name};
use crate::local::LocalKind;
use crate::registry::FeatureRegistry;

#[derive(Parser, Debug, Clone)]
pub struct FeaturesCommand {}

impl SubCommandExtend for FeaturesCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let registry = FeatureRegistry::standard();
        println!("{:<20} {:<8} {}", "FEATURE", "FIELD", "HASH FIELD");
        for (kind, name) in registry.iter() {
            println!("{:<20} {:<8} {}", kind.to_string(), name, hash_field_name(name));
        }
        println!();
        println!("{:<20} {:<8} {}", "LOCAL FEATURE", "FIELD", "VISUAL WORDS FIELD");
        for kind in LocalKind::ALL {
            println!("{:<20} {:<8} {}", kind.to_string(), kind.field_name(), visual_words_field_name(kind.field_name()));
        }
        Ok(())
    }
}
