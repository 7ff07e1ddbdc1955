use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::Parser;
use serde_json::json;

use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts};
use crate::document::Document;
use crate::registry::FeatureRegistry;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 图片路径
    pub image: PathBuf,
    /// 同时计算与另一张图片的特征距离
    #[arg(long, value_name = "IMAGE")]
    pub against: Option<PathBuf>,
}

impl ShowCommand {
    fn build(&self, opts: &Opts, path: &Path) -> Result<Document> {
        let builder = self.feature.builder(&opts.conf_dir)?;
        let image = image::open(path)?.to_rgb8();
        Ok(builder.build(Some(&*path.to_string_lossy()), &image)?)
    }
}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let document = self.build(opts, &self.image)?;

        let Some(against) = &self.against else {
            println!("{}", serde_json::to_string_pretty(&document)?);
            return Ok(());
        };

        let other = self.build(opts, against)?;
        let registry = FeatureRegistry::standard();
        let mut distances = serde_json::Map::new();
        for &kind in &self.feature.features {
            let (Some(a), Some(b)) = (document.decode_feature(kind, &registry), other.decode_feature(kind, &registry))
            else {
                return Err(anyhow!("计算距离需要二进制载荷，请使用 --mode fast"));
            };
            let (a, b) = (a?, b?);
            distances.insert(kind.field_name().to_string(), json!(a.distance(&*b)));
        }
        let output = json!({ "document": document, "against": other, "distances": distances });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}
