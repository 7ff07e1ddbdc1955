use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use log::info;
use regex::Regex;
use tasks::*;
use types::IndexStats;

mod tasks;
mod types;

use crate::DocDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{FeatureOptions, Opts};
use crate::metrics;
use crate::utils::new_progress_bar;

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    #[command(flatten)]
    pub feature: FeatureOptions,
    /// 图片所在目录，也支持 tar 归档文件和每行一个路径的图片列表文件
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp,gif,bmp")]
    pub suffix: String,
    /// 在写入文档库之前使用正则表达式对图片路径进行处理，结果作为文档标识
    /// 例：--replace '/path/to/image/(?<name>[0-9]+).jpg' '$name'
    #[arg(short, long, value_names = ["REGEX", "REPLACE"], num_args = 2, verbatim_doc_comment)]
    pub replace: Vec<String>,
    /// 如果图片已添加，是否用新的标识覆盖旧的记录
    #[arg(long)]
    pub overwrite: bool,
    /// 处理完成后把指标推送到该 Pushgateway 地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 推送指标时使用的 instance 标签，默认为主机名
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
}

impl IndexCommand {
    fn replace(&self) -> anyhow::Result<Replace> {
        match self.replace.as_slice() {
            [] => Ok(None),
            [re, replace] => Ok(Some((Regex::new(re)?, replace.clone()))),
            _ => Err(anyhow!("--replace 需要两个参数")),
        }
    }
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let replace = self.replace()?;

        let builder = Arc::new(self.feature.builder(&opts.conf_dir)?);
        let db = Arc::new(DocDBBuilder::new(opts.conf_dir.clone()).open().await?);
        let stats = Arc::new(IndexStats::default());

        let pb = new_progress_bar(None);

        let (t1, rx) = task_scan(self.path.clone(), pb.clone(), stats.clone(), re_suf);
        let (t2, rx) = task_hash(rx);
        let (t3, rx) = task_filter(rx, pb.clone(), db.clone(), stats.clone(), self.overwrite, replace.clone());
        let (t4, rx) = task_build(rx, pb.clone(), builder, stats.clone(), replace.clone());
        let t5 = task_add(rx, pb.clone(), db, stats.clone(), self.overwrite, replace);

        // 等待所有任务完成
        let (r1, r2, r3, r4, r5) = tokio::join!(t1, t2, t3, t4, t5);
        let result = [r1, r2, r3, r4, r5].into_iter().try_for_each(|r| -> anyhow::Result<()> { r? });

        let summary = stats.summary();
        pb.finish_with_message(format!("处理完成: {summary}"));
        info!("处理完成: {summary}");
        println!("{summary}");

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(default_instance);
            metrics::push(url, instance).await;
        }

        result
    }
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "imdoc".to_string())
}
