use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::export::{Exporter, SolrClient};
use crate::utils::new_progress_bar;
use crate::{DocDBBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// Solr core 地址，默认读取配置文件
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,
    /// 每批推送的文档数量
    #[arg(long, value_name = "SIZE")]
    pub batch_size: Option<usize>,
    /// 每批最多尝试的次数
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
    /// 单次请求的超时秒数
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// 推送完成后不提交
    #[arg(long)]
    pub no_commit: bool,
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let mut config = opts.conf_dir.load_config()?.export;
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if self.no_commit {
            config.commit = false;
        }

        let db = DocDBBuilder::new(opts.conf_dir.clone()).open().await?;
        let total = db.count().await?;
        info!("开始导出 {} 个文档到 {}", total, config.url);

        let pb = new_progress_bar(Some(total as u64));
        let batch_size = config.batch_size.max(1);
        let client = SolrClient::new(&config.url, Duration::from_secs(config.timeout_secs))?;
        let mut exporter = Exporter::new(client, config);

        // 本地文档库只读，导出失败不影响已写入的文档
        let mut last = 0;
        loop {
            let documents = db.documents_after(last, batch_size).await?;
            let Some((id, _)) = documents.last() else {
                break;
            };
            last = *id;
            for (_, document) in &documents {
                exporter.push(document).await?;
                pb.set_message(format!("已推送 {}", exporter.exported()));
                pb.inc(1);
            }
        }

        let exported = exporter.finish().await?;
        pb.finish_with_message("导出完成");
        info!("导出成功，共 {} 个文档", exported);
        Ok(())
    }
}
