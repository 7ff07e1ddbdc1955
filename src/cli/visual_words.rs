use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use ndarray::Array2;

use crate::cli::SubCommandExtend;
use crate::document::{Field, visual_words_field_name};
use crate::local::{DESCRIPTOR_LEN, LocalKind, Vocabulary};
use crate::utils::new_progress_bar;
use crate::{DocDB, DocDBBuilder, Opts};

/// 每次从文档库读取的文档数量
const PAGE_SIZE: usize = 256;

#[derive(Parser, Debug, Clone)]
pub struct VisualWordsCommand {
    /// 局部特征
    #[arg(short, long, value_enum, default_value = "su")]
    pub local: LocalKind,
    /// 用于训练的文档数量，只统计含有该局部特征的文档
    #[arg(short, long, default_value_t = 500)]
    pub documents: usize,
    /// 视觉词数量
    #[arg(short = 'k', long, default_value_t = 512, value_parser = clap::value_parser!(u64).range(1..))]
    pub clusters: u64,
    /// 最大迭代次数
    #[arg(short, long, default_value_t = 20)]
    pub max_iter: usize,
    /// 随机数种子
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

impl VisualWordsCommand {
    /// 从前若干个含有该局部特征的文档中收集描述子
    async fn collect_samples(&self, db: &DocDB) -> Result<Array2<f32>> {
        let mut samples = vec![];
        let mut used = 0;
        let mut last = 0;
        'outer: loop {
            let documents = db.documents_after(last, PAGE_SIZE).await?;
            let Some((id, _)) = documents.last() else {
                break;
            };
            last = *id;
            for (_, document) in &documents {
                if used >= self.documents {
                    break 'outer;
                }
                let descriptors = document.decode_local(self.local)?;
                if descriptors.is_empty() {
                    continue;
                }
                used += 1;
                samples.extend(descriptors.into_iter().flatten());
            }
        }
        info!("从 {} 个文档中收集到 {} 个描述子", used, samples.len() / DESCRIPTOR_LEN);
        Ok(Array2::from_shape_vec((samples.len() / DESCRIPTOR_LEN, DESCRIPTOR_LEN), samples)?)
    }

    /// 重新计算所有文档的视觉词字段，返回更新的文档数量
    async fn update_documents(&self, db: &DocDB, vocabulary: &Vocabulary) -> Result<u64> {
        let field_name = visual_words_field_name(self.local.field_name());
        let pb = new_progress_bar(Some(db.count().await? as u64));
        let mut updated = 0;
        let mut last = 0;
        loop {
            let documents = db.documents_after(last, PAGE_SIZE).await?;
            let Some((id, _)) = documents.last() else {
                break;
            };
            last = *id;
            for (id, document) in &documents {
                pb.inc(1);
                let descriptors = document.decode_local(self.local)?;
                if descriptors.is_empty() {
                    continue;
                }
                let words = vocabulary.words(descriptors.iter().map(Vec::as_slice))?;
                db.replace_field(*id, &Field::text(&field_name, words)).await?;
                updated += 1;
            }
        }
        pb.finish_with_message("视觉词更新完成");
        Ok(updated)
    }
}

impl SubCommandExtend for VisualWordsCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = DocDBBuilder::new(opts.conf_dir.clone()).open().await?;
        let samples = self.collect_samples(&db).await?;
        if samples.nrows() == 0 {
            return Err(anyhow!("文档库中没有 {} 特征，请先使用 --local {} 索引图片", self.local, self.local.field_name()));
        }

        let (clusters, max_iter, seed) = (self.clusters as usize, self.max_iter, self.seed);
        let vocabulary =
            tokio::task::spawn_blocking(move || Vocabulary::train(samples.view(), clusters, max_iter, seed)).await??;
        let path = opts.conf_dir.visual_words();
        vocabulary.save(&path)?;
        info!("视觉词表已保存到 {}", path.display());

        let updated = self.update_documents(&db, &vocabulary).await?;
        println!("已更新 {} 个文档的视觉词", updated);
        Ok(())
    }
}
