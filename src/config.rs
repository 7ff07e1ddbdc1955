use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::Context;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;
use serde::Deserialize;

use crate::cli::*;
use crate::document::{
    ChainedBuilder, DocumentBuilder, Hashing, LocalDocumentBuilder, MAX_IMAGE_DIMENSION, Mode, ensure_unique_kinds,
};
use crate::export::ExportConfig;
use crate::feature::FeatureKind;
use crate::hashing::{HashFunctions, HashingMode};
use crate::local::{DEFAULT_MAX_KEYPOINTS, LocalKind, Vocabulary};
use crate::registry::FeatureRegistry;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "aloxaf", "imdoc")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".imdoc"));
    ConfDir { path }
});

#[derive(Parser, Debug, Clone)]
pub struct FeatureOptions {
    /// 提取的特征，多个特征用逗号分隔
    #[arg(short, long = "feature", value_enum, value_delimiter = ',', default_value = "cl")]
    pub features: Vec<FeatureKind>,
    /// 提取的局部特征，多个特征用逗号分隔
    #[arg(short, long = "local", value_enum, value_delimiter = ',')]
    pub locals: Vec<LocalKind>,
    /// 每张图片最多保留的关键点数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_KEYPOINTS)]
    pub keypoints: usize,
    /// 为每个特征生成哈希字段
    #[arg(long)]
    pub hash: bool,
    /// 哈希函数族
    #[arg(long, value_enum, default_value_t = HashingMode::BitSampling)]
    pub hash_mode: HashingMode,
    /// 特征载荷的存储方式，fast 为二进制，slow 为文本
    #[arg(long, value_enum, default_value_t = Mode::Fast)]
    pub mode: Mode,
    /// 图片长边的最大尺寸，超过时等比缩小后再提取特征
    #[arg(
        short = 'S',
        long,
        value_name = "SIZE",
        default_value_t = MAX_IMAGE_DIMENSION,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_size: u32,
}

impl FeatureOptions {
    /// 按选项创建文档构建器
    ///
    /// 哈希函数文件无法加载时不生成哈希字段，视觉词表不存在时不生成视觉词字段。
    pub fn builder(&self, conf_dir: &ConfDir) -> anyhow::Result<ChainedBuilder> {
        ensure_unique_kinds(&self.features)?;
        let hashing = if self.hash {
            HashFunctions::open(conf_dir.hash_functions()).map(|f| Hashing::new(f, self.hash_mode))
        } else {
            None
        };
        let vocabulary = if self.locals.is_empty() {
            None
        } else if conf_dir.visual_words().exists() {
            Vocabulary::open(conf_dir.visual_words())
        } else {
            info!("视觉词表 {} 不存在，不生成视觉词字段", conf_dir.visual_words().display());
            None
        };

        let registry = FeatureRegistry::standard();
        let mut builder = ChainedBuilder::new();
        for &kind in &self.features {
            builder.push(
                DocumentBuilder::new(kind, &registry)?
                    .mode(self.mode)
                    .hashing(hashing.clone())
                    .max_dimension(self.max_size),
            )?;
        }
        for &kind in &self.locals {
            builder.push(
                LocalDocumentBuilder::new(kind)
                    .mode(self.mode)
                    .max_keypoints(self.keypoints)
                    .vocabulary(vocabulary.clone())
                    .max_dimension(self.max_size),
            )?;
        }
        info!(
            "特征: {}，哈希: {}，视觉词: {}",
            builder.builders().iter().map(|b| b.field_name()).collect::<Vec<_>>().join(","),
            if hashing.is_some() { "启用" } else { "禁用" },
            if vocabulary.is_some() { "启用" } else { "禁用" }
        );
        Ok(builder)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imdoc", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imdoc 配置文件目录
    #[arg(short, long, default_value_t = CONF_DIR.clone())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 提取图片特征并写入本地文档库
    Index(IndexCommand),
    /// 把本地文档库中的文档批量推送到 Solr
    Export(ExportCommand),
    /// 生成哈希函数文件
    Hashes(HashesCommand),
    /// 打印单张图片生成的文档
    Show(ShowCommand),
    /// 列出支持的特征及其字段名
    Features(FeaturesCommand),
    /// 用文档库中的局部特征训练视觉词表，并更新所有文档的视觉词字段
    VisualWords(VisualWordsCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imdoc.db")
    }

    /// 返回哈希函数文件的路径
    pub fn hash_functions(&self) -> PathBuf {
        self.path.join("hash_functions.bin")
    }

    /// 返回视觉词表文件的路径
    pub fn visual_words(&self) -> PathBuf {
        self.path.join("visual_words.bin")
    }

    /// 返回配置文件的路径
    pub fn config_file(&self) -> PathBuf {
        self.path.join("config.json")
    }

    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load_config(&self) -> anyhow::Result<FileConfig> {
        let path = self.config_file();
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let data = std::fs::read(&path)?;
        serde_json::from_slice(&data).with_context(|| format!("无法解析配置文件 {}", path.display()))
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl std::fmt::Display for ConfDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// config.json 的内容，所有键都是可选的
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub export: ExportConfig,
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::registry::ConfigError;

    #[test]
    fn test_paths() {
        let conf_dir = ConfDir::from_str("/tmp/imdoc").unwrap();
        assert_eq!(conf_dir.database(), PathBuf::from("/tmp/imdoc/imdoc.db"));
        assert_eq!(conf_dir.hash_functions(), PathBuf::from("/tmp/imdoc/hash_functions.bin"));
        assert_eq!(conf_dir.config_file(), PathBuf::from("/tmp/imdoc/config.json"));
        assert_eq!(conf_dir.visual_words(), PathBuf::from("/tmp/imdoc/visual_words.bin"));
    }

    fn parse_features(args: &[&str]) -> Result<FeatureOptions, clap::Error> {
        FeatureOptions::try_parse_from(std::iter::once("imdoc").chain(args.iter().copied()))
    }

    #[test]
    fn test_feature_options() {
        let options = parse_features(&["-f", "cl,eh", "-l", "su", "--keypoints", "50"]).unwrap();
        assert_eq!(options.features, vec![FeatureKind::ColorLayout, FeatureKind::EdgeHistogram]);
        assert_eq!(options.locals, vec![LocalKind::Surf]);
        assert_eq!(options.keypoints, 50);
        assert_eq!(options.max_size, MAX_IMAGE_DIMENSION);

        assert!(parse_features(&["-S", "0"]).is_err());
        assert_eq!(parse_features(&["-S", "1"]).unwrap().max_size, 1);
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let conf_dir = ConfDir::from_str(dir.path().to_str().unwrap()).unwrap();

        let options = parse_features(&["-f", "cl,cl"]).unwrap();
        let err = options.builder(&conf_dir).err().unwrap();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::DuplicateKind { kind: FeatureKind::ColorLayout })
        );

        let options = parse_features(&["-l", "su,su"]).unwrap();
        assert!(options.builder(&conf_dir).is_err());

        let options = parse_features(&["-f", "cl,eh", "-l", "su"]).unwrap();
        let builder = options.builder(&conf_dir).unwrap();
        let names: Vec<&str> = builder.builders().iter().map(|b| b.field_name()).collect();
        assert_eq!(names, vec!["cl", "eh", "su"]);
    }

    #[test]
    fn test_load_config() {
        let dir = tempdir().unwrap();
        let conf_dir = ConfDir::from_str(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(conf_dir.load_config().unwrap().export.batch_size, ExportConfig::default().batch_size);

        std::fs::write(conf_dir.config_file(), r#"{"export": {"url": "http://solr:8983/solr/lire", "batch_size": 7}}"#)
            .unwrap();
        let config = conf_dir.load_config().unwrap();
        assert_eq!(config.export.url, "http://solr:8983/solr/lire");
        assert_eq!(config.export.batch_size, 7);
        assert_eq!(config.export.retries, ExportConfig::default().retries);

        std::fs::write(conf_dir.config_file(), "{ not json").unwrap();
        assert!(conf_dir.load_config().is_err());
    }
}
