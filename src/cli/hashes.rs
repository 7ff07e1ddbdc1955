use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;

use crate::Opts;
use crate::cli::SubCommandExtend;
use crate::hashing::{HashConfig, HashFunctions, MAX_HASH_DIMENSION};

#[derive(Parser, Debug, Clone)]
pub struct HashesCommand {
    /// 随机数种子，相同的种子生成相同的哈希函数
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// 位采样的哈希槽数量
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub bit_sampling_slots: usize,
    /// 每个哈希槽的采样位数
    #[arg(long, value_name = "N", default_value_t = 12, value_parser = clap::value_parser!(u8).range(1..=31))]
    pub bits: u8,
    /// 位采样的量化级数
    #[arg(long, value_name = "N", default_value_t = 8, value_parser = clap::value_parser!(u8).range(1..))]
    pub levels: u8,
    /// 随机投影的哈希槽数量
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub projection_slots: usize,
    /// 随机投影的维度
    #[arg(long, value_name = "N", default_value_t = MAX_HASH_DIMENSION)]
    pub dimensions: usize,
    /// 随机投影的桶宽度
    #[arg(long, value_name = "W", default_value_t = 4.)]
    pub bin_width: f32,
    /// 覆盖已存在的哈希函数文件
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for HashesCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        if self.bit_sampling_slots == 0 || self.projection_slots == 0 || self.dimensions == 0 {
            return Err(anyhow!("哈希槽数量和投影维度必须大于 0"));
        }
        if !(self.bin_width > 0.) {
            return Err(anyhow!("桶宽度必须大于 0"));
        }

        let path = opts.conf_dir.hash_functions();
        if path.exists() && !self.force {
            return Err(anyhow!("哈希函数文件已存在: {}，使用 --force 覆盖", path.display()));
        }
        std::fs::create_dir_all(opts.conf_dir.path())?;

        let config = HashConfig {
            bit_sampling_slots: self.bit_sampling_slots,
            bits: self.bits as usize,
            levels: self.levels,
            projection_slots: self.projection_slots,
            dimensions: self.dimensions,
            bin_width: self.bin_width,
        };
        HashFunctions::generate(&config, self.seed).save(&path)?;
        info!("已生成哈希函数: {}", path.display());
        Ok(())
    }
}
