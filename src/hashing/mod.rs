//! 局部敏感哈希
//!
//! 哈希函数参数由 `hashes` 子命令一次性生成并保存到文件，运行时加载一次后
//! 以 `Arc<HashFunctions>` 的形式在各个 worker 之间共享，只读不写。

mod bit_sampling;
mod projection;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bit_sampling::{BitSampling, SamplePoint};
pub use projection::RandomProjection;

pub use crate::persist::RegistryLoadError;
use crate::persist;

/// 参与哈希的向量最大维度
pub const MAX_HASH_DIMENSION: usize = 3100;

const MAGIC: &[u8; 4] = b"IMDH";
const VERSION: u32 = 1;

/// 哈希函数族
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashingMode {
    /// 位采样
    #[default]
    BitSampling,
    /// 随机投影
    Lsh,
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("向量维度 {len} 超过哈希上限 {max}")]
    UnsupportedDimension { len: usize, max: usize },
    #[error("向量维度 {len} 超过投影维度 {dimensions}")]
    DimensionMismatch { len: usize, dimensions: usize },
    #[error("向量为空")]
    EmptyVector,
}

/// 生成哈希函数使用的参数
#[derive(Debug, Clone, Copy)]
pub struct HashConfig {
    /// 位采样的哈希槽数量
    pub bit_sampling_slots: usize,
    /// 每个哈希槽的采样位数
    pub bits: usize,
    /// 位采样的量化级数
    pub levels: u8,
    /// 随机投影的哈希槽数量
    pub projection_slots: usize,
    /// 随机投影的维度
    pub dimensions: usize,
    /// 随机投影的桶宽度
    pub bin_width: f32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            bit_sampling_slots: 100,
            bits: 12,
            levels: 8,
            projection_slots: 100,
            dimensions: MAX_HASH_DIMENSION,
            bin_width: 4.,
        }
    }
}

/// 哈希函数集合，同时包含两种哈希函数族的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashFunctions {
    bit_sampling: BitSampling,
    projection: RandomProjection,
}

impl HashFunctions {
    /// 用给定的种子生成哈希函数，相同的种子和参数总是得到相同的结果
    pub fn generate(config: &HashConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bit_sampling =
            BitSampling::generate(config.bit_sampling_slots, config.bits, config.levels, &mut rng);
        let projection =
            RandomProjection::generate(config.projection_slots, config.dimensions, config.bin_width, &mut rng);
        Self { bit_sampling, projection }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryLoadError> {
        let functions: Self = persist::load(path.as_ref(), MAGIC, VERSION)?;
        functions.bit_sampling.validate().map_err(RegistryLoadError::Invalid)?;
        functions.projection.validate().map_err(RegistryLoadError::Invalid)?;
        Ok(functions)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryLoadError> {
        persist::save(path.as_ref(), MAGIC, VERSION, self)
    }

    /// 加载哈希函数，失败时记录日志并返回 `None`，此时哈希功能不可用
    pub fn open(path: impl AsRef<Path>) -> Option<Arc<Self>> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(functions) => {
                info!(
                    "已加载哈希函数: {} (位采样 {} 个, 随机投影 {} 个)",
                    path.display(),
                    functions.slots(HashingMode::BitSampling),
                    functions.slots(HashingMode::Lsh)
                );
                Some(Arc::new(functions))
            }
            Err(e) => {
                warn!("{}，哈希功能已禁用", e);
                None
            }
        }
    }

    /// 哈希槽数量，即每个文档输出的哈希值个数
    pub fn slots(&self, mode: HashingMode) -> usize {
        match mode {
            HashingMode::BitSampling => self.bit_sampling.slots(),
            HashingMode::Lsh => self.projection.slots(),
        }
    }

    /// 每个哈希值的十六进制位数
    pub fn token_width(&self, mode: HashingMode) -> usize {
        match mode {
            HashingMode::BitSampling => self.bit_sampling.token_width(),
            HashingMode::Lsh => 8,
        }
    }

    /// 计算哈希值，输出顺序与哈希函数顺序一致
    pub fn hash(&self, vector: &[f32], mode: HashingMode) -> Result<Vec<i32>, HashError> {
        if vector.is_empty() {
            return Err(HashError::EmptyVector);
        }
        if vector.len() > MAX_HASH_DIMENSION {
            return Err(HashError::UnsupportedDimension { len: vector.len(), max: MAX_HASH_DIMENSION });
        }
        match mode {
            HashingMode::BitSampling => self.bit_sampling.hash(vector),
            HashingMode::Lsh => self.projection.hash(vector),
        }
    }

    /// 计算哈希值并渲染为空格分隔的十六进制字符串
    pub fn hash_string(&self, vector: &[f32], mode: HashingMode) -> Result<String, HashError> {
        let codes = self.hash(vector, mode)?;
        Ok(to_hash_string(&codes, self.token_width(mode)))
    }
}

/// 每个哈希值按补码渲染为定宽小写十六进制，空格分隔
pub fn to_hash_string(codes: &[i32], width: usize) -> String {
    let mut s = String::with_capacity(codes.len() * (width + 1));
    for (i, &code) in codes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{:0width$x}", code as u32, width = width);
    }
    s
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn small() -> HashFunctions {
        let config = HashConfig { projection_slots: 16, dimensions: 256, bit_sampling_slots: 16, ..Default::default() };
        HashFunctions::generate(&config, 42)
    }

    fn vector(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i * 7) % 11) as f32).collect()
    }

    #[test]
    fn test_hash_string_format() {
        assert_eq!(to_hash_string(&[0, 10, 4095], 3), "000 00a fff");
        assert_eq!(to_hash_string(&[-1, 1], 8), "ffffffff 00000001");
        assert_eq!(to_hash_string(&[], 3), "");
    }

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(small(), small());
        let other = HashFunctions::generate(&HashConfig::default(), 43);
        assert_ne!(small(), other);
    }

    #[test]
    fn test_identical_vectors_identical_tokens() {
        let hf = small();
        for mode in [HashingMode::BitSampling, HashingMode::Lsh] {
            let a = hf.hash_string(&vector(144), mode).unwrap();
            let b = hf.hash_string(&vector(144).clone(), mode).unwrap();
            assert_eq!(a, b);
            let tokens: Vec<&str> = a.split(' ').collect();
            assert_eq!(tokens.len(), hf.slots(mode));
            assert!(tokens.iter().all(|t| t.len() == hf.token_width(mode)));
            assert!(a.chars().all(|c| c == ' ' || c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_dimension_bounds() {
        let hf = small();
        let err = hf.hash(&vector(MAX_HASH_DIMENSION + 1), HashingMode::BitSampling).unwrap_err();
        assert!(matches!(err, HashError::UnsupportedDimension { len: 3101, max: MAX_HASH_DIMENSION }));
        assert!(hf.hash(&vector(MAX_HASH_DIMENSION), HashingMode::BitSampling).is_ok());
        // 投影维度只有 256
        assert!(matches!(
            hf.hash(&vector(300), HashingMode::Lsh),
            Err(HashError::DimensionMismatch { len: 300, dimensions: 256 })
        ));
        assert!(matches!(hf.hash(&[], HashingMode::Lsh), Err(HashError::EmptyVector)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hash_functions.bin");
        let hf = small();
        hf.save(&path).unwrap();
        assert_eq!(HashFunctions::load(&path).unwrap(), hf);
        assert!(HashFunctions::open(&path).is_some());
    }

    #[test]
    fn test_load_failures() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        assert!(matches!(HashFunctions::load(&missing), Err(RegistryLoadError::Io { .. })));
        assert!(HashFunctions::open(&missing).is_none());

        let garbage = dir.path().join("garbage.bin");
        std::fs::write(&garbage, b"not a hash file").unwrap();
        assert!(matches!(HashFunctions::load(&garbage), Err(RegistryLoadError::Magic)));

        let future = dir.path().join("future.bin");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        std::fs::write(&future, bytes).unwrap();
        assert!(matches!(
            HashFunctions::load(&future),
            Err(RegistryLoadError::Version { expected: VERSION, found: 99 })
        ));
    }
}
