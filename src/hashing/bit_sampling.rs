use rand::Rng;
use serde::{Deserialize, Serialize};

use super::HashError;

/// 一个采样位：向量中的相对位置和量化阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// 在向量中的相对位置，范围 [0, 1)
    pub position: f32,
    /// 量化值大于该阈值时该位为 1
    pub level: u8,
}

/// 位采样 LSH
///
/// 向量先按最小/最大值线性量化到 0..=levels，视为一元编码的汉明空间，
/// 每个哈希槽从中采样 `bits` 个位组成桶编号。采样位置是相对位置，
/// 因此同一组参数适用于任意长度的向量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitSampling {
    levels: u8,
    bits: usize,
    /// 按槽排列，长度为 slots * bits
    points: Vec<SamplePoint>,
}

impl BitSampling {
    pub fn generate<R: Rng>(slots: usize, bits: usize, levels: u8, rng: &mut R) -> Self {
        assert!((1..=31).contains(&bits), "bits must be in 1..=31");
        assert!(levels > 0, "levels must be positive");
        let points = (0..slots * bits)
            .map(|_| SamplePoint { position: rng.random::<f32>(), level: rng.random_range(0..levels) })
            .collect();
        Self { levels, bits, points }
    }

    pub fn slots(&self) -> usize {
        self.points.len() / self.bits
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// 每个哈希值输出的十六进制位数
    pub fn token_width(&self) -> usize {
        self.bits.div_ceil(4)
    }

    /// 检查从文件读取的参数是否合法
    pub(super) fn validate(&self) -> Result<(), String> {
        if !(1..=31).contains(&self.bits) {
            return Err(format!("bits 超出范围: {}", self.bits));
        }
        if self.levels == 0 {
            return Err("levels 不能为 0".to_string());
        }
        if self.points.is_empty() || self.points.len() % self.bits != 0 {
            return Err(format!("采样位数量 {} 不是 bits 的整数倍", self.points.len()));
        }
        if let Some(p) = self.points.iter().find(|p| !(0. ..1.).contains(&p.position)) {
            return Err(format!("采样位置超出范围: {}", p.position));
        }
        Ok(())
    }

    pub fn hash(&self, vector: &[f32]) -> Result<Vec<i32>, HashError> {
        if vector.is_empty() {
            return Err(HashError::EmptyVector);
        }
        let quantized = quantize(vector, self.levels);
        let len = quantized.len();
        Ok(self
            .points
            .chunks_exact(self.bits)
            .map(|slot| {
                slot.iter().enumerate().fold(0i32, |hash, (j, p)| {
                    let idx = ((p.position * len as f32) as usize).min(len - 1);
                    if quantized[idx] > p.level { hash | (1 << j) } else { hash }
                })
            })
            .collect())
    }
}

/// 按最小/最大值线性量化到 0..=levels，常数向量全部量化为 0
fn quantize(vector: &[f32], levels: u8) -> Vec<u8> {
    let (min, max) = vector
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !(range > 0.) {
        return vec![0; vector.len()];
    }
    vector
        .iter()
        .map(|&v| (((v - min) / range) * levels as f32).round().clamp(0., levels as f32) as u8)
        .collect()
}
