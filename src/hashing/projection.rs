use ndarray::{Array2, ArrayView1, s};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use super::HashError;

/// 随机投影 LSH (p-stable)
///
/// 每个哈希槽为一个高斯随机方向 a 和偏移 b，桶编号为 floor((a·v + b) / w)，
/// 即以 b 为起点、间隔为 w 的分桶边界。距离相近的向量落入同一个桶的概率更高。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomProjection {
    /// slots x dimensions
    directions: Array2<f32>,
    offsets: Vec<f32>,
    bin_width: f32,
}

impl RandomProjection {
    pub fn generate<R: Rng>(slots: usize, dimensions: usize, bin_width: f32, rng: &mut R) -> Self {
        assert!(bin_width > 0., "bin width must be positive");
        let directions = Array2::from_shape_simple_fn((slots, dimensions), || StandardNormal.sample(rng));
        let offsets = (0..slots).map(|_| rng.random::<f32>() * bin_width).collect();
        Self { directions, offsets, bin_width }
    }

    pub fn slots(&self) -> usize {
        self.directions.nrows()
    }

    pub fn dimensions(&self) -> usize {
        self.directions.ncols()
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.slots() == 0 {
            return Err("投影方向数量为 0".to_string());
        }
        if self.offsets.len() != self.slots() {
            return Err(format!("偏移数量 {} 与投影方向数量 {} 不一致", self.offsets.len(), self.slots()));
        }
        if !(self.bin_width > 0.) {
            return Err(format!("桶宽度必须为正数: {}", self.bin_width));
        }
        Ok(())
    }

    /// 较短的向量只投影到前 `vector.len()` 维，超过投影维度的向量直接拒绝
    pub fn hash(&self, vector: &[f32]) -> Result<Vec<i32>, HashError> {
        if vector.len() > self.dimensions() {
            return Err(HashError::DimensionMismatch {
                len: vector.len(),
                dimensions: self.dimensions(),
            });
        }
        let v = ArrayView1::from(vector);
        let dots = self.directions.slice(s![.., ..vector.len()]).dot(&v);
        Ok(dots
            .iter()
            .zip(&self.offsets)
            .map(|(d, b)| ((d + b) / self.bin_width).floor() as i32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_too_long_vector_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let rp = RandomProjection::generate(4, 16, 4., &mut rng);
        let err = rp.hash(&[1.; 17]).unwrap_err();
        assert!(matches!(err, HashError::DimensionMismatch { len: 17, dimensions: 16 }));
        assert_eq!(rp.hash(&[1.; 16]).unwrap().len(), 4);
        assert_eq!(rp.hash(&[1.; 3]).unwrap().len(), 4);
    }

    #[test]
    fn test_zero_vector_lands_in_offset_bucket() {
        let mut rng = StdRng::seed_from_u64(0);
        let rp = RandomProjection::generate(8, 32, 4., &mut rng);
        // 偏移 b ∈ [0, w)，所以零向量一定落在 0 号桶
        assert_eq!(rp.hash(&[0.; 32]).unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_near_vectors_collide_more_than_far_vectors() {
        let mut rng = StdRng::seed_from_u64(42);
        let rp = RandomProjection::generate(200, 64, 8., &mut rng);
        let base: Vec<f32> = (0..64).map(|i| (i % 7) as f32).collect();
        let near: Vec<f32> = base.iter().map(|v| v + 0.1).collect();
        let far: Vec<f32> = base.iter().rev().map(|v| v * 3.).collect();

        let collisions = |a: &[f32], b: &[f32]| {
            let (ha, hb) = (rp.hash(a).unwrap(), rp.hash(b).unwrap());
            ha.iter().zip(&hb).filter(|(x, y)| x == y).count()
        };
        assert!(collisions(&base, &near) > collisions(&base, &far));
    }

    #[test]
    fn test_directions_are_standard_normal() {
        let mut rng = StdRng::seed_from_u64(9);
        let rp = RandomProjection::generate(100, 200, 4., &mut rng);
        let n = rp.directions.len() as f32;
        let mean = rp.directions.sum() / n;
        let var = rp.directions.mapv(|x| (x - mean).powi(2)).sum() / n;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.).abs() < 0.05);
    }
}
