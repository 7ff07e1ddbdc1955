use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persist::{self, RegistryLoadError};

const MAGIC: &[u8; 4] = b"IMDV";
const VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("样本数量 {samples} 不足以训练 {clusters} 个视觉词")]
    TooFewSamples { samples: usize, clusters: usize },
    #[error("描述子维度错误: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 视觉词表，每行是一个聚类中心
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    centroids: Array2<f32>,
}

fn squared_l2(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &Array2<f32>, vector: ArrayView1<f32>) -> (usize, f32) {
    let mut best = (0, f32::MAX);
    for (i, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_l2(vector, centroid);
        if dist < best.1 {
            best = (i, dist);
        }
    }
    best
}

/// k-means++ 初始化，按到最近中心距离的平方加权抽样，距离全为 0 时均匀抽样
fn init_centroids(samples: ArrayView2<f32>, clusters: usize, rng: &mut StdRng) -> Array2<f32> {
    let n = samples.nrows();
    let mut centroids = Array2::zeros((clusters, samples.ncols()));
    centroids.row_mut(0).assign(&samples.row(rng.random_range(0..n)));
    let mut distances: Vec<f32> = vec![f32::MAX; n];
    for c in 1..clusters {
        let last = centroids.row(c - 1).to_owned();
        for (i, d) in distances.iter_mut().enumerate() {
            *d = d.min(squared_l2(samples.row(i), last.view()));
        }
        let index = match WeightedIndex::new(&distances) {
            Ok(weighted) => weighted.sample(rng),
            Err(_) => rng.random_range(0..n),
        };
        centroids.row_mut(c).assign(&samples.row(index));
    }
    centroids
}

impl Vocabulary {
    pub fn new(centroids: Array2<f32>) -> Self {
        Self { centroids }
    }

    /// 用 k-means 训练视觉词表，相同的样本和种子总是得到相同的结果
    ///
    /// 分配结果不再变化或达到 `max_iter` 轮时停止，空簇保留上一轮的中心。
    pub fn train(
        samples: ArrayView2<f32>,
        clusters: usize,
        max_iter: usize,
        seed: u64,
    ) -> Result<Self, VocabularyError> {
        let n = samples.nrows();
        if clusters == 0 || n < clusters {
            return Err(VocabularyError::TooFewSamples { samples: n, clusters });
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut centroids = init_centroids(samples, clusters, &mut rng);
        let mut assignments = vec![usize::MAX; n];

        for round in 1..=max_iter {
            let (next, cost): (Vec<usize>, Vec<f32>) =
                (0..n).into_par_iter().map(|i| nearest(&centroids, samples.row(i))).unzip();
            let changed = next.iter().zip(&assignments).filter(|(a, b)| a != b).count();
            assignments = next;
            info!("第 {} 轮: 误差 {:.4}，{} 个样本改变了归属", round, cost.iter().sum::<f32>(), changed);
            if changed == 0 {
                break;
            }

            let mut sums = Array2::<f32>::zeros(centroids.dim());
            let mut counts = vec![0usize; clusters];
            for (i, &cluster) in assignments.iter().enumerate() {
                sums.row_mut(cluster).scaled_add(1., &samples.row(i));
                counts[cluster] += 1;
            }
            for (c, mut centroid) in centroids.axis_iter_mut(Axis(0)).enumerate() {
                if counts[c] > 0 {
                    centroid.assign(&(&sums.row(c) / counts[c] as f32));
                }
            }
        }

        Ok(Self { centroids })
    }

    /// 视觉词数量
    pub fn len(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.centroids.ncols()
    }

    /// 离描述子最近的视觉词编号
    pub fn nearest(&self, descriptor: &[f32]) -> Result<usize, VocabularyError> {
        if descriptor.len() != self.dimensions() {
            return Err(VocabularyError::DimensionMismatch { expected: self.dimensions(), actual: descriptor.len() });
        }
        Ok(nearest(&self.centroids, ArrayView1::from(descriptor)).0)
    }

    /// 每个视觉词出现的次数
    pub fn histogram<'a, I>(&self, descriptors: I) -> Result<Vec<u32>, VocabularyError>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut histogram = vec![0; self.len()];
        for descriptor in descriptors {
            histogram[self.nearest(descriptor)?] += 1;
        }
        Ok(histogram)
    }

    /// 视觉词字段的文本
    pub fn words<'a, I>(&self, descriptors: I) -> Result<String, VocabularyError>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        Ok(to_visual_words(&self.histogram(descriptors)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryLoadError> {
        let vocabulary: Self = persist::load(path.as_ref(), MAGIC, VERSION)?;
        if vocabulary.is_empty() {
            return Err(RegistryLoadError::Invalid("视觉词表为空".to_string()));
        }
        Ok(vocabulary)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryLoadError> {
        persist::save(path.as_ref(), MAGIC, VERSION, self)
    }

    /// 加载视觉词表，失败时记录日志并返回 `None`
    pub fn open(path: impl AsRef<Path>) -> Option<Arc<Self>> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(vocabulary) => {
                info!("已加载视觉词表: {} ({} 个视觉词)", path.display(), vocabulary.len());
                Some(Arc::new(vocabulary))
            }
            Err(e) => {
                warn!("{}，视觉词已禁用", e);
                None
            }
        }
    }

    pub fn centroid(&self, index: usize) -> Array1<f32> {
        self.centroids.row(index).to_owned()
    }
}

/// 按编号顺序输出 `v<编号>`，出现几次就重复几次，空格分隔
pub fn to_visual_words(histogram: &[u32]) -> String {
    let mut s = String::new();
    for (word, &count) in histogram.iter().enumerate() {
        for _ in 0..count {
            if !s.is_empty() {
                s.push(' ');
            }
            let _ = write!(s, "v{word}");
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use tempfile::tempdir;

    use super::*;

    fn two_clusters() -> Array2<f32> {
        let mut rows = vec![];
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.01;
            rows.extend_from_slice(&[jitter, 0., 0.]);
            rows.extend_from_slice(&[10. + jitter, 10., 10.]);
        }
        Array2::from_shape_vec((40, 3), rows).unwrap()
    }

    #[test]
    fn test_train_separates_clusters() {
        let samples = two_clusters();
        let vocabulary = Vocabulary::train(samples.view(), 2, 20, 7).unwrap();
        assert_eq!(vocabulary.len(), 2);
        assert_eq!(vocabulary.dimensions(), 3);

        let low = vocabulary.nearest(&[0., 0., 0.]).unwrap();
        let high = vocabulary.nearest(&[10., 10., 10.]).unwrap();
        assert_ne!(low, high);
        assert!(vocabulary.centroid(low)[0] < 0.1);
        assert!((vocabulary.centroid(high)[1] - 10.).abs() < 1e-4);

        assert_eq!(Vocabulary::train(samples.view(), 2, 20, 7).unwrap(), vocabulary);
    }

    #[test]
    fn test_too_few_samples() {
        let samples = two_clusters();
        assert_eq!(
            Vocabulary::train(samples.view(), 41, 5, 0),
            Err(VocabularyError::TooFewSamples { samples: 40, clusters: 41 })
        );
        assert!(matches!(Vocabulary::train(samples.view(), 0, 5, 0), Err(VocabularyError::TooFewSamples { .. })));
    }

    #[test]
    fn test_identical_samples() {
        let samples = Array2::<f32>::ones((4, 2));
        let vocabulary = Vocabulary::train(samples.view(), 3, 5, 1).unwrap();
        assert_eq!(vocabulary.len(), 3);
        assert_eq!(vocabulary.nearest(&[1., 1.]).unwrap(), 0);
    }

    #[test]
    fn test_histogram_and_words() {
        let vocabulary = Vocabulary::new(array![[0., 0.], [1., 1.], [5., 5.]]);
        let descriptors: Vec<&[f32]> = vec![&[4.9f32, 5.][..], &[0.1, 0.][..], &[5., 5.1][..]];
        assert_eq!(vocabulary.histogram(descriptors.iter().copied()).unwrap(), vec![1, 0, 2]);
        assert_eq!(vocabulary.words(descriptors).unwrap(), "v0 v2 v2");
        assert_eq!(
            vocabulary.nearest(&[1.]),
            Err(VocabularyError::DimensionMismatch { expected: 2, actual: 1 })
        );
        assert_eq!(to_visual_words(&[0, 0]), "");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("visual_words.bin");
        let vocabulary = Vocabulary::new(array![[0., 1.], [2., 3.]]);
        vocabulary.save(&path).unwrap();
        assert_eq!(Vocabulary::load(&path).unwrap(), vocabulary);
        assert!(Vocabulary::open(&path).is_some());
        assert!(Vocabulary::open(dir.path().join("missing.bin")).is_none());
    }
}
