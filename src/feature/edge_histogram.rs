use std::f32::consts::SQRT_2;

use image::RgbImage;

use super::*;

const SUB_IMAGES: u32 = 4;
const EDGE_TYPES: usize = 5;
const LEN: usize = (SUB_IMAGES * SUB_IMAGES) as usize * EDGE_TYPES;
/// 期望的图像块数量
const DESIRED_BLOCKS: u32 = 1100;
/// 边缘强度阈值，低于该值的图像块视为平坦
const THRESHOLD: f32 = 11.;

/// 垂直、水平、45°、135°、无方向，作用于 2x2 子块均值 (左上, 右上, 左下, 右下)
const FILTERS: [[f32; 4]; EDGE_TYPES] = [
    [1., -1., 1., -1.],
    [1., 1., -1., -1.],
    [SQRT_2, 0., 0., -SQRT_2],
    [0., SQRT_2, -SQRT_2, 0.],
    [2., -2., -2., 2.],
];

/// MPEG-7 边缘直方图描述子
///
/// 图片切分为 4x4 个子图，统计每个子图内 5 种边缘类型的图像块比例，
/// 每个分量量化为 3 bit。
#[derive(Debug, Clone)]
pub struct EdgeHistogram {
    data: Vec<f32>,
}

impl Default for EdgeHistogram {
    fn default() -> Self {
        Self { data: vec![0.; LEN] }
    }
}

impl GlobalFeature for EdgeHistogram {
    fn kind(&self) -> FeatureKind {
        FeatureKind::EdgeHistogram
    }

    fn extract(&mut self, image: &RgbImage) -> Result<(), FeatureError> {
        check_image(image)?;
        let (width, height) = image.dimensions();
        let gray = |x: u32, y: u32| {
            let p = image.get_pixel(x, y);
            luminance([p[0] as f32, p[1] as f32, p[2] as f32])
        };

        let block = block_size(width, height);
        let half = block / 2;
        let cells = (SUB_IMAGES * SUB_IMAGES) as usize;
        let mut counts = vec![[0u32; EDGE_TYPES]; cells];
        let mut blocks = vec![0u32; cells];

        for by in (0..height.saturating_sub(block - 1)).step_by(block as usize) {
            for bx in (0..width.saturating_sub(block - 1)).step_by(block as usize) {
                let mut means = [0f32; 4];
                for (i, (ox, oy)) in [(0, 0), (half, 0), (0, half), (half, half)].iter().enumerate() {
                    let mut sum = 0.;
                    for y in by + oy..by + oy + half {
                        for x in bx + ox..bx + ox + half {
                            sum += gray(x, y);
                        }
                    }
                    means[i] = sum / (half * half) as f32;
                }

                let cell = ((by * SUB_IMAGES / height) * SUB_IMAGES + bx * SUB_IMAGES / width) as usize;
                blocks[cell] += 1;
                if let Some(edge) = edge_type(&means) {
                    counts[cell][edge] += 1;
                }
            }
        }

        self.data.clear();
        for (count, total) in counts.iter().zip(&blocks) {
            for &c in count {
                let ratio = if *total == 0 { 0. } else { c as f32 / *total as f32 };
                self.data.push(quantize(ratio));
            }
        }
        Ok(())
    }

    fn histogram(&self) -> &[f32] {
        &self.data
    }

    fn to_bytes(&self) -> Vec<u8> {
        encode_u8(&self.data)
    }

    fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), FeatureError> {
        self.data = decode_u8(bytes, LEN)?;
        Ok(())
    }

    /// 局部直方图的 L1 距离，再加上 5 倍权重的全局直方图距离
    fn distance(&self, other: &dyn GlobalFeature) -> f32 {
        let (a, b) = (self.histogram(), other.histogram());
        let global = |h: &[f32]| {
            let mut g = [0f32; EDGE_TYPES];
            for chunk in h.chunks_exact(EDGE_TYPES) {
                g.iter_mut().zip(chunk).for_each(|(g, v)| *g += v);
            }
            g.map(|v| v / (SUB_IMAGES * SUB_IMAGES) as f32)
        };
        l1_distance(a, b) + 5. * l1_distance(&global(a), &global(b))
    }
}

/// 图像块边长，必须为偶数且不小于 2
fn block_size(width: u32, height: u32) -> u32 {
    let a = ((width as f64 * height as f64) / DESIRED_BLOCKS as f64).sqrt() as u32;
    ((a / 2) * 2).max(2)
}

fn edge_type(means: &[f32; 4]) -> Option<usize> {
    let (edge, strength) = FILTERS
        .iter()
        .map(|f| f.iter().zip(means).map(|(w, m)| w * m).sum::<f32>().abs())
        .enumerate()
        .fold((0, f32::MIN), |acc, (i, s)| if s > acc.1 { (i, s) } else { acc });
    (strength >= THRESHOLD).then_some(edge)
}

/// 开方后线性量化到 0..8，低比例区间分辨率更高
fn quantize(ratio: f32) -> f32 {
    (ratio.sqrt() * 7.).round().clamp(0., 7.)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::super::tests::*;
    use super::*;

    #[test]
    fn test_flat_image_has_no_edges() {
        let mut eh = EdgeHistogram::default();
        eh.extract(&solid(120, 80, [90, 90, 90])).unwrap();
        assert_eq!(eh.histogram().len(), 80);
        assert!(eh.histogram().iter().all(|&v| v == 0.));
    }

    #[test]
    fn test_vertical_stripes() {
        let image = RgbImage::from_fn(128, 128, |x, _| {
            if x % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        let mut eh = EdgeHistogram::default();
        eh.extract(&image).unwrap();
        // 每个子图的第一个分量为垂直边缘
        for chunk in eh.histogram().chunks_exact(EDGE_TYPES) {
            assert_eq!(chunk[0], 7.);
            assert!(chunk[1..].iter().all(|&v| v == 0.));
        }
    }

    #[test]
    fn test_tiny_image() {
        let mut eh = EdgeHistogram::default();
        eh.extract(&gradient(1, 1)).unwrap();
        assert!(eh.histogram().iter().all(|&v| v == 0.));
    }

    #[test]
    fn test_block_size_is_even() {
        assert_eq!(block_size(1, 1), 2);
        assert_eq!(block_size(1024, 768) % 2, 0);
        assert!(block_size(1024, 768) >= 2);
    }
}
