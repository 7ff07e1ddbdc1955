use std::f32::consts::PI;
use std::sync::LazyLock;

use image::RgbImage;

use super::*;

const Y_COEFFS: usize = 21;
const C_COEFFS: usize = 6;
const LEN: usize = Y_COEFFS + 2 * C_COEFFS;

/// 8x8 之字形扫描顺序的前 21 项
const ZIGZAG: [usize; Y_COEFFS] =
    [0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40];

const Y_WEIGHTS: [f32; Y_COEFFS] =
    [2., 2., 2., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1.];
const C_WEIGHTS: [f32; C_COEFFS] = [2., 1., 1., 1., 1., 1.];

/// DCT 基函数 cos((2x+1)uπ/16)，下标为 [u][x]
static COS_TABLE: LazyLock<[[f32; 8]; 8]> = LazyLock::new(|| {
    let mut table = [[0.; 8]; 8];
    for (u, row) in table.iter_mut().enumerate() {
        for (x, v) in row.iter_mut().enumerate() {
            *v = ((2 * x + 1) as f32 * u as f32 * PI / 16.).cos();
        }
    }
    table
});

/// MPEG-7 颜色布局描述子
///
/// 8x8 网格平均色转到 YCbCr，做二维 DCT 后按之字形取低频系数，
/// 量化为 0..64：Y 取 21 个，Cb、Cr 各取 6 个
#[derive(Debug, Clone)]
pub struct ColorLayout {
    data: Vec<f32>,
}

impl Default for ColorLayout {
    fn default() -> Self {
        Self { data: vec![0.; LEN] }
    }
}

impl ColorLayout {
    pub fn y_coeffs(&self) -> &[f32] {
        &self.data[..Y_COEFFS]
    }
}

impl GlobalFeature for ColorLayout {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ColorLayout
    }

    fn extract(&mut self, image: &RgbImage) -> Result<(), FeatureError> {
        check_image(image)?;
        let means = grid_means(image, 8);

        let mut planes = [[0f32; 64]; 3];
        for (i, rgb) in means.iter().enumerate() {
            let [r, g, b] = *rgb;
            planes[0][i] = luminance(*rgb);
            planes[1][i] = (-0.169 * r - 0.331 * g + 0.5 * b + 128.).clamp(0., 255.);
            planes[2][i] = (0.5 * r - 0.419 * g - 0.081 * b + 128.).clamp(0., 255.);
        }

        self.data.clear();
        for (plane, take) in planes.iter().zip([Y_COEFFS, C_COEFFS, C_COEFFS]) {
            let coeffs = dct_8x8(plane);
            for (k, &pos) in ZIGZAG[..take].iter().enumerate() {
                self.data.push(quantize(coeffs[pos], k == 0));
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

    fn distance(&self, other: &dyn GlobalFeature) -> f32 {
        let (a, b) = (self.histogram(), other.histogram());
        let weighted = |range: std::ops::Range<usize>, weights: &[f32]| {
            range.zip(weights).map(|(i, w)| w * (a[i] - b[i]).powi(2)).sum::<f32>().sqrt()
        };
        let cb = Y_COEFFS..Y_COEFFS + C_COEFFS;
        let cr = Y_COEFFS + C_COEFFS..LEN;
        weighted(0..Y_COEFFS, &Y_WEIGHTS) + weighted(cb, &C_WEIGHTS) + weighted(cr, &C_WEIGHTS)
    }
}

/// 二维 DCT-II，输入输出均为行优先
fn dct_8x8(block: &[f32; 64]) -> [f32; 64] {
    let cos = &*COS_TABLE;
    let mut out = [0.; 64];
    for v in 0..8 {
        for u in 0..8 {
            let mut sum = 0.;
            for y in 0..8 {
                for x in 0..8 {
                    sum += block[y * 8 + x] * cos[u][x] * cos[v][y];
                }
            }
            let cu = if u == 0 { 1. / 2f32.sqrt() } else { 1. };
            let cv = if v == 0 { 1. / 2f32.sqrt() } else { 1. };
            out[v * 8 + u] = 0.25 * cu * cv * sum;
        }
    }
    out
}

/// DC 系数范围 [0, 2040]，AC 系数约为 [-1020, 1020]，都映射到 0..64
fn quantize(coeff: f32, dc: bool) -> f32 {
    let q = if dc { coeff / 32. } else { coeff / 32. + 32. };
    q.round().clamp(0., 63.)
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;

    #[test]
    fn test_solid_image_has_only_dc() {
        let mut cl = ColorLayout::default();
        cl.extract(&solid(64, 64, [128, 128, 128])).unwrap();
        let y = cl.y_coeffs();
        // 128 * 8 / 32 = 32
        assert_eq!(y[0], 32.);
        assert!(y[1..].iter().all(|&c| c == 32.));
    }

    #[test]
    fn test_length_and_range() {
        let mut cl = ColorLayout::default();
        cl.extract(&gradient(200, 120)).unwrap();
        assert_eq!(cl.histogram().len(), 33);
        assert!(cl.histogram().iter().all(|&c| (0. ..=63.).contains(&c) && c.fract() == 0.));
    }

    #[test]
    fn test_dc_dominates_distance() {
        let mut dark = ColorLayout::default();
        let mut light = ColorLayout::default();
        let mut near = ColorLayout::default();
        dark.extract(&solid(32, 32, [20, 20, 20])).unwrap();
        light.extract(&solid(32, 32, [230, 230, 230])).unwrap();
        near.extract(&solid(32, 32, [30, 30, 30])).unwrap();
        assert!(dark.distance(&near) < dark.distance(&light));
    }
}
