use std::f32::consts::SQRT_2;

use image::RgbImage;

use super::*;

const LEVELS: usize = 4;
const LEN: usize = LEVELS * LEVELS * LEVELS;

/// 对立颜色空间直方图
///
/// O1 = (R - G) / √2，O2 = (R + G - 2B) / √6，O3 = (R + G + B) / √3，
/// 每个分量在取值范围内均匀量化为 4 级，距离为 Jensen-Shannon 散度
#[derive(Debug, Clone)]
pub struct OpponentHistogram {
    data: Vec<f32>,
}

impl Default for OpponentHistogram {
    fn default() -> Self {
        Self { data: vec![0.; LEN] }
    }
}

impl GlobalFeature for OpponentHistogram {
    fn kind(&self) -> FeatureKind {
        FeatureKind::OpponentHistogram
    }

    fn extract(&mut self, image: &RgbImage) -> Result<(), FeatureError> {
        check_image(image)?;
        let sqrt_3 = 3f32.sqrt();
        let sqrt_6 = 6f32.sqrt();
        let mut hist = vec![0.; LEN];
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0.map(|c| c as f32);
            let o1 = bin((r - g) / SQRT_2, -255. / SQRT_2, 255. / SQRT_2);
            let o2 = bin((r + g - 2. * b) / sqrt_6, -510. / sqrt_6, 510. / sqrt_6);
            let o3 = bin((r + g + b) / sqrt_3, 0., 765. / sqrt_3);
            hist[(o1 * LEVELS + o2) * LEVELS + o3] += 1.;
        }
        normalize(&mut hist);
        self.data = hist;
        Ok(())
    }

    fn histogram(&self) -> &[f32] {
        &self.data
    }

    fn to_bytes(&self) -> Vec<u8> {
        encode_f32(&self.data)
    }

    fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), FeatureError> {
        self.data = decode_f32(bytes, LEN)?;
        Ok(())
    }

    fn distance(&self, other: &dyn GlobalFeature) -> f32 {
        jsd(self.histogram(), other.histogram())
    }
}

fn bin(value: f32, min: f32, max: f32) -> usize {
    let t = (value - min) / (max - min);
    ((t * LEVELS as f32) as usize).min(LEVELS - 1)
}
