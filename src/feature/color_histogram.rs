use image::RgbImage;

use super::*;

/// 每个通道的量化级数
const LEVELS: usize = 4;
const LEN: usize = LEVELS * LEVELS * LEVELS;

/// RGB 颜色直方图，每个通道量化为 4 级，归一化后以 f32 存储
#[derive(Debug, Clone)]
pub struct ColorHistogram {
    data: Vec<f32>,
}

impl Default for ColorHistogram {
    fn default() -> Self {
        Self { data: vec![0.; LEN] }
    }
}

impl GlobalFeature for ColorHistogram {
    fn kind(&self) -> FeatureKind {
        FeatureKind::ColorHistogram
    }

    fn extract(&mut self, image: &RgbImage) -> Result<(), FeatureError> {
        check_image(image)?;
        let mut hist = vec![0.; LEN];
        for pixel in image.pixels() {
            let [r, g, b] = pixel.0.map(|c| c as usize * LEVELS / 256);
            hist[(r * LEVELS + g) * LEVELS + b] += 1.;
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
}
