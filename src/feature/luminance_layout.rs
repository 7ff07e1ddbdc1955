use image::RgbImage;

use super::*;

const GRID: u32 = 8;
const LEN: usize = (GRID * GRID) as usize;

/// 亮度布局：8x8 灰度缩略图
#[derive(Debug, Clone)]
pub struct LuminanceLayout {
    data: Vec<f32>,
}

impl Default for LuminanceLayout {
    fn default() -> Self {
        Self { data: vec![0.; LEN] }
    }
}

impl GlobalFeature for LuminanceLayout {
    fn kind(&self) -> FeatureKind {
        FeatureKind::LuminanceLayout
    }

    fn extract(&mut self, image: &RgbImage) -> Result<(), FeatureError> {
        check_image(image)?;
        self.data = grid_means(image, GRID)
            .into_iter()
            .map(|rgb| luminance(rgb).round().clamp(0., 255.))
            .collect();
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
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;

    #[test]
    fn test_gradient_increases_downwards() {
        let mut ll = LuminanceLayout::default();
        ll.extract(&gradient(64, 64)).unwrap();
        let h = ll.histogram();
        // 同一列自上而下亮度不减
        for row in 1..8 {
            assert!(h[row * 8] >= h[(row - 1) * 8]);
        }
    }
}
