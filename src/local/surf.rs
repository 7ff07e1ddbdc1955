//! 不带方向的 SURF 特征
//!
//! 在积分图上用盒子滤波近似 Hessian 行列式，两个 octave 共六层响应，
//! 在 3x3x3 邻域内做非极大值抑制，只取网格位置，不做亚像素插值。

use image::RgbImage;
use log::debug;

use super::{DESCRIPTOR_LEN, LocalFeature};
use crate::feature::{FeatureError, check_image, luminance};

/// 默认的 Hessian 响应阈值，针对灰度范围 [0, 1]
pub const DEFAULT_THRESHOLD: f32 = 0.0004;
/// 默认每张图片最多保留的关键点数量
pub const DEFAULT_MAX_KEYPOINTS: usize = 200;

/// (采样步长, 滤波器尺寸)
const LAYERS: [(usize, usize); 6] = [(2, 9), (2, 15), (2, 21), (2, 27), (4, 39), (4, 51)];
/// 每个 octave 中参与非极大值抑制的三层 (下, 中, 上)
const TRIPLETS: [[usize; 3]; 4] = [[0, 1, 2], [1, 2, 3], [1, 3, 4], [3, 4, 5]];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub response: f32,
}

struct IntegralImage {
    width: usize,
    height: usize,
    // (height + 1) x (width + 1)，首行首列为 0
    sums: Vec<f64>,
}

impl IntegralImage {
    fn new(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let stride = width + 1;
        let mut sums = vec![0.; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.;
            for x in 0..width {
                let p = image.get_pixel(x as u32, y as u32);
                row += luminance([p[0] as f32, p[1] as f32, p[2] as f32]) as f64 / 255.;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { width, height, sums }
    }

    /// 从 (row, col) 开始 rows x cols 区域的像素和，超出图片的部分按 0 计
    fn box_sum(&self, row: i64, col: i64, rows: i64, cols: i64) -> f32 {
        let clamp_r = |r: i64| r.clamp(0, self.height as i64) as usize;
        let clamp_c = |c: i64| c.clamp(0, self.width as i64) as usize;
        let (r0, r1) = (clamp_r(row), clamp_r(row + rows));
        let (c0, c1) = (clamp_c(col), clamp_c(col + cols));
        let stride = self.width + 1;
        let at = |r: usize, c: usize| self.sums[r * stride + c];
        let sum = at(r1, c1) - at(r0, c1) - at(r1, c0) + at(r0, c0);
        sum.max(0.) as f32
    }

    fn haar_x(&self, row: i64, col: i64, size: i64) -> f32 {
        let half = size / 2;
        self.box_sum(row - half, col, size, half) - self.box_sum(row - half, col - half, size, half)
    }

    fn haar_y(&self, row: i64, col: i64, size: i64) -> f32 {
        let half = size / 2;
        self.box_sum(row, col - half, half, size) - self.box_sum(row - half, col - half, half, size)
    }
}

struct ResponseLayer {
    width: usize,
    height: usize,
    step: usize,
    filter: usize,
    responses: Vec<f32>,
}

impl ResponseLayer {
    fn build(integral: &IntegralImage, step: usize, filter: usize) -> Self {
        let width = integral.width / step;
        let height = integral.height / step;
        let border = ((filter - 1) / 2) as i64;
        let lobe = (filter / 3) as i64;
        let w = filter as i64;
        let inverse_area = 1. / (filter * filter) as f32;

        let mut responses = vec![0.; width * height];
        for ar in 0..height {
            for ac in 0..width {
                let r = (ar * step) as i64;
                let c = (ac * step) as i64;
                let dxx = integral.box_sum(r - lobe + 1, c - border, 2 * lobe - 1, w)
                    - 3. * integral.box_sum(r - lobe + 1, c - lobe / 2, 2 * lobe - 1, lobe);
                let dyy = integral.box_sum(r - border, c - lobe + 1, w, 2 * lobe - 1)
                    - 3. * integral.box_sum(r - lobe / 2, c - lobe + 1, lobe, 2 * lobe - 1);
                let dxy = integral.box_sum(r - lobe, c + 1, lobe, lobe) + integral.box_sum(r + 1, c - lobe, lobe, lobe)
                    - integral.box_sum(r - lobe, c - lobe, lobe, lobe)
                    - integral.box_sum(r + 1, c + 1, lobe, lobe);
                let (dxx, dyy, dxy) = (dxx * inverse_area, dyy * inverse_area, dxy * inverse_area);
                responses[ar * width + ac] = dxx * dyy - 0.81 * dxy * dxy;
            }
        }
        Self { width, height, step, filter, responses }
    }

    /// 以 `src` 层的网格坐标取本层的响应
    fn response(&self, row: usize, col: usize, src: &ResponseLayer) -> f32 {
        let scale = self.width / src.width;
        self.responses[scale * row * self.width + scale * col]
    }
}

#[derive(Debug, Clone)]
pub struct Surf {
    pub threshold: f32,
    pub max_keypoints: usize,
}

impl Default for Surf {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD, max_keypoints: DEFAULT_MAX_KEYPOINTS }
    }
}

impl Surf {
    pub fn new(threshold: f32, max_keypoints: usize) -> Self {
        Self { threshold, max_keypoints }
    }

    /// 检测关键点，按响应从大到小排序，最多 `max_keypoints` 个
    pub fn detect(&self, image: &RgbImage) -> Vec<Keypoint> {
        let integral = IntegralImage::new(image);
        self.detect_integral(&integral)
    }

    /// 提取关键点及其 64 维描述子，空图片返回错误，没有关键点时返回空列表
    pub fn extract(&self, image: &RgbImage) -> Result<Vec<LocalFeature>, FeatureError> {
        check_image(image)?;
        let integral = IntegralImage::new(image);
        let features: Vec<LocalFeature> = self
            .detect_integral(&integral)
            .into_iter()
            .map(|keypoint| LocalFeature { keypoint, descriptor: describe(&integral, &keypoint) })
            .collect();
        debug!("SURF: {}x{} 图片提取到 {} 个关键点", image.width(), image.height(), features.len());
        Ok(features)
    }

    fn detect_integral(&self, integral: &IntegralImage) -> Vec<Keypoint> {
        if integral.width / 4 < 3 || integral.height / 4 < 3 {
            return vec![];
        }
        let layers: Vec<ResponseLayer> =
            LAYERS.iter().map(|&(step, filter)| ResponseLayer::build(integral, step, filter)).collect();

        let mut keypoints = vec![];
        for [b, m, t] in TRIPLETS {
            let (b, m, t) = (&layers[b], &layers[m], &layers[t]);
            for r in 0..t.height {
                for c in 0..t.width {
                    if self.is_extremum(r, c, t, m, b) {
                        keypoints.push(Keypoint {
                            x: (c * t.step) as f32,
                            y: (r * t.step) as f32,
                            scale: 1.2 / 9. * m.filter as f32,
                            response: m.response(r, c, t),
                        });
                    }
                }
            }
        }

        keypoints.sort_by(|a, b| {
            b.response.total_cmp(&a.response).then(a.y.total_cmp(&b.y)).then(a.x.total_cmp(&b.x))
        });
        keypoints.truncate(self.max_keypoints);
        keypoints
    }

    fn is_extremum(&self, r: usize, c: usize, t: &ResponseLayer, m: &ResponseLayer, b: &ResponseLayer) -> bool {
        let border = (t.filter + 1) / (2 * t.step);
        if r <= border || r + border >= t.height || c <= border || c + border >= t.width {
            return false;
        }
        let candidate = m.response(r, c, t);
        if candidate < self.threshold {
            return false;
        }
        for rr in r - 1..=r + 1 {
            for cc in c - 1..=c + 1 {
                if t.response(rr, cc, t) >= candidate
                    || ((rr != r || cc != c) && m.response(rr, cc, t) >= candidate)
                    || b.response(rr, cc, t) >= candidate
                {
                    return false;
                }
            }
        }
        true
    }
}

fn gaussian(x: f32, y: f32, sigma: f32) -> f32 {
    (-(x * x + y * y) / (2. * sigma * sigma)).exp()
}

/// 4x4 个子区域，每个子区域 5x5 个采样点，累计 [dx, dy, |dx|, |dy|]，最后做 L2 归一化
fn describe(integral: &IntegralImage, keypoint: &Keypoint) -> Vec<f32> {
    let scale = keypoint.scale;
    let haar_size = 2 * (scale.round() as i64).max(1);
    let mut descriptor = Vec::with_capacity(DESCRIPTOR_LEN);
    for i in 0..4 {
        for j in 0..4 {
            let mut sums = [0f32; 4];
            for k in 0..5 {
                for l in 0..5 {
                    // 相对关键点的偏移，以 scale 为单位
                    let u = (i * 5 + k) as f32 - 10. + 0.5;
                    let v = (j * 5 + l) as f32 - 10. + 0.5;
                    let weight = gaussian(u, v, 3.3);
                    let row = (keypoint.y + v * scale).round() as i64;
                    let col = (keypoint.x + u * scale).round() as i64;
                    let dx = weight * integral.haar_x(row, col, haar_size);
                    let dy = weight * integral.haar_y(row, col, haar_size);
                    sums[0] += dx;
                    sums[1] += dy;
                    sums[2] += dx.abs();
                    sums[3] += dy.abs();
                }
            }
            descriptor.extend_from_slice(&sums);
        }
    }
    let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0. {
        descriptor.iter_mut().for_each(|v| *v /= norm);
    }
    descriptor
}
