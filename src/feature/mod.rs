//! 全局图像特征
//!
//! 每种特征都实现 [`GlobalFeature`]，负责从 RGB 图片中提取特征向量、
//! 以紧凑的二进制格式序列化，以及在精确重排阶段计算距离。

mod color_histogram;
mod color_layout;
mod edge_histogram;
mod luminance_layout;
mod opponent_histogram;

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use clap::ValueEnum;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use color_histogram::ColorHistogram;
pub use color_layout::ColorLayout;
pub use edge_histogram::EdgeHistogram;
pub use luminance_layout::LuminanceLayout;
pub use opponent_histogram::OpponentHistogram;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("图片尺寸为空: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
    #[error("无法解码图片: {0}")]
    Decode(#[from] image::ImageError),
    #[error("特征数据长度错误: 期望 {expected} 字节，实际 {actual} 字节")]
    PayloadLength { expected: usize, actual: usize },
}

/// 支持的特征类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum FeatureKind {
    #[value(name = "cl")]
    ColorLayout,
    #[value(name = "eh")]
    EdgeHistogram,
    #[value(name = "ll")]
    LuminanceLayout,
    #[value(name = "ch")]
    ColorHistogram,
    #[value(name = "oh")]
    OpponentHistogram,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 5] = [
        Self::ColorLayout,
        Self::EdgeHistogram,
        Self::LuminanceLayout,
        Self::ColorHistogram,
        Self::OpponentHistogram,
    ];

    /// 该特征的规范字段名
    pub fn field_name(self) -> &'static str {
        match self {
            Self::ColorLayout => "cl",
            Self::EdgeHistogram => "eh",
            Self::LuminanceLayout => "ll",
            Self::ColorHistogram => "ch",
            Self::OpponentHistogram => "oh",
        }
    }

    /// 创建一个空的特征实例
    pub fn create(self) -> Box<dyn GlobalFeature> {
        match self {
            Self::ColorLayout => Box::new(ColorLayout::default()),
            Self::EdgeHistogram => Box::new(EdgeHistogram::default()),
            Self::LuminanceLayout => Box::new(LuminanceLayout::default()),
            Self::ColorHistogram => Box::new(ColorHistogram::default()),
            Self::OpponentHistogram => Box::new(OpponentHistogram::default()),
        }
    }

    /// 从存储的二进制数据中恢复特征
    pub fn decode(self, bytes: &[u8]) -> Result<Box<dyn GlobalFeature>, FeatureError> {
        let mut feature = self.create();
        feature.set_bytes(bytes)?;
        Ok(feature)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ColorLayout => "ColorLayout",
            Self::EdgeHistogram => "EdgeHistogram",
            Self::LuminanceLayout => "LuminanceLayout",
            Self::ColorHistogram => "ColorHistogram",
            Self::OpponentHistogram => "OpponentHistogram",
        };
        f.write_str(name)
    }
}

/// 全局特征
pub trait GlobalFeature: Send + Sync {
    /// 特征类型
    fn kind(&self) -> FeatureKind;

    /// 特征类型未在注册表中登记时使用的字段名，返回 `None` 表示无法自描述
    fn default_field_name(&self) -> Option<&'static str> {
        Some(self.kind().field_name())
    }

    /// 从图片中提取特征，覆盖当前数据
    fn extract(&mut self, image: &RgbImage) -> Result<(), FeatureError>;

    /// 特征向量
    fn histogram(&self) -> &[f32];

    /// 紧凑的二进制表示
    fn to_bytes(&self) -> Vec<u8>;

    /// 从 [`GlobalFeature::to_bytes`] 的输出恢复特征
    fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), FeatureError>;

    /// 与另一个同类特征的距离，越小越相似
    fn distance(&self, other: &dyn GlobalFeature) -> f32 {
        l1_distance(self.histogram(), other.histogram())
    }

    /// 文本表示，空格分隔
    fn to_text(&self) -> String {
        self.histogram().iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
    }
}

pub(crate) fn check_image(image: &RgbImage) -> Result<(), FeatureError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FeatureError::EmptyImage { width, height });
    }
    Ok(())
}

/// 把图片划分为 n x n 的网格，返回每个格子的 RGB 平均值（行优先）
///
/// 图片小于网格时，空格子取其左上角对应的像素
pub(crate) fn grid_means(image: &RgbImage, n: u32) -> Vec<[f32; 3]> {
    let (width, height) = image.dimensions();
    let cells = (n * n) as usize;
    let mut sum = vec![[0f64; 3]; cells];
    let mut count = vec![0u32; cells];
    for (x, y, pixel) in image.enumerate_pixels() {
        let cell = ((y * n / height) * n + x * n / width) as usize;
        for c in 0..3 {
            sum[cell][c] += pixel[c] as f64;
        }
        count[cell] += 1;
    }
    (0..cells)
        .map(|cell| {
            if count[cell] == 0 {
                let (cx, cy) = (cell as u32 % n, cell as u32 / n);
                let pixel = image.get_pixel(cx * width / n, cy * height / n);
                return [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
            }
            let c = count[cell] as f64;
            [(sum[cell][0] / c) as f32, (sum[cell][1] / c) as f32, (sum[cell][2] / c) as f32]
        })
        .collect()
}

pub(crate) fn luminance(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

/// 每个分量占一个字节，分量必须是 0..=255 的整数
pub(crate) fn encode_u8(values: &[f32]) -> Vec<u8> {
    values.iter().map(|&v| v as u8).collect()
}

pub(crate) fn decode_u8(bytes: &[u8], len: usize) -> Result<Vec<f32>, FeatureError> {
    if bytes.len() != len {
        return Err(FeatureError::PayloadLength { expected: len, actual: bytes.len() });
    }
    Ok(bytes.iter().map(|&b| b as f32).collect())
}

/// 每个分量按小端 f32 存储
pub(crate) fn encode_f32(values: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut bytes);
    bytes
}

pub(crate) fn decode_f32(bytes: &[u8], len: usize) -> Result<Vec<f32>, FeatureError> {
    if bytes.len() != len * 4 {
        return Err(FeatureError::PayloadLength { expected: len * 4, actual: bytes.len() });
    }
    let mut values = vec![0.; len];
    LittleEndian::read_f32_into(bytes, &mut values);
    Ok(values)
}

pub(crate) fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Jensen-Shannon 散度，输入为归一化直方图
pub(crate) fn jsd(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.;
    for (&p, &q) in a.iter().zip(b) {
        let m = (p + q) / 2.;
        if p > 0. {
            sum += p * (p / m).ln();
        }
        if q > 0. {
            sum += q * (q / m).ln();
        }
    }
    sum / 2.
}

/// 归一化直方图，使各分量之和为 1
pub(crate) fn normalize(hist: &mut [f32]) {
    let total: f32 = hist.iter().sum();
    if total > 0. {
        hist.iter_mut().for_each(|v| *v /= total);
    }
}
