//! 局部特征与视觉词
//!
//! 一张图片提取出若干关键点，每个关键点对应一个定长描述子，
//! 在文档中以多个同名字段存储。视觉词表由 `visual-words` 子命令训练。

mod surf;
mod vocabulary;

use std::fmt;

use clap::ValueEnum;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use surf::{DEFAULT_MAX_KEYPOINTS, DEFAULT_THRESHOLD, Keypoint, Surf};
pub use vocabulary::{Vocabulary, VocabularyError, to_visual_words};

use crate::feature::{FeatureError, decode_f32, encode_f32};

/// 描述子维度
pub const DESCRIPTOR_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum LocalKind {
    #[value(name = "su")]
    Surf,
}

impl LocalKind {
    pub const ALL: [LocalKind; 1] = [LocalKind::Surf];

    pub fn field_name(self) -> &'static str {
        match self {
            Self::Surf => "su",
        }
    }

    pub fn extract(self, image: &RgbImage, max_keypoints: usize) -> Result<Vec<LocalFeature>, FeatureError> {
        match self {
            Self::Surf => Surf::new(DEFAULT_THRESHOLD, max_keypoints).extract(image),
        }
    }
}

impl fmt::Display for LocalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surf => write!(f, "SURF"),
        }
    }
}

/// 一个关键点及其描述子
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFeature {
    pub keypoint: Keypoint,
    pub descriptor: Vec<f32>,
}

impl LocalFeature {
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_f32(&self.descriptor)
    }

    pub fn to_text(&self) -> String {
        self.descriptor.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
    }
}

/// 从二进制载荷恢复描述子
pub fn decode_descriptor(bytes: &[u8]) -> Result<Vec<f32>, FeatureError> {
    decode_f32(bytes, DESCRIPTOR_LEN)
}
