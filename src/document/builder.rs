use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use image::RgbImage;
use image::imageops::{self, FilterType};
use log::{debug, warn};
use thiserror::Error;

use super::{Field, MAX_IMAGE_DIMENSION, hash_field_name};
use crate::feature::{FeatureError, FeatureKind, GlobalFeature};
use crate::hashing::{HashFunctions, HashingMode};
use crate::registry::{ConfigError, FeatureRegistry};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("提取特征 {field} 失败: {source}")]
    Extraction {
        field: String,
        #[source]
        source: FeatureError,
    },
}

/// 特征载荷的存储方式，不影响哈希字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// 二进制存储
    #[default]
    Fast,
    /// 文本存储
    Slow,
}

/// 启用哈希时使用的哈希函数和哈希函数族
#[derive(Debug, Clone)]
pub struct Hashing {
    pub functions: Arc<HashFunctions>,
    pub mode: HashingMode,
}

impl Hashing {
    pub fn new(functions: Arc<HashFunctions>, mode: HashingMode) -> Self {
        Self { functions, mode }
    }
}

/// 从一张图片生成一组字段
pub trait FieldBuilder: Send + Sync {
    /// 特征载荷的字段名
    fn field_name(&self) -> &str;

    /// 提取特征前图片长边的最大尺寸
    fn max_dimension(&self) -> u32 {
        MAX_IMAGE_DIMENSION
    }

    fn create_fields(&self, image: &RgbImage) -> Result<Vec<Field>, BuildError>;
}

type FeatureFactory = Box<dyn Fn() -> Box<dyn GlobalFeature> + Send + Sync>;

/// 单个特征的字段构建器
///
/// 输出恰好一个载荷字段，启用哈希且向量维度受支持时再加一个哈希字段。
pub struct DocumentBuilder {
    factory: FeatureFactory,
    kind: FeatureKind,
    field_name: String,
    hash_field_name: String,
    mode: Mode,
    hashing: Option<Hashing>,
    max_dimension: u32,
}

impl fmt::Debug for DocumentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentBuilder")
            .field("kind", &self.kind)
            .field("field_name", &self.field_name)
            .field("mode", &self.mode)
            .field("hashing", &self.hashing.as_ref().map(|h| h.mode))
            .field("max_dimension", &self.max_dimension)
            .finish()
    }
}

impl DocumentBuilder {
    pub fn new(kind: FeatureKind, registry: &FeatureRegistry) -> Result<Self, ConfigError> {
        Self::with_factory(registry, move || kind.create())
    }

    /// 使用自定义的特征构造函数
    ///
    /// 字段名优先取注册表中的名字，其次取特征自身的默认字段名，都没有时返回错误。
    pub fn with_factory<F>(registry: &FeatureRegistry, factory: F) -> Result<Self, ConfigError>
    where
        F: Fn() -> Box<dyn GlobalFeature> + Send + Sync + 'static,
    {
        let probe = factory();
        let kind = probe.kind();
        let field_name = match registry.field_name_for(kind) {
            Some(name) => name.to_owned(),
            None => match probe.default_field_name() {
                Some(name) if !name.is_empty() => name.to_owned(),
                _ => return Err(ConfigError::NoFieldName { kind }),
            },
        };
        Ok(Self {
            factory: Box::new(factory),
            kind,
            hash_field_name: hash_field_name(&field_name),
            field_name,
            mode: Mode::default(),
            hashing: None,
            max_dimension: MAX_IMAGE_DIMENSION,
        })
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// 设为 `None` 时不生成哈希字段
    pub fn hashing(mut self, hashing: Option<Hashing>) -> Self {
        self.hashing = hashing;
        self
    }

    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn hash_field_name(&self) -> &str {
        &self.hash_field_name
    }

    fn hash_field(&self, feature: &dyn GlobalFeature) -> Option<Field> {
        let hashing = self.hashing.as_ref()?;
        match hashing.functions.hash_string(feature.histogram(), hashing.mode) {
            Ok(tokens) => Some(Field::text(&self.hash_field_name, tokens)),
            Err(e) => {
                warn!("跳过哈希字段 {}: {}", self.hash_field_name, e);
                None
            }
        }
    }
}

impl FieldBuilder for DocumentBuilder {
    fn field_name(&self) -> &str {
        &self.field_name
    }

    fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_fields(&self, image: &RgbImage) -> Result<Vec<Field>, BuildError> {
        let image = scale_image(image, self.max_dimension);
        let mut feature = (self.factory)();
        feature
            .extract(&image)
            .map_err(|source| BuildError::Extraction { field: self.field_name.clone(), source })?;
        debug!("提取特征 {}: {} 维", self.field_name, feature.histogram().len());

        let payload = match self.mode {
            Mode::Fast => Field::binary(&self.field_name, feature.to_bytes()),
            Mode::Slow => Field::text(&self.field_name, feature.to_text()),
        };
        let mut fields = vec![payload];
        fields.extend(self.hash_field(&*feature));
        Ok(fields)
    }
}

/// 长边超过 `max_dimension` 时等比缩小，否则原样返回，上限至少为 1
pub fn scale_image(image: &RgbImage, max_dimension: u32) -> Cow<'_, RgbImage> {
    let max_dimension = max_dimension.max(1);
    let (width, height) = image.dimensions();
    let longer = width.max(height);
    if longer <= max_dimension {
        return Cow::Borrowed(image);
    }
    let scale = |side: u32| ((side as f64 * max_dimension as f64 / longer as f64).round() as u32).max(1);
    let (w, h) = if width >= height { (max_dimension, scale(height)) } else { (scale(width), max_dimension) };
    Cow::Owned(imageops::resize(image, w, h, FilterType::Triangle))
}
