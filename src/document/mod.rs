//! 文档构建
//!
//! 一张图片对应一个 [`Document`]：可选的标识字段，每种特征一个二进制载荷字段，
//! 以及启用哈希时每种特征一个 `<字段名>_hash` 哈希字段。
//! 局部特征每个关键点一个同名字段，加载了视觉词表时再加一个 `<字段名>_vw` 字段。

mod builder;
mod chained;
mod local;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use thiserror::Error;

pub use builder::*;
pub use chained::*;
pub use local::*;

use crate::feature::{FeatureError, FeatureKind, GlobalFeature};
use crate::local::{LocalKind, decode_descriptor};
use crate::registry::FeatureRegistry;

/// 标识字段名
pub const IDENTIFIER_FIELD: &str = "id";
/// 哈希字段名后缀
pub const HASH_FIELD_SUFFIX: &str = "_hash";
/// 视觉词字段名后缀
pub const VISUAL_WORDS_FIELD_SUFFIX: &str = "_vw";
/// 提取特征前图片长边的最大尺寸
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// 特征字段对应的哈希字段名
pub fn hash_field_name(field: &str) -> String {
    format!("{field}{HASH_FIELD_SUFFIX}")
}

/// 局部特征字段对应的视觉词字段名
pub fn visual_words_field_name(field: &str) -> String {
    format!("{field}{VISUAL_WORDS_FIELD_SUFFIX}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    /// 仅存储的二进制数据
    Binary(#[serde(serialize_with = "serialize_base64")] Vec<u8>),
    /// 不分词的字符串
    Keyword(String),
    /// 按空白分词的文本
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Keyword(_) => "keyword",
            Self::Text(_) => "text",
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Keyword(s) | Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn binary(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), value: FieldValue::Binary(bytes) }
    }

    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: FieldValue::Keyword(value.into()) }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: FieldValue::Text(value.into()) }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("没有任何特征字段")]
    Empty,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub fields: Vec<Field>,
}

impl Document {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn identifier(&self) -> Option<&str> {
        self.get(IDENTIFIER_FIELD).and_then(FieldValue::as_str)
    }

    /// 第一个同名字段的值
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 从二进制载荷字段恢复特征，字段不存在或不是二进制时返回 `None`
    pub fn decode_feature(
        &self,
        kind: FeatureKind,
        registry: &FeatureRegistry,
    ) -> Option<Result<Box<dyn GlobalFeature>, FeatureError>> {
        let name = registry.field_name_for(kind).unwrap_or(kind.field_name());
        let bytes = self.get(name)?.as_bytes()?;
        Some(kind.decode(bytes))
    }

    /// 恢复局部特征的所有描述子，忽略文本方式存储的字段
    pub fn decode_local(&self, kind: LocalKind) -> Result<Vec<Vec<f32>>, FeatureError> {
        self.fields
            .iter()
            .filter(|f| f.name == kind.field_name())
            .filter_map(|f| f.value.as_bytes())
            .map(decode_descriptor)
            .collect()
    }
}

/// 把标识字段和若干组特征字段合并为一个文档
///
/// 标识只用于展示，允许为空字符串，唯一性由索引负责。
pub fn assemble<I>(identifier: Option<&str>, field_sets: I) -> Result<Document, AssembleError>
where
    I: IntoIterator<Item = Vec<Field>>,
{
    let mut field_sets = field_sets.into_iter().peekable();
    if field_sets.peek().is_none() {
        return Err(AssembleError::Empty);
    }
    let mut fields = Vec::new();
    if let Some(id) = identifier {
        fields.push(Field::keyword(IDENTIFIER_FIELD, id));
    }
    fields.extend(field_sets.flatten());
    Ok(Document { fields })
}
