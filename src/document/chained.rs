use std::collections::HashSet;

use image::RgbImage;

use super::builder::scale_image;
use super::{
    AssembleError, BuildError, Document, DocumentBuilder, DocumentError, Field, FieldBuilder, Hashing, Mode, assemble,
};
use crate::feature::FeatureKind;
use crate::registry::{ConfigError, FeatureRegistry};

/// 依次调用多个字段构建器，输出合并后的字段
#[derive(Default)]
pub struct ChainedBuilder {
    builders: Vec<Box<dyn FieldBuilder>>,
}

impl ChainedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为每种特征创建一个构建器，共享同一组哈希函数
    pub fn from_kinds(
        kinds: &[FeatureKind],
        registry: &FeatureRegistry,
        mode: Mode,
        hashing: Option<Hashing>,
    ) -> Result<Self, ConfigError> {
        ensure_unique_kinds(kinds)?;
        let mut chained = Self::new();
        for &kind in kinds {
            let builder = DocumentBuilder::new(kind, registry)?.mode(mode).hashing(hashing.clone());
            chained.push(builder)?;
        }
        Ok(chained)
    }

    /// 追加一个构建器，字段名与已有构建器重复时返回错误
    pub fn push(&mut self, builder: impl FieldBuilder + 'static) -> Result<(), ConfigError> {
        if self.builders.iter().any(|b| b.field_name() == builder.field_name()) {
            return Err(ConfigError::DuplicateName { name: builder.field_name().to_owned() });
        }
        self.builders.push(Box::new(builder));
        Ok(())
    }

    pub fn builders(&self) -> &[Box<dyn FieldBuilder>] {
        &self.builders
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// 构建单张图片的文档，任一特征提取失败时整个文档失败
    pub fn build(&self, identifier: Option<&str>, image: &RgbImage) -> Result<Document, DocumentError> {
        // 先按最大的尺寸上限缩放一次，避免每个构建器都缩放原图
        let Some(max) = self.builders.iter().map(|b| b.max_dimension()).max() else {
            return Err(AssembleError::Empty.into());
        };
        let image = scale_image(image, max);
        let field_sets = self
            .builders
            .iter()
            .map(|b| b.create_fields(&image))
            .collect::<Result<Vec<Vec<Field>>, BuildError>>()?;
        Ok(assemble(identifier, field_sets)?)
    }
}

/// 同一种特征只能出现一次
pub fn ensure_unique_kinds(kinds: &[FeatureKind]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for &kind in kinds {
        if !seen.insert(kind) {
            return Err(ConfigError::DuplicateKind { kind });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LocalDocumentBuilder;
    use crate::feature::tests::gradient;
    use crate::local::LocalKind;

    #[test]
    fn test_build_multiple_features() {
        let registry = FeatureRegistry::standard();
        let kinds = [FeatureKind::ColorLayout, FeatureKind::EdgeHistogram, FeatureKind::ColorHistogram];
        let chained = ChainedBuilder::from_kinds(&kinds, &registry, Mode::Fast, None).unwrap();
        let doc = chained.build(Some("img.png"), &gradient(80, 60)).unwrap();
        let names: Vec<&str> = doc.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "cl", "eh", "ch"]);
    }

    #[test]
    fn test_empty_chain() {
        let chained = ChainedBuilder::new();
        let err = chained.build(None, &gradient(8, 8)).unwrap_err();
        assert!(matches!(err, DocumentError::Assemble(AssembleError::Empty)));
    }

    #[test]
    fn test_failure_aborts_document() {
        let registry = FeatureRegistry::standard();
        let chained = ChainedBuilder::from_kinds(&FeatureKind::ALL, &registry, Mode::Fast, None).unwrap();
        let err = chained.build(Some("empty"), &RgbImage::new(0, 3)).unwrap_err();
        assert!(matches!(err, DocumentError::Build(BuildError::Extraction { .. })));
    }

    #[test]
    fn test_duplicate_kind_is_rejected() {
        let registry = FeatureRegistry::standard();
        let kinds = [FeatureKind::ColorLayout, FeatureKind::EdgeHistogram, FeatureKind::ColorLayout];
        let err = ChainedBuilder::from_kinds(&kinds, &registry, Mode::Fast, None).err();
        assert_eq!(err, Some(ConfigError::DuplicateKind { kind: FeatureKind::ColorLayout }));
    }

    #[test]
    fn test_duplicate_field_name_is_rejected() {
        let registry = FeatureRegistry::standard();
        let mut chained = ChainedBuilder::new();
        chained.push(DocumentBuilder::new(FeatureKind::ColorLayout, &registry).unwrap()).unwrap();
        chained.push(LocalDocumentBuilder::new(LocalKind::Surf)).unwrap();
        assert_eq!(
            chained.push(LocalDocumentBuilder::new(LocalKind::Surf)),
            Err(ConfigError::DuplicateName { name: "su".to_string() })
        );
        assert_eq!(chained.builders().len(), 2);
    }
}
