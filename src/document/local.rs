use std::sync::Arc;

use image::RgbImage;
use log::{debug, warn};

use super::{BuildError, Field, FieldBuilder, MAX_IMAGE_DIMENSION, Mode, scale_image, visual_words_field_name};
use crate::local::{DEFAULT_MAX_KEYPOINTS, LocalFeature, LocalKind, Vocabulary};

/// 局部特征的字段构建器
///
/// 每个关键点输出一个载荷字段，没有关键点时不输出任何字段。
/// 设置了视觉词表且至少有一个关键点时，再输出一个视觉词字段。
#[derive(Debug, Clone)]
pub struct LocalDocumentBuilder {
    kind: LocalKind,
    field_name: String,
    visual_words_field_name: String,
    mode: Mode,
    max_keypoints: usize,
    vocabulary: Option<Arc<Vocabulary>>,
    max_dimension: u32,
}

impl LocalDocumentBuilder {
    pub fn new(kind: LocalKind) -> Self {
        let field_name = kind.field_name().to_owned();
        Self {
            kind,
            visual_words_field_name: visual_words_field_name(&field_name),
            field_name,
            mode: Mode::default(),
            max_keypoints: DEFAULT_MAX_KEYPOINTS,
            vocabulary: None,
            max_dimension: MAX_IMAGE_DIMENSION,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_keypoints(mut self, max_keypoints: usize) -> Self {
        self.max_keypoints = max_keypoints;
        self
    }

    /// 设为 `None` 时不生成视觉词字段
    pub fn vocabulary(mut self, vocabulary: Option<Arc<Vocabulary>>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn kind(&self) -> LocalKind {
        self.kind
    }

    pub fn visual_words_field_name(&self) -> &str {
        &self.visual_words_field_name
    }

    fn visual_words_field(&self, features: &[LocalFeature]) -> Option<Field> {
        let vocabulary = self.vocabulary.as_ref()?;
        if features.is_empty() {
            return None;
        }
        match vocabulary.words(features.iter().map(|f| f.descriptor.as_slice())) {
            Ok(words) => Some(Field::text(&self.visual_words_field_name, words)),
            Err(e) => {
                warn!("跳过视觉词字段 {}: {}", self.visual_words_field_name, e);
                None
            }
        }
    }
}

impl FieldBuilder for LocalDocumentBuilder {
    fn field_name(&self) -> &str {
        &self.field_name
    }

    fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_fields(&self, image: &RgbImage) -> Result<Vec<Field>, BuildError> {
        let image = scale_image(image, self.max_dimension);
        let features = self
            .kind
            .extract(&image, self.max_keypoints)
            .map_err(|source| BuildError::Extraction { field: self.field_name.clone(), source })?;
        debug!("提取局部特征 {}: {} 个关键点", self.field_name, features.len());

        let mut fields: Vec<Field> = features
            .iter()
            .map(|feature| match self.mode {
                Mode::Fast => Field::binary(&self.field_name, feature.to_bytes()),
                Mode::Slow => Field::text(&self.field_name, feature.to_text()),
            })
            .collect();
        fields.extend(self.visual_words_field(&features));
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use ndarray::Array2;

    use super::*;
    use crate::document::FieldValue;
    use crate::feature::tests::solid;
    use crate::local::DESCRIPTOR_LEN;

    fn blobs() -> RgbImage {
        let mut image = solid(160, 120, [0, 0, 0]);
        for (x0, y0) in [(40, 40), (100, 70)] {
            for y in y0..y0 + 12 {
                for x in x0..x0 + 12 {
                    image.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        image
    }

    fn vocabulary(words: usize) -> Option<Arc<Vocabulary>> {
        let centroids = Array2::from_shape_fn((words, DESCRIPTOR_LEN), |(i, j)| ((i + j) % 3) as f32);
        Some(Arc::new(Vocabulary::new(centroids)))
    }

    #[test]
    fn test_one_field_per_keypoint() {
        let builder = LocalDocumentBuilder::new(LocalKind::Surf);
        let fields = builder.create_fields(&blobs()).unwrap();
        assert!(!fields.is_empty());
        for field in &fields {
            assert_eq!(field.name, "su");
            assert_eq!(field.value.as_bytes().map(<[u8]>::len), Some(DESCRIPTOR_LEN * 4));
        }

        let limited = LocalDocumentBuilder::new(LocalKind::Surf).max_keypoints(1);
        assert_eq!(limited.create_fields(&blobs()).unwrap().len(), 1);
    }

    #[test]
    fn test_visual_words_field() {
        let builder = LocalDocumentBuilder::new(LocalKind::Surf).vocabulary(vocabulary(4));
        let fields = builder.create_fields(&blobs()).unwrap();
        let last = fields.last().unwrap();
        assert_eq!(last.name, "su_vw");
        let FieldValue::Text(words) = &last.value else { panic!("{last:?}") };
        assert_eq!(words.split(' ').count(), fields.len() - 1);
        assert!(words.split(' ').all(|w| w.starts_with('v')));
    }

    #[test]
    fn test_no_keypoints_no_fields() {
        let builder = LocalDocumentBuilder::new(LocalKind::Surf).vocabulary(vocabulary(4));
        assert!(builder.create_fields(&solid(64, 64, [120, 120, 120])).unwrap().is_empty());
    }

    #[test]
    fn test_vocabulary_mismatch_skips_words() {
        let centroids = Array2::zeros((2, 8));
        let builder = LocalDocumentBuilder::new(LocalKind::Surf).vocabulary(Some(Arc::new(Vocabulary::new(centroids))));
        let fields = builder.create_fields(&blobs()).unwrap();
        assert!(fields.iter().all(|f| f.name == "su"));
    }

    #[test]
    fn test_slow_mode_stores_text() {
        let builder = LocalDocumentBuilder::new(LocalKind::Surf).mode(Mode::Slow);
        let fields = builder.create_fields(&blobs()).unwrap();
        assert_eq!(fields[0].value.as_str().unwrap().split(' ').count(), DESCRIPTOR_LEN);
    }

    #[test]
    fn test_empty_image_fails() {
        let err = LocalDocumentBuilder::new(LocalKind::Surf).create_fields(&RgbImage::new(0, 0)).unwrap_err();
        let BuildError::Extraction { field, .. } = err;
        assert_eq!(field, "su");
    }
}
