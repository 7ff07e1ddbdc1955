use std::collections::HashMap;

use thiserror::Error;

use crate::feature::FeatureKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("无法确定特征 {kind} 的字段名")]
    NoFieldName { kind: FeatureKind },
    #[error("字段名不能为空")]
    EmptyFieldName,
    #[error("特征 {kind} 已注册")]
    DuplicateKind { kind: FeatureKind },
    #[error("字段名 {name} 已被使用")]
    DuplicateName { name: String },
}

/// 特征类型与字段名之间的一一映射
///
/// 在进程启动时构建，之后只读，通过引用传给需要的组件。
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    names: HashMap<FeatureKind, String>,
    kinds: HashMap<String, FeatureKind>,
}

impl FeatureRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 包含所有内置特征及其规范字段名
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for kind in FeatureKind::ALL {
            let registered = registry.register(kind, kind.field_name());
            debug_assert!(registered.is_ok(), "内置字段名重复: {kind}");
        }
        registry
    }

    pub fn register(&mut self, kind: FeatureKind, name: impl Into<String>) -> Result<(), ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }
        if self.names.contains_key(&kind) {
            return Err(ConfigError::DuplicateKind { kind });
        }
        if self.kinds.contains_key(&name) {
            return Err(ConfigError::DuplicateName { name });
        }
        self.kinds.insert(name.clone(), kind);
        self.names.insert(kind, name);
        Ok(())
    }

    pub fn field_name_for(&self, kind: FeatureKind) -> Option<&str> {
        self.names.get(&kind).map(String::as_str)
    }

    pub fn kind_for(&self, name: &str) -> Option<FeatureKind> {
        self.kinds.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 按字段名排序遍历
    pub fn iter(&self) -> impl Iterator<Item = (FeatureKind, &str)> {
        let mut entries: Vec<_> = self.names.iter().map(|(k, v)| (*k, v.as_str())).collect();
        entries.sort_by(|a, b| a.1.cmp(b.1));
        entries.into_iter()
    }
}
