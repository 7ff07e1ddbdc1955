//! 把本地文档批量推送到 Solr
//!
//! 文档按 LIRE Solr 插件的约定转换：标识写入 `id`，特征载荷写入 `<字段名>_hi`
//! (二进制载荷以 base64 编码)，哈希和视觉词写入 `<字段名>_ha`。

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::document::{Document, FieldValue, HASH_FIELD_SUFFIX, IDENTIFIER_FIELD, VISUAL_WORDS_FIELD_SUFFIX};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Solr core 地址，例如 http://localhost:8983/solr/lire
    pub url: String,
    /// 每批推送的文档数量
    pub batch_size: usize,
    /// 每批最多尝试的次数
    pub retries: u32,
    /// 首次重试前等待的毫秒数，之后每次翻倍
    pub backoff_ms: u64,
    /// 单次请求的超时秒数
    pub timeout_secs: u64,
    /// 全部推送完成后是否提交
    pub commit: bool,
    /// 二进制载荷字段的后缀
    pub binary_suffix: String,
    /// 哈希字段的后缀
    pub hash_suffix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8983/solr/lire".to_string(),
            batch_size: 30,
            retries: 3,
            backoff_ms: 500,
            timeout_secs: 30,
            commit: true,
            binary_suffix: "_hi".to_string(),
            hash_suffix: "_ha".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Solr 返回错误 {status}: {body}")]
    Status { status: u16, body: String },
}

/// 把文档转换为 Solr 文档，同名字段合并为数组
pub fn to_remote(document: &Document, config: &ExportConfig) -> Value {
    let mut map = Map::new();
    for field in &document.fields {
        let (key, value) = match &field.value {
            _ if field.name == IDENTIFIER_FIELD => {
                (IDENTIFIER_FIELD.to_string(), Value::from(field.value.as_str().unwrap_or_default()))
            }
            FieldValue::Binary(bytes) => {
                (format!("{}{}", field.name, config.binary_suffix), Value::from(STANDARD.encode(bytes)))
            }
            FieldValue::Text(s) => match token_base(&field.name) {
                Some(base) => (format!("{}{}", base, config.hash_suffix), Value::from(s.as_str())),
                // 文本方式存储的特征载荷
                None => (format!("{}{}", field.name, config.binary_suffix), Value::from(s.as_str())),
            },
            FieldValue::Keyword(s) => (field.name.clone(), Value::from(s.as_str())),
        };
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => *existing = Value::Array(vec![existing.take(), value]),
            None => {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}

/// 哈希字段和视觉词字段对应的特征字段名
fn token_base(name: &str) -> Option<&str> {
    name.strip_suffix(HASH_FIELD_SUFFIX).or_else(|| name.strip_suffix(VISUAL_WORDS_FIELD_SUFFIX))
}

/// 文档的推送目标
pub trait DocumentSink {
    fn add(&self, batch: &[Value]) -> impl Future<Output = Result<(), ExportError>> + Send;

    fn commit(&self) -> impl Future<Output = Result<(), ExportError>> + Send;
}

pub struct SolrClient {
    client: reqwest::Client,
    url: String,
}

impl SolrClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let url = url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn post(&self, body: &Value, query: &[(&str, &str)]) -> Result<(), ExportError> {
        let response = self.client.post(format!("{}/update", self.url)).query(query).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }
}

impl DocumentSink for SolrClient {
    async fn add(&self, batch: &[Value]) -> Result<(), ExportError> {
        self.post(&Value::from(batch), &[("wt", "json")]).await
    }

    async fn commit(&self) -> Result<(), ExportError> {
        self.post(&json!({ "commit": {} }), &[("wt", "json")]).await
    }
}

/// 缓冲文档并按批推送
pub struct Exporter<S> {
    sink: S,
    config: ExportConfig,
    buffer: Vec<Value>,
    exported: usize,
}

impl<S: DocumentSink> Exporter<S> {
    pub fn new(sink: S, config: ExportConfig) -> Self {
        let capacity = config.batch_size.max(1);
        Self { sink, config, buffer: Vec::with_capacity(capacity), exported: 0 }
    }

    /// 已确认推送成功的文档数量
    pub fn exported(&self) -> usize {
        self.exported
    }

    pub async fn push(&mut self, document: &Document) -> anyhow::Result<()> {
        self.buffer.push(to_remote(document, &self.config));
        if self.buffer.len() >= self.config.batch_size.max(1) {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> anyhow::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let retries = self.config.retries.max(1);
        let mut backoff = Duration::from_millis(self.config.backoff_ms);
        let mut attempt = 1;
        while let Err(e) = self.sink.add(&self.buffer).await {
            if attempt >= retries {
                return Err(anyhow!("推送失败: {}，已成功导出 {} 个文档", e, self.exported));
            }
            warn!("推送失败 ({}/{}): {}，{:?} 后重试", attempt, retries, e, backoff);
            tokio::time::sleep(backoff).await;
            backoff *= 2;
            attempt += 1;
        }
        self.exported += self.buffer.len();
        debug!("已推送 {} 个文档", self.exported);
        self.buffer.clear();
        Ok(())
    }

    /// 推送剩余文档并提交
    pub async fn finish(mut self) -> anyhow::Result<usize> {
        self.flush().await?;
        if self.config.commit {
            self.sink.commit().await.map_err(|e| anyhow!("提交失败: {}，已成功导出 {} 个文档", e, self.exported))?;
            info!("已提交 {} 个文档", self.exported);
        }
        Ok(self.exported)
    }
}
