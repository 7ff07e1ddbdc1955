use std::sync::LazyLock;

use log::{error, info};
use prometheus::*;
use tokio::task::spawn_blocking;

static METRIC_DOCUMENT_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("imdoc_document_count", "count of the processed images by status", &["status"])
        .unwrap()
});

static METRIC_BUILD_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "imdoc_build_duration",
        "duration of the per-image document build in seconds",
        &["features"]
    )
    .unwrap()
});

/// 文档的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Indexed,
    Skipped,
    Failed,
}

impl DocumentStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Indexed => "indexed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

pub fn inc_document_count(status: DocumentStatus) {
    METRIC_DOCUMENT_COUNT.with_label_values(&[status.as_str()]).inc();
}

pub fn observe_build_duration(features: &str, duration: f32) {
    METRIC_BUILD_DURATION.with_label_values(&[features]).observe(duration as f64);
}

/// 把当前进程的所有指标推送到 Pushgateway
pub async fn push(url: String, instance: String) {
    let metric_families = prometheus::gather();
    let r = spawn_blocking(move || {
        prometheus::push_metrics("imdoc", labels! { "instance".to_string() => instance }, &url, metric_families, None)
    })
    .await;
    match r {
        Ok(Ok(())) => info!("已推送指标"),
        Ok(Err(e)) => error!("推送指标失败: {e}"),
        Err(e) => error!("推送指标失败: {e}"),
    }
}
