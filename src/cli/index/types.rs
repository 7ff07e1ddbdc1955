use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::Document;
use crate::metrics::{self, DocumentStatus};

pub struct ImageData {
    pub path: String,
    pub data: Vec<u8>,
}

pub struct HashedImageData {
    pub path: String,
    pub data: Vec<u8>,
    pub hash: Vec<u8>,
}

pub struct BuiltDocument {
    pub path: String,
    pub hash: Vec<u8>,
    pub document: Document,
}

/// 各阶段共享的处理结果计数
#[derive(Debug, Default)]
pub struct IndexStats {
    indexed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl IndexStats {
    pub fn record(&self, status: DocumentStatus) {
        let counter = match status {
            DocumentStatus::Indexed => &self.indexed,
            DocumentStatus::Skipped => &self.skipped,
            DocumentStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::inc_document_count(status);
    }

    pub fn indexed(&self) -> u64 {
        self.indexed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> String {
        format!("成功 {} 张，跳过 {} 张，失败 {} 张", self.indexed(), self.skipped(), self.failed())
    }
}
