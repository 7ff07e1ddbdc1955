use sqlx::FromRow;

/// 文档记录
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRecord {
    /// 文档 ID
    pub id: i64,
    /// 文档标识，一般为图片路径
    pub identifier: String,
    /// 图片 blake3 哈希
    pub hash: Vec<u8>,
}

/// 字段记录，按 position 排序后还原文档中字段的顺序
#[derive(Debug, Clone, FromRow)]
pub struct FieldRecord {
    pub document_id: i64,
    pub position: i64,
    pub name: String,
    /// binary / keyword / text
    pub kind: String,
    pub binary: Option<Vec<u8>>,
    pub text: Option<String>,
}
