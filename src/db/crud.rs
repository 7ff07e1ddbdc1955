use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::{DocumentRecord, FieldRecord};

/// 添加文档记录
pub async fn add_document<'c, E>(executor: E, identifier: &str, hash: &[u8]) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO document (identifier, hash)
        VALUES (?, ?)
        RETURNING id
        "#,
    )
    .bind(identifier)
    .bind(hash)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// 添加字段
pub async fn add_field<'c, E>(executor: E, field: &FieldRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO field (document_id, position, name, kind, binary, text)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(field.document_id)
    .bind(field.position)
    .bind(&field.name)
    .bind(&field.kind)
    .bind(&field.binary)
    .bind(&field.text)
    .execute(executor)
    .await?;

    Ok(())
}

/// 检查图片哈希是否存在
pub async fn check_document_hash(executor: &SqlitePool, hash: &[u8]) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM document WHERE hash = ?
        "#,
    )
    .bind(hash)
    .fetch_one(executor)
    .await?;

    Ok(count > 0)
}

/// 更新文档标识
pub async fn update_identifier(executor: &SqlitePool, hash: &[u8], identifier: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE document SET identifier = ? WHERE hash = ?
        "#,
    )
    .bind(identifier)
    .bind(hash)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// 按 ID 顺序获取 ID 大于 `after` 的文档
pub async fn get_documents_after(executor: &SqlitePool, after: i64, limit: usize) -> Result<Vec<DocumentRecord>> {
    sqlx::query_as(
        r#"
        SELECT id, identifier, hash FROM document
        WHERE id > ?
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(after)
    .bind(limit as i64)
    .fetch_all(executor)
    .await
}

/// 获取 ID 在 [first, last] 范围内所有文档的字段
pub async fn get_fields_between(executor: &SqlitePool, first: i64, last: i64) -> Result<Vec<FieldRecord>> {
    sqlx::query_as(
        r#"
        SELECT document_id, position, name, kind, binary, text FROM field
        WHERE document_id BETWEEN ? AND ?
        ORDER BY document_id ASC, position ASC
        "#,
    )
    .bind(first)
    .bind(last)
    .fetch_all(executor)
    .await
}

/// 查询数据库中的文档数量
pub async fn count_documents(executor: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM document").fetch_one(executor).await
}

/// 删除文档中所有同名字段
pub async fn delete_fields_named<'c, E>(executor: E, document_id: i64, name: &str) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM field WHERE document_id = ? AND name = ?
        "#,
    )
    .bind(document_id)
    .bind(name)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// 文档中下一个可用的字段位置
pub async fn next_field_position<'c, E>(executor: E, document_id: i64) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(position), -1) + 1 FROM field WHERE document_id = ?
        "#,
    )
    .bind(document_id)
    .fetch_one(executor)
    .await
}
