//! 文档库的 SQLite 存储
//!
//! `document` 表每张图片一行，`field` 表按 (document_id, position) 保存字段，
//! 删除文档时级联删除其字段。

use std::path::Path;
use std::time::Duration;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

/// 写入任务等待锁的最长时间
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// 打开数据库，父目录和数据库文件不存在时自动创建，然后执行迁移
pub async fn open_database(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!("打开文档库: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .filename(filename)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(num_cpus::get().max(2) as u32)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_open_creates_parent_and_cascades() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/imdoc.db");
        let db = open_database(&path).await.unwrap();
        assert!(path.exists());

        let id = crud::add_document(&db, "x.jpg", b"h").await.unwrap();
        let field = FieldRecord {
            document_id: id,
            position: 0,
            name: "cl".to_string(),
            kind: "binary".to_string(),
            binary: Some(vec![1]),
            text: None,
        };
        crud::add_field(&db, &field).await.unwrap();

        sqlx::query("DELETE FROM document WHERE id = ?").bind(id).execute(&db).await.unwrap();
        assert!(crud::get_fields_between(&db, id, id).await.unwrap().is_empty());

        // 没有对应文档的字段违反外键约束
        assert!(crud::add_field(&db, &FieldRecord { document_id: id + 100, ..field }).await.is_err());
    }
}
