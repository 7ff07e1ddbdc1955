use anyhow::{Result, anyhow};
use log::info;

use crate::config::ConfDir;
use crate::db::{Database, FieldRecord, crud, open_database};
use crate::document::{Document, Field, FieldValue, IDENTIFIER_FIELD};

pub struct DocDBBuilder {
    conf_dir: ConfDir,
}

impl DocDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir }
    }

    pub async fn open(self) -> Result<DocDB> {
        let db = open_database(self.conf_dir.database()).await?;
        let db = DocDB { db };
        info!("已打开文档数据库，共 {} 个文档", db.count().await?);
        Ok(db)
    }
}

/// 本地文档库
///
/// 写入由单个任务串行完成，读取可以并发。
pub struct DocDB {
    db: Database,
}

impl DocDB {
    /// 检查图片是否已经添加
    pub async fn check_hash(&self, hash: &[u8]) -> Result<bool> {
        Ok(crud::check_document_hash(&self.db, hash).await?)
    }

    /// 在一个事务中写入文档及其所有字段，没有标识的文档以空字符串作为标识
    pub async fn add_document(&self, hash: &[u8], document: &Document) -> Result<i64> {
        let identifier = document.identifier().unwrap_or_default();
        let mut tx = self.db.begin().await?;
        let id = crud::add_document(&mut *tx, identifier, hash).await?;
        // 标识单独保存在 document 表中
        let fields = document.fields.iter().filter(|f| f.name != IDENTIFIER_FIELD);
        for (position, field) in fields.enumerate() {
            crud::add_field(&mut *tx, &to_record(id, position as i64, field)).await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    /// 更新已添加图片的标识
    pub async fn update_identifier(&self, hash: &[u8], identifier: &str) -> Result<()> {
        crud::update_identifier(&self.db, hash, identifier).await?;
        Ok(())
    }

    /// 按 ID 顺序读取一批 ID 大于 `after` 的文档
    pub async fn documents_after(&self, after: i64, limit: usize) -> Result<Vec<(i64, Document)>> {
        let records = crud::get_documents_after(&self.db, after, limit).await?;
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Ok(vec![]);
        };
        let mut fields = crud::get_fields_between(&self.db, first.id, last.id).await?.into_iter().peekable();

        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            let mut document = Document::new(vec![Field::keyword(IDENTIFIER_FIELD, record.identifier)]);
            while let Some(field) = fields.next_if(|f| f.document_id == record.id) {
                document.fields.push(from_record(field)?);
            }
            documents.push((record.id, document));
        }
        Ok(documents)
    }

    /// 用新值替换文档中所有同名字段，新字段追加在末尾
    pub async fn replace_field(&self, document_id: i64, field: &Field) -> Result<()> {
        let mut tx = self.db.begin().await?;
        crud::delete_fields_named(&mut *tx, document_id, &field.name).await?;
        let position = crud::next_field_position(&mut *tx, document_id).await?;
        crud::add_field(&mut *tx, &to_record(document_id, position, field)).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(crud::count_documents(&self.db).await?)
    }
}

fn to_record(document_id: i64, position: i64, field: &Field) -> FieldRecord {
    let (binary, text) = match &field.value {
        FieldValue::Binary(bytes) => (Some(bytes.clone()), None),
        FieldValue::Keyword(s) | FieldValue::Text(s) => (None, Some(s.clone())),
    };
    FieldRecord {
        document_id,
        position,
        name: field.name.clone(),
        kind: field.value.kind().to_string(),
        binary,
        text,
    }
}

fn from_record(record: FieldRecord) -> Result<Field> {
    let value = match (record.kind.as_str(), record.binary, record.text) {
        ("binary", Some(bytes), _) => FieldValue::Binary(bytes),
        ("keyword", _, Some(s)) => FieldValue::Keyword(s),
        ("text", _, Some(s)) => FieldValue::Text(s),
        (kind, ..) => return Err(anyhow!("字段 {} 的类型 {} 无效", record.name, kind)),
    };
    Ok(Field { name: record.name, value })
}
