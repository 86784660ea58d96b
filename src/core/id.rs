use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// 复合 ID：`database/table/key`
///
/// 同时是存储文件相对 `databases/` 的路径与索引文档 ID，两种表示只靠它关联。
/// 构造时校验每一段，保证 (database, table, key) -> ID 是单射。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RecordId {
    database: String,
    table: String,
    key: String,
}

impl RecordId {
    pub fn new(database: &str, table: &str, key: &str) -> Result<Self> {
        validate_segment("database", database)?;
        validate_segment("table", table)?;
        validate_segment("key", key)?;
        Ok(Self {
            database: database.to_string(),
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 相对存储根的文件路径
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.database).join(&self.table).join(&self.key)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.database, self.table, self.key)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RecordId {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(db), Some(table), Some(key), None) => Self::new(db, table, key),
            _ => Err(StoreError::InvalidArgument(format!("malformed record id {s:?}"))),
        }
    }
}

/// 拒绝会破坏路径结构的名字：空、`.`、`..`、分隔符、NUL
pub fn validate_segment(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(format!("{what} must not be empty")));
    }
    if name == "." || name == ".." {
        return Err(StoreError::InvalidArgument(format!(
            "{what} {name:?} is a path traversal segment"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidArgument(format!(
            "{what} {name:?} contains a path separator or NUL"
        )));
    }
    Ok(())
}
