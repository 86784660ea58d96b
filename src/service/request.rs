use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{Field, Record};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadRequest {
    pub database: String,
    pub table: String,
    /// 非空时按 key 直接读取，忽略 `where`
    pub key: Option<String>,
    #[serde(rename = "where")]
    pub predicates: Option<HashMap<String, Field>>,
    /// 作用于索引命中列表，在回读文件之前
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ReadRequest {
    pub fn by_key(database: &str, table: &str, key: &str) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            key: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn by_predicates<'a>(
        database: &str,
        table: &str,
        predicates: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            predicates: Some(
                predicates
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), Field::string(v)))
                    .collect(),
            ),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    pub record: Record,
    pub database: String,
    pub table: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
    pub database: String,
    pub table: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    pub database: String,
    pub table: String,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
