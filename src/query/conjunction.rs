use std::collections::HashMap;

use crate::core::Field;

pub const DATABASE_FIELD: &str = "database";
pub const TABLE_FIELD: &str = "table";

/// 元数据字段在索引中的字段路径：`metadata.<name>.value`
pub fn metadata_field_path(name: &str) -> String {
    format!("metadata.{name}.value")
}

/// 精确匹配条件：字段路径 = 原文值（keyword 分析，不切词）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TermClause {
    pub field: String,
    pub value: String,
}

/// 合取查询：固定的 database/table 条件 + 每个谓词一个条件，全部 AND
///
/// 不支持 OR / 取反 / 范围。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConjunctionQuery {
    clauses: Vec<TermClause>,
}

impl ConjunctionQuery {
    pub fn for_table(database: &str, table: &str) -> Self {
        Self {
            clauses: vec![
                TermClause {
                    field: DATABASE_FIELD.to_string(),
                    value: database.to_string(),
                },
                TermClause {
                    field: TABLE_FIELD.to_string(),
                    value: table.to_string(),
                },
            ],
        }
    }

    pub fn and_field(mut self, name: &str, value: &str) -> Self {
        self.clauses.push(TermClause {
            field: metadata_field_path(name),
            value: value.to_string(),
        });
        self
    }

    pub fn from_where(database: &str, table: &str, predicates: &HashMap<String, Field>) -> Self {
        predicates
            .iter()
            .fold(Self::for_table(database, table), |q, (name, field)| {
                q.and_field(name, &field.value)
            })
    }

    pub fn clauses(&self) -> &[TermClause] {
        &self.clauses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_database_table_and_predicate_terms() {
        let mut wh = HashMap::new();
        wh.insert("email".to_string(), Field::string("a@x.com"));
        let q = ConjunctionQuery::from_where("d", "t", &wh);

        assert_eq!(q.clauses().len(), 3);
        assert_eq!(q.clauses()[0].field, "database");
        assert_eq!(q.clauses()[1].value, "t");
        assert_eq!(
            q.clauses()[2],
            TermClause {
                field: "metadata.email.value".into(),
                value: "a@x.com".into(),
            }
        );
    }

    #[test]
    fn empty_where_keeps_only_namespace_terms() {
        let q = ConjunctionQuery::from_where("d", "t", &HashMap::new());
        assert_eq!(q, ConjunctionQuery::for_table("d", "t"));
    }
}
