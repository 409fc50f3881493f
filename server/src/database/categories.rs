use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use shared::types::ValidationReport;

use crate::database::mapper::{
    Descriptor, Expansion, FromRecord, MapperError, Param, Record, Value, exists, query_many,
};

/// A post may carry at most this many categories.
pub const MAX_CATEGORIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description")]
    pub description: String,
}

impl Category {
    pub fn descriptor() -> Descriptor {
        Descriptor::new()
            .integer("categoryId")
            .text("name")
            .text("description")
    }
}

impl FromRecord for Category {
    fn from_record(mut record: Record) -> Result<Self, MapperError> {
        Ok(Self {
            id: record.take_i64("categoryId")?,
            name: record.take_string("name")?,
            description: record.take_string("description")?,
        })
    }
}

/// A category as it appears inside a post: id and name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRef {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
}

impl CategoryRef {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.push("categoryId", Value::Integer(self.id));
        record.push("name", Value::Text(self.name.clone()));
        record
    }
}

impl From<Category> for CategoryRef {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
        }
    }
}

impl FromRecord for CategoryRef {
    fn from_record(mut record: Record) -> Result<Self, MapperError> {
        Ok(Self {
            id: record.take_i64("categoryId")?,
            name: record.take_string("name")?,
        })
    }
}

pub async fn all_categories(pool: &SqlitePool) -> Result<Vec<Category>, MapperError> {
    query_many(
        pool,
        &Category::descriptor(),
        "SELECT categoryId, name, description FROM categories ORDER BY categoryId",
        &[],
    )
    .await
}

pub async fn category_exists(pool: &SqlitePool, id: i64) -> Result<bool, MapperError> {
    exists(
        pool,
        "SELECT categoryId FROM categories WHERE categoryId = ?1",
        &[Param::from(id)],
    )
    .await
}

/// `[1, 2]` -> `"1""2"`, the stored form of a post's categories.
pub fn encode_ids(ids: &[i64]) -> String {
    ids.iter().map(|id| format!("\"{}\"", id)).collect()
}

/// Every maximal run of ASCII digits in `raw`, in order.
///
/// Both `"3""7"` and the older `"3","7"` yield `[3, 7]`. Runs too long for an
/// `i64` are dropped.
pub fn extract_ids(raw: &str) -> Vec<i64> {
    raw.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .filter_map(|run| run.parse().ok())
        .collect()
}

/// Expansion of a stored categories column against `known`.
///
/// Ids come back in the order they appear in the column; ids with no
/// matching category are skipped.
pub fn expander(known: Vec<Category>) -> Expansion {
    let known: Vec<CategoryRef> = known.into_iter().map(CategoryRef::from).collect();
    Arc::new(move |raw: &str| {
        extract_ids(raw)
            .into_iter()
            .filter_map(|id| known.iter().find(|category| category.id == id))
            .map(CategoryRef::to_record)
            .collect()
    })
}

/// Load the categories table and build an expansion over it.
pub async fn load_expander(pool: &SqlitePool) -> Result<Expansion, MapperError> {
    let known = all_categories(pool).await?;
    debug!("Loaded {} categories for expansion", known.len());
    Ok(expander(known))
}

/// Check a submitted category list, recording problems in `report`.
///
/// Returns the stored form of the list; it is only meaningful when the
/// report stayed empty.
pub async fn check_categories(
    pool: &SqlitePool,
    ids: &[i64],
    report: &mut ValidationReport,
) -> Result<String, MapperError> {
    report.check("too much cats", ids.len() > MAX_CATEGORIES);
    report.check("no cats", ids.is_empty());

    for &id in ids {
        if !category_exists(pool, id).await? {
            report.push("no such category!");
            break;
        }
    }

    Ok(encode_ids(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open;
    use shared::types::server_config::DatabaseConfig;

    fn known() -> Vec<Category> {
        vec![
            Category {
                id: 1,
                name: "golang".into(),
                description: "gophers".into(),
            },
            Category {
                id: 2,
                name: "js".into(),
                description: "web".into(),
            },
            Category {
                id: 3,
                name: "rust".into(),
                description: "crabs".into(),
            },
        ]
    }

    fn names(records: Vec<Record>) -> Vec<String> {
        records
            .into_iter()
            .map(|r| CategoryRef::from_record(r).unwrap().name)
            .collect()
    }

    #[test]
    fn encode_quotes_each_id() {
        assert_eq!(encode_ids(&[1, 2]), r#""1""2""#);
        assert_eq!(encode_ids(&[]), "");
    }

    #[test]
    fn extract_handles_both_stored_forms() {
        assert_eq!(extract_ids(r#""3""7""#), vec![3, 7]);
        assert_eq!(extract_ids(r#""3","7""#), vec![3, 7]);
        assert_eq!(extract_ids(r#""12""#), vec![12]);
        assert!(extract_ids("").is_empty());
        assert!(extract_ids("\"99999999999999999999\"").is_empty());
    }

    #[test]
    fn expansion_keeps_input_order() {
        let expand = expander(known());
        assert_eq!(names(expand(r#""3""1""#)), vec!["rust", "golang"]);
        assert_eq!(names(expand(r#""1""3""#)), vec!["golang", "rust"]);
    }

    #[test]
    fn expansion_skips_unknown_ids() {
        let expand = expander(known());
        assert_eq!(names(expand(r#""1""9""#)), vec!["golang"]);
        assert!(expand(r#""42""#).is_empty());
    }

    #[tokio::test]
    async fn expanded_rows_carry_id_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&DatabaseConfig {
            path: dir.path().join("expand.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap();

        let descriptor = Descriptor::new()
            .integer("postId")
            .with_expansion("categories", load_expander(&pool).await.unwrap());
        let mut rows: Vec<Record> = query_many(
            &pool,
            &descriptor,
            "SELECT 1, ?1",
            &[Param::from(r#""1""9""#)],
        )
        .await
        .unwrap();

        let expanded = rows[0].take_records("categories").unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].len(), 2);
        assert!(expanded[0].get("description").is_none());

        let category = CategoryRef::from_record(expanded.into_iter().next().unwrap()).unwrap();
        assert_eq!(
            category,
            CategoryRef {
                id: 1,
                name: "golang".into()
            }
        );
        assert_eq!(
            serde_json::to_value(&category).unwrap(),
            serde_json::json!({"ID": 1, "Name": "golang"})
        );
    }

    #[tokio::test]
    async fn submitted_lists_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(&DatabaseConfig {
            path: dir.path().join("cats.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap();

        let mut ok = ValidationReport::new();
        let stored = check_categories(&pool, &[2, 1], &mut ok).await.unwrap();
        assert!(ok.is_empty());
        assert_eq!(stored, r#""2""1""#);

        let mut none = ValidationReport::new();
        check_categories(&pool, &[], &mut none).await.unwrap();
        assert_eq!(none.messages(), ["no cats".to_string()]);

        let mut missing = ValidationReport::new();
        check_categories(&pool, &[1, 77], &mut missing).await.unwrap();
        assert_eq!(missing.messages(), ["no such category!".to_string()]);

        let mut many = ValidationReport::new();
        check_categories(&pool, &[1, 2, 1, 2], &mut many).await.unwrap();
        assert_eq!(many.messages(), ["too much cats".to_string()]);
    }
}
