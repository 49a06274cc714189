// src/content.rs
// Case-content collaborator: ordered case/teaching-note/outline text written
// by the (excluded) upload pipeline, read here for prompt construction.

use sqlx::SqlitePool;

use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct ContentBlock {
    pub kind: String,
    pub body: String,
}

pub async fn load_case_blocks(
    pool: &SqlitePool,
    case_id: &str,
) -> Result<Vec<ContentBlock>, ChatError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT kind, body FROM case_content WHERE case_id = $1 ORDER BY ord",
    )
    .bind(case_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(kind, body)| ContentBlock { kind, body })
        .collect())
}

/// Flattened case context for prompts; empty string when nothing is loaded.
pub async fn load_case_context(pool: &SqlitePool, case_id: &str) -> Result<String, ChatError> {
    let blocks = load_case_blocks(pool, case_id).await?;
    Ok(blocks
        .into_iter()
        .map(|b| format!("[{}]\n{}", b.kind, b.body))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocks_come_back_in_order() {
        let pool = crate::db::connect_memory().await.unwrap();

        for (ord, kind, body) in [
            (2, "outline", "the outline"),
            (1, "teaching_note", "the note"),
            (0, "case", "the case"),
        ] {
            sqlx::query(
                "INSERT INTO case_content (case_id, ord, kind, body) VALUES ('c1', $1, $2, $3)",
            )
            .bind(ord)
            .bind(kind)
            .bind(body)
            .execute(&pool)
            .await
            .unwrap();
        }

        let blocks = load_case_blocks(&pool, "c1").await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].kind, "case");
        assert_eq!(blocks[2].kind, "outline");

        let context = load_case_context(&pool, "c1").await.unwrap();
        assert!(context.starts_with("[case]"));
    }

    #[tokio::test]
    async fn test_missing_case_yields_empty_context() {
        let pool = crate::db::connect_memory().await.unwrap();
        let context = load_case_context(&pool, "missing").await.unwrap();
        assert!(context.is_empty());
    }
}
