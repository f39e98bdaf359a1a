use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::ActivityEvent;
use crate::pipeline::PipelineRun;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn count_events(pool: &PgPool) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query("SELECT COUNT(*) AS total FROM tool_recommender.team_activity")
        .fetch_one(pool)
        .await?
        .get("total");
    Ok(count)
}

pub async fn insert_events(pool: &PgPool, events: &[ActivityEvent]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    for event in events {
        sqlx::query(
            r#"
            INSERT INTO tool_recommender.team_activity
            (id, event_timestamp, team_id, tool_name, action_type, outcome, satisfaction_score, latency_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.event_timestamp)
        .bind(&event.team_id)
        .bind(&event.tool_name)
        .bind(&event.action_type)
        .bind(event.outcome.as_deref())
        .bind(event.satisfaction_score)
        .bind(event.latency_ms)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(rows = events.len(), "inserted activity events");
    Ok(events.len())
}

pub async fn fetch_events(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<ActivityEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT event_timestamp, team_id, tool_name, action_type, outcome,
               satisfaction_score, latency_ms
        FROM tool_recommender.team_activity
        WHERE event_timestamp >= $1
        ORDER BY event_timestamp
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        events.push(ActivityEvent {
            event_timestamp: row.get("event_timestamp"),
            team_id: row.get("team_id"),
            tool_name: row.get("tool_name"),
            action_type: row.get("action_type"),
            outcome: row.get("outcome"),
            satisfaction_score: row.get("satisfaction_score"),
            latency_ms: row.get("latency_ms"),
        });
    }

    info!(rows = events.len(), %since, "fetched activity events");
    Ok(events)
}

/// Replaces the recommendation table with this run's rows.
pub async fn publish_recommendations(pool: &PgPool, run: &PipelineRun) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM tool_recommender.team_recommendations")
        .execute(&mut *tx)
        .await?;

    for row in &run.recommendations.rows {
        sqlx::query(
            r#"
            INSERT INTO tool_recommender.team_recommendations
            (run_id, team_id, recommended_tool, confidence, cluster_id, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run.run_id)
        .bind(&row.team_id)
        .bind(&row.tool_name)
        .bind(row.confidence)
        .bind(i32::try_from(row.cluster_id)?)
        .bind(run.generated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(rows = run.recommendations.len(), "published recommendations");
    Ok(run.recommendations.len())
}
