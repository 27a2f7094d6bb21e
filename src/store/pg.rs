use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::cluster::enrich::{enrich, Descriptors};
use crate::model::{
    ArticleRecord, CandidateRow, ClusterKey, EventRow, EvidenceTier, FetchCommit, IndexedEvent, MemberRow, NewSource,
    PendingItem, Source, SummarySource,
};

use super::{LinkOutcome, LinkRequest, LinkTarget, Repository};

/// Postgres-backed repository over the `news` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { PgStore { pool } }
}

const SOURCE_COLUMNS: &str = r#"
    source_id, name, url, region, topic, source_class, cadence,
    is_enabled, last_fetch_at, etag, last_modified
"#;

const EVENT_COLUMNS: &str = r#"
    event_id, cluster_key, title, summary, region, topic, evidence, updated_at
"#;

fn source_from_row(r: &PgRow) -> Result<Source> {
    let class: String = r.try_get("source_class")?;
    let cadence: String = r.try_get("cadence")?;
    Ok(Source {
        source_id: r.try_get("source_id")?,
        name: r.try_get("name")?,
        url: r.try_get("url")?,
        region: r.try_get("region")?,
        topic: r.try_get("topic")?,
        source_class: class.parse()?,
        cadence: cadence.parse()?,
        is_enabled: r.try_get("is_enabled")?,
        last_fetch_at: r.try_get("last_fetch_at")?,
        etag: r.try_get("etag")?,
        last_modified: r.try_get("last_modified")?,
    })
}

fn event_from_row(r: &PgRow) -> Result<EventRow> {
    let evidence: i16 = r.try_get("evidence")?;
    Ok(EventRow {
        event_id: r.try_get("event_id")?,
        cluster_key: r.try_get("cluster_key")?,
        title: r.try_get("title")?,
        summary: r.try_get("summary")?,
        region: r.try_get("region")?,
        topic: r.try_get("topic")?,
        evidence: EvidenceTier::from_level(evidence),
        updated_at: r.try_get("updated_at")?,
    })
}

impl Repository for PgStore {
    async fn upsert_source(&self, src: &NewSource) -> Result<bool> {
        let row = sqlx::query(
            r#"
            INSERT INTO news.source (name, url, region, topic, source_class, cadence, is_enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (url)
            DO UPDATE SET name = EXCLUDED.name,
                          region = EXCLUDED.region,
                          topic = EXCLUDED.topic,
                          source_class = EXCLUDED.source_class,
                          cadence = EXCLUDED.cadence,
                          is_enabled = EXCLUDED.is_enabled
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&src.name)
        .bind(&src.url)
        .bind(&src.region)
        .bind(&src.topic)
        .bind(src.source_class.as_str())
        .bind(src.cadence.as_str())
        .bind(src.is_enabled)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<Option<bool>, _>("inserted")?.unwrap_or(false))
    }

    async fn list_sources(&self, enabled: Option<bool>) -> Result<Vec<Source>> {
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM news.source WHERE ($1::bool IS NULL OR is_enabled = $1) ORDER BY source_id"
        );
        let rows = sqlx::query(&sql).bind(enabled).fetch_all(&self.pool).await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn sources_for_fetch(&self, limit: i64) -> Result<Vec<Source>> {
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM news.source WHERE is_enabled \
             ORDER BY last_fetch_at ASC NULLS FIRST, source_id LIMIT $1"
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn commit_fetch(&self, commit: &FetchCommit) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let mut created = 0usize;
        for it in &commit.items {
            let res = sqlx::query(
                r#"
                INSERT INTO news.raw_item (source_id, guid, url, title, summary, published_at, item_hash)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source_id, item_hash) DO NOTHING
                "#,
            )
            .bind(commit.source_id)
            .bind(&it.guid)
            .bind(&it.url)
            .bind(&it.title)
            .bind(&it.summary)
            .bind(it.published_at)
            .bind(&it.item_hash)
            .execute(&mut *tx)
            .await?;
            created += res.rows_affected() as usize;
        }

        sqlx::query(
            r#"
            INSERT INTO news.fetch_log (source_id, status_code, elapsed_ms, bytes_received, error)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(commit.source_id)
        .bind(commit.log.status_code)
        .bind(commit.log.elapsed_ms)
        .bind(commit.log.bytes_received)
        .bind(commit.log.error.as_deref())
        .execute(&mut *tx)
        .await?;

        match &commit.validators {
            Some(v) => {
                sqlx::query(
                    "UPDATE news.source SET last_fetch_at = now(), etag = $2, last_modified = $3 WHERE source_id = $1",
                )
                .bind(commit.source_id)
                .bind(v.etag.as_deref())
                .bind(v.last_modified.as_deref())
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("UPDATE news.source SET last_fetch_at = now() WHERE source_id = $1")
                    .bind(commit.source_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await.with_context(|| format!("commit fetch source_id={}", commit.source_id))?;
        Ok(created)
    }

    async fn items_for_extraction(&self, limit: i64, retry_failed: bool) -> Result<Vec<PendingItem>> {
        let rows = sqlx::query(
            r#"
            SELECT i.item_id, i.url, i.title
            FROM news.raw_item i
            LEFT JOIN news.article a ON a.item_id = i.item_id
            WHERE i.url <> ''
              AND (a.item_id IS NULL OR ($2 AND a.extract_error <> '' AND a.text = ''))
            ORDER BY i.published_at DESC NULLS LAST, i.created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(retry_failed)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(PendingItem { item_id: r.try_get("item_id")?, url: r.try_get("url")?, title: r.try_get("title")? })
            })
            .collect()
    }

    async fn upsert_article(&self, item_id: i64, article: &ArticleRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO news.article (item_id, final_url, title, text, lang, extracted_at, extract_error)
            VALUES ($1, $2, $3, $4, $5, now(), $6)
            ON CONFLICT (item_id) DO UPDATE
              SET final_url     = EXCLUDED.final_url,
                  title         = EXCLUDED.title,
                  text          = EXCLUDED.text,
                  lang          = EXCLUDED.lang,
                  extracted_at  = now(),
                  extract_error = EXCLUDED.extract_error
            "#,
        )
        .bind(item_id)
        .bind(&article.final_url)
        .bind(&article.title)
        .bind(&article.text)
        .bind(&article.lang)
        .bind(&article.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cluster_candidates(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CandidateRow>> {
        let rows = sqlx::query(
            r#"
            SELECT i.item_id, i.url, i.title, i.summary,
                   a.title AS article_title, a.text AS article_text,
                   s.region, s.topic,
                   (ei.item_id IS NOT NULL) AS linked
            FROM news.raw_item i
            JOIN news.source s ON s.source_id = i.source_id
            LEFT JOIN news.article a ON a.item_id = i.item_id
            LEFT JOIN news.event_item ei ON ei.item_id = i.item_id
            WHERE i.published_at >= $1
               OR (i.published_at IS NULL AND i.created_at >= $1)
            ORDER BY i.published_at DESC NULLS LAST, i.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(CandidateRow {
                    item_id: r.try_get("item_id")?,
                    url: r.try_get("url")?,
                    title: r.try_get("title")?,
                    summary: r.try_get("summary")?,
                    article_title: r.try_get("article_title")?,
                    article_text: r.try_get("article_text")?,
                    region: r.try_get("region")?,
                    topic: r.try_get("topic")?,
                    linked: r.try_get("linked")?,
                })
            })
            .collect()
    }

    async fn events_in_buckets(&self, buckets: &[u16]) -> Result<Vec<IndexedEvent>> {
        if buckets.is_empty() { return Ok(vec![]); }
        let prefixes: Vec<String> = buckets.iter().map(|b| ClusterKey::bucket_hex(*b)).collect();
        let rows = sqlx::query(
            r#"
            SELECT event_id, cluster_key
            FROM news.event
            WHERE cluster_key LIKE 'sh64:%'
              AND substring(cluster_key FROM 6 FOR 4) = ANY($1)
            ORDER BY event_id
            "#,
        )
        .bind(&prefixes)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            let key: String = r.try_get("cluster_key")?;
            // keys written by other tooling are not part of the index
            let Some(key) = ClusterKey::parse(&key) else { continue };
            out.push(IndexedEvent { event_id: r.try_get("event_id")?, key });
        }
        Ok(out)
    }

    async fn link_item(&self, req: &LinkRequest) -> Result<LinkOutcome> {
        let mut tx = self.pool.begin().await?;

        let (event_id, created) = match &req.target {
            LinkTarget::Existing(id) => (*id, false),
            LinkTarget::Create(key) => {
                let inserted: Option<i64> = sqlx::query_scalar(
                    r#"
                    INSERT INTO news.event (cluster_key)
                    VALUES ($1)
                    ON CONFLICT (cluster_key) DO NOTHING
                    RETURNING event_id
                    "#,
                )
                .bind(key.as_str())
                .fetch_optional(&mut *tx)
                .await?;
                match inserted {
                    Some(id) => (id, true),
                    None => {
                        // a concurrent run created it first; join that event
                        let id: i64 = sqlx::query_scalar("SELECT event_id FROM news.event WHERE cluster_key = $1")
                            .bind(key.as_str())
                            .fetch_one(&mut *tx)
                            .await?;
                        (id, false)
                    }
                }
            }
        };

        let linked = sqlx::query(
            "INSERT INTO news.event_item (event_id, item_id) VALUES ($1, $2) ON CONFLICT (item_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(req.item_id)
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let row = sqlx::query("SELECT title, region, topic FROM news.event WHERE event_id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;
        let current = Descriptors { title: row.try_get("title")?, region: row.try_get("region")?, topic: row.try_get("topic")? };
        let cand = Descriptors { title: req.title.clone(), region: req.region.clone(), topic: req.topic.clone() };
        let next = enrich(&current, &cand).unwrap_or(current);

        sqlx::query(
            "UPDATE news.event SET title = $2, region = $3, topic = $4, updated_at = now() WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(&next.title)
        .bind(&next.region)
        .bind(&next.topic)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.with_context(|| format!("commit link item_id={}", req.item_id))?;
        Ok(LinkOutcome::Linked { event_id, created })
    }

    async fn event_members(&self, event_id: i64) -> Result<Vec<MemberRow>> {
        let rows = sqlx::query(
            r#"
            SELECT i.url, NULLIF(a.final_url, '') AS final_url, s.source_class
            FROM news.event_item ei
            JOIN news.raw_item i ON i.item_id = ei.item_id
            JOIN news.source s ON s.source_id = i.source_id
            LEFT JOIN news.article a ON a.item_id = ei.item_id
            WHERE ei.event_id = $1
            ORDER BY ei.item_id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let class: String = r.try_get("source_class")?;
                Ok(MemberRow { url: r.try_get("url")?, final_url: r.try_get("final_url")?, source_class: class.parse()? })
            })
            .collect()
    }

    async fn set_evidence(&self, event_id: i64, tier: EvidenceTier) -> Result<bool> {
        let res = sqlx::query("UPDATE news.event SET evidence = $2 WHERE event_id = $1 AND evidence <> $2")
            .bind(event_id)
            .bind(tier.level())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn events_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<EventRow>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM news.event WHERE updated_at >= $1 ORDER BY updated_at DESC");
        let rows = sqlx::query(&sql).bind(since).fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn summary_sources(&self, event_ids: &[i64]) -> Result<Vec<SummarySource>> {
        if event_ids.is_empty() { return Ok(vec![]); }
        let rows = sqlx::query(
            r#"
            SELECT ei.event_id, ei.item_id, a.text AS article_text, i.summary, i.title
            FROM news.event_item ei
            JOIN news.raw_item i ON i.item_id = ei.item_id
            LEFT JOIN news.article a ON a.item_id = ei.item_id
            WHERE ei.event_id = ANY($1)
            ORDER BY ei.event_id, ei.item_id
            "#,
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(SummarySource {
                    event_id: r.try_get("event_id")?,
                    item_id: r.try_get("item_id")?,
                    article_text: r.try_get("article_text")?,
                    raw_summary: r.try_get("summary")?,
                    raw_title: r.try_get("title")?,
                })
            })
            .collect()
    }

    async fn store_summary(&self, event_id: i64, summary: &str, touch_updated_at: bool) -> Result<()> {
        let sql = if touch_updated_at {
            "UPDATE news.event SET summary = $2, updated_at = now() WHERE event_id = $1"
        } else {
            "UPDATE news.event SET summary = $2 WHERE event_id = $1"
        };
        sqlx::query(sql).bind(event_id).bind(summary).execute(&self.pool).await?;
        Ok(())
    }

    async fn brief_events(&self, since: DateTime<Utc>, min: EvidenceTier) -> Result<Vec<EventRow>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM news.event WHERE updated_at >= $1 AND evidence >= $2 \
             ORDER BY evidence DESC, updated_at DESC"
        );
        let rows = sqlx::query(&sql).bind(since).bind(min.level()).fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }
}
