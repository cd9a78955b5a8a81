use anyhow::Result;
use common::db::AsyncDb;
use std::time::Instant;

/// Mirrors a job's lifecycle into the `job_status` table.
pub struct JobTracker {
    db: AsyncDb,
    job_name: String,
    start_time: Instant,
}

impl JobTracker {
    pub async fn start(db: &AsyncDb, job_name: &str) -> Result<Self> {
        let name = job_name.to_string();
        db.call_named("job_tracker.start", move |conn| {
            conn.execute(
                "INSERT INTO job_status (job_name, status, last_run_at, updated_at)
                 VALUES (?1, 'running', datetime('now'), datetime('now'))
                 ON CONFLICT(job_name) DO UPDATE SET
                    status = 'running',
                    last_run_at = datetime('now'),
                    updated_at = datetime('now'),
                    last_error = NULL,
                    duration_ms = NULL",
                rusqlite::params![name],
            )?;
            Ok(())
        })
        .await?;

        Ok(Self {
            db: db.clone(),
            job_name: job_name.to_string(),
            start_time: Instant::now(),
        })
    }

    fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    pub async fn success(self, metadata: Option<serde_json::Value>) -> Result<()> {
        self.finish("idle", None, metadata).await
    }

    /// Marks the job failed; the scan's report message is kept as `last_error`.
    pub async fn fail(self, message: &str, metadata: Option<serde_json::Value>) -> Result<()> {
        self.finish("failed", Some(message.to_string()), metadata).await
    }

    async fn finish(
        self,
        status: &'static str,
        last_error: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let duration_ms = self.elapsed_ms();
        let name = self.job_name;
        let meta = metadata.map(|v| v.to_string());

        self.db
            .call_named("job_tracker.finish", move |conn| {
                conn.execute(
                    "UPDATE job_status
                     SET status = ?2, duration_ms = ?3, last_error = ?4, metadata = ?5,
                         updated_at = datetime('now')
                     WHERE job_name = ?1",
                    rusqlite::params![name, status, duration_ms, last_error, meta],
                )?;
                Ok(())
            })
            .await
    }
}
