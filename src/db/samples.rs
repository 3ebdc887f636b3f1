//! Sample operations: content-addressed insert-or-lookup.

use opentelemetry::KeyValue;
use sqlx::AnyConnection;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{FileHashes, NewSample, Sample, SampleId};
use crate::telemetry::metrics;

const SAMPLE_COLUMNS: &str = "id, file_size, file_type, md5, crc32, sha1, sha256, sha512, ssdeep";

impl super::Store {
    /// Insert a sample, or return the id of the sample already stored with the
    /// same hash tuple. Racing callers with identical hashes all get one id.
    pub async fn insert_or_get_sample(&self, sample: &NewSample) -> Result<SampleId> {
        let mut tx = self.pool().begin().await?;
        match insert_or_get_sample_on(&mut tx, sample).await {
            Ok(id) => {
                tx.commit().await?;
                Ok(id)
            }
            // Deferred constraint checks can report the duplicate only at
            // commit; the winner's row is visible once ours is gone.
            Err(Error::Conflict(_)) => {
                drop(tx);
                let mut conn = self.pool().acquire().await?;
                find_sample_id_on(&mut conn, &sample.hashes)
                    .await?
                    .ok_or_else(|| Error::Other("sample vanished after a hash conflict".into()))
            }
            Err(e) => Err(e),
        }
    }

    /// Look a sample up by its hash tuple.
    pub async fn find_sample(&self, hashes: &FileHashes) -> Result<Option<Sample>> {
        let row: Option<SampleRow> = sqlx::query_as(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples
             WHERE md5 = $1 AND crc32 = $2 AND sha1 = $3 AND sha256 = $4 AND sha512 = $5"
        ))
        .bind(&hashes.md5)
        .bind(&hashes.crc32)
        .bind(&hashes.sha1)
        .bind(&hashes.sha256)
        .bind(&hashes.sha512)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(SampleRow::into_sample))
    }

    pub async fn count_samples(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM samples")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Get a sample by id.
    pub async fn get_sample(&self, id: SampleId) -> Result<Option<Sample>> {
        let row: Option<SampleRow> =
            sqlx::query_as(&format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(SampleRow::into_sample))
    }
}

/// Insert-or-lookup against an open connection or transaction.
///
/// `ON CONFLICT DO NOTHING` turns a duplicate into "no row returned", which
/// then falls back to reading the existing row by its key.
pub(crate) async fn insert_or_get_sample_on(
    conn: &mut AnyConnection,
    sample: &NewSample,
) -> Result<SampleId> {
    let inserted: Option<(i64,)> = sqlx::query_as(
        "INSERT INTO samples (file_size, file_type, md5, crc32, sha1, sha256, sha512, ssdeep)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (md5, crc32, sha1, sha256, sha512) DO NOTHING
         RETURNING id",
    )
    .bind(sample.file_size)
    .bind(&sample.file_type)
    .bind(&sample.hashes.md5)
    .bind(&sample.hashes.crc32)
    .bind(&sample.hashes.sha1)
    .bind(&sample.hashes.sha256)
    .bind(&sample.hashes.sha512)
    .bind(&sample.ssdeep)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((id,)) = inserted {
        metrics::samples_inserted().add(1, &[KeyValue::new("result", "created")]);
        debug!(sample_id = id, md5 = %sample.hashes.md5, "sample created");
        return Ok(SampleId(id));
    }

    let existing = find_sample_id_on(conn, &sample.hashes)
        .await?
        .ok_or_else(|| Error::Other("hash conflict but no matching sample".into()))?;

    metrics::samples_inserted().add(1, &[KeyValue::new("result", "existing")]);
    debug!(sample_id = %existing, md5 = %sample.hashes.md5, "sample already stored");
    Ok(existing)
}

async fn find_sample_id_on(conn: &mut AnyConnection, hashes: &FileHashes) -> Result<Option<SampleId>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM samples
         WHERE md5 = $1 AND crc32 = $2 AND sha1 = $3 AND sha256 = $4 AND sha512 = $5",
    )
    .bind(&hashes.md5)
    .bind(&hashes.crc32)
    .bind(&hashes.sha1)
    .bind(&hashes.sha256)
    .bind(&hashes.sha512)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|(id,)| SampleId(id)))
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct SampleRow {
    id: i64,
    file_size: i64,
    file_type: Option<String>,
    md5: String,
    crc32: String,
    sha1: String,
    sha256: String,
    sha512: String,
    ssdeep: Option<String>,
}

impl SampleRow {
    fn into_sample(self) -> Sample {
        Sample {
            id: SampleId(self.id),
            file_size: self.file_size,
            file_type: self.file_type,
            hashes: FileHashes {
                md5: self.md5,
                crc32: self.crc32,
                sha1: self.sha1,
                sha256: self.sha256,
                sha512: self.sha512,
            },
            ssdeep: self.ssdeep,
        }
    }
}
