//! SQLite implementation of [`PartitionStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use tokio_rusqlite::rusqlite::OptionalExtension;

use super::connection::CacheDb;
use super::{PartitionStore, RequestKey};
use crate::Error;
use crate::model::CapturedResponse;

fn insert_partition(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_entry(
    conn: &rusqlite::Connection, partition: &str, key: &RequestKey, response: &CapturedResponse,
) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&response.headers)?;
    conn.execute(
        "INSERT INTO entries (
            partition_name, key_hash, method, request_url, response_url,
            status, headers_json, body, captured_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(partition_name, key_hash) DO UPDATE SET
            response_url = excluded.response_url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            captured_at = excluded.captured_at",
        params![
            partition,
            key.hash(),
            key.method(),
            key.url(),
            &response.url,
            response.status,
            headers_json,
            &response.body,
            &response.captured_at,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl PartitionStore for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { insert_partition(conn, &name) })
            .await
            .map_err(Error::from)
    }

    async fn contains(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM entries WHERE partition_name = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn read(&self, partition: &str, key: &RequestKey) -> Result<Option<CapturedResponse>, Error> {
        let partition = partition.to_string();
        let hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<CapturedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT response_url, status, headers_json, body, captured_at
                     FROM entries WHERE partition_name = ?1 AND key_hash = ?2",
                )?;

                let row = stmt.query_row(params![partition, hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                });

                match row {
                    Ok((url, status, headers_json, body, captured_at)) => {
                        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
                        Ok(Some(CapturedResponse { url, status, headers, body, captured_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn write(&self, partition: &str, key: &RequestKey, response: &CapturedResponse) -> Result<(), Error> {
        let partition = partition.to_string();
        let key = key.clone();
        let response = response.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_partition(&tx, &partition)?;
                upsert_entry(&tx, &partition, &key, &response)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn commit(&self, partition: &str, entries: Vec<(RequestKey, CapturedResponse)>) -> Result<(), Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_partition(&tx, &partition)?;
                tx.execute("DELETE FROM entries WHERE partition_name = ?1", params![partition])?;
                for (key, response) in &entries {
                    upsert_entry(&tx, &partition, key, response)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt =
                    conn.prepare("SELECT method, request_url FROM entries WHERE partition_name = ?1 ORDER BY rowid")?;
                let keys = stmt
                    .query_map(params![partition], |row| Ok(RequestKey::from_parts(row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    async fn activated_version(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                let version = conn
                    .query_row("SELECT activated_version FROM worker_state WHERE id = 1", [], |row| row.get(0))
                    .optional()?;
                Ok(version)
            })
            .await
            .map_err(Error::from)
    }

    async fn record_activation(&self, version: &str) -> Result<(), Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO worker_state (id, activated_version, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET
                        activated_version = excluded.activated_version,
                        activated_at = excluded.activated_at",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
