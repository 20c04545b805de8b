//! `CacheStore` implementation for the SQLite database.

use async_trait::async_trait;
use http::StatusCode;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::entry::{EntryKey, PreparedEntry, decode_headers, encode_headers, vary_matches};
use super::store::{CacheHandle, CacheStore};
use crate::{Error, Request, Response};

/// Row columns needed to rebuild a response and check its `Vary` fingerprint.
const ENTRY_COLUMNS: &str = "e.vary_json, e.vary_values, e.status, e.headers_json, e.body";

struct EntryRow {
    vary_json: String,
    vary_values: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            vary_json: row.get(0)?,
            vary_values: row.get(1)?,
            status: row.get(2)?,
            headers_json: row.get(3)?,
            body: row.get(4)?,
        })
    }

    fn matches(&self, request: &Request) -> Result<bool, Error> {
        let vary: Vec<String> = serde_json::from_str(&self.vary_json)?;
        Ok(vary_matches(&vary, &self.vary_values, request))
    }

    fn into_response(self) -> Result<Response, Error> {
        let status = StatusCode::from_u16(self.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        Ok(Response { status, headers: decode_headers(&self.headers_json)?, body: self.body.into() })
    }
}

/// Encoded form of a `PreparedEntry`, ready to bind.
struct EntryParams {
    request: Request,
    key: EntryKey,
    vary_json: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryParams {
    fn encode(request: &Request, response: &Response) -> Result<Self, Error> {
        let entry = PreparedEntry::new(request, response)?;
        Ok(Self {
            request: request.clone(),
            vary_json: serde_json::to_string(&entry.vary)?,
            headers_json: encode_headers(&entry.response.headers)?,
            status: entry.response.status.as_u16(),
            body: entry.response.body.to_vec(),
            key: entry.key,
        })
    }
}

fn ensure_cache(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    let exists: bool =
        conn.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![name], |row| row.get(0))?;
    if exists { Ok(()) } else { Err(Error::CacheNotFound(name.to_string())) }
}

/// Delete the stored variants of `entry`'s URL that its request would match.
fn delete_replaced(conn: &rusqlite::Connection, cache: &str, entry: &EntryParams) -> Result<(), Error> {
    let mut stmt = conn.prepare(
        "SELECT id, vary_json, vary_values FROM cache_entries
         WHERE cache_name = ?1 AND key_hash = ?2",
    )?;
    let rows = stmt
        .query_map(params![cache, &entry.key.hash], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (id, vary_json, vary_values) in rows {
        let vary: Vec<String> = serde_json::from_str(&vary_json)?;
        if vary_matches(&vary, &vary_values, &entry.request) {
            conn.execute("DELETE FROM cache_entries WHERE id = ?1", params![id])?;
        }
    }
    Ok(())
}

fn insert_entry(conn: &rusqlite::Connection, cache: &str, entry: &EntryParams, stored_at: &str) -> Result<(), Error> {
    delete_replaced(conn, cache, entry)?;
    conn.execute(
        "INSERT INTO cache_entries (
            cache_name, key_hash, method, url, vary_json, vary_values,
            status, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            cache,
            &entry.key.hash,
            &entry.key.method,
            &entry.key.url,
            &entry.vary_json,
            &entry.key.vary_values,
            entry.status,
            &entry.headers_json,
            &entry.body,
            stored_at,
        ],
    )?;
    Ok(())
}

/// Return the first row (in `rows` order) whose `Vary` fingerprint accepts `request`.
fn first_match(rows: Vec<EntryRow>, request: &Request) -> Result<Option<Response>, Error> {
    for row in rows {
        if row.matches(request)? {
            return row.into_response().map(Some);
        }
    }
    Ok(None)
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, name: &str) -> Result<CacheHandle, Error> {
        let owned = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                    params![owned, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(CacheHandle::new(name))
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id ASC")?;
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
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_in(&self, handle: &CacheHandle, request: &Request) -> Result<Option<Response>, Error> {
        let cache = handle.name().to_string();
        let request = request.clone();
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let key = EntryKey::for_request(&request);
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM cache_entries e
                     WHERE e.cache_name = ?1 AND e.key_hash = ?2"
                ))?;
                let rows = stmt
                    .query_map(params![cache, key.hash], EntryRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                first_match(rows, &request)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        let request = request.clone();
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let key = EntryKey::for_request(&request);
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM cache_entries e
                     JOIN caches c ON c.name = e.cache_name
                     WHERE e.key_hash = ?1
                     ORDER BY c.id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![key.hash], EntryRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                first_match(rows, &request)
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, handle: &CacheHandle, request: &Request, response: &Response) -> Result<(), Error> {
        let cache = handle.name().to_string();
        let entry = EntryParams::encode(request, response)?;
        let stored_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &cache)?;
                insert_entry(&tx, &cache, &entry, &stored_at)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, handle: &CacheHandle, entries: &[(Request, Response)]) -> Result<(), Error> {
        let cache = handle.name().to_string();
        let encoded = entries
            .iter()
            .map(|(request, response)| EntryParams::encode(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let stored_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &cache)?;
                for entry in &encoded {
                    insert_entry(&tx, &cache, entry, &stored_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, handle: &CacheHandle) -> Result<Vec<EntryKey>, Error> {
        let cache = handle.name().to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryKey>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, method, url, vary_values FROM cache_entries
                     WHERE cache_name = ?1 ORDER BY id ASC",
                )?;
                let keys = stmt
                    .query_map(params![cache], |row| {
                        Ok(EntryKey {
                            hash: row.get(0)?,
                            method: row.get(1)?,
                            url: row.get(2)?,
                            vary_values: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_entry(&self, handle: &CacheHandle, key: &EntryKey) -> Result<bool, Error> {
        let cache = handle.name().to_string();
        let hash = key.hash.clone();
        let vary_values = key.vary_values.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE cache_name = ?1 AND key_hash = ?2 AND vary_values = ?3",
                    params![cache, hash, vary_values],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn len(&self, handle: &CacheHandle) -> Result<usize, Error> {
        let cache = handle.name().to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1", params![cache], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }
}
