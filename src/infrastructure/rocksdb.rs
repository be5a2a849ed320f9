use crate::domain::ports::PaymentSessionStore;
use crate::domain::session::{PaymentSession, StateBlob};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing sessions keyed by session id.
pub const CF_SESSIONS: &str = "sessions";
/// Column Family mapping correlation ids to session ids.
pub const CF_CORRELATIONS: &str = "correlations";

/// A persistent session store implementation using RocksDB.
///
/// Sessions are stored as JSON in one Column Family, with a secondary index
/// from correlation id in another. Writes are serialized through a single
/// mutex so the version check and the put form one compare-and-swap.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("sessions" and "correlations") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_sessions = ColumnFamilyDescriptor::new(CF_SESSIONS, Options::default());
        let cf_correlations = ColumnFamilyDescriptor::new(CF_CORRELATIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_sessions, cf_correlations])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn read(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let cf = self.cf(CF_SESSIONS)?;
        match self.db.get_cf(cf, session_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, session: &PaymentSession) -> Result<()> {
        let cf = self.cf(CF_SESSIONS)?;
        let value = serde_json::to_vec(session)?;
        self.db.put_cf(cf, session.id.as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl PaymentSessionStore for RocksDBStore {
    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        self.read(session_id)
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<PaymentSession>> {
        let cf = self.cf(CF_CORRELATIONS)?;
        match self.db.get_cf(cf, correlation_id.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8(id).map_err(|e| {
                    PaymentError::InternalError(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Corrupt correlation index: {}", e),
                    )))
                })?;
                self.read(&id)
            }
            None => Ok(None),
        }
    }

    async fn replace_state(
        &self,
        session_id: &str,
        expected_version: u64,
        state_blob: StateBlob,
    ) -> Result<PaymentSession> {
        let _guard = self.write_lock.lock().await;
        let mut session = self
            .read(session_id)?
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_owned()))?;

        if session.version != expected_version {
            return Err(PaymentError::VersionConflict(session_id.to_owned()));
        }

        session.state_blob = state_blob;
        session.version += 1;
        self.write(&session)?;
        Ok(session)
    }

    async fn insert(&self, session: PaymentSession) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let sessions = self.cf(CF_SESSIONS)?;
        let correlations = self.cf(CF_CORRELATIONS)?;

        let mut batch = WriteBatch::default();
        if let Some(previous) = self.db.get_cf(correlations, session.correlation_id.as_bytes())?
            && previous != session.id.as_bytes()
        {
            batch.delete_cf(sessions, previous);
        }
        batch.put_cf(
            correlations,
            session.correlation_id.as_bytes(),
            session.id.as_bytes(),
        );
        batch.put_cf(sessions, session.id.as_bytes(), serde_json::to_vec(&session)?);
        self.db.write(batch)?;
        Ok(())
    }

    async fn mark_completed(&self, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut session = self
            .read(session_id)?
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_owned()))?;
        session.completed_at = Some(at);
        session.version += 1;
        self.write(&session)
    }
}
