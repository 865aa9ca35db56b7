use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryOrder, Schema, TransactionTrait,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::data_capture::types::CapturedMessage;
use crate::error_handling::types::StorageError;
use crate::storage::db_entities::buffered_messages;
use crate::storage::storage_trait::DurableBuffer;

type Reply<T> = SyncSender<Result<T, StorageError>>;

enum Command {
    Append(CapturedMessage, Reply<()>),
    ReadAndClear(Reply<Vec<CapturedMessage>>),
    Count(Reply<usize>),
}

/// Durable buffer stored in a SQLite table through SeaORM.
///
/// A dedicated worker thread owns the connection and a current-thread
/// runtime. Callers enqueue commands and block on the reply, so the buffer
/// can be used from plain threads and from inside a tokio runtime alike,
/// and writes are applied strictly in the order they were submitted.
pub struct DatabaseBuffer {
    path: PathBuf,
    commands: Option<UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl DatabaseBuffer {
    /// Default database filename inside the storage directory
    pub const DEFAULT_DB_FILE: &'static str = "sms-relay.sqlite3";

    pub fn new_in_dir<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        Self::new_file(dir.as_ref().join(Self::DEFAULT_DB_FILE))
    }

    pub fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Failed to create database dir {}: {}", parent.display(), e);
                StorageError::WriteFailed
            })?;
        }

        let (tx, rx) = unbounded_channel();
        let (ready_tx, ready_rx) = sync_channel(1);
        let worker_path = path.clone();
        let worker = std::thread::Builder::new()
            .name("sms-relay-db".into())
            .spawn(move || run_worker(worker_path, rx, ready_tx))
            .map_err(|e| {
                error!("Failed to spawn database worker: {}", e);
                StorageError::ConnectionFailed
            })?;

        ready_rx.recv().map_err(|_| {
            error!("Database worker exited before reporting readiness");
            StorageError::ConnectionFailed
        })??;
        info!("DatabaseBuffer initialized at {}", path.display());

        Ok(Self {
            path,
            commands: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        on_failure: StorageError,
    ) -> Result<T, StorageError> {
        let commands = self.commands.as_ref().ok_or_else(|| on_failure.clone())?;
        let (reply_tx, reply_rx) = sync_channel(1);
        commands.send(build(reply_tx)).map_err(|_| {
            error!("Database worker for {} is gone", self.path.display());
            on_failure.clone()
        })?;
        reply_rx.recv().map_err(|_| {
            error!("Database worker for {} dropped a reply", self.path.display());
            on_failure
        })?
    }
}

impl Drop for DatabaseBuffer {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Database worker for {} panicked", self.path.display());
            }
        }
    }
}

impl DurableBuffer for DatabaseBuffer {
    fn append(&self, message: &CapturedMessage) -> Result<(), StorageError> {
        self.request(
            |reply| Command::Append(message.clone(), reply),
            StorageError::WriteFailed,
        )
    }

    fn read_and_clear(&self) -> Result<Vec<CapturedMessage>, StorageError> {
        self.request(Command::ReadAndClear, StorageError::ReadFailed)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.request(Command::Count, StorageError::ReadFailed)
    }
}

fn run_worker(path: PathBuf, mut commands: UnboundedReceiver<Command>, ready: Reply<()>) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build database runtime: {}", e);
            let _ = ready.send(Err(StorageError::ConnectionFailed));
            return;
        }
    };

    rt.block_on(async move {
        let db = match connect(&path).await {
            Ok(db) => {
                let _ = ready.send(Ok(()));
                db
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        while let Some(command) = commands.recv().await {
            match command {
                Command::Append(message, reply) => {
                    let _ = reply.send(insert(&db, &message).await);
                }
                Command::ReadAndClear(reply) => {
                    let _ = reply.send(drain(&db).await);
                }
                Command::Count(reply) => {
                    let _ = reply.send(count(&db).await);
                }
            }
        }

        debug!("Database worker for {} shutting down", path.display());
        if let Err(e) = db.close().await {
            warn!("Error closing database {}: {}", path.display(), e);
        }
    });
}

async fn connect(path: &Path) -> Result<DatabaseConnection, StorageError> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = Database::connect(url).await.map_err(|e| {
        error!("Failed to open database {}: {}", path.display(), e);
        StorageError::ConnectionFailed
    })?;

    let backend = db.get_database_backend();
    let mut create = Schema::new(backend).create_table_from_entity(buffered_messages::Entity);
    create.if_not_exists();
    db.execute(backend.build(&create)).await.map_err(|e| {
        error!("Failed to create buffered_messages table: {}", e);
        StorageError::WriteFailed
    })?;
    Ok(db)
}

async fn insert(db: &DatabaseConnection, message: &CapturedMessage) -> Result<(), StorageError> {
    let row = buffered_messages::ActiveModel {
        sender: Set(message.sender.clone()),
        body: Set(message.body.clone()),
        captured_at: Set(message.captured_at.to_rfc3339()),
        ..Default::default()
    };
    buffered_messages::Entity::insert(row)
        .exec(db)
        .await
        .map_err(|e| {
            error!("Failed to insert message from {}: {}", message.sender, e);
            StorageError::WriteFailed
        })?;
    debug!("Buffered message from {} in database", message.sender);
    Ok(())
}

async fn drain(db: &DatabaseConnection) -> Result<Vec<CapturedMessage>, StorageError> {
    let txn = db.begin().await.map_err(|e| {
        error!("Failed to open drain transaction: {}", e);
        StorageError::ReadFailed
    })?;
    let rows = buffered_messages::Entity::find()
        .order_by_asc(buffered_messages::Column::Id)
        .all(&txn)
        .await
        .map_err(|e| {
            error!("Failed to read buffered messages: {}", e);
            StorageError::ReadFailed
        })?;
    buffered_messages::Entity::delete_many()
        .exec(&txn)
        .await
        .map_err(|e| {
            error!("Failed to clear buffered messages: {}", e);
            StorageError::WriteFailed
        })?;
    txn.commit().await.map_err(|e| {
        error!("Failed to commit drain: {}", e);
        StorageError::WriteFailed
    })?;

    info!("Drained {} buffered message(s) from database", rows.len());
    Ok(rows.into_iter().map(row_into_message).collect())
}

async fn count(db: &DatabaseConnection) -> Result<usize, StorageError> {
    let n = buffered_messages::Entity::find()
        .count(db)
        .await
        .map_err(|e| {
            error!("Failed to count buffered messages: {}", e);
            StorageError::ReadFailed
        })?;
    Ok(n as usize)
}

fn row_into_message(row: buffered_messages::Model) -> CapturedMessage {
    let captured_at = DateTime::parse_from_rfc3339(&row.captured_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Invalid captured_at on row {}: {}", row.id, e);
            Utc::now()
        });
    CapturedMessage {
        sender: row.sender,
        body: row.body,
        captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_db_append_and_drain_in_order() {
        let dir = TempDir::new().unwrap();
        let buffer = DatabaseBuffer::new_in_dir(dir.path()).unwrap();
        for body in ["one", "two", "three"] {
            buffer.append(&CapturedMessage::new("BANK", body)).unwrap();
        }
        assert_eq!(buffer.len().unwrap(), 3);

        let drained = buffer.read_and_clear().unwrap();
        let bodies: Vec<_> = drained.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
        assert!(buffer.is_empty().unwrap());
    }

    #[test]
    fn test_db_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let msg = CapturedMessage::new("555", "persisted");
        {
            let buffer = DatabaseBuffer::new_in_dir(dir.path()).unwrap();
            buffer.append(&msg).unwrap();
        }
        let reopened = DatabaseBuffer::new_in_dir(dir.path()).unwrap();
        let drained = reopened.read_and_clear().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].body, "persisted");
        assert_eq!(
            drained[0].captured_at.timestamp_micros(),
            msg.captured_at.timestamp_micros()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_db_usable_from_async_context() {
        let dir = TempDir::new().unwrap();
        let buffer = DatabaseBuffer::new_in_dir(dir.path()).unwrap();
        buffer.append(&CapturedMessage::new("A", "from async")).unwrap();
        assert_eq!(buffer.read_and_clear().unwrap().len(), 1);
    }
}
