use std::path::Path;

use rocksdb::{
    ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded, Options, WriteBatch,
};

use crate::error::{StorageError, StorageResult};
use crate::message::Message;
use crate::storage::traits::{Storage, WriteBatchOp};

const CF_MESSAGES: &str = "messages";
const CF_STATE: &str = "state";

/// All column family names (excluding `default` which RocksDB creates automatically).
const COLUMN_FAMILIES: &[&str] = &[CF_MESSAGES, CF_STATE];

type DB = DBWithThreadMode<MultiThreaded>;

/// RocksDB-backed storage implementation.
pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Open or create a RocksDB database at the given path with all column families.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> StorageResult<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::RocksDb(format!("column family not found: {name}")))
    }
}

impl Storage for RocksDbStorage {
    fn put_message(&self, key: &[u8], message: &Message) -> StorageResult<()> {
        let cf = self.cf(CF_MESSAGES)?;
        let value = serde_json::to_vec(message)?;
        self.db.put_cf(&cf, key, &value)?;
        Ok(())
    }

    fn get_message(&self, key: &[u8]) -> StorageResult<Option<Message>> {
        let cf = self.cf(CF_MESSAGES)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn delete_message(&self, key: &[u8]) -> StorageResult<()> {
        let cf = self.cf(CF_MESSAGES)?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    fn list_messages(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Message)>> {
        let cf = self.cf(CF_MESSAGES)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));
        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let msg: Message = serde_json::from_slice(&value)?;
            results.push((key.to_vec(), msg));
        }
        Ok(results)
    }

    fn put_state(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let cf = self.cf(CF_STATE)?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn get_state(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(CF_STATE)?;
        Ok(self.db.get_cf(&cf, key)?.map(|v| v.to_vec()))
    }

    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()> {
        let mut batch = WriteBatch::default();

        for op in ops {
            match op {
                WriteBatchOp::PutMessage { key, value } => {
                    batch.put_cf(&self.cf(CF_MESSAGES)?, &key, &value);
                }
                WriteBatchOp::DeleteMessage { key } => {
                    batch.delete_cf(&self.cf(CF_MESSAGES)?, &key);
                }
                WriteBatchOp::PutState { key, value } => {
                    batch.put_cf(&self.cf(CF_STATE)?, &key, &value);
                }
                WriteBatchOp::DeleteState { key } => {
                    batch.delete_cf(&self.cf(CF_STATE)?, &key);
                }
            }
        }

        self.db.write(batch)?;
        Ok(())
    }
}
