//! sled adapter for the moderation tables and the records they moderate
use super::config::{Config, TableNames};
use super::error::ModerationError;
use super::moderation::{ApprovalRequest, ApprovalStep, ApproverAssignment, RecordLink};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Tree};
use std::sync::Arc;

pub type TxResult<T> = ConflictableTransactionResult<T, ModerationError>;

/// Names a table of moderated records. Keys are numeric row ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    table: String,
}

pub struct ModerationStore {
    instance: Arc<Db>,
    names: TableNames,
    pub(crate) requests: Tree,
    pub(crate) steps: Tree,
    pub(crate) step_users: Tree,
    pub(crate) record_links: Tree,
}

impl Resource {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl ModerationStore {
    /// Open (or create) the database at `config.db_path`.
    pub fn open(config: &Config) -> Result<Self, ModerationError> {
        let db = sled::open(&config.db_path)?;
        Self::with_db(Arc::new(db), config)
    }

    /// Use an already opened database. Sled locks the path, so hosts that
    /// share one database between components go through here.
    pub fn with_db(instance: Arc<Db>, config: &Config) -> Result<Self, ModerationError> {
        let names = config.table_names();

        Ok(Self {
            requests: instance.open_tree(&names.requests)?,
            steps: instance.open_tree(&names.steps)?,
            step_users: instance.open_tree(&names.step_users)?,
            record_links: instance.open_tree(&names.record_links)?,
            names,
            instance,
        })
    }

    pub fn table_names(&self) -> &TableNames {
        &self.names
    }

    pub fn generate_id(&self) -> Result<u64, ModerationError> {
        Ok(self.instance.generate_id()?)
    }

    /// The record tree of `resource`, or `None` if nothing was ever stored
    /// in it. `Db::open_tree` would create it, so reads check first.
    pub(crate) fn existing_record_tree(
        &self,
        resource: &Resource,
    ) -> Result<Option<Tree>, ModerationError> {
        let name = self.names.record_tree(resource.table());
        let exists = self
            .instance
            .tree_names()
            .iter()
            .any(|tree| &**tree == name.as_bytes());
        if !exists {
            return Ok(None);
        }
        Ok(Some(self.instance.open_tree(name)?))
    }

    /// Store a target record. The engine only checks that it exists.
    pub fn put_record(
        &self,
        resource: &Resource,
        record_id: u64,
        body: impl AsRef<[u8]>,
    ) -> Result<(), ModerationError> {
        let name = self.names.record_tree(resource.table());
        self.instance
            .open_tree(name)?
            .insert(id_key(record_id), body.as_ref())?;
        Ok(())
    }

    pub fn get_record(
        &self,
        resource: &Resource,
        record_id: u64,
    ) -> Result<Option<Vec<u8>>, ModerationError> {
        let Some(records) = self.existing_record_tree(resource)? else {
            return Ok(None);
        };
        let value = records.get(id_key(record_id))?;
        Ok(value.map(|v| v.to_vec()))
    }

    pub fn get_request(&self, id: u64) -> Result<Option<ApprovalRequest>, ModerationError> {
        read(&self.requests, &id_key(id), "approval request")
    }

    pub fn get_step(&self, id: u64) -> Result<Option<ApprovalStep>, ModerationError> {
        read(&self.steps, &id_key(id), "approval step")
    }

    pub fn get_assignment(
        &self,
        step_id: u64,
    ) -> Result<Option<ApproverAssignment>, ModerationError> {
        read(&self.step_users, &id_key(step_id), "approver assignment")
    }

    pub fn get_link(
        &self,
        resource: &Resource,
        record_id: u64,
    ) -> Result<Option<RecordLink>, ModerationError> {
        read(
            &self.record_links,
            &link_key(resource.table(), record_id),
            "record link",
        )
    }
}

pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

// table name, a nul separator, then the big-endian row id
pub fn link_key(table: &str, record_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 9);
    key.extend_from_slice(table.as_bytes());
    key.push(0);
    key.extend_from_slice(&record_id.to_be_bytes());
    key
}

fn read<T>(tree: &Tree, key: &[u8], what: &'static str) -> Result<Option<T>, ModerationError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => minicbor::decode(&bytes)
            .map(Some)
            .map_err(|_| ModerationError::Decode(what)),
        None => Ok(None),
    }
}

pub fn abort<T>(err: ModerationError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Transactional read and decode of one row.
pub fn tx_read<T>(
    tree: &TransactionalTree,
    key: &[u8],
    what: &'static str,
) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => match minicbor::decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(_) => abort(ModerationError::Decode(what)),
        },
        None => Ok(None),
    }
}

/// Transactional encode and write of one row.
pub fn tx_write<T>(
    tree: &TransactionalTree,
    key: &[u8],
    value: &T,
    what: &'static str,
) -> TxResult<()>
where
    T: minicbor::Encode<()>,
{
    let bytes = match minicbor::to_vec(value) {
        Ok(bytes) => bytes,
        Err(_) => return abort(ModerationError::Encode(what)),
    };
    tree.insert(key, bytes)?;
    Ok(())
}
