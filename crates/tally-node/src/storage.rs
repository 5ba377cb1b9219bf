//! RocksDB-backed persistent ledger storage.
//!
//! Column families hold positions (keyed by big-endian id), per-cycle
//! records (keyed by big-endian cycle), and metadata: the global ledger
//! fields and the in-memory collaborator snapshot. All mutations use atomic
//! [`WriteBatch`]es, one per ledger operation.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

use tally_core::error::TallyError;
use tally_core::types::Cycle;
use tally_ledger::{ChangeSet, CycleRecord, GlobalMeta, LedgerState, Position, WorldState};

// --- Column family names ---

const CF_POSITIONS: &str = "positions";
const CF_CYCLES: &str = "cycles";
const CF_META: &str = "meta";

const ALL_CFS: &[&str] = &[CF_POSITIONS, CF_CYCLES, CF_META];

// --- Metadata keys ---

const META_GLOBAL: &[u8] = b"global";
const META_WORLD: &[u8] = b"world";

fn storage_err(e: impl std::fmt::Display) -> TallyError {
    TallyError::Storage(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, TallyError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(storage_err)
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, TallyError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(storage_err)?;
    Ok(value)
}

fn decode_key(bytes: &[u8]) -> Result<u64, TallyError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| TallyError::Storage("invalid key length".into()))?;
    Ok(u64::from_be_bytes(arr))
}

/// RocksDB-backed ledger storage.
pub struct LedgerStore {
    db: DB,
}

impl LedgerStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TallyError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;
        Ok(Self { db })
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, TallyError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| TallyError::Storage(format!("missing column family: {name}")))
    }

    /// Whether nothing was ever written.
    pub fn is_empty(&self) -> Result<bool, TallyError> {
        let cf = self.cf_handle(CF_META)?;
        Ok(self.db.get_cf(cf, META_GLOBAL).map_err(storage_err)?.is_none())
    }

    /// Atomically write the records touched by an operation together with
    /// the collaborator snapshot.
    pub fn write_changes(&self, changes: &ChangeSet, world: &WorldState) -> Result<(), TallyError> {
        let cf_cycles = self.cf_handle(CF_CYCLES)?;
        let cf_positions = self.cf_handle(CF_POSITIONS)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let mut batch = WriteBatch::default();
        for (cycle, record) in &changes.cycles {
            let key = cycle.to_be_bytes();
            if record.is_empty() {
                batch.delete_cf(cf_cycles, key);
            } else {
                batch.put_cf(cf_cycles, key, encode(record)?);
            }
        }
        for position in &changes.positions {
            batch.put_cf(cf_positions, position.id.0.to_be_bytes(), encode(position)?);
        }
        batch.put_cf(cf_meta, META_GLOBAL, encode(&changes.meta)?);
        batch.put_cf(cf_meta, META_WORLD, encode(world)?);

        self.db.write(batch).map_err(storage_err)
    }

    /// Write only the collaborator snapshot.
    pub fn write_world(&self, world: &WorldState) -> Result<(), TallyError> {
        let cf = self.cf_handle(CF_META)?;
        self.db
            .put_cf(cf, META_WORLD, encode(world)?)
            .map_err(storage_err)
    }

    /// Write a full ledger state, e.g. when importing.
    pub fn write_state(&self, state: &LedgerState, world: &WorldState) -> Result<(), TallyError> {
        let changes = ChangeSet {
            meta: state.meta(),
            cycles: state.cycle_records(),
            positions: state.positions.iter().cloned().collect(),
        };
        self.write_changes(&changes, world)
    }

    pub fn cycle_record(&self, cycle: Cycle) -> Result<Option<CycleRecord>, TallyError> {
        let cf = self.cf_handle(CF_CYCLES)?;
        self.db
            .get_cf(cf, cycle.to_be_bytes())
            .map_err(storage_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Restore the ledger state and collaborator snapshot.
    ///
    /// An empty database yields the genesis state.
    pub fn load(&self) -> Result<(LedgerState, WorldState), TallyError> {
        let cf_meta = self.cf_handle(CF_META)?;
        let Some(meta_bytes) = self.db.get_cf(cf_meta, META_GLOBAL).map_err(storage_err)? else {
            return Ok((LedgerState::default(), WorldState::default()));
        };
        let meta: GlobalMeta = decode(&meta_bytes)?;
        let world = match self.db.get_cf(cf_meta, META_WORLD).map_err(storage_err)? {
            Some(bytes) => decode(&bytes)?,
            None => WorldState::default(),
        };

        let mut cycles = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf_handle(CF_CYCLES)?, IteratorMode::Start)
        {
            let (key, value) = item.map_err(storage_err)?;
            let record: CycleRecord = decode(&value)?;
            cycles.push((decode_key(&key)?, record));
        }

        let mut positions = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf_handle(CF_POSITIONS)?, IteratorMode::Start)
        {
            let (_, value) = item.map_err(storage_err)?;
            let position: Position = decode(&value)?;
            positions.push(position);
        }

        Ok((LedgerState::restore(meta, cycles, positions), world))
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), TallyError> {
        self.db.flush().map_err(storage_err)
    }

    /// Overwrite the global metadata record with raw bytes.
    #[cfg(test)]
    pub(crate) fn put_raw_global(&self, bytes: &[u8]) -> Result<(), TallyError> {
        let cf = self.cf_handle(CF_META)?;
        self.db.put_cf(cf, META_GLOBAL, bytes).map_err(storage_err)
    }
}
