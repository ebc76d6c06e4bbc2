use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tel_chain::{
    create_checkpoint, Anchor, ChainEntry, ChainError, ChainVerifier, CheckpointWindow,
    VerificationResult,
};
use tel_crypto::{MerkleProof, MerkleTree, SigningKey, VerifyingKey};
use tel_module::{
    LedgerModule, ModuleError, ModuleFactory, ModuleMeta, ModuleRegistry, ModuleState,
};
use tel_services::ServiceRegistry;
use tel_types::{Hash, Record};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acl::{AclBackend, Grant, MemoryAcl, Permission, WRITE};
use crate::config::{AclMode, LedgerConfig};
use crate::error::{EngineError, Result};
use crate::query::{QueryFilters, QueryResult};
use crate::state::LedgerState;
use crate::storage::StorageBackend;

/// A committed append.
#[derive(Clone, Debug)]
pub struct AppendOutcome {
    pub hash: Hash,
    /// `after_append` failures. The entry is committed regardless.
    pub warnings: Vec<ModuleError>,
}

/// A committed batch.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    /// Entry hashes in append order.
    pub hashes: Vec<Hash>,
    pub warnings: Vec<ModuleError>,
}

/// The chain tip a new entry links to.
#[derive(Clone, Copy)]
struct Tip {
    hash: Option<Hash>,
    timestamp: Option<u64>,
}

impl Tip {
    fn of(state: &LedgerState) -> Self {
        Self {
            hash: state.latest_hash(),
            timestamp: state.latest().map(|e| e.record.timestamp),
        }
    }

    fn after(entry: &ChainEntry) -> Self {
        Self {
            hash: Some(entry.hash),
            timestamp: Some(entry.record.timestamp),
        }
    }
}

/// Builder for [`LedgerEngine`].
pub struct LedgerEngineBuilder {
    config: LedgerConfig,
    storage: Option<Box<dyn StorageBackend>>,
    signing_key: Option<SigningKey>,
    factory: ModuleFactory,
    services: ServiceRegistry,
    modules: Vec<Box<dyn LedgerModule>>,
    acl: Option<Box<dyn AclBackend>>,
}

impl LedgerEngineBuilder {
    /// Persist entries through `storage` and load the existing chain from it.
    pub fn storage(mut self, storage: impl StorageBackend + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Sign every new entry and checkpoint with `key`.
    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Replace the built-in module factory.
    pub fn factory(mut self, factory: ModuleFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Start from a pre-populated service registry.
    pub fn services(mut self, services: ServiceRegistry) -> Self {
        self.services = services;
        self
    }

    /// Guard appends with `acl`, whatever the configured [`AclMode`].
    pub fn acl(mut self, acl: impl AclBackend + 'static) -> Self {
        self.acl = Some(Box::new(acl));
        self
    }

    /// Register an already-constructed module after the configured ones.
    pub fn module(mut self, module: Box<dyn LedgerModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Validate the configuration, build and start modules, and load and
    /// verify the stored chain.
    ///
    /// Any failure here is fatal: no engine is returned in a partial state.
    pub fn build(self) -> Result<LedgerEngine> {
        let Self {
            config,
            storage,
            signing_key,
            factory,
            mut services,
            modules: extra_modules,
            acl,
        } = self;

        config.validate()?;
        if config.require_signatures && signing_key.is_none() {
            return Err(EngineError::SigningKeyRequired(config.id.clone()));
        }
        let audit_key = if config.require_signatures {
            signing_key.as_ref().map(SigningKey::verifying_key)
        } else {
            None
        };

        let acl = match (acl, config.acl) {
            (Some(backend), _) => Some(backend),
            (None, AclMode::InMemory) => Some(Box::new(MemoryAcl::new()) as Box<dyn AclBackend>),
            (None, AclMode::None) => None,
        };

        let mut modules = ModuleRegistry::new(config.id.clone());
        for module_config in &config.modules {
            let module = factory.create(module_config)?;
            modules.register_with_config(module, module_config.config.clone())?;
        }
        for module in extra_modules {
            modules.register(module)?;
        }

        let state = match &storage {
            Some(storage) => load_state(&config, storage.as_ref(), audit_key)?,
            None => LedgerState::new(),
        };

        let started = modules
            .init_all(&mut services)
            .and_then(|()| modules.start_all(&mut services));
        if let Err(e) = started {
            modules.stop_all(&mut services);
            return Err(e.into());
        }

        info!(
            ledger_id = %config.id,
            entries = state.len(),
            modules = modules.len(),
            storage = storage.is_some(),
            signing = signing_key.is_some(),
            acl = acl.is_some(),
            "ledger engine started"
        );

        Ok(LedgerEngine {
            config,
            modules,
            services,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            storage,
            signing_key,
            audit_key,
            acl,
            anchors: RwLock::new(Vec::new()),
        })
    }
}

fn load_state(
    config: &LedgerConfig,
    storage: &dyn StorageBackend,
    audit_key: Option<VerifyingKey>,
) -> Result<LedgerState> {
    let entries = storage.load_all_entries()?;
    let report = chain_verifier(audit_key).verify(&entries);
    if !report.valid {
        warn!(
            ledger_id = %config.id,
            entries = report.entries_checked,
            faults = report.fault_count(),
            "stored chain failed verification"
        );
        return Err(report.into());
    }
    if let Some(max) = config.max_entries {
        if entries.len() > max {
            return Err(EngineError::CapacityExceeded { max });
        }
    }

    let mut state = LedgerState::new();
    for entry in entries {
        if state.contains_id(&entry.record.id) {
            return Err(EngineError::DuplicateRecordId(entry.record.id));
        }
        state.push(entry);
    }
    debug!(ledger_id = %config.id, entries = state.len(), "chain loaded from storage");
    Ok(state)
}

fn chain_verifier(audit_key: Option<VerifyingKey>) -> ChainVerifier {
    match audit_key {
        Some(key) => ChainVerifier::new().with_verifying_key(key),
        None => ChainVerifier::new(),
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// A tamper-evident, append-only ledger.
///
/// Appends are serialised by a writer gate; the chain index sits behind a
/// read-write lock that is only write-locked to insert committed entries,
/// so readers always see a whole number of appends. Entries are written to
/// storage before they become visible in memory. `after_append` hooks run
/// after the gate is released.
pub struct LedgerEngine {
    config: LedgerConfig,
    modules: ModuleRegistry,
    services: ServiceRegistry,
    state: RwLock<LedgerState>,
    writer: Mutex<()>,
    storage: Option<Box<dyn StorageBackend>>,
    signing_key: Option<SigningKey>,
    /// Key entry signatures are checked against during verification.
    audit_key: Option<VerifyingKey>,
    acl: Option<Box<dyn AclBackend>>,
    anchors: RwLock<Vec<Anchor>>,
}

impl LedgerEngine {
    pub fn builder(config: LedgerConfig) -> LedgerEngineBuilder {
        LedgerEngineBuilder {
            config,
            storage: None,
            signing_key: None,
            factory: ModuleFactory::with_builtins(),
            services: ServiceRegistry::new(),
            modules: Vec::new(),
            acl: None,
        }
    }

    /// In-memory engine with the built-in modules.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signing_key.as_ref().map(SigningKey::verifying_key)
    }

    pub fn module(&self, id: &str) -> Option<&dyn LedgerModule> {
        self.modules.get(id)
    }

    pub fn module_ids(&self) -> Vec<&str> {
        self.modules.ids()
    }

    pub fn module_state(&self, id: &str) -> Option<ModuleState> {
        self.modules.state(id)
    }

    pub fn module_metadata(&self) -> Vec<ModuleMeta> {
        self.modules.metadata()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append one record.
    ///
    /// The record is validated, passed through every module's
    /// `before_append`, linked to the tip, signed when the engine holds a key,
    /// persisted, and only then made visible. A rejection at any step leaves
    /// the ledger unchanged.
    ///
    /// With access control enabled an anonymous append is refused; use
    /// [`append_as`](Self::append_as).
    pub fn append(&self, record: Record) -> Result<AppendOutcome> {
        self.append_inner(None, record)
    }

    /// Append one record on behalf of `requester`, who needs an active
    /// `write` grant on [`resource_oid`](Self::resource_oid) when access
    /// control is enabled.
    pub fn append_as(&self, requester: &str, record: Record) -> Result<AppendOutcome> {
        self.append_inner(Some(requester), record)
    }

    fn append_inner(&self, requester: Option<&str>, record: Record) -> Result<AppendOutcome> {
        self.authorize_write(requester)?;
        let writer = self.lock_writer()?;

        let entry = {
            let state = self.read_state()?;
            self.check_capacity(state.len(), 1)?;
            self.prepare(record, Tip::of(&state), &state, &HashSet::new())?
        };

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_entry(&entry) {
                warn!(
                    ledger_id = %self.config.id,
                    record_id = %entry.record.id,
                    error = %e,
                    "entry write failed"
                );
                return Err(e.into());
            }
        }

        let hash = entry.hash;
        let record = entry.record.clone();
        self.write_state()?.push(entry);
        debug!(
            ledger_id = %self.config.id,
            record_id = %record.id,
            stream = %record.stream,
            hash = %hash.short_hex(),
            "entry appended"
        );
        // after_append hooks run outside the writer section.
        drop(writer);

        let warnings = self.run_after_append(&record, &hash);
        Ok(AppendOutcome { hash, warnings })
    }

    /// Append several records as one unit.
    ///
    /// Every record is prepared and linked before anything is written; the
    /// batch is then persisted with a single `save_batch`. If any step fails
    /// no record of the batch is visible.
    pub fn append_batch(&self, records: Vec<Record>) -> Result<BatchOutcome> {
        self.append_batch_inner(None, records)
    }

    /// [`append_batch`](Self::append_batch) on behalf of `requester`.
    pub fn append_batch_as(&self, requester: &str, records: Vec<Record>) -> Result<BatchOutcome> {
        self.append_batch_inner(Some(requester), records)
    }

    fn append_batch_inner(
        &self,
        requester: Option<&str>,
        records: Vec<Record>,
    ) -> Result<BatchOutcome> {
        self.authorize_write(requester)?;
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let writer = self.lock_writer()?;

        let entries = {
            let state = self.read_state()?;
            self.check_capacity(state.len(), records.len())?;
            let mut tip = Tip::of(&state);
            let mut batch_ids = HashSet::with_capacity(records.len());
            let mut entries = Vec::with_capacity(records.len());
            for record in records {
                let entry = self.prepare(record, tip, &state, &batch_ids)?;
                tip = Tip::after(&entry);
                batch_ids.insert(entry.record.id.clone());
                entries.push(entry);
            }
            entries
        };

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_batch(&entries) {
                warn!(
                    ledger_id = %self.config.id,
                    batch = entries.len(),
                    error = %e,
                    "batch write failed; ledger unchanged"
                );
                return Err(e.into());
            }
        }

        {
            let mut state = self.write_state()?;
            for entry in &entries {
                state.push(entry.clone());
            }
        }
        info!(ledger_id = %self.config.id, batch = entries.len(), "batch appended");
        drop(writer);

        let mut outcome = BatchOutcome {
            hashes: entries.iter().map(|e| e.hash).collect(),
            warnings: Vec::new(),
        };
        for entry in &entries {
            outcome
                .warnings
                .extend(self.run_after_append(&entry.record, &entry.hash));
        }
        Ok(outcome)
    }

    /// Anchor the entries in `range` (the whole chain when `None`) with a
    /// fresh UUID v7 id and the current time.
    pub fn checkpoint(&self, range: Option<Range<usize>>) -> Result<Anchor> {
        let window = CheckpointWindow::new(Uuid::now_v7().to_string(), now_millis());
        self.checkpoint_with(range, window)
    }

    /// Anchor the entries in `range` under a caller-supplied id and time.
    pub fn checkpoint_with(
        &self,
        range: Option<Range<usize>>,
        window: CheckpointWindow,
    ) -> Result<Anchor> {
        let _writer = self.lock_writer()?;
        let hashes: Vec<Hash> = {
            let state = self.read_state()?;
            let range = checked_range(range, state.len())?;
            state.entries()[range].iter().map(|e| e.hash).collect()
        };

        let anchor = create_checkpoint(&hashes, window, self.signing_key.as_ref())?;
        self.anchors
            .write()
            .map_err(|_| EngineError::LockPoisoned)?
            .push(anchor.clone());

        info!(
            ledger_id = %self.config.id,
            anchor_id = %anchor.id,
            entries = anchor.entry_count,
            root = %anchor.root_hash.short_hex(),
            signed = anchor.is_signed(),
            "checkpoint anchored"
        );
        Ok(anchor)
    }

    fn prepare(
        &self,
        mut record: Record,
        tip: Tip,
        state: &LedgerState,
        batch_ids: &HashSet<String>,
    ) -> Result<ChainEntry> {
        record.validate()?;
        self.modules.before_append(&mut record)?;

        if state.contains_id(&record.id) || batch_ids.contains(&record.id) {
            return Err(EngineError::DuplicateRecordId(record.id));
        }
        if let Some(previous) = tip.timestamp {
            if record.timestamp < previous {
                return Err(ChainError::TimestampOutOfOrder {
                    entry_id: record.id,
                    previous,
                    current: record.timestamp,
                }
                .into());
            }
        }

        let entry = ChainEntry::new(record, tip.hash)?;
        Ok(match &self.signing_key {
            Some(key) => entry.signed(key),
            None => entry,
        })
    }

    fn check_capacity(&self, len: usize, adding: usize) -> Result<()> {
        match self.config.max_entries {
            Some(max) if len + adding > max => Err(EngineError::CapacityExceeded { max }),
            _ => Ok(()),
        }
    }

    fn run_after_append(&self, record: &Record, hash: &Hash) -> Vec<ModuleError> {
        let failures = self.modules.after_append(record, hash);
        for failure in &failures {
            warn!(
                ledger_id = %self.config.id,
                record_id = %record.id,
                error = %failure,
                "after_append hook failed"
            );
        }
        failures
    }

    // -----------------------------------------------------------------------
    // Access control
    // -----------------------------------------------------------------------

    pub fn has_acl(&self) -> bool {
        self.acl.is_some()
    }

    /// Resource OID that write grants for this ledger name.
    pub fn resource_oid(&self) -> String {
        format!("oid:ledger:{}", self.config.id)
    }

    /// Store `grant`. Fails with `AclDisabled` when the ledger has no ACL.
    pub fn grant(&self, grant: Grant) -> Result<()> {
        let acl = self.require_acl()?;
        let permission = grant.permission.clone();
        acl.grant(grant)?;
        info!(
            ledger_id = %self.config.id,
            subject = %permission.subject_oid,
            resource = %permission.resource_oid,
            action = %permission.action,
            "access granted"
        );
        Ok(())
    }

    /// Remove the grant for `permission`; returns whether one existed.
    pub fn revoke(&self, permission: &Permission) -> Result<bool> {
        let removed = self.require_acl()?.revoke(permission)?;
        info!(
            ledger_id = %self.config.id,
            subject = %permission.subject_oid,
            resource = %permission.resource_oid,
            action = %permission.action,
            removed,
            "access revoked"
        );
        Ok(removed)
    }

    /// Whether `permission` is held now. Always true without an ACL.
    pub fn check_access(&self, permission: &Permission) -> Result<bool> {
        match &self.acl {
            Some(acl) => Ok(acl.check(permission, now_secs())?),
            None => Ok(true),
        }
    }

    /// Active grants held by `subject_oid`. Empty without an ACL.
    pub fn list_grants(&self, subject_oid: &str) -> Result<Vec<Grant>> {
        match &self.acl {
            Some(acl) => Ok(acl.list_grants(subject_oid, now_secs())?),
            None => Ok(Vec::new()),
        }
    }

    fn require_acl(&self) -> Result<&dyn AclBackend> {
        self.acl
            .as_deref()
            .ok_or_else(|| EngineError::AclDisabled(self.config.id.clone()))
    }

    fn authorize_write(&self, requester: Option<&str>) -> Result<()> {
        let Some(acl) = &self.acl else {
            return Ok(());
        };
        let resource = self.resource_oid();
        let allowed = match requester {
            Some(requester) => {
                acl.check(&Permission::new(requester, resource.as_str(), WRITE), now_secs())?
            }
            None => false,
        };
        if !allowed {
            warn!(
                ledger_id = %self.config.id,
                requester = requester.unwrap_or("-"),
                "write denied"
            );
            return Err(EngineError::AccessDenied {
                requester: requester.map(str::to_owned),
                resource,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Pre-flight check: record structure plus every module's `validate`.
    pub fn validate(&self, record: &Record) -> Result<()> {
        record.validate()?;
        self.modules.validate(record)?;
        Ok(())
    }

    pub fn get(&self, hash: &Hash) -> Result<Option<Record>> {
        Ok(self.read_state()?.entry(hash).map(|e| e.record.clone()))
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.read_state()?.entry_by_id(id).map(|e| e.record.clone()))
    }

    pub fn entry(&self, hash: &Hash) -> Result<Option<ChainEntry>> {
        Ok(self.read_state()?.entry(hash).cloned())
    }

    pub fn entry_by_id(&self, id: &str) -> Result<Option<ChainEntry>> {
        Ok(self.read_state()?.entry_by_id(id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_state()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_state()?.is_empty())
    }

    pub fn latest_hash(&self) -> Result<Option<Hash>> {
        Ok(self.read_state()?.latest_hash())
    }

    pub fn latest_entry(&self) -> Result<Option<ChainEntry>> {
        Ok(self.read_state()?.latest().cloned())
    }

    /// Snapshot of every entry in append order.
    pub fn entries(&self) -> Result<Vec<ChainEntry>> {
        Ok(self.read_state()?.entries().to_vec())
    }

    /// Anchors created by this engine, oldest first.
    pub fn anchors(&self) -> Result<Vec<Anchor>> {
        Ok(self
            .anchors
            .read()
            .map_err(|_| EngineError::LockPoisoned)?
            .clone())
    }

    pub fn query(&self, filters: &QueryFilters) -> Result<QueryResult> {
        let state = self.read_state()?;
        let mut matches: Vec<&Record> = state.records().filter(|r| filters.matches(r)).collect();
        if filters.has_module_filters() {
            matches = self.modules.narrow(matches, &filters.module_filters);
        }
        Ok(QueryResult::paginate(matches, filters.offset, filters.limit))
    }

    // -----------------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------------

    /// Verify the in-memory chain from genesis.
    pub fn verify(&self) -> Result<VerificationResult> {
        let state = self.read_state()?;
        Ok(chain_verifier(self.audit_key).verify(state.entries()))
    }

    /// Verify up to `limit` entries starting at the entry with `start_id`,
    /// which is treated as a local genesis.
    pub fn verify_from(&self, start_id: &str, limit: Option<usize>) -> Result<VerificationResult> {
        let state = self.read_state()?;
        let start = state
            .position_of_id(start_id)
            .ok_or_else(|| EngineError::NotFound(format!("record {start_id}")))?;
        let mut verifier = chain_verifier(self.audit_key).as_window();
        if let Some(limit) = limit {
            verifier = verifier.with_limit(limit);
        }
        Ok(verifier.verify(&state.entries()[start..]))
    }

    /// Reload the chain from storage and verify it. `None` without storage.
    pub fn verify_storage(&self) -> Result<Option<VerificationResult>> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        let entries = storage.load_all_entries()?;
        Ok(Some(chain_verifier(self.audit_key).verify(&entries)))
    }

    /// Merkle inclusion proof of the entry `hash` under `anchor`.
    ///
    /// Fails if the anchor's range is not part of this ledger or its root
    /// does not match the ledger's contents.
    pub fn prove_inclusion(&self, anchor: &Anchor, hash: &Hash) -> Result<MerkleProof> {
        anchor.validate()?;
        let state = self.read_state()?;
        let start = state
            .position_of_hash(&anchor.first_hash)
            .ok_or_else(|| EngineError::NotFound(format!("anchor {} start entry", anchor.id)))?;
        let count = usize::try_from(anchor.entry_count).unwrap_or(usize::MAX);
        let range = checked_range(Some(start..start.saturating_add(count)), state.len())?;

        let leaves: Vec<Hash> = state.entries()[range].iter().map(|e| e.hash).collect();
        let tree = MerkleTree::from_leaves(leaves).map_err(|_| ChainError::EmptyRange)?;
        if tree.root() != anchor.root_hash {
            return Err(ChainError::InvalidAnchor(format!(
                "root of anchor {} does not match the ledger",
                anchor.id
            ))
            .into());
        }

        let index = tree
            .leaves()
            .iter()
            .position(|leaf| leaf == hash)
            .ok_or_else(|| not_covered(anchor, hash))?;
        tree.proof(index).ok_or_else(|| not_covered(anchor, hash))
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.state.read().map_err(|_| EngineError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.state.write().map_err(|_| EngineError::LockPoisoned)
    }
}

fn not_covered(anchor: &Anchor, hash: &Hash) -> EngineError {
    EngineError::NotFound(format!("entry {hash} under anchor {}", anchor.id))
}

fn checked_range(range: Option<Range<usize>>, len: usize) -> Result<Range<usize>> {
    let range = range.unwrap_or(0..len);
    if range.start > range.end || range.end > len {
        return Err(EngineError::RangeOutOfBounds {
            start: range.start,
            end: range.end,
            len,
        });
    }
    Ok(range)
}

impl Drop for LedgerEngine {
    fn drop(&mut self) {
        let failures = self.modules.stop_all(&mut self.services);
        debug!(
            ledger_id = %self.config.id,
            stop_failures = failures.len(),
            "ledger engine stopped"
        );
    }
}

impl fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("id", &self.config.id)
            .field("modules", &self.modules.ids())
            .field("storage", &self.storage.is_some())
            .field("signing", &self.signing_key.is_some())
            .field("acl", &self.acl.is_some())
            .finish_non_exhaustive()
    }
}
