use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tel_services::ServiceRegistry;
use tel_types::{Hash, Record};
use tracing::{debug, info, warn};

use crate::error::{LifecyclePhase, ModuleError};
use crate::module::{LedgerModule, ModuleContext, ModuleState};

/// Snapshot of a registered module's identity and lifecycle state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleMeta {
    pub id: String,
    pub version: String,
    pub state: ModuleState,
}

struct Slot {
    module: Box<dyn LedgerModule>,
    config: Value,
    state: ModuleState,
}

/// Ordered set of modules owned by one ledger.
///
/// Registration order is significant: hooks run in it, and a module may only
/// depend on modules registered before it.
pub struct ModuleRegistry {
    ledger_id: String,
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// Register `module` with an empty configuration.
    pub fn register(&mut self, module: Box<dyn LedgerModule>) -> Result<(), ModuleError> {
        self.register_with_config(module, Value::Object(serde_json::Map::new()))
    }

    /// Register `module`, keeping `config` for its lifecycle hooks.
    ///
    /// Either the module is added in `Registered` state or the registry is
    /// left untouched.
    pub fn register_with_config(
        &mut self,
        module: Box<dyn LedgerModule>,
        config: Value,
    ) -> Result<(), ModuleError> {
        let id = module.id().to_owned();
        if self.index.contains_key(&id) {
            return Err(ModuleError::DuplicateModuleId(id));
        }
        if let Some(missing) = module
            .depends_on()
            .iter()
            .find(|dep| !self.index.contains_key(dep.as_str()))
        {
            return Err(ModuleError::MissingDependency {
                module: id,
                dependency: missing.clone(),
            });
        }

        debug!(
            ledger_id = %self.ledger_id,
            module = %id,
            version = module.version(),
            "module registered"
        );
        self.index.insert(id, self.slots.len());
        self.slots.push(Slot {
            module,
            config,
            state: ModuleState::Registered,
        });
        Ok(())
    }

    /// Initialise every `Registered` module in order. Stops at the first failure.
    pub fn init_all(&mut self, services: &mut ServiceRegistry) -> Result<(), ModuleError> {
        self.transition(
            services,
            LifecyclePhase::Init,
            ModuleState::Registered,
            ModuleState::Initialized,
        )
    }

    /// Start every `Initialized` module in order. Stops at the first failure.
    pub fn start_all(&mut self, services: &mut ServiceRegistry) -> Result<(), ModuleError> {
        self.transition(
            services,
            LifecyclePhase::Start,
            ModuleState::Initialized,
            ModuleState::Started,
        )
    }

    /// Tear down every `Initialized` or `Started` module in reverse order,
    /// best effort.
    ///
    /// Only `Started` modules get their `stop` hook. Services any torn-down
    /// module published are withdrawn. Failures are logged and returned;
    /// every such module still ends up `Stopped`.
    pub fn stop_all(&mut self, services: &mut ServiceRegistry) -> Vec<ModuleError> {
        let mut failures = Vec::new();
        for slot in self.slots.iter_mut().rev() {
            if !matches!(slot.state, ModuleState::Initialized | ModuleState::Started) {
                continue;
            }
            let id = slot.module.id().to_owned();
            if slot.state == ModuleState::Started {
                let mut ctx = ModuleContext {
                    ledger_id: &self.ledger_id,
                    module_id: &id,
                    config: &slot.config,
                    services: &mut *services,
                };
                if let Err(e) = slot.module.stop(&mut ctx) {
                    warn!(
                        ledger_id = %self.ledger_id,
                        module = %id,
                        error = %e,
                        "module stop failed"
                    );
                    failures.push(ModuleError::lifecycle(&id, LifecyclePhase::Stop, e));
                }
            }
            services.remove_owned_by(&id);
            slot.state = ModuleState::Stopped;
            info!(ledger_id = %self.ledger_id, module = %id, "module stopped");
        }
        failures
    }

    fn transition(
        &mut self,
        services: &mut ServiceRegistry,
        phase: LifecyclePhase,
        from: ModuleState,
        to: ModuleState,
    ) -> Result<(), ModuleError> {
        for slot in self.slots.iter_mut().filter(|s| s.state == from) {
            let id = slot.module.id().to_owned();
            let mut ctx = ModuleContext {
                ledger_id: &self.ledger_id,
                module_id: &id,
                config: &slot.config,
                services: &mut *services,
            };
            let result = match phase {
                LifecyclePhase::Init => slot.module.init(&mut ctx),
                LifecyclePhase::Start => slot.module.start(&mut ctx),
                LifecyclePhase::Stop => slot.module.stop(&mut ctx),
            };
            result.map_err(|e| ModuleError::lifecycle(&id, phase, e))?;
            slot.state = to;
            info!(
                ledger_id = %self.ledger_id,
                module = %id,
                phase = %phase,
                state = %to,
                "module lifecycle transition"
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hook dispatch
    // -----------------------------------------------------------------------

    /// Run every `before_append` hook in registration order.
    ///
    /// The first rejection aborts; later hooks do not run.
    pub fn before_append(&self, record: &mut Record) -> Result<(), ModuleError> {
        for slot in &self.slots {
            slot.module.before_append(record)?;
        }
        Ok(())
    }

    /// Run every `after_append` hook, collecting failures instead of stopping.
    pub fn after_append(&self, record: &Record, hash: &Hash) -> Vec<ModuleError> {
        self.slots
            .iter()
            .filter_map(|slot| slot.module.after_append(record, hash).err())
            .collect()
    }

    /// Run every module's stateless validation; the first failure wins.
    pub fn validate(&self, record: &Record) -> Result<(), ModuleError> {
        for slot in &self.slots {
            slot.module.validate(record)?;
        }
        Ok(())
    }

    /// Narrow `records` with module queries.
    ///
    /// A record survives iff every module claiming its stream keeps it.
    /// Records in unclaimed streams pass through. Input order is preserved.
    pub fn narrow<'a>(&self, records: Vec<&'a Record>, filters: &Value) -> Vec<&'a Record> {
        let mut survivors = records;
        for slot in &self.slots {
            let module = slot.module.as_ref();
            let claimed: Vec<usize> = survivors
                .iter()
                .enumerate()
                .filter(|(_, r)| module.claims_stream(&r.stream))
                .map(|(i, _)| i)
                .collect();
            if claimed.is_empty() {
                continue;
            }
            let input: Vec<&'a Record> = claimed.iter().map(|&i| survivors[i]).collect();
            let mut kept = module.query(&input, filters).into_iter().peekable();

            // `query` returns a subsequence of its input, so one forward walk
            // maps every kept record back to its position.
            let mut dropped = HashSet::new();
            for i in claimed {
                if kept.peek().is_some_and(|r| *r == survivors[i]) {
                    kept.next();
                } else {
                    dropped.insert(i);
                }
            }
            survivors = survivors
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !dropped.contains(i))
                .map(|(_, r)| r)
                .collect();
        }
        survivors
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&dyn LedgerModule> {
        self.index.get(id).map(|&i| self.slots[i].module.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.index.get(id).map(|&i| self.slots[i].state)
    }

    /// Module ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.module.id()).collect()
    }

    pub fn metadata(&self) -> Vec<ModuleMeta> {
        self.slots
            .iter()
            .map(|s| ModuleMeta {
                id: s.module.id().to_owned(),
                version: s.module.version().to_owned(),
                state: s.state,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LedgerModule> {
        self.slots.iter().map(|s| s.module.as_ref())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("ledger_id", &self.ledger_id)
            .field("modules", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    /// Configurable test module.
    struct Stub {
        id: String,
        deps: Vec<String>,
        stream: Option<&'static str>,
        reject: bool,
        fail_after: bool,
        fail_init: bool,
        fail_start: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Stub {
        fn new(id: &str) -> Self {
            Self {
                id: id.into(),
                deps: Vec::new(),
                stream: None,
                reject: false,
                fail_after: false,
                fail_init: false,
                fail_start: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl LedgerModule for Stub {
        fn id(&self) -> &str {
            &self.id
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn depends_on(&self) -> &[String] {
            &self.deps
        }

        fn claims_stream(&self, stream: &str) -> bool {
            self.stream == Some(stream)
        }

        fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
            if self.fail_init {
                return Err(ModuleError::rejected(&self.id, "cannot init"));
            }
            ctx.provide(format!("{}.marker", self.id), self.id.clone())
                .map_err(|e| ModuleError::lifecycle(&self.id, LifecyclePhase::Init, e))
        }

        fn start(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
            if self.fail_start {
                return Err(ModuleError::rejected(&self.id, "cannot start"));
            }
            Ok(())
        }

        fn before_append(&self, record: &mut Record) -> Result<(), ModuleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(ModuleError::rejected(&self.id, "always rejects"));
            }
            record.set_payload_field(format!("seen_by_{}", self.id), json!(true));
            Ok(())
        }

        fn after_append(&self, _record: &Record, _hash: &Hash) -> Result<(), ModuleError> {
            if self.fail_after {
                return Err(ModuleError::rejected(&self.id, "notification failed"));
            }
            Ok(())
        }

        fn validate(&self, _record: &Record) -> Result<(), ModuleError> {
            if self.reject {
                return Err(ModuleError::rejected(&self.id, "always rejects"));
            }
            Ok(())
        }

        fn query<'a>(&self, records: &[&'a Record], filters: &Value) -> Vec<&'a Record> {
            let wanted = filters.get(&self.id).and_then(Value::as_str);
            records
                .iter()
                .copied()
                .filter(|r| wanted.map_or(true, |w| r.payload_str("tag") == Some(w)))
                .collect()
        }
    }

    fn record(id: &str, stream: &str, tag: &str) -> Record {
        Record::new(id, stream, 1000, json!({"tag": tag}))
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let mut registry = ModuleRegistry::new("main");
        registry.register(Box::new(Stub::new("proof"))).unwrap();

        let mut second = Stub::new("proof");
        second.reject = true;
        let err = registry.register(Box::new(second)).unwrap_err();

        assert_eq!(err, ModuleError::DuplicateModuleId("proof".into()));
        assert_eq!(registry.len(), 1);
        let mut rec = record("r", "s", "x");
        assert!(registry.before_append(&mut rec).is_ok());
    }

    #[test]
    fn missing_dependency_leaves_registry_unchanged() {
        let mut registry = ModuleRegistry::new("main");
        let mut dependent = Stub::new("audit");
        dependent.deps = vec!["proof".into()];

        let err = registry.register(Box::new(dependent)).unwrap_err();
        assert_eq!(
            err,
            ModuleError::MissingDependency {
                module: "audit".into(),
                dependency: "proof".into()
            }
        );
        assert!(registry.is_empty());

        registry.register(Box::new(Stub::new("proof"))).unwrap();
        let mut dependent = Stub::new("audit");
        dependent.deps = vec!["proof".into()];
        registry.register(Box::new(dependent)).unwrap();
        assert_eq!(registry.ids(), vec!["proof", "audit"]);
    }

    #[test]
    fn lifecycle_moves_forward_and_publishes_services() {
        let mut registry = ModuleRegistry::new("main");
        let mut services = ServiceRegistry::new();
        registry.register(Box::new(Stub::new("a"))).unwrap();
        registry.register(Box::new(Stub::new("b"))).unwrap();
        assert_eq!(registry.state("a"), Some(ModuleState::Registered));

        registry.init_all(&mut services).unwrap();
        assert_eq!(registry.state("a"), Some(ModuleState::Initialized));
        assert_eq!(services.info("a.marker").unwrap().owner.as_deref(), Some("a"));

        registry.start_all(&mut services).unwrap();
        assert!(registry
            .metadata()
            .iter()
            .all(|m| m.state == ModuleState::Started));

        let failures = registry.stop_all(&mut services);
        assert!(failures.is_empty());
        assert_eq!(registry.state("b"), Some(ModuleState::Stopped));
        assert!(services.is_empty());
    }

    #[test]
    fn start_failure_is_reported_with_phase() {
        let mut registry = ModuleRegistry::new("main");
        let mut services = ServiceRegistry::new();
        let mut broken = Stub::new("broken");
        broken.fail_start = true;
        registry.register(Box::new(broken)).unwrap();

        registry.init_all(&mut services).unwrap();
        let err = registry.start_all(&mut services).unwrap_err();
        assert!(matches!(
            err,
            ModuleError::Lifecycle {
                phase: LifecyclePhase::Start,
                ref module,
                ..
            } if module == "broken"
        ));
        assert_eq!(registry.state("broken"), Some(ModuleState::Initialized));
    }

    #[test]
    fn teardown_after_partial_init_withdraws_services() {
        let mut registry = ModuleRegistry::new("main");
        let mut services = ServiceRegistry::new();
        let mut broken = Stub::new("b");
        broken.fail_init = true;
        registry.register(Box::new(Stub::new("a"))).unwrap();
        registry.register(Box::new(broken)).unwrap();

        let err = registry.init_all(&mut services).unwrap_err();
        assert!(matches!(err, ModuleError::Lifecycle { phase: LifecyclePhase::Init, .. }));
        assert!(services.contains("a.marker"));

        let failures = registry.stop_all(&mut services);
        assert!(failures.is_empty());
        assert!(services.is_empty());
        assert_eq!(registry.state("a"), Some(ModuleState::Stopped));
        assert_eq!(registry.state("b"), Some(ModuleState::Registered));
    }

    #[test]
    fn first_rejection_stops_later_hooks() {
        let mut registry = ModuleRegistry::new("main");
        let mut first = Stub::new("first");
        first.reject = true;
        let second = Stub::new("second");
        let second_calls = Arc::clone(&second.calls);
        registry.register(Box::new(first)).unwrap();
        registry.register(Box::new(second)).unwrap();

        let mut rec = record("r", "s", "x");
        let err = registry.before_append(&mut rec).unwrap_err();
        assert_eq!(err, ModuleError::rejected("first", "always rejects"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let mut registry = ModuleRegistry::new("main");
        registry.register(Box::new(Stub::new("a"))).unwrap();
        registry.register(Box::new(Stub::new("b"))).unwrap();

        let mut rec = record("r", "s", "x");
        registry.before_append(&mut rec).unwrap();
        assert_eq!(rec.payload_field("seen_by_a"), Some(&json!(true)));
        assert_eq!(rec.payload_field("seen_by_b"), Some(&json!(true)));
    }

    #[test]
    fn after_append_failures_are_collected() {
        let mut registry = ModuleRegistry::new("main");
        let mut noisy = Stub::new("noisy");
        noisy.fail_after = true;
        registry.register(Box::new(noisy)).unwrap();
        registry.register(Box::new(Stub::new("quiet"))).unwrap();

        let failures = registry.after_append(&record("r", "s", "x"), &Hash::zero());
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn narrowing_intersects_claiming_modules() {
        let mut registry = ModuleRegistry::new("main");
        let mut alpha = Stub::new("alpha");
        alpha.stream = Some("proofs");
        let mut beta = Stub::new("beta");
        beta.stream = Some("proofs");
        registry.register(Box::new(alpha)).unwrap();
        registry.register(Box::new(beta)).unwrap();

        let records = [
            record("p1", "proofs", "x"),
            record("p2", "proofs", "y"),
            record("a1", "assets", "z"),
        ];
        let refs: Vec<&Record> = records.iter().collect();

        let kept = registry.narrow(refs.clone(), &json!({"alpha": "x"}));
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "a1"]);

        let kept = registry.narrow(refs, &json!({"alpha": "x", "beta": "y"}));
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn get_returns_registered_module() {
        let mut registry = ModuleRegistry::new("main");
        registry.register(Box::new(Stub::new("a"))).unwrap();
        assert_eq!(registry.get("a").map(|m| m.version()), Some("0.0.1"));
        assert!(registry.get("missing").is_none());
        assert!(registry.contains("a"));
    }
}
