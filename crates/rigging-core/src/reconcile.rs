//! Detection and cleanup of runs that stopped with an operation in flight.
//!
//! When the journal ends on a `prepared`/`sent` event the submitting
//! identity's sequence number can no longer be trusted, so every registry
//! entry the interrupted run recorded is discarded and redone rather than
//! resubmitting on top of unknown state.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::OrchestrationError;
use crate::journal::{DeploymentJournal, JournalEvent, JournalSnapshot, RunId};
use crate::registry::{AddressRegistry, RegistryStore};
use crate::types::{Address, ModuleKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    None,
    DiscardPartialState {
        /// Interrupted run; `None` when its only journal line was torn
        run: Option<RunId>,
        /// Description of the operation left without an outcome
        open_operation: Option<String>,
        /// Registry entries written by the interrupted run
        recorded: Vec<ModuleKey>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub clean: bool,
    pub action: ReconcileAction,
}

impl Reconciliation {
    fn clean() -> Self {
        Self {
            clean: true,
            action: ReconcileAction::None,
        }
    }
}

/// Registry entries removed while discarding an interrupted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardSummary {
    pub run: Option<RunId>,
    pub removed: Vec<(ModuleKey, Address)>,
}

pub struct NonceReconciler;

impl NonceReconciler {
    /// Inspect the journal tail.
    pub fn reconcile(snapshot: &JournalSnapshot) -> Reconciliation {
        let last = snapshot.last();
        let open = snapshot.torn_tail || last.is_some_and(|e| !e.event.is_terminal());
        if !open {
            return Reconciliation::clean();
        }

        // A torn line after a closed run belongs to a run that recorded nothing
        let run = match last {
            Some(e) if snapshot.torn_tail && closes_run(&e.event) => None,
            Some(e) => Some(e.run.clone()),
            None => None,
        };
        let open_operation = if snapshot.torn_tail {
            None
        } else {
            last.and_then(|e| match &e.event {
                JournalEvent::Prepared { description, .. }
                | JournalEvent::Sent { description, .. } => Some(description.clone()),
                _ => None,
            })
        };
        let recorded = match &run {
            Some(run) => snapshot
                .run_entries(run)
                .filter_map(|e| match &e.event {
                    JournalEvent::Recorded { module_key, .. } => Some(module_key.clone()),
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        };

        Reconciliation {
            clean: false,
            action: ReconcileAction::DiscardPartialState {
                run,
                open_operation,
                recorded,
            },
        }
    }

    /// Apply a `DiscardPartialState` decision.
    ///
    /// Removes the interrupted run's registry entries, persists the registry,
    /// repairs a torn journal tail and appends a `run_discarded` marker so
    /// the next reconcile sees a clean journal.
    pub fn discard(
        reconciliation: &Reconciliation,
        journal: &DeploymentJournal,
        registry: &mut AddressRegistry,
        store: &RegistryStore,
    ) -> Result<Option<DiscardSummary>, OrchestrationError> {
        let ReconcileAction::DiscardPartialState { run, recorded, .. } = &reconciliation.action
        else {
            return Ok(None);
        };

        let removed: Vec<(ModuleKey, Address)> = recorded
            .iter()
            .filter_map(|key| registry.discard(key).map(|addr| (key.clone(), addr)))
            .collect();

        if !removed.is_empty() {
            store.persist(registry)?;
        }
        journal.repair_tail()?;
        journal.append(JournalEvent::RunDiscarded {
            discarded_run: run.clone().unwrap_or_else(|| RunId::new("unknown")),
            removed: removed.iter().map(|(k, _)| k.clone()).collect(),
        })?;

        for (key, address) in &removed {
            tracing::warn!(module = %key, %address, "Discarded registry entry from incomplete run");
        }

        Ok(Some(DiscardSummary {
            run: run.clone(),
            removed,
        }))
    }

    /// Record deployments that were confirmed but never reached the registry.
    ///
    /// A confirmed deployment stays orphaned until a later `recorded` event
    /// names its key. Deployments of a discarded run are not restored, and
    /// neither are keys the registry already holds.
    pub fn restore(
        snapshot: &JournalSnapshot,
        journal: &DeploymentJournal,
        registry: &mut AddressRegistry,
        store: &RegistryStore,
    ) -> Result<Vec<(ModuleKey, Address)>, OrchestrationError> {
        let mut orphans: IndexMap<ModuleKey, (RunId, Address)> = IndexMap::new();
        for entry in &snapshot.entries {
            match &entry.event {
                JournalEvent::Confirmed {
                    target,
                    created: Some(address),
                    ..
                } => {
                    orphans.insert(target.clone(), (entry.run.clone(), address.clone()));
                }
                JournalEvent::Recorded { module_key, .. } => {
                    orphans.shift_remove(module_key);
                }
                JournalEvent::RunDiscarded { discarded_run, .. } => {
                    orphans.retain(|_, (run, _)| run != discarded_run);
                }
                _ => {}
            }
        }

        let mut restored = Vec::new();
        for (key, (_, address)) in orphans {
            if registry.contains(&key) {
                continue;
            }
            registry.put(key.clone(), address.clone())?;
            restored.push((key, address));
        }
        if restored.is_empty() {
            return Ok(restored);
        }

        store.persist(registry)?;
        for (key, address) in &restored {
            journal.append(JournalEvent::Recorded {
                module_key: key.clone(),
                address: address.clone(),
            })?;
            tracing::warn!(
                module = %key,
                %address,
                "Restored confirmed deployment missing from registry"
            );
        }
        Ok(restored)
    }
}

fn closes_run(event: &JournalEvent) -> bool {
    matches!(
        event,
        JournalEvent::RunCompleted | JournalEvent::RunDiscarded { .. }
    )
}
