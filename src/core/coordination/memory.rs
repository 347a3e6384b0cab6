// src/core/coordination/memory.rs

//! An in-process coordination service. Backs single-node deployments and the
//! test suite; the semantics (ephemeral sequential children, session loss
//! dropping a session's nodes) match the production coordination service.

use super::{CoordinationClient, SEQUENCE_LEN, SessionState};
use crate::core::errors::OtterError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Tree {
    /// Full node path -> owning session id.
    nodes: BTreeMap<String, u64>,
    /// Per-parent sequence counters.
    counters: HashMap<String, u64>,
}

struct Shared {
    tree: Mutex<Tree>,
    states: Mutex<HashMap<u64, SessionState>>,
    next_session: AtomicU64,
}

/// One session against the shared in-memory tree. `new_session` yields
/// another handle to the same tree with an independent session, which is how
/// tests simulate multiple cluster members.
#[derive(Clone)]
pub struct InMemoryCoordination {
    shared: Arc<Shared>,
    session: u64,
}

impl Default for InMemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordination {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            tree: Mutex::new(Tree::default()),
            states: Mutex::new(HashMap::from([(1, SessionState::Connected)])),
            next_session: AtomicU64::new(2),
        });
        Self { shared, session: 1 }
    }

    /// A new, independent session sharing this tree.
    pub fn new_session(&self) -> Self {
        let session = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        self.shared
            .states
            .lock()
            .insert(session, SessionState::Connected);
        Self {
            shared: self.shared.clone(),
            session,
        }
    }

    /// Expires this session: its state becomes `Lost` and every ephemeral
    /// node it owns disappears from the tree.
    pub fn expire_session(&self) {
        self.shared
            .states
            .lock()
            .insert(self.session, SessionState::Lost);
        self.shared
            .tree
            .lock()
            .nodes
            .retain(|_, owner| *owner != self.session);
    }

    pub fn set_session_state(&self, state: SessionState) {
        self.shared.states.lock().insert(self.session, state);
    }

    fn check_connected(&self) -> Result<(), OtterError> {
        match self.session_state() {
            SessionState::Connected => Ok(()),
            _ => Err(OtterError::SessionLost),
        }
    }
}

#[async_trait]
impl CoordinationClient for InMemoryCoordination {
    async fn create_ephemeral_sequential(&self, prefix: &str) -> Result<String, OtterError> {
        self.check_connected()?;
        let (parent, _) = prefix
            .rsplit_once('/')
            .ok_or_else(|| OtterError::InvalidRequest(format!("bad node prefix '{prefix}'")))?;
        let mut tree = self.shared.tree.lock();
        let counter = tree.counters.entry(parent.to_string()).or_insert(0);
        let sequence = *counter;
        *counter += 1;
        let full = format!("{prefix}{sequence:0width$}", width = SEQUENCE_LEN);
        tree.nodes.insert(full.clone(), self.session);
        let name = full[parent.len() + 1..].to_string();
        Ok(name)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, OtterError> {
        self.check_connected()?;
        let prefix = format!("{path}/");
        let tree = self.shared.tree.lock();
        Ok(tree
            .nodes
            .keys()
            .filter_map(|full| full.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<(), OtterError> {
        self.check_connected()?;
        self.shared.tree.lock().nodes.remove(path);
        Ok(())
    }

    fn session_state(&self) -> SessionState {
        self.shared
            .states
            .lock()
            .get(&self.session)
            .copied()
            .unwrap_or(SessionState::Lost)
    }
}
