// Path: crates/forge/src/testing/pair.rs

use super::credentials::ValidatorCredentials;
use super::runtime::{ContainerHandle, NetworkHandle, VolumeHandle};
use super::tool::ExternalTool;
use casperlabs_types::config::StartupStrategy;
use casperlabs_types::error::PairError;
use std::fmt;

pub fn node_container_name(node_index: u32) -> String {
    format!("node-{}", node_index)
}

pub fn engine_container_name(node_index: u32) -> String {
    format!("execution-engine-{}", node_index)
}

/// Selects one process of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Node,
    Engine,
}

impl ProcessKind {
    pub fn container_name(self, node_index: u32) -> String {
        match self {
            ProcessKind::Node => node_container_name(node_index),
            ProcessKind::Engine => engine_container_name(node_index),
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Node => f.write_str("node"),
            ProcessKind::Engine => f.write_str("engine"),
        }
    }
}

/// Lifecycle of a pair. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Uninitialized,
    NetworkReady,
    VolumeReady,
    EngineStarting,
    EngineRunning,
    NodeStarting,
    NodeRunning,
    ShuttingDown,
    Terminated,
}

impl PairState {
    pub fn can_transition_to(self, next: PairState) -> bool {
        use PairState::*;
        match (self, next) {
            (Uninitialized, NetworkReady) => true,
            (NetworkReady, VolumeReady) => true,
            (VolumeReady, EngineStarting) => true,
            // Engine pairing disabled.
            (VolumeReady, NodeStarting) => true,
            (EngineStarting, EngineRunning) => true,
            (EngineRunning, NodeStarting) => true,
            (NodeStarting, NodeRunning) => true,
            (Uninitialized | ShuttingDown | Terminated, ShuttingDown) => false,
            (_, ShuttingDown) => true,
            (ShuttingDown, Terminated) => true,
            _ => false,
        }
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: PairState) -> Result<(), PairError> {
        if !self.can_transition_to(next) {
            return Err(PairError::InvalidTransition {
                from: format!("{:?}", self),
                to: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_running(self) -> bool {
        matches!(self, PairState::EngineRunning | PairState::NodeRunning)
    }
}

/// One logical test node: a ledger node and its execution engine.
#[derive(Debug)]
pub struct ProcessPair {
    pub(crate) node_index: u32,
    pub(crate) network: NetworkHandle,
    pub(crate) volume: Option<VolumeHandle>,
    /// Per-node volumes are removed with the pair; shared ones are not.
    pub(crate) volume_owned: bool,
    pub(crate) node: Option<ContainerHandle>,
    pub(crate) engine: Option<ContainerHandle>,
    pub(crate) credentials: ValidatorCredentials,
    pub(crate) state: PairState,
    pub(crate) strategy: StartupStrategy,
    pub(crate) tool: Option<ExternalTool>,
}

impl ProcessPair {
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    pub fn volume(&self) -> Option<&VolumeHandle> {
        self.volume.as_ref()
    }

    pub fn node(&self) -> Option<&ContainerHandle> {
        self.node.as_ref()
    }

    pub fn engine(&self) -> Option<&ContainerHandle> {
        self.engine.as_ref()
    }

    pub fn handle(&self, kind: ProcessKind) -> Option<&ContainerHandle> {
        match kind {
            ProcessKind::Node => self.node(),
            ProcessKind::Engine => self.engine(),
        }
    }

    pub fn credentials(&self) -> &ValidatorCredentials {
        &self.credentials
    }

    pub fn state(&self) -> PairState {
        self.state
    }

    pub fn strategy(&self) -> StartupStrategy {
        self.strategy
    }

    /// `true` when every present handle sits on the pair's network and volume.
    pub fn is_consistently_attached(&self) -> bool {
        let volume = self.volume.as_ref().map(|v| v.name.as_str());
        [self.node.as_ref(), self.engine.as_ref()]
            .into_iter()
            .flatten()
            .all(|h| {
                h.network.as_deref() == Some(self.network.name.as_str())
                    && h.volume.as_deref() == volume
            })
    }
}

impl fmt::Display for ProcessPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ProcessPair(node-{})>", self.node_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_derive_from_index() {
        assert_eq!(node_container_name(3), "node-3");
        assert_eq!(engine_container_name(3), "execution-engine-3");
        assert_eq!(ProcessKind::Engine.container_name(0), "execution-engine-0");
    }

    #[test]
    fn full_lifecycle_is_accepted() {
        use PairState::*;
        let mut state = Uninitialized;
        for next in [
            NetworkReady,
            VolumeReady,
            EngineStarting,
            EngineRunning,
            NodeStarting,
            NodeRunning,
            ShuttingDown,
            Terminated,
        ] {
            state.advance(next).unwrap();
        }
        assert_eq!(state, Terminated);
    }

    #[test]
    fn shutting_down_reachable_after_network_ready() {
        use PairState::*;
        for from in [
            NetworkReady,
            VolumeReady,
            EngineStarting,
            EngineRunning,
            NodeStarting,
            NodeRunning,
        ] {
            assert!(from.can_transition_to(ShuttingDown), "{:?}", from);
        }
        assert!(!Uninitialized.can_transition_to(ShuttingDown));
    }

    #[test]
    fn terminated_is_absorbing() {
        use PairState::*;
        for next in [
            Uninitialized,
            NetworkReady,
            EngineRunning,
            NodeRunning,
            ShuttingDown,
            Terminated,
        ] {
            let mut state = Terminated;
            assert!(state.advance(next).is_err());
            assert_eq!(state, Terminated);
        }
    }

    #[test]
    fn skipping_the_engine_is_allowed_only_from_volume_ready() {
        use PairState::*;
        assert!(VolumeReady.can_transition_to(NodeStarting));
        assert!(!NetworkReady.can_transition_to(NodeStarting));
        assert!(!EngineStarting.can_transition_to(NodeStarting));
    }
}
