/**
 * agent/stream.rs
 *
 * Borrowed view of one stream of an agent
 */

use super::{Agent, CandidateSnapshot};
use crate::native::types::ComponentState;

#[derive(Clone, Copy)]
pub struct Stream<'a> {
    agent: &'a Agent,
    id: u32,
}

impl<'a> Stream<'a> {
    pub(super) fn new(agent: &'a Agent, id: u32) -> Self {
        Self { agent, id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn gather_candidates(&self) -> bool {
        self.agent.gather_candidates(self.id)
    }

    pub fn attach_receiver(&self, component_id: u32) -> bool {
        self.agent.attach_receiver(self.id, component_id)
    }

    pub fn send(&self, component_id: u32, data: &[u8]) -> i32 {
        self.agent.send(self.id, component_id, data)
    }

    pub fn component_state(&self, component_id: u32) -> ComponentState {
        self.agent.component_state(self.id, component_id)
    }

    pub fn local_candidates(&self, component_id: u32) -> Vec<CandidateSnapshot> {
        self.agent.local_candidates(self.id, component_id)
    }

    pub fn remote_candidates(&self, component_id: u32) -> Vec<CandidateSnapshot> {
        self.agent.remote_candidates(self.id, component_id)
    }
}

impl std::fmt::Debug for Stream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("agent", &self.agent.token())
            .field("id", &self.id)
            .finish()
    }
}
