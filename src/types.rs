//! Simulation output types.

use crate::agent::HealthState;
use crate::network::Coord;
use serde::{Deserialize, Serialize};

/// Position and health of one active agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFeature {
    pub id: usize,
    pub coordinates: Coord,
    pub health_state: HealthState,
}

/// Number of agents per health compartment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    #[serde(rename = "S")]
    pub susceptible: usize,
    #[serde(rename = "E")]
    pub exposed: usize,
    #[serde(rename = "I")]
    pub infected: usize,
    #[serde(rename = "R")]
    pub recovered: usize,
    /// Cumulative deaths since the start of the run.
    #[serde(rename = "D")]
    pub deceased: usize,
}

impl Counts {
    pub fn get(&self, state: HealthState) -> usize {
        match state {
            HealthState::Susceptible => self.susceptible,
            HealthState::Exposed => self.exposed,
            HealthState::Infected => self.infected,
            HealthState::Recovered => self.recovered,
            HealthState::Deceased => self.deceased,
        }
    }

    pub fn add(&mut self, state: HealthState) {
        match state {
            HealthState::Susceptible => self.susceptible += 1,
            HealthState::Exposed => self.exposed += 1,
            HealthState::Infected => self.infected += 1,
            HealthState::Recovered => self.recovered += 1,
            HealthState::Deceased => self.deceased += 1,
        }
    }

    pub fn total(&self) -> usize {
        HealthState::ALL.iter().map(|&state| self.get(state)).sum()
    }
}

/// State of the simulation between two ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Active (non-deceased) agents.
    pub agents: Vec<AgentFeature>,
    pub counts: Counts,
    /// Number of ticks advanced so far.
    pub step: usize,
}

/// One successful transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfectionEvent {
    pub transmitter_id: usize,
    pub receiver_id: usize,
    /// Tick during which the transmission happened.
    pub tick: usize,
}
