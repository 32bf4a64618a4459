//! Agent-based SEIRD epidemic simulation over a road network.
//!
//! Agents follow age-dependent daily routines between home, work, school and
//! leisure places, moving one road node per tick along cached shortest
//! paths. Each tick, infected agents may transmit to susceptible agents
//! within a distance threshold.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod manager;
pub mod network;
pub mod routine;
pub mod routing;
pub mod spatial;
pub mod stats;
pub mod types;

pub use agent::{Agent, HealthState};
pub use config::Config;
pub use engine::Engine;
pub use network::{Coord, GeoData, PoiSets, RoadNetwork};
pub use types::{AgentFeature, Counts, InfectionEvent, Snapshot};
