//! Agents and their SEIRD health state machine.

use crate::config::ModelConfig;
use crate::network::{PoiSets, RoadNetwork};
use crate::routine;
use crate::routing::PathCache;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt};

/// Health compartment of an agent.
///
/// Transitions only follow S -> E -> I -> {R, D}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthState {
    #[serde(rename = "S")]
    Susceptible,
    #[serde(rename = "E")]
    Exposed,
    #[serde(rename = "I")]
    Infected,
    #[serde(rename = "R")]
    Recovered,
    #[serde(rename = "D")]
    Deceased,
}

impl HealthState {
    pub const ALL: [HealthState; 5] = [
        HealthState::Susceptible,
        HealthState::Exposed,
        HealthState::Infected,
        HealthState::Recovered,
        HealthState::Deceased,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            HealthState::Susceptible => "S",
            HealthState::Exposed => "E",
            HealthState::Infected => "I",
            HealthState::Recovered => "R",
            HealthState::Deceased => "D",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_become(&self, next: HealthState) -> bool {
        use HealthState::*;
        matches!(
            (self, next),
            (Susceptible, Exposed)
                | (Exposed, Infected)
                | (Infected, Recovered)
                | (Infected, Deceased)
        )
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything an agent reads or mutates outside itself during a tick.
pub struct StepContext<'a, R: Rng + ?Sized> {
    pub tick: usize,
    pub params: &'a ModelConfig,
    pub network: &'a RoadNetwork,
    pub pois: &'a PoiSets,
    pub cache: &'a mut PathCache,
    pub rng: &'a mut R,
}

/// Person moving between home, work, school and leisure places.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    id: usize,
    health_state: HealthState,
    age: f64,

    home: usize,
    work: Option<usize>,
    school: Option<usize>,

    current_node: usize,
    current_destination: usize,
    /// Nodes left to traverse, excluding `current_node`.
    path: VecDeque<usize>,

    latent_timer: usize,
    infection_timer: usize,
}

impl Agent {
    /// Create a susceptible agent standing at home.
    pub fn new(
        id: usize,
        age: f64,
        home: usize,
        work: Option<usize>,
        school: Option<usize>,
    ) -> Self {
        Self {
            id,
            health_state: HealthState::Susceptible,
            age,
            home,
            work,
            school,
            current_node: home,
            current_destination: home,
            path: VecDeque::new(),
            latent_timer: 0,
            infection_timer: 0,
        }
    }

    /// Set the initial health state, with both timers at zero.
    pub fn with_health_state(mut self, health_state: HealthState) -> Self {
        self.health_state = health_state;
        self.latent_timer = 0;
        self.infection_timer = 0;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn health_state(&self) -> HealthState {
        self.health_state
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn home(&self) -> usize {
        self.home
    }

    pub fn work(&self) -> Option<usize> {
        self.work
    }

    pub fn school(&self) -> Option<usize> {
        self.school
    }

    pub fn current_node(&self) -> usize {
        self.current_node
    }

    pub fn current_destination(&self) -> usize {
        self.current_destination
    }

    pub fn path(&self) -> &VecDeque<usize> {
        &self.path
    }

    pub fn latent_timer(&self) -> usize {
        self.latent_timer
    }

    pub fn infection_timer(&self) -> usize {
        self.infection_timer
    }

    pub fn is_deceased(&self) -> bool {
        self.health_state == HealthState::Deceased
    }

    /// Move a susceptible agent to the exposed compartment.
    ///
    /// Returns `false` and leaves the agent untouched if it was not susceptible.
    pub fn expose(&mut self) -> bool {
        if self.health_state != HealthState::Susceptible {
            return false;
        }
        self.transition(HealthState::Exposed);
        self.latent_timer = 0;
        true
    }

    fn transition(&mut self, next: HealthState) {
        debug_assert!(
            self.health_state.can_become(next),
            "agent {} cannot go from {} to {next}",
            self.id,
            self.health_state
        );
        self.health_state = next;
    }

    /// Advance the agent by one tick: health timers first, then movement.
    pub fn step<R: Rng + ?Sized>(&mut self, ctx: &mut StepContext<'_, R>) {
        self.update_health(ctx.params, &mut *ctx.rng);
        self.update_position(ctx);
    }

    fn update_health<R: Rng + ?Sized>(&mut self, params: &ModelConfig, rng: &mut R) {
        match self.health_state {
            HealthState::Exposed => {
                self.latent_timer += 1;
                if self.latent_timer >= params.latent_period {
                    self.transition(HealthState::Infected);
                    self.latent_timer = 0;
                    self.infection_timer = 0;
                }
            }
            HealthState::Infected => {
                self.infection_timer += 1;
                if self.infection_timer >= params.recovery_period {
                    let draw: f64 = rng.random();
                    self.transition(if draw > params.death_rate {
                        HealthState::Recovered
                    } else {
                        HealthState::Deceased
                    });
                }
            }
            HealthState::Susceptible | HealthState::Recovered | HealthState::Deceased => {}
        }
    }

    fn update_position<R: Rng + ?Sized>(&mut self, ctx: &mut StepContext<'_, R>) {
        if self.path.is_empty() {
            self.current_destination =
                routine::select_destination(self, ctx.tick, ctx.pois, &mut *ctx.rng);
            self.path = ctx
                .cache
                .get_or_compute(ctx.network, self.current_node, self.current_destination)
                .into();
        }
        if let Some(next) = self.path.pop_front() {
            self.current_node = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::network::GeoData;
    use rand_chacha::ChaCha12Rng;

    struct Fixture {
        params: ModelConfig,
        geo: GeoData,
        cache: PathCache,
        rng: ChaCha12Rng,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                params: test_config().model,
                geo: GeoData::grid(6, 6).unwrap(),
                cache: PathCache::new(),
                rng: ChaCha12Rng::seed_from_u64(11),
            }
        }

        fn step(&mut self, agent: &mut Agent, tick: usize) {
            let mut ctx = StepContext {
                tick,
                params: &self.params,
                network: &self.geo.network,
                pois: &self.geo.pois,
                cache: &mut self.cache,
                rng: &mut self.rng,
            };
            agent.step(&mut ctx);
        }
    }

    #[test]
    fn legal_transitions() {
        use HealthState::*;
        assert!(Susceptible.can_become(Exposed));
        assert!(Infected.can_become(Deceased));
        assert!(!Susceptible.can_become(Infected));
        assert!(!Recovered.can_become(Susceptible));
        assert!(!Deceased.can_become(Recovered));
    }

    #[test]
    fn exposed_becomes_infected_after_latent_period() {
        let mut fx = Fixture::new();
        fx.params.latent_period = 3;
        let mut agent = Agent::new(0, 30.0, 0, None, None).with_health_state(HealthState::Exposed);

        for tick in 0..2 {
            fx.step(&mut agent, tick);
            assert_eq!(agent.health_state(), HealthState::Exposed);
            assert_eq!(agent.latent_timer(), tick + 1);
        }
        fx.step(&mut agent, 2);
        assert_eq!(agent.health_state(), HealthState::Infected);
        assert_eq!(agent.latent_timer(), 0);
        assert_eq!(agent.infection_timer(), 0);
    }

    #[test]
    fn infected_resolves_after_recovery_period() {
        let mut fx = Fixture::new();
        fx.params.recovery_period = 2;
        fx.params.death_rate = 0.0;
        let mut agent = Agent::new(0, 30.0, 0, None, None).with_health_state(HealthState::Infected);
        fx.step(&mut agent, 0);
        assert_eq!(agent.health_state(), HealthState::Infected);
        fx.step(&mut agent, 1);
        assert_eq!(agent.health_state(), HealthState::Recovered);

        fx.params.death_rate = 1.0;
        let mut agent = Agent::new(1, 30.0, 0, None, None).with_health_state(HealthState::Infected);
        fx.step(&mut agent, 0);
        fx.step(&mut agent, 1);
        assert!(agent.is_deceased());
    }

    #[test]
    fn expose_only_affects_susceptible() {
        let mut agent = Agent::new(0, 30.0, 0, None, None);
        assert!(agent.expose());
        assert_eq!(agent.health_state(), HealthState::Exposed);
        assert!(!agent.expose());

        let mut recovered =
            Agent::new(1, 30.0, 0, None, None).with_health_state(HealthState::Recovered);
        assert!(!recovered.expose());
        assert_eq!(recovered.health_state(), HealthState::Recovered);
    }

    #[test]
    fn commutes_to_work_one_hop_per_tick() {
        let mut fx = Fixture::new();
        let work = 35;
        let mut agent = Agent::new(0, 30.0, 0, Some(work), None);

        // Monday 9am: head to work across the grid (10 hops).
        fx.step(&mut agent, 9);
        assert_eq!(agent.current_destination(), work);
        assert_eq!(agent.path().len(), 9);
        assert_ne!(agent.current_node(), 0);

        let mut prev = agent.current_node();
        for tick in 10..19 {
            fx.step(&mut agent, tick);
            let moved = fx
                .geo
                .network
                .neighbors(prev)
                .any(|(n, _)| n == agent.current_node());
            assert!(moved, "agent jumped from {prev} to {}", agent.current_node());
            prev = agent.current_node();
        }
        assert_eq!(agent.current_node(), work);
        assert!(agent.path().is_empty());
    }

    #[test]
    fn stays_put_when_destination_reached() {
        let mut fx = Fixture::new();
        let mut agent = Agent::new(0, 30.0, 4, None, None);
        // Monday 8pm: home, already there.
        fx.step(&mut agent, 20);
        assert_eq!(agent.current_node(), 4);
        assert!(agent.path().is_empty());
    }

    #[test]
    fn serializes_states_as_letters() {
        let json = serde_json::to_string(&HealthState::ALL).unwrap();
        assert_eq!(json, r#"["S","E","I","R","D"]"#);
        assert_eq!(HealthState::Deceased.to_string(), "D");
    }
}
