use crate::agent::{Agent, HealthState, StepContext};
use crate::config::Config;
use crate::network::GeoData;
use crate::routine::{SCHOOL_AGES, WORK_AGES};
use crate::routing::PathCache;
use crate::spatial::SpatialGrid;
use crate::types::{AgentFeature, Counts, InfectionEvent, Snapshot};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

const MAX_AGE: f64 = 80.0;

/// Simulation engine.
///
/// Owns the configuration, road network, agent population, infection log and
/// random number generator, and provides methods to initialize, advance,
/// observe, save, and load simulations.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    geo: GeoData,
    agents: Vec<Agent>,
    events: Vec<InfectionEvent>,
    tick: usize,
    n_deceased: usize,
    rng: ChaCha12Rng,

    // Pure memo over a static network, rebuilt lazily after loading.
    #[serde(skip)]
    path_cache: PathCache,
}

impl Engine {
    /// Load the geographic data for `cfg.network.place` and create a random
    /// initial population.
    pub fn initialize<P: AsRef<Path>>(cfg: Config, data_dir: P) -> Result<Self> {
        let geo = GeoData::load(&cfg.network.place, data_dir)
            .context("failed to load geographic data")?;
        let seed = cfg.init.seed;
        Self::generate_initial_condition(cfg, geo, seed)
    }

    /// Create a new `Engine` with a random initial population.
    ///
    /// Homes are uniform over all nodes and ages uniform in `[0, 80)`.
    /// School-age agents get a school and working-age agents a workplace.
    /// The first 1% of agents start infected.
    pub fn generate_initial_condition(
        cfg: Config,
        geo: GeoData,
        seed: Option<u64>,
    ) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let mut rng = match seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let home_dist = Uniform::new(0, geo.network.node_count())?;
        let age_dist = Uniform::new(0.0, MAX_AGE)?;

        let n_agents = cfg.init.num_agents;
        let n_infected = n_agents / 100;

        let mut agents = Vec::with_capacity(n_agents);
        for id in 0..n_agents {
            let home = home_dist.sample(&mut rng);
            let age = age_dist.sample(&mut rng);

            let (work, school) = if SCHOOL_AGES.contains(&age) {
                let school = geo.pois.education.choose(&mut rng).copied();
                (None, Some(school.unwrap_or(home)))
            } else if WORK_AGES.contains(&age) {
                let work = geo.pois.work.choose(&mut rng).copied();
                (Some(work.unwrap_or(home)), None)
            } else {
                (None, None)
            };

            let mut agent = Agent::new(id, age, home, work, school);
            if id < n_infected {
                agent = agent.with_health_state(HealthState::Infected);
            }
            agents.push(agent);
        }

        Ok(Self::assemble(cfg, geo, agents, rng))
    }

    /// Create a new `Engine` around an explicit population.
    pub fn from_population(
        cfg: Config,
        geo: GeoData,
        agents: Vec<Agent>,
        seed: u64,
    ) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let n_nodes = geo.network.node_count();
        let mut ids = HashSet::with_capacity(agents.len());
        for agent in &agents {
            if !ids.insert(agent.id()) {
                bail!("duplicate agent id {}", agent.id());
            }
            let nodes = [Some(agent.home()), agent.work(), agent.school()];
            if let Some(node) = nodes.into_iter().flatten().find(|&node| node >= n_nodes) {
                bail!(
                    "agent {} references node {node} outside 0..{n_nodes}",
                    agent.id()
                );
            }
            if agent.is_deceased() {
                bail!("agent {} is already deceased", agent.id());
            }
        }

        let rng = ChaCha12Rng::seed_from_u64(seed);
        Ok(Self::assemble(cfg, geo, agents, rng))
    }

    fn assemble(cfg: Config, geo: GeoData, agents: Vec<Agent>, rng: ChaCha12Rng) -> Self {
        Self {
            cfg,
            geo,
            agents,
            events: Vec::new(),
            tick: 0,
            n_deceased: 0,
            rng,
            path_cache: PathCache::new(),
        }
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn geo(&self) -> &GeoData {
        &self.geo
    }

    /// Active agents, in creation order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Number of ticks advanced so far.
    pub fn tick(&self) -> usize {
        self.tick
    }

    /// Transmission log, in the order transmissions happened.
    pub fn infection_events(&self) -> &[InfectionEvent] {
        &self.events
    }

    pub fn path_cache(&self) -> &PathCache {
        &self.path_cache
    }

    /// Whether the run has reached its configured length.
    pub fn is_finished(&self) -> bool {
        self.cfg.max_ticks().is_some_and(|max| self.tick >= max)
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        let mut ctx = StepContext {
            tick: self.tick,
            params: &self.cfg.model,
            network: &self.geo.network,
            pois: &self.geo.pois,
            cache: &mut self.path_cache,
            rng: &mut self.rng,
        };
        for agent in &mut self.agents {
            agent.step(&mut ctx);
        }

        let n_new = self.check_infections();
        let n_dead = self.remove_deceased();

        log::debug!(
            "tick {}: {n_new} transmissions, {n_dead} deaths, {} cached paths ({} hits, {} misses)",
            self.tick,
            self.path_cache.len(),
            self.path_cache.hits(),
            self.path_cache.misses()
        );
        self.tick += 1;
    }

    /// Run transmission between infected and susceptible agents that are
    /// within the distance threshold of each other.
    ///
    /// Susceptible positions are indexed once per tick, before any exposure,
    /// so a receiver reached by several transmitters may log several events
    /// even though it is only exposed once. Events carry the step count the
    /// engine reaches at the end of this tick, matching the `step` of the
    /// next snapshot.
    fn check_infections(&mut self) -> usize {
        let infected = self.indices_in(HealthState::Infected);
        let susceptible = self.indices_in(HealthState::Susceptible);
        if infected.is_empty() || susceptible.is_empty() {
            return 0;
        }

        let network = &self.geo.network;
        let threshold = self.cfg.model.distance_threshold;
        let positions = susceptible
            .iter()
            .map(|&i_agt| network.coordinates(self.agents[i_agt].current_node()))
            .collect();
        let grid = SpatialGrid::new(positions, threshold);

        let mut n_new = 0;
        for &i_inf in &infected {
            let transmitter = &self.agents[i_inf];
            let transmitter_id = transmitter.id();
            let center = network.coordinates(transmitter.current_node());

            for i_sus in grid.query_radius(center, threshold) {
                if self.rng.random::<f64>() >= self.cfg.model.infection_prob {
                    continue;
                }
                let receiver = &mut self.agents[susceptible[i_sus]];
                receiver.expose();
                self.events.push(InfectionEvent {
                    transmitter_id,
                    receiver_id: receiver.id(),
                    tick: self.tick + 1,
                });
                n_new += 1;
            }
        }

        n_new
    }

    fn indices_in(&self, state: HealthState) -> Vec<usize> {
        self.agents
            .iter()
            .enumerate()
            .filter(|(_, agt)| agt.health_state() == state)
            .map(|(i_agt, _)| i_agt)
            .collect()
    }

    fn remove_deceased(&mut self) -> usize {
        let n_before = self.agents.len();
        self.agents.retain(|agt| !agt.is_deceased());
        let n_dead = n_before - self.agents.len();
        self.n_deceased += n_dead;
        n_dead
    }

    /// Current state of the simulation.
    ///
    /// `D` in the counts is the cumulative number of deaths; deceased agents
    /// are no longer listed.
    pub fn get_state(&self) -> Snapshot {
        let mut counts = Counts::default();
        let agents = self
            .agents
            .iter()
            .map(|agt| {
                counts.add(agt.health_state());
                AgentFeature {
                    id: agt.id(),
                    coordinates: self.geo.network.coordinates(agt.current_node()),
                    health_state: agt.health_state(),
                }
            })
            .collect();
        counts.deceased += self.n_deceased;

        Snapshot {
            agents,
            counts,
            step: self.tick,
        }
    }

    /// Perform the simulation and save the resulting snapshots to a binary file.
    ///
    /// Each save advances the engine by up to `steps_per_save` ticks and then
    /// encodes a [`Snapshot`]. Stops early once the run is finished.
    /// Returns the number of snapshots written.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<usize> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let saves_per_file = self.cfg.output.saves_per_file;
        let mut n_saves = 0;
        for i_save in 0..saves_per_file {
            if self.is_finished() {
                log::info!("reached configured run length at tick {}", self.tick);
                break;
            }
            for _ in 0..self.cfg.output.steps_per_save {
                if self.is_finished() {
                    break;
                }
                self.step();
            }

            encode::write(&mut writer, &self.get_state()).context("failed to serialize state")?;
            n_saves += 1;

            let progress = 100.0 * (i_save + 1) as f64 / saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(n_saves)
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }
}
