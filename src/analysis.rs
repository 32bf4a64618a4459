use crate::agent::HealthState;
use crate::stats::Accumulator;
use crate::types::{Counts, Snapshot};
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, snapshot: &Snapshot) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Mean and standard deviation of each compartment count over all snapshots.
pub struct MeanCounts {
    acc_vec: Vec<Accumulator>,
}

impl MeanCounts {
    pub fn new() -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(HealthState::ALL.len(), Accumulator::new);
        Self { acc_vec }
    }
}

impl Obs for MeanCounts {
    fn update(&mut self, snapshot: &Snapshot) -> Result<()> {
        for (state, acc) in HealthState::ALL.iter().zip(self.acc_vec.iter_mut()) {
            acc.add(snapshot.counts.get(*state) as f64);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let reports: serde_json::Map<_, _> = HealthState::ALL
            .iter()
            .zip(self.acc_vec.iter())
            .map(|(state, acc)| (state.label().to_string(), serde_json::json!(acc.report())))
            .collect();
        serde_json::json!({ "mean_counts": reports })
    }
}

/// Largest number of simultaneously infected agents and when it happened.
pub struct Peak {
    infected: usize,
    step: Option<usize>,
}

impl Peak {
    pub fn new() -> Self {
        Self {
            infected: 0,
            step: None,
        }
    }
}

impl Obs for Peak {
    fn update(&mut self, snapshot: &Snapshot) -> Result<()> {
        if self.step.is_none() || snapshot.counts.infected > self.infected {
            self.infected = snapshot.counts.infected;
            self.step = Some(snapshot.step);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "peak": { "infected": self.infected, "step": self.step } })
    }
}

/// Counts at the last snapshot and the fraction of agents ever infected.
pub struct Outcome {
    last: Option<(usize, Counts)>,
}

impl Outcome {
    pub fn new() -> Self {
        Self { last: None }
    }
}

impl Obs for Outcome {
    fn update(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.last = Some((snapshot.step, snapshot.counts));
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let Some((step, counts)) = self.last else {
            return serde_json::json!({ "outcome": null });
        };
        let total = counts.total();
        let attack_rate = if total > 0 {
            (total - counts.susceptible) as f64 / total as f64
        } else {
            f64::NAN
        };
        serde_json::json!({
            "outcome": { "step": step, "counts": counts, "attack_rate": attack_rate }
        })
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
    n_snapshots: usize,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(MeanCounts::new()),
            Box::new(Peak::new()),
            Box::new(Outcome::new()),
        ];
        Self {
            obs_ptr_vec,
            n_snapshots: 0,
        }
    }

    pub fn add_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(snapshot).context("failed to update observable")?;
        }
        self.n_snapshots += 1;
        Ok(())
    }

    /// Feed every snapshot stored in a trajectory file.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        while !reader.fill_buf().context("failed to read file")?.is_empty() {
            let snapshot: Snapshot =
                decode::from_read(&mut reader).context("failed to read snapshot")?;
            self.add_snapshot(&snapshot)?;
        }
        Ok(())
    }

    pub fn n_snapshots(&self) -> usize {
        self.n_snapshots
    }

    pub fn reports(&self) -> Vec<serde_json::Value> {
        self.obs_ptr_vec.iter().map(|obs| obs.report()).collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P, extra: serde_json::Value) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);

        let mut reports = self.reports();
        reports.push(extra);
        serde_json::to_writer_pretty(writer, &reports).context("failed to serialize results")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(step: usize, s: usize, i: usize, r: usize, d: usize) -> Snapshot {
        Snapshot {
            agents: Vec::new(),
            counts: Counts {
                susceptible: s,
                exposed: 0,
                infected: i,
                recovered: r,
                deceased: d,
            },
            step,
        }
    }

    #[test]
    fn tracks_peak_and_outcome() {
        let mut analyzer = Analyzer::new();
        for snap in [
            snapshot(10, 98, 2, 0, 0),
            snapshot(20, 80, 15, 5, 0),
            snapshot(30, 70, 9, 20, 1),
        ] {
            analyzer.add_snapshot(&snap).unwrap();
        }
        assert_eq!(analyzer.n_snapshots(), 3);

        let reports = analyzer.reports();
        let mean_infected = reports[0]["mean_counts"]["I"]["mean"].as_f64().unwrap();
        assert!((mean_infected - 26.0 / 3.0).abs() < 1e-12);
        assert_eq!(reports[1]["peak"]["infected"], 15);
        assert_eq!(reports[1]["peak"]["step"], 20);
        assert_eq!(reports[2]["outcome"]["step"], 30);
        assert_eq!(reports[2]["outcome"]["counts"]["D"], 1);
        assert_eq!(reports[2]["outcome"]["attack_rate"], 0.3);
    }

    #[test]
    fn empty_analysis_reports_nothing_observed() {
        let analyzer = Analyzer::new();
        let reports = analyzer.reports();
        assert!(reports[1]["peak"]["step"].is_null());
        assert!(reports[2]["outcome"].is_null());
    }
}
