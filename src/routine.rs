//! Daily routines: where an agent heads next given its age, health and the
//! simulated time of day.

use crate::agent::{Agent, HealthState};
use crate::network::PoiSets;
use rand::prelude::*;
use std::ops::Range;

pub const TICKS_PER_DAY: usize = 24;
pub const DAYS_PER_WEEK: usize = 7;
/// Days `0..WORKDAYS` of each week are weekdays.
pub const WORKDAYS: usize = 5;

pub const SCHOOL_AGES: Range<f64> = 5.0..18.0;
pub const WORK_AGES: Range<f64> = 18.0..65.0;
pub const RETIREMENT_AGE: f64 = 65.0;

const SCHOOL_HOURS: Range<usize> = 8..15;
const WORK_HOURS: Range<usize> = 8..17;

/// Chance that an infected agent heads home instead of following its routine.
const ISOLATION_PROB: f64 = 0.5;
/// Weekday leisure chance for young children and retirees.
const WEEKDAY_LEISURE_PROB: f64 = 0.5;
const WEEKEND_LEISURE_PROB: f64 = 0.3;

pub fn day_of_week(tick: usize) -> usize {
    (tick / TICKS_PER_DAY) % DAYS_PER_WEEK
}

pub fn hour_of_day(tick: usize) -> usize {
    tick % TICKS_PER_DAY
}

/// Select the next destination node of `agent` at `tick`.
pub fn select_destination<R: Rng + ?Sized>(
    agent: &Agent,
    tick: usize,
    pois: &PoiSets,
    rng: &mut R,
) -> usize {
    let home = agent.home();

    if agent.health_state() == HealthState::Infected && rng.random::<f64>() < ISOLATION_PROB {
        return home;
    }

    let hour = hour_of_day(tick);
    let age = agent.age();

    if day_of_week(tick) < WORKDAYS {
        if SCHOOL_AGES.contains(&age) && SCHOOL_HOURS.contains(&hour) {
            agent.school().unwrap_or(home)
        } else if WORK_AGES.contains(&age) && WORK_HOURS.contains(&hour) {
            agent.work().unwrap_or(home)
        } else if age >= RETIREMENT_AGE || age < SCHOOL_AGES.start {
            if rng.random::<f64>() < WEEKDAY_LEISURE_PROB {
                pick_or_home(&pois.leisure, home, rng)
            } else {
                home
            }
        } else {
            home
        }
    } else if rng.random::<f64>() < WEEKEND_LEISURE_PROB {
        pick_or_home(&pois.leisure, home, rng)
    } else {
        home
    }
}

fn pick_or_home<R: Rng + ?Sized>(nodes: &[usize], home: usize, rng: &mut R) -> usize {
    nodes.choose(rng).copied().unwrap_or(home)
}
