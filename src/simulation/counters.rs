use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::floating_type_mod::FT;

#[derive(Clone)]
pub(crate) struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}

impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }

    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl Counter<FT> {
    pub fn avg(&self) -> FT {
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }

    pub fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::MAX, FT::min)
    }

    pub fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::MIN, FT::max)
    }
}

impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    pub fn avg(&self) -> Duration {
        if self.values.is_empty() {
            return Duration::ZERO;
        }
        self.sum() / self.values.len() as u32
    }

    pub fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

/// Named value series, e.g. the number of corrected particles per step.
pub(crate) struct ValueCounters {
    pub counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}

impl ValueCounters {
    pub fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    pub fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

/// Wall-clock time spent in the named stages of a step.
pub(crate) struct PerformanceCounters {
    pub counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}

impl PerformanceCounters {
    pub fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    pub fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }

    pub fn end(&mut self, id: &str) {
        if self.enabled {
            match self.counters.get_mut(id) {
                Some(counter) => counter.end(),
                None => log::warn!("performance counter '{}' ended without being started", id),
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[test]
fn value_counters_track_min_max_avg() {
    let mut vcounters = ValueCounters::new(true);
    for v in [3., 1., 2.] {
        vcounters.add_value("iterations", v);
    }
    let counter = &vcounters.counters["iterations"];
    assert_eq!(counter.len(), 3);
    assert_eq!(counter.min(), 1.);
    assert_eq!(counter.max(), 3.);
    assert_eq!(counter.avg(), 2.);
}

#[test]
fn disabled_counters_record_nothing() {
    let mut vcounters = ValueCounters::new(false);
    vcounters.add_value("iterations", 1.);
    assert!(vcounters.counters.is_empty());

    let mut pcounters = PerformanceCounters::new(false);
    pcounters.begin("step");
    pcounters.end("step");
    assert!(pcounters.counters.is_empty());
}

#[test]
fn performance_counters_record_each_stage() {
    let mut pcounters = PerformanceCounters::new(true);
    for _ in 0..2 {
        pcounters.begin("density-pass");
        pcounters.end("density-pass");
    }
    let counter = &pcounters.counters["density-pass"];
    assert_eq!(counter.len(), 2);
    assert!(counter.avg() <= counter.sum());
}
