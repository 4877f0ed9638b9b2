use std::fmt::{Display, Write};
use std::mem;

use nalgebra::zero;
use num_traits::Float;

use crate::{
    corrector::pressure_solve,
    counters::{PerformanceCounters, ValueCounters},
    density::{density_at, evaluate_pressure},
    floating_type_mod::FT,
    forces::{external_force, viscosity_force},
    neighbor_sampler::{HashPlanes, NeighborSampler, NeighborTable, SizingInfo},
    particle::{Particle, ParticleLayout, ParticleLayoutType, ParticleSource, ParticleStorage},
    simulation_parameters::SimulationParams,
    sph_kernels::cfl_factor,
};

/// Per-step values, reduced over all particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStatistics {
    pub max_speed: FT,
    pub min_density: FT,
    pub max_density: FT,

    // particles that ran at least one pressure correction iteration
    pub corrected_particle_count: usize,

    // summed over all particles
    pub corrector_iterations: usize,
}

impl StepStatistics {
    pub fn zero() -> StepStatistics {
        StepStatistics {
            max_speed: 0.,
            min_density: FT::INFINITY,
            max_density: FT::NEG_INFINITY,
            corrected_particle_count: 0,
            corrector_iterations: 0,
        }
    }

    pub fn for_particle(speed: FT, density: FT, corrector_iterations: usize) -> StepStatistics {
        StepStatistics {
            max_speed: speed,
            min_density: density,
            max_density: density,
            corrected_particle_count: if corrector_iterations > 0 { 1 } else { 0 },
            corrector_iterations,
        }
    }

    pub fn combine(self, other: StepStatistics) -> StepStatistics {
        StepStatistics {
            max_speed: FT::max(self.max_speed, other.max_speed),
            min_density: FT::min(self.min_density, other.min_density),
            max_density: FT::max(self.max_density, other.max_density),
            corrected_particle_count: self.corrected_particle_count + other.corrected_particle_count,
            corrector_iterations: self.corrector_iterations + other.corrector_iterations,
        }
    }
}

pub struct FluidSimulation {
    particles: ParticleLayout,
    simulation_params: SimulationParams,
    sizing: SizingInfo,
    planes: HashPlanes,

    // only used by `single_step`, `step` takes the table from the caller
    table: NeighborTable,

    pub time: FT,
    step_number: usize,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl FluidSimulation {
    pub fn new(
        particles: Vec<Particle>,
        layout_type: ParticleLayoutType,
        simulation_params: SimulationParams,
        sizing: SizingInfo,
        planes: HashPlanes,
        counters_enabled: bool,
    ) -> Self {
        assert_eq!(
            particles.len(),
            sizing.particles,
            "particle count does not match the sizing info"
        );
        assert!(simulation_params.mass > 0.);
        assert!(simulation_params.h0 > 0.);

        FluidSimulation {
            particles: ParticleLayout::new(layout_type, particles),
            simulation_params,
            sizing,
            planes,
            table: NeighborTable::empty(sizing),
            time: 0.,
            step_number: 0,
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        }
    }

    pub fn num_particles(&self) -> usize {
        self.particles.num_particles()
    }

    pub fn particles(&self) -> &ParticleLayout {
        &self.particles
    }

    pub fn simulation_params(&self) -> SimulationParams {
        self.simulation_params
    }

    pub fn sizing(&self) -> SizingInfo {
        self.sizing
    }

    pub fn planes(&self) -> &HashPlanes {
        &self.planes
    }

    /// The table built by the last `single_step`.
    pub fn table(&self) -> &NeighborTable {
        &self.table
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    /**
     * Rebuilds the neighbor table from the current positions and advances the simulation
     * by one step.
     */
    pub fn single_step(&mut self) -> StepStatistics {
        self.pcounters.begin("neighborhood");
        let positions = self.particles.positions();
        let num_dropped = self.table.rebuild(&positions, &self.planes, self.sizing);
        self.pcounters.end("neighborhood");

        self.vcounters.add_value("dropped-from-table", num_dropped as FT);
        if num_dropped > 0 {
            log::debug!("{} particles did not fit into the neighbor table", num_dropped);
        }

        let table = mem::take(&mut self.table);
        let statistics = self.step(&table);
        self.table = table;
        statistics
    }

    /**
     * Advances the simulation by one step with an externally built neighbor table.
     *
     * The density pass finishes for all particles before the predict-correct pass starts.
     * Both passes read neighbor state from a copy taken at the start of the pass.
     */
    pub fn step(&mut self, table: &NeighborTable) -> StepStatistics {
        log::info!("step {} time {}", self.step_number, self.time);

        self.pcounters.begin("simulation-step");

        let sampler = NeighborSampler::new(table, self.sizing, &self.planes);
        let simulation_params = self.simulation_params;

        self.pcounters.begin("density-pass");
        Self::density_pass(&mut self.particles, &sampler, simulation_params);
        self.pcounters.end("density-pass");

        let cfl = cfl_factor(simulation_params.max_vel);

        self.pcounters.begin("predict-correct-pass");
        let statistics = Self::predict_correct_pass(&mut self.particles, &sampler, simulation_params, cfl);
        self.pcounters.end("predict-correct-pass");

        self.simulation_params.max_vel = FT::max(self.simulation_params.max_vel, statistics.max_speed);

        self.time += cfl;
        self.step_number += 1;

        self.pcounters.end("simulation-step");

        self.vcounters.add_value("max-speed", statistics.max_speed);
        self.vcounters.add_value("max-density", statistics.max_density);
        self.vcounters
            .add_value("corrected-particles", statistics.corrected_particle_count as FT);
        self.vcounters
            .add_value("corrector-iterations", statistics.corrector_iterations as FT);

        log::debug!(
            "max speed {} (max_vel {}), density [{}, {}], {} particles corrected in {} iterations",
            statistics.max_speed,
            self.simulation_params.max_vel,
            statistics.min_density,
            statistics.max_density,
            statistics.corrected_particle_count,
            statistics.corrector_iterations
        );

        statistics
    }

    fn density_pass(particles: &mut ParticleLayout, sampler: &NeighborSampler, simulation_params: SimulationParams) {
        let snapshot = particles.clone();
        particles.update_particles(|_i, particle| {
            particle.density = density_at(particle.position, &snapshot, sampler, simulation_params);
            evaluate_pressure(particle);
            StepStatistics::for_particle(particle.velocity.norm(), particle.density, 0)
        });
    }

    fn predict_correct_pass(
        particles: &mut ParticleLayout,
        sampler: &NeighborSampler,
        simulation_params: SimulationParams,
        cfl: FT,
    ) -> StepStatistics {
        let snapshot = particles.clone();
        particles.update_particles(|i, particle| {
            viscosity_force(i, particle, &snapshot, sampler, simulation_params);
            external_force(particle, simulation_params);

            let outcome = pressure_solve(i, particle, &snapshot, sampler, simulation_params);

            particle.velocity += particle.force * (cfl / simulation_params.mass);
            particle.position += particle.velocity * cfl;
            particle.force = zero();

            StepStatistics::for_particle(particle.velocity.norm(), particle.density, outcome.iterations)
        })
    }
}

pub fn write_statistics(fluid_simulation: &FluidSimulation) -> Result<String, std::fmt::Error> {
    let mut s = String::new();

    if !fluid_simulation.pcounters.is_enabled() {
        return Ok(s);
    }

    writeln!(
        s,
        "particles: {} steps: {} time: {}",
        fluid_simulation.num_particles(),
        fluid_simulation.step_number,
        fluid_simulation.time
    )?;
    if let Some(counter) = fluid_simulation.pcounters.counters.get("simulation-step") {
        writeln!(s, "simulation-time: {}ms", counter.sum().as_secs_f64() * 1000.)?;
    }
    writeln!(s)?;

    let mut v = fluid_simulation.pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.)?;
    }
    writeln!(s)?;

    let mut v = fluid_simulation.vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        writeln!(
            s,
            "{}: min:{} max:{} avg:{} samples:{}",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg(),
            vcounter.len()
        )?;
    }

    Ok(s)
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

#[cfg(test)]
fn two_particle_simulation(layout_type: ParticleLayoutType) -> (FluidSimulation, NeighborTable) {
    use crate::{neighbor_sampler::axis_planes, simulation_parameters::test_params, vec3f, V3};

    let mut params = test_params();
    params.h0 = 0.5;

    // particle 0 can never be sampled, it only keeps the indices of the pair apart from the sentinel
    let particles = vec![
        Particle::new(vec3f(100., 100., 100.), V3::zeros()),
        Particle::new(vec3f(0., 0., 0.), V3::zeros()),
        Particle::new(vec3f(0.25, 0., 0.), V3::zeros()),
    ];
    let sizing = SizingInfo {
        particles: 3,
        boundaries: 0,
        buckets: 1,
        bucket_size: 150,
    };
    let mut entries = vec![0; 150];
    entries[0] = 1;
    entries[1] = 2;

    (
        FluidSimulation::new(particles, layout_type, params, sizing, axis_planes(), false),
        NeighborTable::from_entries(entries, sizing),
    )
}

#[test]
fn two_particles_see_each_other_once() {
    use crate::sph_kernels::kernel;

    let (mut simulation, table) = two_particle_simulation(ParticleLayoutType::StructOfArrays);
    let params = simulation.simulation_params();

    let statistics = simulation.step(&table);

    let expected = params.mass * kernel(0., params.h0) + params.mass * kernel(0.25, params.h0);
    for i in [1, 2] {
        assert_ft_approx_eq(simulation.particles().density(i), expected, expected * 1e-5, || {
            format!("density of particle {}", i)
        });
        // far below the rest density
        assert_eq!(simulation.particles().pressure(i), 0.);
    }
    assert_eq!(simulation.particles().density(0), 0.);
    assert_eq!(statistics.corrected_particle_count, 0);
    assert_eq!(statistics.corrector_iterations, 0);
}

#[test]
fn isolated_particle_rises_with_external_force() {
    let (mut simulation, table) = two_particle_simulation(ParticleLayoutType::ArrayOfStructs);
    let params = simulation.simulation_params();
    assert_eq!(params.max_vel, 0.);

    let statistics = simulation.step(&table);

    // cfl factor 0.5 for max_vel 0; the dummy particle has no neighbors in range
    let particle = simulation.particles().particle(0);
    assert_ft_approx_eq(particle.velocity.y, 0.5 * 9.81, 1e-5, || "velocity".to_string());
    assert_ft_approx_eq(particle.position.y, 100. + 0.25 * 9.81, 1e-4, || "position".to_string());
    assert_eq!(particle.velocity.x, 0.);
    assert_eq!(particle.force, crate::V3::zeros());

    assert!(statistics.max_speed >= particle.velocity.norm());
    assert_eq!(simulation.simulation_params().max_vel, statistics.max_speed);
    assert_eq!(simulation.time, 0.5);
    assert_eq!(simulation.step_number(), 1);

    // above 2 the cfl factor follows the running maximum speed
    let max_vel = simulation.simulation_params().max_vel;
    assert!(max_vel > 2.);
    simulation.step(&table);
    assert_ft_approx_eq(simulation.time, 0.5 + 1. / max_vel, 1e-6, || "time".to_string());
}

#[test]
fn max_vel_never_decreases() {
    use crate::V3;

    let (mut simulation, table) = two_particle_simulation(ParticleLayoutType::StructOfArrays);
    simulation.simulation_params.max_vel = 100.;

    simulation.step(&table);

    assert_eq!(simulation.simulation_params().max_vel, 100.);
    assert!(simulation.particles().velocity(0) != V3::zeros());
}

#[test]
fn dense_particle_runs_the_corrector() {
    use crate::{neighbor_sampler::axis_planes, simulation_parameters::test_params, vec3f, V3};

    let mut params = test_params();
    params.h0 = 0.1;

    // the single slot holds particle 1, so it samples itself 150 times
    let particles = vec![
        Particle::new(vec3f(100., 100., 100.), V3::zeros()),
        Particle::new(vec3f(0., 0., 0.), V3::zeros()),
    ];
    let sizing = SizingInfo {
        particles: 2,
        boundaries: 0,
        buckets: 1,
        bucket_size: 1,
    };
    let table = NeighborTable::from_entries(vec![1], sizing);
    let mut simulation = FluidSimulation::new(
        particles,
        ParticleLayoutType::StructOfArrays,
        params,
        sizing,
        axis_planes(),
        true,
    );

    let statistics = simulation.step(&table);

    assert_eq!(statistics.corrected_particle_count, 1);
    assert_eq!(statistics.corrector_iterations, 6);
    assert!(statistics.max_density > 1000.);

    let report = write_statistics(&simulation).unwrap();
    assert!(report.contains("corrector-iterations: min:6 max:6 avg:6"));
    assert!(report.contains("density-pass"));
}

#[test]
fn layouts_step_identically() {
    use crate::{vec3f, V3};

    let mut records = Vec::new();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..4 {
                let position = vec3f(x as FT, y as FT, z as FT) * 0.05;
                records.push(Particle::new(position, vec3f(0., 0., 0.1 * x as FT)));
            }
        }
    }
    let sizing = SizingInfo {
        particles: records.len(),
        boundaries: 0,
        buckets: 32,
        bucket_size: 16,
    };
    let mut params = crate::simulation_parameters::test_params();
    params.h0 = 0.12;
    params.mass = 0.02;

    let planes = HashPlanes::random(1);
    let mut soa = FluidSimulation::new(
        records.clone(),
        ParticleLayoutType::StructOfArrays,
        params,
        sizing,
        planes,
        false,
    );
    let mut aos = FluidSimulation::new(records, ParticleLayoutType::ArrayOfStructs, params, sizing, planes, false);

    for _ in 0..3 {
        let statistics_soa = soa.single_step();
        let statistics_aos = aos.single_step();
        assert_eq!(statistics_soa, statistics_aos);
    }

    assert_eq!(soa.table(), aos.table());
    assert_eq!(soa.time, aos.time);
    for i in 0..soa.num_particles() {
        assert_eq!(soa.particles().particle(i), aos.particles().particle(i));
        assert!(soa.particles().position(i) != V3::zeros());
    }
}
