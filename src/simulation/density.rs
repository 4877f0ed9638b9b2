use crate::{
    floating_type_mod::FT,
    neighbor_sampler::NeighborSampler,
    particle::{Particle, ParticleSource},
    simulation_parameters::SimulationParams,
    sph_kernels::kernel,
    V3,
};

// Tait equation of state
pub const EOS_STIFFNESS: FT = 2.15;
pub const EOS_EXPONENT: FT = 7.16;
pub const REST_DENSITY: FT = 1000.;
pub const EOS_BASE_PRESSURE: FT = 0.;

/**
 * Interpolated density at an arbitrary point. There is no self term, a particle that sits
 * at `point` only contributes if the sampler returns it.
 */
pub fn density_at(
    point: V3,
    particles: &impl ParticleSource,
    sampler: &NeighborSampler,
    simulation_params: SimulationParams,
) -> FT {
    let mut density_acc = 0.;
    for j in sampler.samples(point) {
        let dist = (point - particles.position(j)).norm();
        density_acc += simulation_params.mass * kernel(dist, simulation_params.h0);
    }
    density_acc
}

/**
 * Density of particle `i` located at `position`, seeded with the (mass-less) self weight
 * `kernel(0, h0)`. Only the sentinel is skipped, so `i` is counted again every time the
 * sampler hands it back.
 */
pub fn density_of_particle(
    i: usize,
    position: V3,
    particles: &impl ParticleSource,
    sampler: &NeighborSampler,
    simulation_params: SimulationParams,
) -> FT {
    debug_assert!(i < particles.num_particles());

    let mut density_acc = kernel(0., simulation_params.h0);
    for j in sampler.samples(position) {
        let dist = (position - particles.position(j)).norm();
        density_acc += simulation_params.mass * kernel(dist, simulation_params.h0);
    }
    density_acc
}

/// Never negative: the fluid does not pull.
pub fn equation_of_state(density: FT) -> FT {
    let pressure =
        (EOS_STIFFNESS / EOS_EXPONENT) * ((density / REST_DENSITY).powf(EOS_EXPONENT) - 1.) + EOS_BASE_PRESSURE;
    if pressure <= 0. {
        return 0.;
    }
    pressure
}

pub fn evaluate_pressure(particle: &mut Particle) {
    particle.pressure = equation_of_state(particle.density);
}

#[test]
fn equation_of_state_clamps_and_grows() {
    for density in [0., 1., 500., 999., 999.999, 1000.] {
        assert_eq!(equation_of_state(density), 0.);
    }

    let mut last = 0.;
    for i in 1..200 {
        let density = 1000. + i as FT * 0.5;
        let pressure = equation_of_state(density);
        assert!(pressure > last, "pressure not increasing at density {}", density);
        last = pressure;
    }
}

#[test]
fn equation_of_state_matches_tait_form() {
    use crate::assert_ft_approx_eq;

    let density: FT = 1100.;
    let expected = 2.15 / 7.16 * ((1.1 as FT).powf(7.16) - 1.);
    assert_ft_approx_eq(equation_of_state(density), expected, 1e-5, || "tait eos".to_string());

    let mut particle = Particle::new(V3::zeros(), V3::zeros());
    particle.density = density;
    evaluate_pressure(&mut particle);
    assert_eq!(particle.pressure, equation_of_state(density));
}

#[cfg(test)]
fn sampler_fixture(entries: Vec<u32>) -> (crate::neighbor_sampler::NeighborTable, crate::neighbor_sampler::SizingInfo) {
    use crate::neighbor_sampler::{NeighborTable, SizingInfo};

    let sizing = SizingInfo {
        particles: 3,
        boundaries: 0,
        buckets: 1,
        bucket_size: entries.len(),
    };
    (NeighborTable::from_entries(entries, sizing), sizing)
}

#[test]
fn isolated_particle_density_is_self_weight() {
    use crate::{
        neighbor_sampler::axis_planes,
        particle::ParticleArray,
        simulation_parameters::test_params,
        vec3f,
    };

    let planes = axis_planes();
    let (table, sizing) = sampler_fixture(vec![0; 8]);
    let sampler = NeighborSampler::new(&table, sizing, &planes);

    let mut params = test_params();
    params.mass = 1.;
    let particles = ParticleArray::new(vec![
        Particle::new(vec3f(10., 0., 0.), V3::zeros()),
        Particle::new(vec3f(0.1, 0.1, 0.1), V3::zeros()),
        Particle::new(vec3f(-5., 0., 0.), V3::zeros()),
    ]);

    let density = density_of_particle(1, particles.position(1), &particles, &sampler, params);
    assert_eq!(density, kernel(0., params.h0) * params.mass);
    assert_eq!(density_at(particles.position(1), &particles, &sampler, params), 0.);
}

#[test]
fn self_collision_counts_twice() {
    use crate::{
        neighbor_sampler::axis_planes,
        particle::ParticleVec,
        simulation_parameters::test_params,
        vec3f,
    };

    let planes = axis_planes();
    // one slot holding particle 1, every one of the 150 offsets lands on it
    let (table, sizing) = sampler_fixture(vec![1]);
    let sampler = NeighborSampler::new(&table, sizing, &planes);
    let params = test_params();

    let particles = ParticleVec::from_records(&[
        Particle::new(vec3f(10., 0., 0.), V3::zeros()),
        Particle::new(vec3f(0.1, 0.1, 0.1), V3::zeros()),
        Particle::new(vec3f(-5., 0., 0.), V3::zeros()),
    ]);

    let w0 = kernel(0., params.h0);
    let density = density_of_particle(1, particles.position[1], &particles, &sampler, params);
    let expected = w0 + 150. * params.mass * w0;
    crate::assert_ft_approx_eq(density, expected, expected * 1e-5, || "self collision".to_string());

    let density_at_point = density_at(particles.position[1], &particles, &sampler, params);
    crate::assert_ft_approx_eq(density_at_point, 150. * params.mass * w0, expected * 1e-5, || {
        "density at particle position".to_string()
    });
}
