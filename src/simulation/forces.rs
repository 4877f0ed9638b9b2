use crate::{
    floating_type_mod::FT,
    neighbor_sampler::NeighborSampler,
    particle::{Particle, ParticleSource},
    simulation_parameters::SimulationParams,
    sph_kernels::{gradient, second_derivative},
    vec3f, V3,
};

pub const GRAVITY: FT = 9.81;

/**
 * Symmetric pressure gradient force on particle `i`, whose own (possibly already corrected)
 * state is `particle`. The result is added to `particle.force` and returned.
 */
pub fn pressure_force(
    i: usize,
    particle: &mut Particle,
    particles: &impl ParticleSource,
    sampler: &NeighborSampler,
    simulation_params: SimulationParams,
) -> V3 {
    let density_i = particle.density;
    debug_assert!(density_i > 0., "pressure force on particle {} with density {}", i, density_i);
    let pressure_term_i = particle.pressure / (density_i * density_i);
    let m = -(simulation_params.mass * simulation_params.mass);

    let mut force = V3::zeros();
    for j in sampler.samples(particle.position) {
        if j == i {
            continue;
        }
        let density_j = particles.density(j);
        debug_assert!(density_j > 0., "neighbor {} has density {}", j, density_j);

        let x_ij = particle.position - particles.position(j);
        let pressure_term = pressure_term_i + particles.pressure(j) / (density_j * density_j);
        force += gradient(x_ij.norm(), simulation_params.h0, x_ij) * (m * pressure_term);
    }

    particle.force += force;
    force
}

/**
 * Viscosity from the kernel Laplacian. The coefficient is `mass / density_j`, so the
 * pairwise forces are not antisymmetric.
 */
pub fn viscosity_force(
    i: usize,
    particle: &mut Particle,
    particles: &impl ParticleSource,
    sampler: &NeighborSampler,
    simulation_params: SimulationParams,
) -> V3 {
    let mut force = V3::zeros();
    for j in sampler.samples(particle.position) {
        if j == i {
            continue;
        }
        let density_j = particles.density(j);
        debug_assert!(density_j > 0., "neighbor {} has density {}", j, density_j);

        let x_ij = particle.position - particles.position(j);
        let v_ji = (particles.velocity(j) - particle.velocity) * (1. / density_j);
        force += v_ji * (simulation_params.mass * second_derivative(x_ij.norm(), simulation_params.h0));
    }

    particle.force += force;
    force
}

/// Points along +y.
pub fn external_force(particle: &mut Particle, simulation_params: SimulationParams) -> V3 {
    let force = vec3f(0., simulation_params.mass * GRAVITY, 0.);
    particle.force += force;
    force
}

#[cfg(test)]
fn pair_fixture() -> (Vec<Particle>, crate::neighbor_sampler::NeighborTable, crate::neighbor_sampler::SizingInfo) {
    use crate::neighbor_sampler::{NeighborTable, SizingInfo};

    // particle 0 is a far away dummy, 1 and 2 see each other through a single bucket
    let mut particles = vec![
        Particle::new(vec3f(100., 100., 100.), V3::zeros()),
        Particle::new(vec3f(0., 0., 0.), vec3f(1., 0., 0.)),
        Particle::new(vec3f(0.5, 0., 0.), vec3f(-1., 0., 0.)),
    ];
    for p in particles.iter_mut() {
        p.density = 1000.;
        p.pressure = 2.;
    }
    let sizing = SizingInfo {
        particles: 3,
        boundaries: 0,
        buckets: 1,
        bucket_size: 150,
    };
    let mut entries = vec![0; 150];
    entries[0] = 1;
    entries[1] = 2;
    (particles, NeighborTable::from_entries(entries, sizing), sizing)
}

#[test]
fn pressure_force_follows_gradient_sign() {
    use crate::{neighbor_sampler::axis_planes, particle::ParticleArray, simulation_parameters::test_params};

    let planes = axis_planes();
    let (records, table, sizing) = pair_fixture();
    let sampler = NeighborSampler::new(&table, sizing, &planes);
    let params = test_params();
    let particles = ParticleArray::new(records.clone());

    let mut p1 = records[1];
    let mut p2 = records[2];
    let f1 = pressure_force(1, &mut p1, &particles, &sampler, params);
    let f2 = pressure_force(2, &mut p2, &particles, &sampler, params);

    // with the negative first derivative inside the gradient the pair is drawn together
    assert!(f1.x > 0.);
    assert!(f2.x < 0.);
    crate::assert_ft_approx_eq(f1.x, -f2.x, 1e-9, || "pressure force symmetry".to_string());
    assert_eq!(f1.y, 0.);
    assert_eq!(p1.force, f1);

    let r: FT = 0.5;
    let expected = -params.mass * params.mass * (2. * 2. / (1000. * 1000.)) * gradient(r, params.h0, vec3f(-r, 0., 0.));
    crate::assert_ft_approx_eq(f1.x, expected.x, 1e-9, || "pressure force value".to_string());
}

#[test]
fn pressure_force_accumulates() {
    use crate::{neighbor_sampler::axis_planes, particle::ParticleArray, simulation_parameters::test_params};

    let planes = axis_planes();
    let (records, table, sizing) = pair_fixture();
    let sampler = NeighborSampler::new(&table, sizing, &planes);
    let particles = ParticleArray::new(records.clone());

    let mut p1 = records[1];
    let f = pressure_force(1, &mut p1, &particles, &sampler, test_params());
    pressure_force(1, &mut p1, &particles, &sampler, test_params());
    assert_eq!(p1.force, f * 2.);
}

#[test]
fn viscosity_uses_raw_mass_over_neighbor_density() {
    use crate::{neighbor_sampler::axis_planes, particle::ParticleVec, simulation_parameters::test_params};

    let planes = axis_planes();
    let (records, table, sizing) = pair_fixture();
    let sampler = NeighborSampler::new(&table, sizing, &planes);
    let params = test_params();
    let particles = ParticleVec::from_records(&records);

    let mut p1 = records[1];
    let f1 = viscosity_force(1, &mut p1, &particles, &sampler, params);

    let expected = (vec3f(-1., 0., 0.) - vec3f(1., 0., 0.)) * (1. / 1000.) * (params.mass * second_derivative(0.5, params.h0));
    crate::assert_ft_approx_eq(f1.x, expected.x, 1e-9, || "viscosity force".to_string());
    // slows particle 1 down, it moves towards +x
    assert!(f1.x < 0.);
    assert_eq!(p1.force, f1);
}

#[test]
fn external_force_points_up() {
    use crate::simulation_parameters::test_params;

    let params = test_params();
    let mut particle = Particle::new(V3::zeros(), V3::zeros());
    let force = external_force(&mut particle, params);
    assert_eq!(force, vec3f(0., params.mass * 9.81, 0.));
    assert!(particle.force.y > 0.);
}
