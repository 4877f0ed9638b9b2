use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    floating_type_mod::FT,
    neighbor_sampler::{HashPlanes, SizingInfo, SAMPLES_PER_QUERY},
    particle::{Particle, ParticleLayoutType},
    simulation_parameters::SimulationParams,
    vec3f, FluidSimulation, V3,
};

fn default_layout() -> ParticleLayoutType {
    ParticleLayoutType::StructOfArrays
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NeighborTableConfig {
    pub buckets: usize,
    pub bucket_size: usize,
    pub hash_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFluidBlock {
    pub pos: Vec<FT>,
    pub size: Vec<FT>,
    pub spacing: FT,
    pub velocity: Vec<FT>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "default_layout")]
    pub layout: ParticleLayoutType,
    pub neighbor_table: NeighborTableConfig,
    pub blocks: Vec<SceneFluidBlock>,
}

fn to_vec3(values: &[FT], name: &str) -> Result<V3> {
    ensure!(
        values.len() == 3,
        "'{}' needs 3 components, got {}",
        name,
        values.len()
    );
    Ok(vec3f(values[0], values[1], values[2]))
}

/// Fills the box `[min, max)` with a regular grid of particles.
fn add_fluid_block(min: V3, max: V3, grid_spacing: FT, init_with_velocity: V3, particles: &mut Vec<Particle>) {
    let extent = max - min;
    let counts = extent.map(|x| (x / grid_spacing).floor().max(0.) as usize);

    for z in 0..counts.z {
        for y in 0..counts.y {
            for x in 0..counts.x {
                let position = min + vec3f(x as FT, y as FT, z as FT) * grid_spacing;
                particles.push(Particle::new(position, init_with_velocity));
            }
        }
    }
}

pub fn validate_simulation_params(simulation_params: &SimulationParams) -> Result<()> {
    ensure!(simulation_params.time_step > 0., "time_step must be positive");
    ensure!(simulation_params.mass > 0., "mass must be positive");
    ensure!(simulation_params.h0 > 0., "h0 must be positive");
    ensure!(simulation_params.max_vel >= 0., "max_vel must not be negative");
    Ok(())
}

impl SceneConfig {
    pub fn validate(&self) -> Result<()> {
        let table = self.neighbor_table;
        ensure!(table.buckets > 0, "neighbor table needs at least one bucket");
        ensure!(table.bucket_size > 0, "neighbor table buckets need room for at least one particle");
        // a query never reads further than this into a bucket
        ensure!(
            table.bucket_size <= SAMPLES_PER_QUERY,
            "bucket_size {} exceeds the {} samples of a neighbor query",
            table.bucket_size,
            SAMPLES_PER_QUERY
        );
        ensure!(!self.blocks.is_empty(), "scene has no fluid blocks");

        for (i, block) in self.blocks.iter().enumerate() {
            ensure!(block.spacing > 0., "block {}: spacing must be positive", i);
        }
        Ok(())
    }

    pub fn particles(&self) -> Result<Vec<Particle>> {
        let mut particles = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            let pos = to_vec3(&block.pos, "pos").with_context(|| format!("fluid block {}", i))?;
            let size = to_vec3(&block.size, "size").with_context(|| format!("fluid block {}", i))?;
            let velocity = to_vec3(&block.velocity, "velocity").with_context(|| format!("fluid block {}", i))?;
            add_fluid_block(pos, pos + size, block.spacing, velocity, &mut particles);
        }
        Ok(particles)
    }
}

pub fn init_fluid_sim(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    counters_enabled: bool,
) -> Result<FluidSimulation> {
    validate_simulation_params(&simulation_params)?;
    scene_config.validate()?;

    let particles = scene_config.particles()?;
    ensure!(!particles.is_empty(), "the fluid blocks of the scene contain no particles");
    ensure!(
        particles.len() <= u32::MAX as usize,
        "{} particles do not fit into the neighbor table",
        particles.len()
    );

    log::info!("init {} fluid particles", particles.len());

    let sizing = SizingInfo {
        particles: particles.len(),
        boundaries: 0,
        buckets: scene_config.neighbor_table.buckets,
        bucket_size: scene_config.neighbor_table.bucket_size,
    };
    let planes = HashPlanes::random(scene_config.neighbor_table.hash_seed);

    Ok(FluidSimulation::new(
        particles,
        scene_config.layout,
        simulation_params,
        sizing,
        planes,
        counters_enabled,
    ))
}

#[cfg(test)]
fn test_scene() -> SceneConfig {
    serde_yaml::from_str(
        "
neighbor_table:
  buckets: 64
  bucket_size: 32
  hash_seed: 42
blocks:
  - pos: [0.0, 0.0, 0.0]
    size: [0.21, 0.11, 0.11]
    spacing: 0.05
    velocity: [0.0, -1.0, 0.0]
",
    )
    .unwrap()
}

#[test]
fn fluid_block_is_a_regular_grid() {
    let scene = test_scene();
    assert_eq!(scene.layout, ParticleLayoutType::StructOfArrays);

    let particles = scene.particles().unwrap();
    assert_eq!(particles.len(), 4 * 2 * 2);
    assert_eq!(particles[0].position, V3::zeros());
    assert_eq!(particles[1].position, vec3f(0.05, 0., 0.));
    assert!(particles.iter().all(|p| p.velocity == vec3f(0., -1., 0.)));
    assert!(particles.iter().all(|p| p.pressure == 0. && p.density == 0.));
}

#[test]
fn scene_builds_a_simulation() {
    use crate::{particle::ParticleSource, simulation_parameters::test_params};

    let mut scene = test_scene();
    scene.layout = ParticleLayoutType::ArrayOfStructs;
    let mut simulation = init_fluid_sim(test_params(), &scene, false).unwrap();

    assert_eq!(simulation.num_particles(), 16);
    assert_eq!(simulation.sizing().table_len(), 64 * 32);
    assert_eq!(simulation.planes(), &HashPlanes::random(42));

    simulation.single_step();
    assert_eq!(simulation.step_number(), 1);
    assert!(simulation.particles().velocity(1).y > -1.);
}

#[test]
fn invalid_scenes_are_rejected() {
    use crate::simulation_parameters::test_params;

    let mut scene = test_scene();
    scene.neighbor_table.buckets = 0;
    assert!(init_fluid_sim(test_params(), &scene, false).is_err());

    let mut scene = test_scene();
    scene.neighbor_table.bucket_size = SAMPLES_PER_QUERY + 1;
    assert!(scene.validate().is_err());

    let mut scene = test_scene();
    scene.blocks[0].size = vec![0.01, 0.01, 0.01];
    assert!(init_fluid_sim(test_params(), &scene, false).is_err());

    let mut scene = test_scene();
    scene.blocks[0].velocity = vec![0., 1.];
    let err = scene.particles().unwrap_err();
    assert!(format!("{:#}", err).contains("velocity"));

    let mut scene = test_scene();
    scene.blocks.clear();
    assert!(scene.validate().is_err());

    let mut params = test_params();
    params.mass = 0.;
    assert!(init_fluid_sim(params, &test_scene(), false).is_err());
}
