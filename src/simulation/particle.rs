use enum_dispatch::enum_dispatch;
use nalgebra::zero;
use serde::{Deserialize, Serialize};

use crate::{
    concurrency::{par_iter_reduce1, par_iter_reduce5},
    floating_type_mod::FT,
    simulation::StepStatistics,
    V3,
};

/// State of a single particle. Also the element type of the array-of-records layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: V3,
    pub velocity: V3,
    pub force: V3,
    pub pressure: FT,
    pub density: FT,
}

impl Particle {
    pub fn new(position: V3, velocity: V3) -> Particle {
        Particle {
            position,
            velocity,
            force: zero(),
            pressure: 0.,
            density: 0.,
        }
    }
}

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty>),*$(,)?  }) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn from_records(records: &[Particle]) -> Self {
                Self {
                    $(
                        $field_name: records.iter().map(|p| p.$field_name).collect::<Vec<$field_type>>(),
                    )*
                }
            }

            pub fn record(&self, i: usize) -> Particle {
                Particle {
                    $(
                        $field_name: self.$field_name[i],
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V3>,
        pub velocity: Vec<V3>,
        pub force: Vec<V3>,
        pub pressure: Vec<FT>,
        pub density: Vec<FT>,
    }
}

/// Array-of-records layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleArray {
    pub particles: Vec<Particle>,
}

impl ParticleArray {
    pub fn new(particles: Vec<Particle>) -> Self {
        ParticleArray { particles }
    }
}

/// Read access to neighbor state during a pass.
#[enum_dispatch]
pub trait ParticleSource {
    fn num_particles(&self) -> usize;
    fn position(&self, i: usize) -> V3;
    fn velocity(&self, i: usize) -> V3;
    fn pressure(&self, i: usize) -> FT;
    fn density(&self, i: usize) -> FT;
}

/// Write access for the per-particle passes.
#[enum_dispatch]
pub trait ParticleStorage {
    fn particle(&self, i: usize) -> Particle;

    fn positions(&self) -> Vec<V3>;

    /**
     * Runs `f` once for every particle, in parallel, and reduces the returned statistics.
     * All invocations have finished when this returns.
     */
    fn update_particles(
        &mut self,
        f: impl Fn(usize, &mut Particle) -> StepStatistics + Send + Sync,
    ) -> StepStatistics;
}

impl ParticleSource for ParticleVec {
    fn num_particles(&self) -> usize {
        self.position.len()
    }

    #[inline(always)]
    fn position(&self, i: usize) -> V3 {
        self.position[i]
    }

    #[inline(always)]
    fn velocity(&self, i: usize) -> V3 {
        self.velocity[i]
    }

    #[inline(always)]
    fn pressure(&self, i: usize) -> FT {
        self.pressure[i]
    }

    #[inline(always)]
    fn density(&self, i: usize) -> FT {
        self.density[i]
    }
}

impl ParticleStorage for ParticleVec {
    fn particle(&self, i: usize) -> Particle {
        self.record(i)
    }

    fn positions(&self) -> Vec<V3> {
        self.position.clone()
    }

    fn update_particles(
        &mut self,
        f: impl Fn(usize, &mut Particle) -> StepStatistics + Send + Sync,
    ) -> StepStatistics {
        par_iter_reduce5(
            &mut self.position,
            &mut self.velocity,
            &mut self.force,
            &mut self.pressure,
            &mut self.density,
            StepStatistics::zero,
            StepStatistics::combine,
            |i, p_position, p_velocity, p_force, p_pressure, p_density| {
                let mut particle = Particle {
                    position: *p_position,
                    velocity: *p_velocity,
                    force: *p_force,
                    pressure: *p_pressure,
                    density: *p_density,
                };
                let statistics = f(i, &mut particle);
                *p_position = particle.position;
                *p_velocity = particle.velocity;
                *p_force = particle.force;
                *p_pressure = particle.pressure;
                *p_density = particle.density;
                statistics
            },
        )
    }
}

impl ParticleSource for ParticleArray {
    fn num_particles(&self) -> usize {
        self.particles.len()
    }

    #[inline(always)]
    fn position(&self, i: usize) -> V3 {
        self.particles[i].position
    }

    #[inline(always)]
    fn velocity(&self, i: usize) -> V3 {
        self.particles[i].velocity
    }

    #[inline(always)]
    fn pressure(&self, i: usize) -> FT {
        self.particles[i].pressure
    }

    #[inline(always)]
    fn density(&self, i: usize) -> FT {
        self.particles[i].density
    }
}

impl ParticleStorage for ParticleArray {
    fn particle(&self, i: usize) -> Particle {
        self.particles[i]
    }

    fn positions(&self) -> Vec<V3> {
        self.particles.iter().map(|p| p.position).collect()
    }

    fn update_particles(
        &mut self,
        f: impl Fn(usize, &mut Particle) -> StepStatistics + Send + Sync,
    ) -> StepStatistics {
        par_iter_reduce1(&mut self.particles, StepStatistics::zero, StepStatistics::combine, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleLayoutType {
    /// One array per attribute.
    StructOfArrays,
    /// One array of particle records.
    ArrayOfStructs,
}

#[enum_dispatch(ParticleSource, ParticleStorage)]
#[derive(Debug, Clone, PartialEq)]
pub enum ParticleLayout {
    ParticleVec(ParticleVec),
    ParticleArray(ParticleArray),
}

impl ParticleLayout {
    pub fn new(layout_type: ParticleLayoutType, particles: Vec<Particle>) -> ParticleLayout {
        match layout_type {
            ParticleLayoutType::StructOfArrays => ParticleVec::from_records(&particles).into(),
            ParticleLayoutType::ArrayOfStructs => ParticleArray::new(particles).into(),
        }
    }

    pub fn layout_type(&self) -> ParticleLayoutType {
        match self {
            ParticleLayout::ParticleVec(_) => ParticleLayoutType::StructOfArrays,
            ParticleLayout::ParticleArray(_) => ParticleLayoutType::ArrayOfStructs,
        }
    }
}

#[cfg(test)]
fn test_particles() -> Vec<Particle> {
    use crate::vec3f;

    (0..5)
        .map(|i| {
            let t = i as FT;
            let mut p = Particle::new(vec3f(t, 2. * t, -t), vec3f(0., t, 0.));
            p.density = 1000. + t;
            p.pressure = t * 0.5;
            p
        })
        .collect()
}

#[test]
fn layouts_expose_the_same_particles() {
    let records = test_particles();
    let soa = ParticleLayout::new(ParticleLayoutType::StructOfArrays, records.clone());
    let aos = ParticleLayout::new(ParticleLayoutType::ArrayOfStructs, records.clone());

    assert_eq!(soa.layout_type(), ParticleLayoutType::StructOfArrays);
    assert_eq!(aos.layout_type(), ParticleLayoutType::ArrayOfStructs);
    assert_eq!(soa.num_particles(), 5);
    assert_eq!(aos.num_particles(), 5);
    for i in 0..5 {
        assert_eq!(soa.particle(i), records[i]);
        assert_eq!(aos.particle(i), records[i]);
        assert_eq!(soa.position(i), aos.position(i));
        assert_eq!(soa.velocity(i), aos.velocity(i));
        assert_eq!(soa.density(i), aos.density(i));
        assert_eq!(soa.pressure(i), aos.pressure(i));
    }
    assert_eq!(soa.positions(), aos.positions());
}

#[test]
fn update_particles_writes_back_and_reduces() {
    for layout_type in [ParticleLayoutType::StructOfArrays, ParticleLayoutType::ArrayOfStructs] {
        let mut particles = ParticleLayout::new(layout_type, test_particles());

        let statistics = particles.update_particles(|i, p| {
            p.force.x = i as FT;
            p.pressure += 1.;
            StepStatistics::for_particle(p.velocity.norm(), p.density, 0)
        });

        assert_eq!(statistics.max_speed, 4.);
        assert_eq!(statistics.min_density, 1000.);
        assert_eq!(statistics.max_density, 1004.);
        for i in 0..5 {
            assert_eq!(particles.particle(i).force.x, i as FT);
            assert_eq!(particles.pressure(i), i as FT * 0.5 + 1.);
        }
    }
}
