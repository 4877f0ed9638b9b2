pub mod concurrency;
pub mod corrector;
pub mod counters;
pub mod density;
pub mod forces;
pub mod neighbor_sampler;
pub mod neighborhood_search;
pub mod particle;
pub mod scene;
pub mod simulation;
pub mod simulation_parameters;
pub mod sph_kernels;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
}

use floating_type_mod::FT;

use nalgebra::SVector;

#[allow(dead_code)]
pub type V<FT, const D: usize> = SVector<FT, D>;

pub type V3 = V<FT, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use simulation::*;
