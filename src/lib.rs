/*!
Predictive-corrective incompressible SPH with locality-sensitive-hashing neighbor sampling.
*/

mod platform;
mod simulation;

pub use simulation::*;

/// Avoids 'unused' warnings.
#[cfg(not(target_arch = "wasm32"))]
pub use platform::start;
