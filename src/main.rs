/*
 * Notes:
 *   - particle 0 shares its index with the empty table slot, no other particle ever sees it
 *   - a particle can sample itself several times, its density grows with every hit
 */

mod platform;
mod simulation;

pub use simulation::*;

fn main() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    platform::start()?;

    Ok(())
}
