use crate::floating_type_mod::FT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationParams {
    // only used for the predicted state inside the pressure correction loop,
    // the integration itself uses the CFL factor
    pub time_step: FT,

    // uniform for all particles
    pub mass: FT,

    // gain that turns a density error into a pressure correction
    pub delta: FT,

    // running maximum of the particle speeds, grows after every step
    pub max_vel: FT,

    // smoothing radius of all kernels
    pub h0: FT,

    #[serde(default)]
    pub corrector_termination: CorrectorTermination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectorTermination {
    /// The loop condition only sees the density error measured before the first iteration,
    /// so either no iteration runs or all of them do.
    InitialError,

    /// The loop condition sees the density error of the latest iteration.
    LocalError,
}

impl Default for CorrectorTermination {
    fn default() -> Self {
        CorrectorTermination::InitialError
    }
}

#[cfg(test)]
pub(crate) fn test_params() -> SimulationParams {
    SimulationParams {
        time_step: 0.01,
        mass: 0.5,
        delta: 0.1,
        max_vel: 0.,
        h0: 1.,
        corrector_termination: CorrectorTermination::InitialError,
    }
}

#[test]
fn parse_simulation_params() {
    let yaml = "
time_step: 0.004
mass: 0.02
delta: 0.5
max_vel: 0.0
h0: 0.1
";
    let params: SimulationParams = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(params.time_step, 0.004);
    assert_eq!(params.h0, 0.1);
    assert_eq!(params.corrector_termination, CorrectorTermination::InitialError);

    let params: SimulationParams =
        serde_yaml::from_str(&format!("{}corrector_termination: LocalError\n", yaml)).unwrap();
    assert_eq!(params.corrector_termination, CorrectorTermination::LocalError);
}
