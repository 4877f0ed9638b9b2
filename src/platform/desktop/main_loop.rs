use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use crate::{
    scene::{init_fluid_sim, SceneConfig},
    simulation_parameters::SimulationParams,
    write_statistics, FluidSimulation,
};

use super::frame_exporter::FrameExporter;

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

const DEFAULT_NUM_STEPS: usize = 100;

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // RUST_LOG takes precedence over -v
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.format_timestamp_millis().init();
}

pub fn start() -> Result<()> {
    let matches = App::new("PCISPH simulation with LSH neighbor sampling")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("STEPS")
                        .long("steps")
                        .short("n")
                        .required(false)
                        .takes_value(true)
                        .help("Number of simulation steps"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite config"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                )
                .arg(
                    Arg::with_name("EXPORT_FRAMES")
                        .long("export-frames")
                        .short("e")
                        .required(false)
                        .takes_value(true)
                        .help("Directory the particle state of every step is written to"),
                ),
        )
        .get_matches();

    init_logging(matches.occurrences_of("v"));

    match matches.subcommand() {
        ("run", Some(run_matches)) => run(run_matches),
        _ => unreachable!(),
    }
}

/// Replaces keys of the simulation config, unknown keys are an error.
fn overwrite_config(simulation_params_serde: &mut serde_yaml::Value, overwrite_config_str: &str) -> Result<()> {
    let overwrite_config: HashMap<String, serde_yaml::Value> =
        serde_yaml::from_str(overwrite_config_str).context("failed parsing overwrite config")?;
    let mapping = simulation_params_serde
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("cannot get parsed simulation parameters as mapping"))?;

    for (k, v) in overwrite_config.into_iter() {
        let entry = mapping
            .get_mut(&serde_yaml::Value::String(k.clone()))
            .ok_or_else(|| anyhow!("not able to find attribute {}", k))?;
        *entry = v;
    }
    Ok(())
}

fn load_simulation_params(parameter_file: &str, overwrite_file: Option<&str>) -> Result<SimulationParams> {
    let params_yaml = std::fs::read_to_string(parameter_file)
        .with_context(|| format!("failed reading parameter file {}", parameter_file))?;
    let overwrite_config_str = match overwrite_file {
        Some(overwrite_file) => Some(
            std::fs::read_to_string(overwrite_file)
                .with_context(|| format!("failed reading overwrite config {}", overwrite_file))?,
        ),
        None => None,
    };

    parse_simulation_params(&params_yaml, overwrite_config_str.as_deref())
}

fn parse_simulation_params(params_yaml: &str, overwrite_config_str: Option<&str>) -> Result<SimulationParams> {
    let simulation_params: SimulationParams =
        serde_yaml::from_str(params_yaml).context("failed parsing simulation config file")?;
    let overwrite_config_str = match overwrite_config_str {
        Some(overwrite_config_str) => overwrite_config_str,
        None => return Ok(simulation_params),
    };

    // round trip so keys left to their serde default can be overwritten as well
    let mut simulation_params_serde =
        serde_yaml::to_value(&simulation_params).context("failed to pack SimulationParams")?;
    overwrite_config(&mut simulation_params_serde, overwrite_config_str)?;

    serde_yaml::from_value(simulation_params_serde).context("failed to unpack SimulationParams")
}

fn load_scene_config(scene_file_path: &str) -> Result<SceneConfig> {
    let scene_yaml = std::fs::read_to_string(scene_file_path)
        .with_context(|| format!("failed reading scene file {}", scene_file_path))?;
    serde_yaml::from_str(&scene_yaml).context("failed parsing scene config file")
}

fn run(run_matches: &ArgMatches) -> Result<()> {
    let parameter_file = run_matches
        .value_of("SIMULATION_CONFIG")
        .ok_or_else(|| anyhow!("missing simulation config"))?;
    let simulation_params = load_simulation_params(parameter_file, run_matches.value_of("OVERWRITE_CONFIG_FILE"))?;
    log::info!("{:?}", simulation_params);

    let scene_file_path = run_matches
        .value_of("SCENE_CONFIG")
        .ok_or_else(|| anyhow!("missing scene config"))?;
    let scene_config = load_scene_config(scene_file_path)?;
    log::info!("{:?}", scene_config.neighbor_table);

    let num_steps = match run_matches.value_of("STEPS") {
        Some(steps) => steps
            .parse::<usize>()
            .with_context(|| format!("invalid number of steps '{}'", steps))?,
        None => DEFAULT_NUM_STEPS,
    };

    let counters_enabled = run_matches.is_present("STATISTICS_ENABLED");
    let statistics_path_opt = run_matches.value_of("STATISTICS_PATH");

    let frame_exporter = match run_matches.value_of("EXPORT_FRAMES") {
        Some(folder) => Some(FrameExporter::new(folder, "frame")?),
        None => None,
    };

    let mut fluid_simulation = init_fluid_sim(simulation_params, &scene_config, counters_enabled)
        .with_context(|| format!("invalid configuration in {} / {}", parameter_file, scene_file_path))?;

    with_frame_exporter(frame_exporter, |frame_exporter| {
        fluid_main(&mut fluid_simulation, num_steps, frame_exporter)
    })?;

    if counters_enabled {
        let s = write_statistics(&fluid_simulation)?;
        print!("{}", s);
        if let Some(statistics_path) = statistics_path_opt {
            std::fs::write(Path::new(statistics_path), s)
                .with_context(|| format!("failed writing statistics to {}", statistics_path))?;
        }
    }

    Ok(())
}

/// Runs `f` and closes the series index afterwards, also when `f` failed.
fn with_frame_exporter(
    mut frame_exporter: Option<FrameExporter>,
    f: impl FnOnce(Option<&mut FrameExporter>) -> Result<()>,
) -> Result<()> {
    let result = f(frame_exporter.as_mut());

    let finished = match frame_exporter {
        Some(frame_exporter) => frame_exporter.finish(),
        None => Ok(()),
    };
    // the error of `f` wins over a failing finish
    result.and(finished)
}

fn fluid_main(
    fluid_simulation: &mut FluidSimulation,
    num_steps: usize,
    mut frame_exporter: Option<&mut FrameExporter>,
) -> Result<()> {
    let mut total_duration: Duration = Duration::from_nanos(0);

    for frame_number in 0..num_steps {
        let a = std::time::Instant::now();
        let statistics = fluid_simulation.single_step();
        let b = std::time::Instant::now();

        total_duration += b - a;

        if let Some(frame_exporter) = frame_exporter.as_mut() {
            frame_exporter.add_snapshot(fluid_simulation.time, fluid_simulation.particles())?;
        }

        log::info!(
            "{:05}: {} fluid particles {}msec ({}msec AVG), max speed {}",
            frame_number,
            fluid_simulation.num_particles(),
            (b - a).as_secs_f32() * 1000.,
            (total_duration / (frame_number as u32 + 1)).as_secs_f32() * 1000.,
            statistics.max_speed
        );

        if !statistics.max_speed.is_finite() {
            log::error!("simulation diverged in step {}", frame_number);
            return Err(anyhow!("non-finite particle velocity after step {}", frame_number));
        }
    }

    Ok(())
}

#[test]
fn shipped_configs_parse() {
    use crate::particle::ParticleLayoutType;

    let simulation_params: SimulationParams =
        serde_yaml::from_str(include_str!("../../../configs/simulation.yaml")).unwrap();
    let scene_config: SceneConfig = serde_yaml::from_str(include_str!("../../../configs/scene.yaml")).unwrap();
    assert_eq!(scene_config.layout, ParticleLayoutType::StructOfArrays);

    let simulation = init_fluid_sim(simulation_params, &scene_config, false).unwrap();
    assert!(simulation.num_particles() > 1000);
}

#[test]
fn overwrite_config_replaces_known_keys() {
    let mut value: serde_yaml::Value = serde_yaml::from_str(include_str!("../../../configs/simulation.yaml")).unwrap();

    overwrite_config(&mut value, "h0: 0.25\ncorrector_termination: LocalError\n").unwrap();
    let simulation_params: SimulationParams = serde_yaml::from_value(value.clone()).unwrap();
    assert_eq!(simulation_params.h0, 0.25);
    assert_eq!(
        simulation_params.corrector_termination,
        crate::simulation_parameters::CorrectorTermination::LocalError
    );

    assert!(overwrite_config(&mut value, "no_such_key: 1.0\n").is_err());
}

#[test]
fn overwrite_config_reaches_defaulted_keys() {
    use crate::simulation_parameters::CorrectorTermination;

    let params_yaml = "time_step: 0.004\nmass: 0.064\ndelta: 0.5\nmax_vel: 0.0\nh0: 0.1\n";

    let simulation_params = parse_simulation_params(params_yaml, None).unwrap();
    assert_eq!(simulation_params.corrector_termination, CorrectorTermination::InitialError);

    let simulation_params =
        parse_simulation_params(params_yaml, Some("corrector_termination: LocalError\n")).unwrap();
    assert_eq!(simulation_params.corrector_termination, CorrectorTermination::LocalError);
    assert_eq!(simulation_params.h0, 0.1);

    assert!(parse_simulation_params(params_yaml, Some("no_such_key: 1.0\n")).is_err());
}

#[test]
fn series_is_closed_when_the_run_fails() {
    use crate::{
        particle::{Particle, ParticleLayout, ParticleLayoutType},
        V3,
    };

    let folder = std::env::temp_dir().join(format!("pcisph-lsh-failed-run-{}", std::process::id()));
    let particles = ParticleLayout::new(
        ParticleLayoutType::ArrayOfStructs,
        vec![Particle::new(V3::zeros(), V3::zeros()); 2],
    );

    let frame_exporter = FrameExporter::new(&folder, "frame").unwrap();
    let result = with_frame_exporter(Some(frame_exporter), |frame_exporter| {
        if let Some(frame_exporter) = frame_exporter {
            frame_exporter.add_snapshot(0.5, &particles)?;
        }
        Err(anyhow!("non-finite particle velocity after step 0"))
    });

    let err = result.unwrap_err();
    assert!(err.to_string().contains("non-finite"));
    let series = std::fs::read_to_string(folder.join("frame.series")).unwrap();
    assert!(series.contains("frame-00001.bin"));
    assert!(series.trim_end().ends_with('}'));

    std::fs::remove_dir_all(&folder).unwrap();
}
