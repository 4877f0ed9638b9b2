use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    floating_type_mod::FT,
    particle::{ParticleLayout, ParticleSource},
};

/// Writes one binary file per step plus a `<basename>.series` index.
pub(crate) struct FrameExporter {
    /// something like './data/frame' which will get expanded to './data/frame-00001.bin' and './data/frame.series'
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
    series_file: File,
}

impl FrameExporter {
    pub(crate) fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> Result<FrameExporter> {
        let folder: PathBuf = folder.into();
        let basename: String = basename.into();

        create_dir_all(&folder).with_context(|| format!("failed creating {}", folder.display()))?;

        let series_path = folder.join(format!("{}.series", basename));
        let mut series_file =
            File::create(&series_path).with_context(|| format!("failed creating {}", series_path.display()))?;
        series_file.write_all("{\n\"file-series-version\": \"1.0\",\n\"files\": [".as_bytes())?;

        Ok(FrameExporter {
            series_file,
            folder,
            basename,
            snapshot_number: 1,
        })
    }

    pub(crate) fn add_snapshot(&mut self, time: FT, particles: &ParticleLayout) -> Result<()> {
        if self.snapshot_number > 1 {
            self.series_file.write_all(",".as_bytes())?;
        }

        let frame_filename = format!("{}-{:05}.bin", self.basename, self.snapshot_number);
        let frame_path = self.folder.join(&frame_filename);
        let file = File::create(&frame_path).with_context(|| format!("failed creating {}", frame_path.display()))?;
        let mut writer = BufWriter::new(file);
        write_frame(&mut writer, time, particles)?;
        writer.flush()?;

        write!(
            self.series_file,
            "\n{{ \"name\": \"{}\", \"time\": {} }}",
            frame_filename, time
        )?;

        self.snapshot_number += 1;
        Ok(())
    }

    /// Closes the file list of the series index.
    pub(crate) fn finish(mut self) -> Result<()> {
        self.series_file.write_all("\n]\n}\n".as_bytes())?;
        Ok(())
    }
}

/**
 * `u32` particle count and `f32` time, then per particle position, velocity, density and
 * pressure as `f32`. Everything little endian.
 */
pub(crate) fn write_frame(writer: &mut impl Write, time: FT, particles: &ParticleLayout) -> Result<()> {
    let num_particles = particles.num_particles();
    writer.write_u32::<LittleEndian>(u32::try_from(num_particles).context("too many particles for a frame")?)?;
    writer.write_f32::<LittleEndian>(time as f32)?;

    for i in 0..num_particles {
        let position = particles.position(i);
        let velocity = particles.velocity(i);
        for d in 0..3 {
            writer.write_f32::<LittleEndian>(position[d] as f32)?;
        }
        for d in 0..3 {
            writer.write_f32::<LittleEndian>(velocity[d] as f32)?;
        }
        writer.write_f32::<LittleEndian>(particles.density(i) as f32)?;
        writer.write_f32::<LittleEndian>(particles.pressure(i) as f32)?;
    }
    Ok(())
}

#[test]
fn frame_layout() {
    use byteorder::ReadBytesExt;

    use crate::{
        particle::{Particle, ParticleLayoutType},
        vec3f,
    };

    let mut records = vec![
        Particle::new(vec3f(1., 2., 3.), vec3f(-1., 0., 0.5)),
        Particle::new(vec3f(0., 0., 0.), vec3f(0., 0., 0.)),
    ];
    records[0].density = 1000.;
    records[0].pressure = 3.;
    let particles = ParticleLayout::new(ParticleLayoutType::ArrayOfStructs, records);

    let mut buffer = Vec::new();
    write_frame(&mut buffer, 0.5, &particles).unwrap();
    assert_eq!(buffer.len(), 4 + 4 + 2 * 8 * 4);

    let mut reader = &buffer[..];
    assert_eq!(reader.read_u32::<LittleEndian>().unwrap(), 2);
    assert_eq!(reader.read_f32::<LittleEndian>().unwrap(), 0.5);
    let values: Vec<f32> = (0..8).map(|_| reader.read_f32::<LittleEndian>().unwrap()).collect();
    assert_eq!(values, vec![1., 2., 3., -1., 0., 0.5, 1000., 3.]);
}

#[test]
fn exporter_writes_frames_and_series() {
    use crate::{
        particle::{Particle, ParticleLayoutType},
        V3,
    };

    let folder = std::env::temp_dir().join(format!("pcisph-lsh-frames-{}", std::process::id()));
    let particles = ParticleLayout::new(
        ParticleLayoutType::StructOfArrays,
        vec![Particle::new(V3::zeros(), V3::zeros()); 3],
    );

    let mut exporter = FrameExporter::new(&folder, "frame").unwrap();
    exporter.add_snapshot(0.5, &particles).unwrap();
    exporter.add_snapshot(1.0, &particles).unwrap();
    exporter.finish().unwrap();

    let frame = std::fs::read(folder.join("frame-00002.bin")).unwrap();
    assert_eq!(frame.len(), 8 + 3 * 8 * 4);
    assert_eq!(&frame[0..4], &3u32.to_le_bytes());

    let series = std::fs::read_to_string(folder.join("frame.series")).unwrap();
    assert!(series.contains("\"name\": \"frame-00001.bin\", \"time\": 0.5"));
    assert!(series.contains("frame-00002.bin"));
    assert!(series.trim_end().ends_with('}'));

    std::fs::remove_dir_all(&folder).unwrap();
}
