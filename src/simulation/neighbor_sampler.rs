use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, V3};

/// Every neighbor query draws this many offsets from the bucket table, independent of the
/// true neighbor count.
pub const SAMPLES_PER_QUERY: usize = 150;

pub const NUM_HASH_PLANES: usize = 8;

/// Table value meaning "no particle". Particle 0 is therefore never returned as a neighbor.
pub const NEIGHBOR_SENTINEL: u32 = 0;

/// Shape of the particle set and of the bucket table for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingInfo {
    pub particles: usize,
    pub boundaries: usize,
    pub buckets: usize,
    pub bucket_size: usize,
}

impl SizingInfo {
    pub fn table_len(&self) -> usize {
        self.buckets * self.bucket_size
    }
}

/// The hyperplanes (given by their normals) whose sides define the hash code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashPlanes {
    pub normals: [V3; NUM_HASH_PLANES],
}

/// Flat `buckets * bucket_size` array of particle indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeighborTable {
    pub(crate) entries: Vec<u32>,
}

impl NeighborTable {
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn side_of_plane(x: FT) -> usize {
    if x <= 0. {
        0
    } else {
        1
    }
}

/** 8-bit code from the signs of the dot products with each plane, first plane in the highest bit. */
pub fn hash_code(position: V3, planes: &HashPlanes) -> usize {
    let mut code = 0;
    for normal in planes.normals.iter() {
        code <<= 1;
        code += side_of_plane(normal.dot(&position));
    }
    code
}

/**
 * Folds the hash code into the bucket dimension. Codes at or above the bucket count wrap
 * around the whole table instead of staying inside one logical bucket.
 */
#[inline(always)]
pub fn table_index(code: usize, offset: usize, sizing: SizingInfo) -> usize {
    (code * sizing.buckets + offset) % sizing.table_len()
}

pub fn sample(
    position: V3,
    offset: usize,
    table: &NeighborTable,
    sizing: SizingInfo,
    planes: &HashPlanes,
) -> Option<usize> {
    lookup(table, table_index(hash_code(position, planes), offset, sizing))
}

#[inline(always)]
fn lookup(table: &NeighborTable, index: usize) -> Option<usize> {
    match table.entries[index] {
        NEIGHBOR_SENTINEL => None,
        j => Some(j as usize),
    }
}

/// Read-only view on the inputs needed for neighbor queries during a pass.
#[derive(Clone, Copy)]
pub struct NeighborSampler<'a> {
    pub table: &'a NeighborTable,
    pub sizing: SizingInfo,
    pub planes: &'a HashPlanes,
}

impl<'a> NeighborSampler<'a> {
    pub fn new(table: &'a NeighborTable, sizing: SizingInfo, planes: &'a HashPlanes) -> Self {
        assert_eq!(
            table.len(),
            sizing.table_len(),
            "neighbor table does not match buckets * bucket_size"
        );
        NeighborSampler { table, sizing, planes }
    }

    /**
     * All non-sentinel samples for a query at `position`. The same index can show up more
     * than once and the querying particle can sample itself.
     */
    pub fn samples(&self, position: V3) -> impl Iterator<Item = usize> + 'a {
        let code = hash_code(position, self.planes);
        let sizing = self.sizing;
        let table = self.table;
        (0..SAMPLES_PER_QUERY).filter_map(move |offset| lookup(table, table_index(code, offset, sizing)))
    }
}

#[cfg(test)]
pub(crate) fn axis_planes() -> HashPlanes {
    use crate::vec3f;

    HashPlanes {
        normals: [
            vec3f(1., 0., 0.),
            vec3f(0., 1., 0.),
            vec3f(0., 0., 1.),
            vec3f(-1., 0., 0.),
            vec3f(0., -1., 0.),
            vec3f(0., 0., -1.),
            vec3f(1., 1., 0.).normalize(),
            vec3f(0., 1., 1.).normalize(),
        ],
    }
}

#[test]
fn hash_code_follows_plane_signs() {
    use crate::vec3f;

    let planes = axis_planes();

    assert_eq!(hash_code(vec3f(1., 1., 1.), &planes), 0b1110_0011);
    assert_eq!(hash_code(vec3f(-1., -1., -1.), &planes), 0b0001_1100);
    // a point on every plane is "not above" any of them
    assert_eq!(hash_code(V3::zeros(), &planes), 0);
}

#[test]
fn hash_code_is_deterministic_and_in_range() {
    use crate::vec3f;

    let planes = axis_planes();
    for i in 0..200 {
        let t = i as FT * 0.37;
        let p = vec3f(t.sin() * 3., (t * 1.3).cos() * 2., t.sin() * t.cos());
        let code = hash_code(p, &planes);
        assert!(code < 256);
        assert_eq!(code, hash_code(p, &planes));
    }
}

#[test]
fn samples_stay_inside_the_table() {
    use crate::vec3f;

    let planes = axis_planes();
    for (buckets, bucket_size) in [(1, 1), (3, 7), (16, 20), (256, 4), (300, 200)] {
        let sizing = SizingInfo {
            particles: 10,
            boundaries: 0,
            buckets,
            bucket_size,
        };
        for code in 0..256 {
            for offset in 0..SAMPLES_PER_QUERY {
                assert!(table_index(code, offset, sizing) < sizing.table_len());
            }
        }

        let table = NeighborTable {
            entries: (0..sizing.table_len() as u32).collect(),
        };
        for offset in 0..SAMPLES_PER_QUERY {
            let p = vec3f(1., -2., 0.5);
            if let Some(j) = sample(p, offset, &table, sizing, &planes) {
                assert!(j < sizing.table_len());
            }
        }
    }
}

#[test]
fn sentinel_is_never_sampled() {
    let planes = axis_planes();
    let sizing = SizingInfo {
        particles: 4,
        boundaries: 0,
        buckets: 1,
        bucket_size: 4,
    };
    let table = NeighborTable {
        entries: vec![0, 3, 0, 2],
    };
    let sampler = NeighborSampler::new(&table, sizing, &planes);

    let samples: Vec<usize> = sampler.samples(V3::zeros()).collect();

    // 150 offsets wrap around the 4 slots
    assert!(samples.iter().all(|&j| j == 2 || j == 3));
    assert_eq!(samples.iter().filter(|&&j| j == 3).count(), 38);
    assert_eq!(samples.iter().filter(|&&j| j == 2).count(), 37);
    assert_eq!(sample(V3::zeros(), 0, &table, sizing, &planes), None);
    assert_eq!(sample(V3::zeros(), 1, &table, sizing, &planes), Some(3));
}
