use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    neighbor_sampler::{
        hash_code, table_index, HashPlanes, NeighborTable, SizingInfo, NEIGHBOR_SENTINEL, NUM_HASH_PLANES,
    },
    V3,
};

impl HashPlanes {
    /**
     * Random plane normals with components drawn from [-0.5, 0.5), normalized afterwards.
     */
    pub fn random(seed: u64) -> HashPlanes {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut normals = [V3::zeros(); NUM_HASH_PLANES];
        for normal in normals.iter_mut() {
            loop {
                let candidate: V3 = V3::from_fn(|_, _| rng.gen::<FT>() - 0.5);
                let norm = candidate.norm();
                if norm > 1.0e-3 {
                    *normal = candidate / norm;
                    break;
                }
            }
        }
        HashPlanes { normals }
    }
}

impl NeighborTable {
    pub fn empty(sizing: SizingInfo) -> NeighborTable {
        assert!(sizing.buckets > 0 && sizing.bucket_size > 0, "empty neighbor table layout");
        NeighborTable {
            entries: vec![NEIGHBOR_SENTINEL; sizing.table_len()],
        }
    }

    /// Wraps a table that was built elsewhere.
    pub fn from_entries(entries: Vec<u32>, sizing: SizingInfo) -> NeighborTable {
        assert_eq!(
            entries.len(),
            sizing.table_len(),
            "neighbor table does not match buckets * bucket_size"
        );
        NeighborTable { entries }
    }

    /**
     * Rebuild the table from the current particle positions.
     *
     * Particle `i` goes into the first free slot of `table_index(code_i, k)` for
     * `k = 0..bucket_size`, which are exactly the slots the sampler reads first for that
     * code. Particles that find no free slot are left out for this step.
     *
     * Returns the number of particles that were left out. Particle 0 is never stored.
     */
    pub fn rebuild(&mut self, positions: &[V3], planes: &HashPlanes, sizing: SizingInfo) -> usize {
        assert_eq!(self.entries.len(), sizing.table_len());

        let mut codes = vec![0usize; positions.len()];
        par_iter_mut1(&mut codes, |i, p_code| {
            *p_code = hash_code(positions[i], planes);
        });

        for entry in self.entries.iter_mut() {
            *entry = NEIGHBOR_SENTINEL;
        }

        let mut num_dropped = 0;
        // index 0 doubles as the sentinel and cannot be stored
        for (i, &code) in codes.iter().enumerate().skip(1) {
            let free_slot = (0..sizing.bucket_size)
                .map(|k| table_index(code, k, sizing))
                .find(|&idx| self.entries[idx] == NEIGHBOR_SENTINEL);

            match free_slot {
                Some(idx) => self.entries[idx] = i as u32,
                None => num_dropped += 1,
            }
        }

        num_dropped
    }

    pub fn build(positions: &[V3], planes: &HashPlanes, sizing: SizingInfo) -> NeighborTable {
        let mut table = NeighborTable::empty(sizing);
        let num_dropped = table.rebuild(positions, planes, sizing);
        if num_dropped > 0 {
            log::debug!(
                "neighbor table: {} of {} particles did not fit into their buckets",
                num_dropped,
                positions.len()
            );
        }
        table
    }
}

#[test]
fn random_planes_are_unit_and_seeded() {
    use crate::assert_ft_approx_eq;

    let a = HashPlanes::random(7);
    let b = HashPlanes::random(7);
    let c = HashPlanes::random(8);

    assert_eq!(a, b);
    assert_ne!(a, c);
    for normal in a.normals.iter() {
        assert_ft_approx_eq(normal.norm(), 1., 1e-5, || "plane normal length".to_string());
    }
}

#[test]
fn built_table_only_holds_matching_codes() {
    use crate::vec3f;

    let planes = HashPlanes::random(3);
    let sizing = SizingInfo {
        particles: 64,
        boundaries: 0,
        buckets: 16,
        bucket_size: 16,
    };
    let positions: Vec<V3> = (0..64)
        .map(|i| {
            let t = i as FT;
            vec3f((t * 0.7).sin(), (t * 1.1).cos(), (t * 0.3).sin() * 2.)
        })
        .collect();

    let table = NeighborTable::build(&positions, &planes, sizing);

    for (idx, &entry) in table.entries().iter().enumerate() {
        if entry == NEIGHBOR_SENTINEL {
            continue;
        }
        let code = hash_code(positions[entry as usize], &planes);
        assert!(
            (0..sizing.bucket_size).any(|k| table_index(code, k, sizing) == idx),
            "particle {} stored in a slot its code never reads",
            entry
        );
    }

    // each particle is stored at most once
    let mut stored: Vec<u32> = table.entries().iter().cloned().filter(|&e| e != 0).collect();
    let len = stored.len();
    stored.sort_unstable();
    stored.dedup();
    assert_eq!(len, stored.len());
}

#[test]
fn particle_samples_itself_after_rebuild() {
    use crate::{neighbor_sampler::NeighborSampler, vec3f};

    let planes = HashPlanes::random(11);
    let sizing = SizingInfo {
        particles: 3,
        boundaries: 0,
        buckets: 4,
        bucket_size: 8,
    };
    let positions = vec![vec3f(5., 5., 5.), vec3f(0.1, 0.2, 0.3), vec3f(-0.4, 0.1, 0.2)];
    let table = NeighborTable::build(&positions, &planes, sizing);
    let sampler = NeighborSampler::new(&table, sizing, &planes);

    for i in 1..3 {
        assert!(sampler.samples(positions[i]).any(|j| j == i));
    }
    // particle 0 is indistinguishable from an empty slot
    assert!(sampler.samples(positions[0]).all(|j| j != 0));
}

#[test]
fn overfull_buckets_drop_particles() {
    let planes = HashPlanes::random(5);
    let sizing = SizingInfo {
        particles: 10,
        boundaries: 0,
        buckets: 1,
        bucket_size: 4,
    };
    let positions = vec![V3::zeros(); 10];

    let mut table = NeighborTable::empty(sizing);
    let num_dropped = table.rebuild(&positions, &planes, sizing);

    assert_eq!(num_dropped, 5);
    let mut stored = table.entries().to_vec();
    stored.sort_unstable();
    assert_eq!(stored, vec![1, 2, 3, 4]);
}
