use rand::Rng;
use std::collections::HashSet;

use crate::{Parcel, ParcelId};

/// Draw up to `count` distinct parcels from `pool`.
///
/// Performs exactly `count` uniform draws and keeps a draw only if its
/// identity has not been kept yet. Colliding draws are discarded without
/// retry, so the result may hold fewer than `count` parcels, more likely so
/// as `count` approaches the pool size.
pub fn select_random_subset<R: Rng>(pool: &[Parcel], count: usize, rng: &mut R) -> Vec<Parcel> {
    if pool.is_empty() {
        return Vec::new();
    }

    let mut kept: HashSet<ParcelId> = HashSet::with_capacity(count);
    let mut selected = Vec::with_capacity(count.min(pool.len()));

    for _ in 0..count {
        let parcel = pool[rng.gen_range(0..pool.len())];
        if kept.insert(parcel.id()) {
            selected.push(parcel);
        }
    }

    selected
}
