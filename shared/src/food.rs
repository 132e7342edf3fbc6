//! Food placement for the authoritative peer.

use crate::Coordinate;
use rand::Rng;
use std::collections::HashSet;

const RANDOM_ATTEMPTS: usize = 32;

/// Picks a cell not covered by any of `occupied`.
///
/// Rolls uniformly a few times first, then falls back to choosing among the
/// remaining free cells. Returns `None` only when the board is full.
pub fn place_food<'a, R, I>(rng: &mut R, occupied: I, grid_size: i32) -> Option<Coordinate>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'a Coordinate>,
{
    let taken: HashSet<Coordinate> = occupied.into_iter().copied().collect();

    for _ in 0..RANDOM_ATTEMPTS {
        let candidate = Coordinate {
            x: rng.gen_range(0..grid_size),
            y: rng.gen_range(0..grid_size),
        };
        if !taken.contains(&candidate) {
            return Some(candidate);
        }
    }

    let free: Vec<Coordinate> = (0..grid_size)
        .flat_map(|y| (0..grid_size).map(move |x| Coordinate { x, y }))
        .filter(|cell| !taken.contains(cell))
        .collect();

    if free.is_empty() {
        None
    } else {
        Some(free[rng.gen_range(0..free.len())])
    }
}
