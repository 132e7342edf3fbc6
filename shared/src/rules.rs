//! Grid geometry and collision rules.
//!
//! Everything here is a pure function of its arguments, so host and guest
//! evaluate identical inputs to identical results.

use crate::{Coordinate, Direction};
use serde::{Deserialize, Serialize};

/// Edge behaviour of the board. Both peers must run the same ruleset.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ruleset {
    /// Leaving the board is a collision.
    #[default]
    Walled,
    /// Leaving the board re-enters from the opposite edge.
    Toroidal,
}

impl Ruleset {
    /// Next head position for a snake under this ruleset.
    pub fn next_head(self, head: Coordinate, direction: Direction, grid_size: i32) -> Coordinate {
        let moved = advance(head, direction);
        match self {
            Ruleset::Walled => moved,
            Ruleset::Toroidal => wrap(moved, grid_size),
        }
    }

    pub fn hits_wall(self, head: Coordinate, grid_size: i32) -> bool {
        match self {
            Ruleset::Walled => is_wall_collision(head, grid_size),
            Ruleset::Toroidal => false,
        }
    }
}

/// Moves one cell in `direction`. Never wraps.
pub fn advance(position: Coordinate, direction: Direction) -> Coordinate {
    let (dx, dy) = direction.offset();
    Coordinate {
        x: position.x + dx,
        y: position.y + dy,
    }
}

pub fn wrap(position: Coordinate, grid_size: i32) -> Coordinate {
    Coordinate {
        x: position.x.rem_euclid(grid_size),
        y: position.y.rem_euclid(grid_size),
    }
}

pub fn is_wall_collision(head: Coordinate, grid_size: i32) -> bool {
    head.x < 0 || head.x >= grid_size || head.y < 0 || head.y >= grid_size
}

/// Checks `head` against the pre-move body, skipping the current head.
pub fn is_self_collision(head: Coordinate, body: &[Coordinate]) -> bool {
    body.iter().skip(1).any(|segment| *segment == head)
}

/// Checks `head` against every opponent segment, head included.
pub fn is_opponent_collision(head: Coordinate, opponent_body: &[Coordinate]) -> bool {
    opponent_body.iter().any(|segment| *segment == head)
}

pub fn is_head_to_head(head_a: Coordinate, head_b: Coordinate) -> bool {
    head_a == head_b
}

pub fn ate_food(head: Coordinate, food: Coordinate) -> bool {
    head == food
}

pub fn is_reversal(current: Direction, proposed: Direction) -> bool {
    current.opposite() == proposed
}

/// Prepends `new_head` and drops the tail unless the snake grew this tick.
pub fn grow_or_slide(body: &[Coordinate], new_head: Coordinate, grew: bool) -> Vec<Coordinate> {
    let keep = if grew {
        body.len()
    } else {
        body.len().saturating_sub(1)
    };

    let mut next = Vec::with_capacity(keep + 1);
    next.push(new_head);
    next.extend_from_slice(&body[..keep]);
    next
}

/// Why a snake died on a given tick, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    Wall,
    SelfBody,
    OpponentBody,
    HeadToHead,
}

/// Evaluates wall, self and opponent-body collisions in that order and
/// returns the first that applies. Head-to-head is checked separately
/// because it can co-occur with any of them.
pub fn first_collision(
    ruleset: Ruleset,
    new_head: Coordinate,
    body: &[Coordinate],
    opponent_body: &[Coordinate],
    grid_size: i32,
) -> Option<Collision> {
    if ruleset.hits_wall(new_head, grid_size) {
        Some(Collision::Wall)
    } else if is_self_collision(new_head, body) {
        Some(Collision::SelfBody)
    } else if is_opponent_collision(new_head, opponent_body) {
        Some(Collision::OpponentBody)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GRID_SIZE;

    fn c(x: i32, y: i32) -> Coordinate {
        Coordinate::new(x, y)
    }

    #[test]
    fn test_advance_does_not_wrap() {
        assert_eq!(advance(c(0, 0), Direction::Left), c(-1, 0));
        assert_eq!(advance(c(0, 0), Direction::Up), c(0, -1));
        assert_eq!(advance(c(19, 19), Direction::Right), c(20, 19));
        assert_eq!(advance(c(19, 19), Direction::Down), c(19, 20));
    }

    #[test]
    fn test_toroidal_wraps_both_edges() {
        let rules = Ruleset::Toroidal;
        assert_eq!(rules.next_head(c(0, 4), Direction::Left, GRID_SIZE), c(19, 4));
        assert_eq!(rules.next_head(c(19, 4), Direction::Right, GRID_SIZE), c(0, 4));
        assert_eq!(rules.next_head(c(4, 0), Direction::Up, GRID_SIZE), c(4, 19));
        assert_eq!(rules.next_head(c(4, 19), Direction::Down, GRID_SIZE), c(4, 0));
        assert!(!rules.hits_wall(c(-1, 0), GRID_SIZE));
    }

    #[test]
    fn test_wall_collision_bounds() {
        assert!(!is_wall_collision(c(0, 0), GRID_SIZE));
        assert!(!is_wall_collision(c(19, 19), GRID_SIZE));
        assert!(is_wall_collision(c(20, 5), GRID_SIZE));
        assert!(is_wall_collision(c(5, 20), GRID_SIZE));
        assert!(is_wall_collision(c(-1, 5), GRID_SIZE));
        assert!(is_wall_collision(c(5, -1), GRID_SIZE));
    }

    #[test]
    fn test_self_collision_ignores_current_head() {
        let body = vec![c(5, 5), c(4, 5), c(3, 5)];
        assert!(!is_self_collision(c(5, 5), &body));
        assert!(is_self_collision(c(4, 5), &body));
        assert!(is_self_collision(c(3, 5), &body));
        assert!(!is_self_collision(c(6, 5), &body));
    }

    #[test]
    fn test_opponent_collision_includes_head() {
        let opponent = vec![c(8, 8), c(8, 9)];
        assert!(is_opponent_collision(c(8, 8), &opponent));
        assert!(is_opponent_collision(c(8, 9), &opponent));
        assert!(!is_opponent_collision(c(8, 10), &opponent));
    }

    #[test]
    fn test_reversal_only_for_exact_opposite() {
        for current in Direction::ALL {
            for proposed in Direction::ALL {
                assert_eq!(is_reversal(current, proposed), proposed == current.opposite());
            }
        }
    }

    #[test]
    fn test_grow_or_slide_lengths() {
        let body = vec![c(5, 5), c(4, 5), c(3, 5)];

        let slid = grow_or_slide(&body, c(6, 5), false);
        assert_eq!(slid, vec![c(6, 5), c(5, 5), c(4, 5)]);

        let grown = grow_or_slide(&body, c(6, 5), true);
        assert_eq!(grown, vec![c(6, 5), c(5, 5), c(4, 5), c(3, 5)]);
    }

    #[test]
    fn test_grow_or_slide_single_segment() {
        let body = vec![c(2, 5)];
        assert_eq!(grow_or_slide(&body, c(3, 5), false), vec![c(3, 5)]);
        assert_eq!(grow_or_slide(&body, c(3, 5), true), vec![c(3, 5), c(2, 5)]);
    }

    #[test]
    fn test_first_collision_order() {
        let body = vec![c(0, 1), c(0, 0)];
        let opponent = vec![c(1, 1)];

        // Out of bounds beats everything else.
        assert_eq!(
            first_collision(Ruleset::Walled, c(-1, 1), &body, &opponent, GRID_SIZE),
            Some(Collision::Wall)
        );
        assert_eq!(
            first_collision(Ruleset::Walled, c(0, 0), &body, &[c(0, 0)], GRID_SIZE),
            Some(Collision::SelfBody)
        );
        assert_eq!(
            first_collision(Ruleset::Walled, c(1, 1), &body, &opponent, GRID_SIZE),
            Some(Collision::OpponentBody)
        );
        assert_eq!(
            first_collision(Ruleset::Walled, c(0, 2), &body, &opponent, GRID_SIZE),
            None
        );
    }

    #[test]
    fn test_ate_food_exact_match() {
        assert!(ate_food(c(10, 10), c(10, 10)));
        assert!(!ate_food(c(10, 11), c(10, 10)));
        assert!(is_head_to_head(c(3, 3), c(3, 3)));
        assert!(!is_head_to_head(c(3, 3), c(3, 4)));
    }
}
