//! Pixel-stepped movement. The registry advances movements one pixel at
//! a time, probing the obstacle resolver before committing each step.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction4 {
    Right,
    Up,
    Left,
    Down,
}

impl Direction4 {
    /// Unit displacement in map pixels (y grows downward).
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction4::Right => (1, 0),
            Direction4::Up => (0, -1),
            Direction4::Left => (-1, 0),
            Direction4::Down => (0, 1),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction4::Right => Direction4::Left,
            Direction4::Up => Direction4::Down,
            Direction4::Left => Direction4::Right,
            Direction4::Down => Direction4::Up,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction4::Right => "right",
            Direction4::Up => "up",
            Direction4::Left => "left",
            Direction4::Down => "down",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "right" => Direction4::Right,
            "up" => Direction4::Up,
            "left" => Direction4::Left,
            "down" => Direction4::Down,
            _ => return None,
        })
    }
}

/// Straight movement at an integer pixel speed, optionally bounded to a
/// total distance. One pixel is tested and committed at a time, so an
/// obstacle stops the mover flush against it with no overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub direction: Direction4,
    /// Pixels attempted per tick.
    pub speed: i32,
    /// Pixels left to travel; `None` is unbounded.
    pub remaining: Option<i32>,
    /// Set when the last attempted step was blocked.
    pub blocked: bool,
}

impl Movement {
    pub fn straight(direction: Direction4, speed: i32) -> Self {
        Self {
            direction,
            speed: speed.max(0),
            remaining: None,
            blocked: false,
        }
    }

    pub fn bounded(direction: Direction4, speed: i32, distance: i32) -> Self {
        Self {
            remaining: Some(distance.max(0)),
            ..Self::straight(direction, speed)
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.remaining, Some(0))
    }

    /// Pixels to attempt this tick.
    pub fn steps_this_tick(&self) -> i32 {
        match self.remaining {
            Some(remaining) => self.speed.min(remaining),
            None => self.speed,
        }
    }

    /// Accounts for one committed pixel.
    pub fn record_step(&mut self) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = (*remaining - 1).max(0);
        }
        self.blocked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_directions_pair_up() {
        for direction in [
            Direction4::Right,
            Direction4::Up,
            Direction4::Left,
            Direction4::Down,
        ] {
            assert_eq!(direction.opposite().opposite(), direction);
            let (dx, dy) = direction.delta();
            let (ox, oy) = direction.opposite().delta();
            assert_eq!((dx + ox, dy + oy), (0, 0));
        }
    }

    #[test]
    fn bounded_movement_finishes_after_its_distance() {
        let mut movement = Movement::bounded(Direction4::Right, 3, 5);
        let mut committed = 0;
        while !movement.is_finished() {
            for _ in 0..movement.steps_this_tick() {
                movement.record_step();
                committed += 1;
            }
        }
        assert_eq!(committed, 5);
    }

    #[test]
    fn last_tick_attempts_only_the_leftover_pixels() {
        let movement = Movement::bounded(Direction4::Down, 4, 6);
        assert_eq!(movement.steps_this_tick(), 4);
        let mut movement = movement;
        for _ in 0..4 {
            movement.record_step();
        }
        assert_eq!(movement.steps_this_tick(), 2);
    }
}
