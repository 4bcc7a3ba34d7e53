use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

#[macro_export]
macro_rules! pos {
    ($x:expr, $y:expr) => {
        $crate::Pos { x: $x, y: $y }
    };
}

impl Pos {
    /// folds the position back onto a `width` x `height` torus.
    pub fn wrap(self, width: i32, height: i32) -> Self {
        pos!(self.x.rem_euclid(width), self.y.rem_euclid(height))
    }
}

impl Add for Pos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        pos!(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Pos {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        pos!(self.x - rhs.x, self.y - rhs.y)
    }
}

#[test]
fn test_wrap() {
    assert_eq!(pos!(-1, 0).wrap(4, 3), pos!(3, 0));
    assert_eq!(pos!(4, 3).wrap(4, 3), pos!(0, 0));
    assert_eq!(pos!(2, -4).wrap(4, 3), pos!(2, 2));
    assert_eq!(pos!(1, 1) - pos!(2, 2) + pos!(1, 1), pos!(0, 0));
}
