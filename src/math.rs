use std::ops::{Add, Div, Mul, Sub};

/// A 2D integer or float vector, used for image resolutions, positions, and sampling rates.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vec2<T>(pub T, pub T);

impl<T: Copy> Vec2<T> {
    #[inline] pub fn x(self) -> T { self.0 }
    #[inline] pub fn y(self) -> T { self.1 }
    #[inline] pub fn width(self) -> T { self.0 }
    #[inline] pub fn height(self) -> T { self.1 }
}

impl Vec2<usize> {
    #[inline]
    pub fn area(self) -> usize { self.0 * self.1 }

    pub fn to_i32(self) -> Vec2<i32> {
        Vec2(self.0 as i32, self.1 as i32)
    }
}

impl Vec2<i32> {
    pub fn to_usize(self, name: &'static str) -> crate::error::Result<Vec2<usize>> {
        Ok(Vec2(
            crate::io::positive_i32(self.0, name)? as usize,
            crate::io::positive_i32(self.1, name)? as usize,
        ))
    }
}

impl<T: Add<Output = T>> Add for Vec2<T> {
    type Output = Self;
    fn add(self, other: Self) -> Self { Vec2(self.0 + other.0, self.1 + other.1) }
}

impl<T: Sub<Output = T>> Sub for Vec2<T> {
    type Output = Self;
    fn sub(self, other: Self) -> Self { Vec2(self.0 - other.0, self.1 - other.1) }
}

impl<T: Mul<Output = T> + Copy> Mul<T> for Vec2<T> {
    type Output = Self;
    fn mul(self, scalar: T) -> Self { Vec2(self.0 * scalar, self.1 * scalar) }
}

impl<T: Div<Output = T> + Copy> Div<T> for Vec2<T> {
    type Output = Self;
    fn div(self, scalar: T) -> Self { Vec2(self.0 / scalar, self.1 / scalar) }
}

impl<T: std::fmt::Display> std::fmt::Display for Vec2<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.0, self.1)
    }
}

// calculations inspired by
// https://github.com/AcademySoftwareFoundation/openexr/blob/master/OpenEXR/IlmImf/ImfTiledMisc.cpp


/// computes floor(log(x)/log(2))
pub fn floor_log_2(mut number: u32) -> u32 {
    debug_assert_ne!(number, 0);

    let mut log = 0;

//     TODO check if this unrolls properly?
    while number > 1 {
        log += 1;
        number >>= 1;
    }

    log
}


/// computes ceil(log(x)/log(2))
// taken from https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfTiledMisc.cpp
pub fn ceil_log_2(mut number: u32) -> u32 {
    debug_assert_ne!(number, 0);

    let mut log = 0;
    let mut round_up = 0;

    // TODO check if this unrolls properly
    while number > 1 {
        if number & 1 != 0 {
            round_up = 1;
        }

        log +=  1;
        number >>= 1;
    }

    log + round_up
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RoundingMode {
    Down, Up,
}

impl RoundingMode {
    pub fn log2(self, number: u32) -> u32 {
        match self {
            RoundingMode::Down => self::floor_log_2(number),
            RoundingMode::Up => self::ceil_log_2(number),
        }
    }

    pub fn divide(self, dividend: u32, divisor: u32) -> u32 {
        match self {
            RoundingMode::Up => (dividend + divisor - 1) / divisor, // only works for positive numbers
            RoundingMode::Down => dividend / divisor,
        }
    }
}

pub fn compute_tile_count(full_res: u32, tile_size: u32) -> u32 {
    // round up, because if the image is not evenly divisible by the tiles,
    // we add another tile at the end (which is only partially used)
    RoundingMode::Up.divide(full_res, tile_size)
}


// TODO this should be cached? log2 may be very expensive
pub fn compute_level_count(round: RoundingMode, full_res: u32) -> u32 {
    round.log2(full_res) + 1
}

pub fn compute_level_size(round: RoundingMode, full_res: u32, level_index: u32) -> u32 {
    round.divide(full_res,  1 << level_index).max(1)
}

// TODO cache these?
// TODO compute these directly instead of summing up an iterator?
pub fn rip_map_resolutions(round: RoundingMode, max_resolution: (u32, u32)) -> impl Iterator<Item=(u32, u32)> {
    let (w, h) = (compute_level_count(round, max_resolution.0), compute_level_count(round, max_resolution.1));

    (0..w) // TODO test this
        .flat_map(move |x_level|{ // FIXME may swap y and x order?
            (0..h).map(move |y_level| {
                // TODO progressively divide instead??
                let width = compute_level_size(round, max_resolution.0, x_level);
                let height = compute_level_size(round, max_resolution.1, y_level);
                (width, height)
            })
        })
}

// TODO cache all these level values when computing table offset size??
// TODO compute these directly instead of summing up an iterator?
pub fn mip_map_resolutions(round: RoundingMode, max_resolution: (u32, u32)) -> impl Iterator<Item=(u32, u32)> {
    (0..compute_level_count(round, max_resolution.0.max(max_resolution.1)))
        .map(move |level|{
            // TODO progressively divide instead??
            let width = compute_level_size(round, max_resolution.0, level);
            let height = compute_level_size(round, max_resolution.1, level);
            (width, height)
        })
}
