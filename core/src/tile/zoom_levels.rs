use std::{ops::RangeInclusive, str::FromStr};

use anyhow::{bail, Context, Result};

/// The deepest zoom level a pyramid supports
pub const MAX_ZOOM: u8 = 30;

/// An inclusive range of zoom levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLevels {
    min: u8,
    max: u8,
}

impl ZoomLevels {
    /// Creates a range of zoom levels. The bounds may be given in any order.
    pub fn new(a: u8, b: u8) -> Result<Self> {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        if max > MAX_ZOOM {
            bail!("Zoom level {max} exceeds the maximum of {MAX_ZOOM}");
        }
        Ok(Self { min, max })
    }

    pub fn single(zoom: u8) -> Result<Self> {
        Self::new(zoom, zoom)
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    /// Iterates over all zoom levels in ascending order
    pub fn iter(&self) -> RangeInclusive<u8> {
        self.min..=self.max
    }
}

impl FromStr for ZoomLevels {
    type Err = anyhow::Error;

    /// Parses a single zoom level (`"5"`) or a range (`"3,8"`)
    fn from_str(s: &str) -> Result<Self> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u8>()
                .with_context(|| format!("Invalid zoom level `{v}'"))
        };
        match s.split_once(',') {
            Some((a, b)) => Self::new(parse(a)?, parse(b)?),
            None => Self::single(parse(s)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use assertor::{assert_that, EqualityAssertion, ResultAssertion};

    use super::ZoomLevels;

    #[test]
    fn single() {
        let z: ZoomLevels = "5".parse().unwrap();
        assert_that!(z.iter().collect::<Vec<_>>()).is_equal_to(vec![5]);
    }

    #[test]
    fn range_in_any_order() {
        let z: ZoomLevels = "8, 6".parse().unwrap();
        assert_that!(z.min()).is_equal_to(6);
        assert_that!(z.max()).is_equal_to(8);
        assert_that!(z.iter().collect::<Vec<_>>()).is_equal_to(vec![6, 7, 8]);
    }

    #[test]
    fn invalid() {
        assert_that!("abc".parse::<ZoomLevels>()).is_err();
        assert_that!("1,".parse::<ZoomLevels>()).is_err();
        assert_that!("31".parse::<ZoomLevels>()).is_err();
    }
}
