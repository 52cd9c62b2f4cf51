/// A closed range of ray parameters or coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Create a new interval given min and max values.
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns the size of the interval (max - min).
    pub fn size(&self) -> f32 {
        self.max - self.min
    }

    /// True when the interval contains no value at all (min > max).
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Half-open membership test, [min, max).
    ///
    /// Hit queries use this form: a surface exactly at `max` (the light sample, or the
    /// nearest hit found so far) does not count.
    pub fn contains_half_open(&self, x: f32) -> bool {
        self.min <= x && x < self.max
    }

    /// Expands the interval by delta/2 on each side.
    pub fn expand(&self, delta: f32) -> Interval {
        let padding = delta / 2.0;
        Interval::new(self.min - padding, self.max + padding)
    }

    /// Creates an interval that surrounds two other intervals.
    pub fn surrounding(a: &Interval, b: &Interval) -> Interval {
        Interval::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// An empty interval (min > max, contains nothing).
    pub const EMPTY: Interval = Interval {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    /// A universe interval (contains everything).
    pub const UNIVERSE: Interval = Interval {
        min: f32::NEG_INFINITY,
        max: f32::INFINITY,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_size() {
        assert_eq!(Interval::new(2.0, 7.0).size(), 5.0);
        assert_eq!(Interval::new(-5.0, 5.0).size(), 10.0);
    }

    #[test]
    fn test_interval_half_open() {
        let interval = Interval::new(0.5, 5.0);

        assert!(interval.contains_half_open(0.5));
        assert!(interval.contains_half_open(3.0));
        assert!(!interval.contains_half_open(5.0));
        assert!(!interval.contains_half_open(0.25));
    }

    #[test]
    fn test_interval_expand() {
        let expanded = Interval::new(0.0, 10.0).expand(4.0);

        assert_eq!(expanded.min, -2.0);
        assert_eq!(expanded.max, 12.0);
    }

    #[test]
    fn test_interval_empty() {
        let empty = Interval::EMPTY;

        assert!(empty.is_empty());
        assert!(!empty.contains_half_open(0.0));
        assert!(!empty.contains_half_open(f32::INFINITY));

        // Surrounding an empty interval yields the other one.
        let a = Interval::new(1.0, 2.0);
        assert_eq!(Interval::surrounding(&empty, &a), a);
    }

    #[test]
    fn test_interval_universe() {
        let universe = Interval::UNIVERSE;

        assert!(!universe.is_empty());
        assert!(universe.contains_half_open(1e10));
        assert!(universe.contains_half_open(-1e10));
    }
}
