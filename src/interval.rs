use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Half-open interval `[start, end)` into a PRG's linearized sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "interval start {} > end {}", start, end);
        Interval { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| format!("interval {:?} is not of the form [start, end)", s))?;
        let (start, end) = inner
            .split_once(',')
            .ok_or_else(|| format!("interval {:?} is missing a comma", s))?;
        let start: u32 = start
            .trim()
            .parse()
            .map_err(|e| format!("bad interval start in {:?}: {}", s, e))?;
        let end: u32 = end
            .trim()
            .parse()
            .map_err(|e| format!("bad interval end in {:?}: {}", s, e))?;
        if start > end {
            return Err(format!("interval {:?} has start > end", s));
        }
        Ok(Interval { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_empty() {
        let i = Interval::new(2, 5);
        assert_eq!(i.len(), 3);
        assert!(!i.is_empty());

        let e = Interval::new(4, 4);
        assert_eq!(e.len(), 0);
        assert!(e.is_empty());
    }

    #[test]
    fn test_ordering() {
        assert!(Interval::new(0, 3) < Interval::new(0, 4));
        assert!(Interval::new(0, 4) < Interval::new(1, 2));
    }

    #[test]
    fn test_display_parse_round_trip() {
        for iv in [Interval::new(0, 3), Interval::new(7, 7), Interval::new(12, 40)] {
            let s = iv.to_string();
            assert_eq!(s.parse::<Interval>().unwrap(), iv);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("3, 4".parse::<Interval>().is_err());
        assert!("[3 4)".parse::<Interval>().is_err());
        assert!("[5, 2)".parse::<Interval>().is_err());
    }
}
