use crate::interval::Interval;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered sequence of half-open intervals through a PRG's linearized
/// sequence. Sentinel graph nodes carry the empty path.
///
/// The textual form is `N{[s, e)[s, e)…}` with `N` the interval count, so a
/// serialized path always begins with a digit.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PrgPath {
    intervals: Vec<Interval>,
}

impl PrgPath {
    pub fn empty() -> Self {
        PrgPath { intervals: Vec::new() }
    }

    /// Build a path from intervals; each interval must begin at or after the
    /// end of the previous one.
    pub fn from_intervals(intervals: Vec<Interval>) -> Result<Self, String> {
        for pair in intervals.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(format!(
                    "path intervals out of order: {} then {}",
                    pair[0], pair[1]
                ));
            }
        }
        Ok(PrgPath { intervals })
    }

    /// Single-interval path `[start, start + len)`.
    pub fn single(start: u32, len: u32) -> Self {
        PrgPath {
            intervals: vec![Interval::new(start, start + len)],
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Total number of positions covered.
    pub fn length(&self) -> u32 {
        self.intervals.iter().map(Interval::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Start coordinate of the first interval; 0 for the empty path.
    pub fn start(&self) -> u32 {
        self.intervals.first().map_or(0, |iv| iv.start)
    }

    /// End coordinate of the last interval; 0 for the empty path.
    pub fn end(&self) -> u32 {
        self.intervals.last().map_or(0, |iv| iv.end)
    }

    /// Merge an ordered run of paths into one covering path, coalescing
    /// overlapping and adjacent intervals. Used to translate a chain of
    /// overlapping k-mer paths back into one nucleotide stretch.
    pub fn union<'a>(paths: impl IntoIterator<Item = &'a PrgPath>) -> PrgPath {
        let mut all: Vec<Interval> = paths
            .into_iter()
            .flat_map(|p| p.intervals.iter().copied())
            .filter(|iv| !iv.is_empty())
            .collect();
        all.sort();

        let mut merged: Vec<Interval> = Vec::with_capacity(all.len());
        for iv in all {
            match merged.last_mut() {
                Some(last) if iv.start <= last.end => last.end = last.end.max(iv.end),
                _ => merged.push(iv),
            }
        }
        PrgPath { intervals: merged }
    }
}

impl fmt::Display for PrgPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.intervals.len())?;
        for iv in &self.intervals {
            write!(f, "{}", iv)?;
        }
        write!(f, "}}")
    }
}

impl FromStr for PrgPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let brace = s
            .find('{')
            .ok_or_else(|| format!("path {:?} is missing '{{'", s))?;
        let count: usize = s[..brace]
            .parse()
            .map_err(|e| format!("bad interval count in path {:?}: {}", s, e))?;
        let body = s[brace + 1..]
            .strip_suffix('}')
            .ok_or_else(|| format!("path {:?} is missing '}}'", s))?;

        let mut intervals = Vec::with_capacity(count);
        let mut rest = body;
        while !rest.is_empty() {
            let close = rest
                .find(')')
                .ok_or_else(|| format!("unterminated interval in path {:?}", s))?;
            intervals.push(rest[..=close].parse::<Interval>()?);
            rest = &rest[close + 1..];
        }
        if intervals.len() != count {
            return Err(format!(
                "path {:?} declares {} intervals but contains {}",
                s,
                count,
                intervals.len()
            ));
        }
        PrgPath::from_intervals(intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(ivs: &[(u32, u32)]) -> PrgPath {
        PrgPath::from_intervals(ivs.iter().map(|&(s, e)| Interval::new(s, e)).collect()).unwrap()
    }

    #[test]
    fn test_length_start_end() {
        let p = path(&[(0, 1), (4, 5), (8, 9)]);
        assert_eq!(p.length(), 3);
        assert_eq!(p.start(), 0);
        assert_eq!(p.end(), 9);
        assert!(!p.is_empty());
        assert!(PrgPath::empty().is_empty());
    }

    #[test]
    fn test_rejects_out_of_order_intervals() {
        assert!(
            PrgPath::from_intervals(vec![Interval::new(4, 8), Interval::new(2, 3)]).is_err()
        );
    }

    #[test]
    fn test_display_begins_with_digit() {
        let p = path(&[(0, 3), (5, 8)]);
        let s = p.to_string();
        assert_eq!(s, "2{[0, 3)[5, 8)}");
        assert!(s.chars().next().unwrap().is_ascii_digit());
        assert_eq!(PrgPath::empty().to_string(), "0{}");
    }

    #[test]
    fn test_parse_round_trip() {
        for p in [
            PrgPath::empty(),
            path(&[(0, 3)]),
            path(&[(0, 1), (4, 5), (8, 9)]),
        ] {
            assert_eq!(p.to_string().parse::<PrgPath>().unwrap(), p);
        }
        assert!("2{[0, 3)}".parse::<PrgPath>().is_err());
        assert!("x{[0, 3)}".parse::<PrgPath>().is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(path(&[(0, 3)]) < path(&[(0, 4)]));
        assert!(path(&[(0, 3)]) < path(&[(0, 3), (5, 6)]));
        assert!(PrgPath::empty() < path(&[(0, 1)]));
    }

    #[test]
    fn test_union_merges_overlaps() {
        let a = path(&[(0, 5)]);
        let b = path(&[(3, 8)]);
        let c = path(&[(10, 12)]);
        let u = PrgPath::union([&a, &b, &c]);
        assert_eq!(u.intervals(), &[Interval::new(0, 8), Interval::new(10, 12)]);
        assert_eq!(u.length(), 10);
    }
}
