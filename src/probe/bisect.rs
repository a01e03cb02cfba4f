//! Binary-search boundary discovery
//!
//! The success predicate must be monotonic: once a probe at `v` fails, every
//! value above `v` is assumed to fail as well. A backend that accepts a large
//! value but rejects a smaller one yields an incorrect boundary.
//!
//! The floor is assumed good and is never probed. The ceiling is probed like
//! any other value; the search starts with `known_bad = ceiling + 1`, meaning
//! "not yet seen to fail".

use std::fmt;

use tracing::warn;

/// Incremental search state; the caller probes each value [`next_probe`]
/// returns and reports the outcome with [`record`]
///
/// [`next_probe`]: BoundarySearch::next_probe
/// [`record`]: BoundarySearch::record
#[derive(Debug, Clone)]
pub struct BoundarySearch {
    floor: u64,
    ceiling: u64,
    known_good: u64,
    // u128 so that `ceiling + 1` is representable for `u64::MAX`
    known_bad: u128,
    gallop: Option<u64>,
    probes: u32,
}

impl BoundarySearch {
    /// Bisect `[floor, ceiling]` from the midpoint
    pub fn new(floor: u64, ceiling: u64) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            known_good: floor,
            known_bad: u128::from(ceiling) + 1,
            gallop: None,
            probes: 0,
        }
    }

    /// Probe `start, 2*start, 4*start, ...` until the first failure, then bisect
    ///
    /// Used for unbounded domains, where the first midpoint would be absurd.
    pub fn galloping(floor: u64, ceiling: u64, start: u64) -> Self {
        let mut search = Self::new(floor, ceiling);
        search.gallop = Some(start.max(floor.saturating_add(1)));
        search
    }

    /// The next value to probe, or `None` once the boundary is known
    pub fn next_probe(&self) -> Option<u64> {
        let gap = self.known_bad - u128::from(self.known_good);
        if gap <= 1 {
            return None;
        }
        if let Some(next) = self.gallop {
            return Some(next.min(self.ceiling));
        }
        Some(self.known_good + (gap / 2) as u64)
    }

    /// Record the outcome of probing `value`
    pub fn record(&mut self, value: u64, accepted: bool) {
        self.probes += 1;
        if accepted {
            if u128::from(value) >= self.known_bad {
                warn!(
                    "{} accepted after {} failed; the backend is not monotonic",
                    value, self.known_bad
                );
            } else if value > self.known_good {
                self.known_good = value;
            }
        } else if value <= self.known_good {
            warn!(
                "{} failed after {} succeeded; the backend is not monotonic",
                value, self.known_good
            );
        } else if u128::from(value) < self.known_bad {
            self.known_bad = u128::from(value);
        }

        if self.gallop.is_some() {
            self.gallop = if accepted && value < self.ceiling {
                Some(value.saturating_mul(2).max(value + 1))
            } else {
                None
            };
        }
    }

    /// Number of probes recorded so far
    pub fn probes(&self) -> u32 {
        self.probes
    }

    pub fn is_finished(&self) -> bool {
        self.next_probe().is_none()
    }

    /// The boundary as currently known
    pub fn finish(&self) -> Boundary {
        Boundary {
            floor: self.floor,
            ceiling: self.ceiling,
            known_good: self.known_good,
            known_bad: u64::try_from(self.known_bad)
                .ok()
                .filter(|&bad| bad <= self.ceiling),
            probes: self.probes,
        }
    }
}

/// Result of a boundary search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub floor: u64,
    pub ceiling: u64,
    /// Largest value that succeeded (or the floor)
    pub known_good: u64,
    /// Smallest value that failed, if any did
    pub known_bad: Option<u64>,
    pub probes: u32,
}

impl Boundary {
    /// Whether every value up to the ceiling succeeded
    pub fn reached_ceiling(&self) -> bool {
        self.known_good == self.ceiling
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known_bad {
            Some(bad) => write!(
                f,
                "{} succeeded, {} failed ({} probes)",
                self.known_good, bad, self.probes
            ),
            None => write!(
                f,
                "{} succeeded, no failure up to {} ({} probes)",
                self.known_good, self.ceiling, self.probes
            ),
        }
    }
}
