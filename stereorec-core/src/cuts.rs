//! Run-level cut statistics.
//!
//! Each processed event either survives or is rejected by exactly one
//! [`CutReason`]. Reasons are listed in pipeline order, which is also the
//! report order.
#![allow(clippy::cast_precision_loss)]

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why an event was dropped, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CutReason {
    /// Removed by random sub-sampling.
    RandomThinning,
    /// Too few images in the upstream reconstruction.
    Multiplicity,
    /// Upstream reconstruction did not converge.
    Convergence,
    /// Too few images left after image selection.
    ImageSelection,
    /// Geometric reconstruction failed.
    Geometry,
    /// Reconstructed core is not finite.
    CoreInvalid,
    /// Reconstructed offset beyond the wobble cut.
    WobbleOffset,
    /// True offset outside the table-filling range.
    TrueOffsetRange,
}

impl CutReason {
    /// All reasons in report order.
    pub const ALL: [CutReason; 8] = [
        CutReason::RandomThinning,
        CutReason::Multiplicity,
        CutReason::Convergence,
        CutReason::ImageSelection,
        CutReason::Geometry,
        CutReason::CoreInvalid,
        CutReason::WobbleOffset,
        CutReason::TrueOffsetRange,
    ];

    /// Position in [`CutReason::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            CutReason::RandomThinning => "random thinning",
            CutReason::Multiplicity => "image multiplicity",
            CutReason::Convergence => "reconstruction convergence",
            CutReason::ImageSelection => "image selection",
            CutReason::Geometry => "geometric reconstruction",
            CutReason::CoreInvalid => "invalid core",
            CutReason::WobbleOffset => "wobble offset",
            CutReason::TrueOffsetRange => "true offset range",
        }
    }
}

/// Monotonic counters accumulated over a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CutStatistics {
    /// Events entering the event loop.
    pub total: u64,
    /// Events emitted.
    pub survived: u64,
    /// Rejections per reason, indexed by [`CutReason::index`].
    pub rejected: [u64; CutReason::ALL.len()],
}

impl CutStatistics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an event entering the loop.
    pub fn record_seen(&mut self) {
        self.total += 1;
    }

    /// Counts a rejection.
    pub fn record_rejection(&mut self, reason: CutReason) {
        self.rejected[reason.index()] += 1;
    }

    /// Counts a surviving event.
    pub fn record_survivor(&mut self) {
        self.survived += 1;
    }

    /// Rejections for one reason.
    #[must_use]
    pub fn rejected_by(&self, reason: CutReason) -> u64 {
        self.rejected[reason.index()]
    }

    /// Sum of all rejections.
    #[must_use]
    pub fn total_rejected(&self) -> u64 {
        self.rejected.iter().sum()
    }

    /// True when every seen event is accounted for exactly once.
    ///
    /// Holds between events; an event in flight has been seen but not yet
    /// classified.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total == self.survived + self.total_rejected()
    }

    /// Adds another run's counters (reduction across workers).
    pub fn merge(&mut self, other: &CutStatistics) {
        self.total += other.total;
        self.survived += other.survived;
        for (a, b) in self.rejected.iter_mut().zip(other.rejected.iter()) {
            *a += b;
        }
    }

    /// Per-stage rows: reason, count, fraction of all events, fraction of
    /// the events still present when the cut was applied.
    #[must_use]
    pub fn rows(&self) -> Vec<CutRow> {
        let mut remaining = self.total;
        CutReason::ALL
            .iter()
            .map(|&reason| {
                let count = self.rejected_by(reason);
                let row = CutRow {
                    reason,
                    count,
                    fraction_of_total: fraction(count, self.total),
                    fraction_of_remaining: fraction(count, remaining),
                };
                remaining = remaining.saturating_sub(count);
                row
            })
            .collect()
    }
}

/// One line of the cut report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutRow {
    pub reason: CutReason,
    pub count: u64,
    pub fraction_of_total: f64,
    pub fraction_of_remaining: f64,
}

fn fraction(count: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        count as f64 / denominator as f64
    }
}

impl fmt::Display for CutStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cut statistics")?;
        writeln!(f, "{:-<72}", "")?;
        writeln!(f, "{:<28} {:>12}", "events seen", self.total)?;
        writeln!(
            f,
            "{:<28} {:>12} {:>14} {:>14}",
            "cut", "rejected", "of total", "of remaining"
        )?;
        for row in self.rows() {
            writeln!(
                f,
                "{:<28} {:>12} {:>13.2}% {:>13.2}%",
                row.reason.label(),
                row.count,
                100.0 * row.fraction_of_total,
                100.0 * row.fraction_of_remaining
            )?;
        }
        writeln!(f, "{:-<72}", "")?;
        write!(
            f,
            "{:<28} {:>12} {:>13.2}%",
            "survived",
            self.survived,
            100.0 * fraction(self.survived, self.total)
        )
    }
}
