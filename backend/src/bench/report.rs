//! Side-by-side comparison of both strategies on one profile

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::metrics::Metrics;
use super::profile::ContentionProfile;

/// Which strategy did better on a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Optimistic,
    Pessimistic,
    Tie,
}

impl Winner {
    fn higher_is_better<T: PartialOrd>(optimistic: T, pessimistic: T) -> Self {
        if optimistic > pessimistic {
            Winner::Optimistic
        } else if pessimistic > optimistic {
            Winner::Pessimistic
        } else {
            Winner::Tie
        }
    }

    fn lower_is_better<T: PartialOrd>(optimistic: T, pessimistic: T) -> Self {
        Self::higher_is_better(pessimistic, optimistic)
    }

    fn label(&self) -> &'static str {
        match self {
            Winner::Optimistic => "OPT",
            Winner::Pessimistic => "PES",
            Winner::Tie => "TIE",
        }
    }
}

/// Results of running one profile with both strategies
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub profile: ContentionProfile,
    pub optimistic: Metrics,
    pub pessimistic: Metrics,
}

impl Comparison {
    pub fn successes_winner(&self) -> Winner {
        Winner::higher_is_better(self.optimistic.successes, self.pessimistic.successes)
    }

    pub fn total_time_winner(&self) -> Winner {
        Winner::lower_is_better(self.optimistic.total_time, self.pessimistic.total_time)
    }

    pub fn max_latency_winner(&self) -> Winner {
        Winner::lower_is_better(
            self.optimistic.latency_summary().max,
            self.pessimistic.latency_summary().max,
        )
    }

    /// Both runs accounted for every unit that left their lot
    pub fn is_consistent(&self) -> bool {
        self.optimistic.is_conserved() && self.pessimistic.is_conserved()
    }
}

fn secs(d: Duration) -> String {
    format!("{:.4}", d.as_secs_f64())
}

fn row(
    f: &mut fmt::Formatter<'_>,
    metric: &str,
    opt: impl fmt::Display,
    pes: impl fmt::Display,
    winner: Option<Winner>,
) -> fmt::Result {
    write!(f, "{:<30} {:>15} {:>15}", metric, opt, pes)?;
    match winner {
        Some(w) => writeln!(f, " {:>10}", w.label()),
        None => writeln!(f),
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (opt, pes) = (&self.optimistic, &self.pessimistic);
        let (opt_lat, pes_lat) = (opt.latency_summary(), pes.latency_summary());
        let (opt_fail, pes_fail) = (&opt.failure_breakdown, &pes.failure_breakdown);
        let rule = "-".repeat(73);

        writeln!(f, "{}", "=".repeat(73))?;
        writeln!(f, "{}", self.profile)?;
        writeln!(f, "{}", "=".repeat(73))?;
        writeln!(
            f,
            "{:<30} {:>15} {:>15} {:>10}",
            "Metric", "Optimistic", "Pessimistic", "Winner"
        )?;
        writeln!(f, "{}", rule)?;

        row(
            f,
            "Successful sales",
            opt.successes,
            pes.successes,
            Some(self.successes_winner()),
        )?;
        row(
            f,
            "Failed sales",
            opt.failures,
            pes.failures,
            Some(Winner::lower_is_better(opt.failures, pes.failures)),
        )?;
        row(
            f,
            "  insufficient stock",
            opt_fail.insufficient_stock,
            pes_fail.insufficient_stock,
            None,
        )?;
        row(
            f,
            "  version conflict",
            opt_fail.version_conflict,
            pes_fail.version_conflict,
            None,
        )?;
        row(f, "  lock timeout", opt_fail.lock_timeout, pes_fail.lock_timeout, None)?;
        row(f, "Attempts", opt.total_attempts, pes.total_attempts, None)?;
        row(
            f,
            "Total time (s)",
            secs(opt.total_time),
            secs(pes.total_time),
            Some(self.total_time_winner()),
        )?;
        row(
            f,
            "Throughput (sales/s)",
            format!("{:.2}", opt.throughput()),
            format!("{:.2}", pes.throughput()),
            Some(Winner::higher_is_better(opt.throughput(), pes.throughput())),
        )?;
        row(
            f,
            "Mean latency (s)",
            secs(opt_lat.mean),
            secs(pes_lat.mean),
            Some(Winner::lower_is_better(opt_lat.mean, pes_lat.mean)),
        )?;
        row(
            f,
            "p95 latency (s)",
            secs(opt_lat.p95),
            secs(pes_lat.p95),
            Some(Winner::lower_is_better(opt_lat.p95, pes_lat.p95)),
        )?;
        row(
            f,
            "Max latency (s)",
            secs(opt_lat.max),
            secs(pes_lat.max),
            Some(self.max_latency_winner()),
        )?;
        row(
            f,
            "Latency spread (s)",
            secs(opt_lat.spread()),
            secs(pes_lat.spread()),
            Some(Winner::lower_is_better(opt_lat.spread(), pes_lat.spread())),
        )?;
        row(f, "Final stock", opt.final_quantity, pes.final_quantity, None)?;
        row(f, "Units sold", opt.units_removed(), pes.units_removed(), None)?;
        writeln!(f, "{}", rule)?;

        for m in [opt, pes] {
            let status = if m.is_conserved() { "[OK]" } else { "[ERROR]" };
            writeln!(
                f,
                "{} {}: {} units removed, {} sales x {} units",
                status,
                m.strategy,
                m.units_removed(),
                m.successes,
                m.quantity_per_caller
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_direction() {
        assert_eq!(Winner::higher_is_better(5, 3), Winner::Optimistic);
        assert_eq!(Winner::higher_is_better(3, 5), Winner::Pessimistic);
        assert_eq!(Winner::lower_is_better(3, 5), Winner::Optimistic);
        assert_eq!(Winner::lower_is_better(4, 4), Winner::Tie);
    }
}
