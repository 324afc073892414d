//! Statistics of one IMC run, threaded through the driver explicitly.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Accumulated wall-clock time over a number of timed sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Timer {
    #[serde(rename = "total_ms", serialize_with = "as_millis")]
    pub total: Duration,
    pub count: u32,
}

impl Timer {
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.total += started.elapsed();
        self.count = self.count.saturating_add(1);
        out
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s ({} times)", self.total.as_secs_f64(), self.count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImcStatistics {
    pub rounds: u32,
    pub unrolling: Timer,
    pub partitioning: Timer,
    pub safety_check: Timer,
    pub bounding_check: Timer,
    pub interpolation: Timer,
    pub solver_queries: u64,
    pub interpolation_attempts: u32,
    pub interpolation_iterations: u32,
    pub arg_states: usize,
}

impl fmt::Display for ImcStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rounds:                       {}", self.rounds)?;
        writeln!(f, "ARG states:                   {}", self.arg_states)?;
        writeln!(f, "Time for unrolling:           {}", self.unrolling)?;
        writeln!(f, "Time for formula collection:  {}", self.partitioning)?;
        writeln!(f, "Time for safety check:        {}", self.safety_check)?;
        writeln!(f, "Time for bounding assertion:  {}", self.bounding_check)?;
        writeln!(f, "Time for interpolation:       {}", self.interpolation)?;
        writeln!(
            f,
            "Interpolation:                {} attempts, {} iterations",
            self.interpolation_attempts, self.interpolation_iterations
        )?;
        write!(f, "Solver queries:               {}", self.solver_queries)
    }
}
