//! Scan sequencer
//!
//! The sequencer produces a deterministic, time-indexed search motion used
//! while no target is locked. It is driven by the control tick: each step
//! advances the scan-time counter by exactly one quantum and yields exactly
//! one motion primitive, so the tick rate is coupled to the quantum.
//!
//! The program is a table of breakpoints `t0 < t1 < ... < tn`, each interval
//! mapped to a named primitive. Before the warm-up duration has elapsed a
//! fixed initial lateral sweep is emitted regardless of the table. Once the
//! counter reaches `tn` the sequencer signals exhaustion and the caller
//! resets it, restarting the sweep. The sweep is cyclic: only the task's
//! global time budget bounds it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Primitive emitted during the warm-up phase, ignoring the table.
pub const WARM_UP_PRIMITIVE: ScanPrimitive = ScanPrimitive::NegStrafe;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The scan motion program, read-only after construction.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanProgramParams {
    /// Strictly increasing time breakpoints starting at zero.
    ///
    /// Units: seconds of scan time
    pub breakpoints_s: Vec<f64>,

    /// Primitive for each breakpoint interval. Must contain exactly one
    /// entry per interval, i.e. one fewer than the breakpoints.
    pub primitives: Vec<ScanPrimitive>,

    /// Duration of the initial lateral sweep at the start of each cycle.
    ///
    /// Units: seconds
    pub warm_up_s: f64,

    /// Duration of a single command, and therefore of one control tick.
    ///
    /// Units: seconds
    pub quantum_s: f64,

    /// Speed magnitude of every scan command.
    pub speed: f64,
}

/// Open-loop scan motion sequencer.
pub struct ScanSequencer {
    program: ScanProgramParams,

    /// Scan time elapsed in the current sweep cycle.
    ///
    /// Reset to zero only on (re-)entry to the search state.
    elapsed_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Named motion primitives available to the scan program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPrimitive {
    PosForward,
    NegForward,
    PosStrafe,
    NegStrafe,
}

/// The outcome of stepping the sequencer once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Emit this primitive at the program speed for one quantum.
    Command(ScanPrimitive),

    /// The breakpoint table is exhausted, reset to restart the sweep.
    Exhausted,
}

/// Errors raised when validating a scan program.
#[derive(Debug, thiserror::Error)]
pub enum ScanProgramError {
    #[error("Scan table must contain at least two breakpoints, found {0}")]
    TooFewBreakpoints(usize),

    #[error("Scan breakpoints must start at zero, found {0}")]
    FirstBreakpointNonZero(f64),

    #[error("Scan breakpoints must be strictly increasing")]
    NonMonotonicBreakpoints,

    #[error("Expected {expected} primitives for the scan table, found {found}")]
    PrimitiveCountMismatch { expected: usize, found: usize },

    #[error("Scan quantum must be positive, found {0}")]
    InvalidQuantum(f64),

    #[error("Warm-up duration cannot be negative, found {0}")]
    InvalidWarmUp(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScanSequencer {
    /// Create a new sequencer, validating the program.
    pub fn new(program: ScanProgramParams) -> Result<Self, ScanProgramError> {
        if program.breakpoints_s.len() < 2 {
            return Err(ScanProgramError::TooFewBreakpoints(
                program.breakpoints_s.len(),
            ));
        }

        if program.breakpoints_s[0] != 0.0 {
            return Err(ScanProgramError::FirstBreakpointNonZero(
                program.breakpoints_s[0],
            ));
        }

        if program
            .breakpoints_s
            .windows(2)
            .any(|pair| pair[1] <= pair[0])
        {
            return Err(ScanProgramError::NonMonotonicBreakpoints);
        }

        let num_intervals = program.breakpoints_s.len() - 1;
        if program.primitives.len() != num_intervals {
            return Err(ScanProgramError::PrimitiveCountMismatch {
                expected: num_intervals,
                found: program.primitives.len(),
            });
        }

        if program.quantum_s <= 0.0 {
            return Err(ScanProgramError::InvalidQuantum(program.quantum_s));
        }

        if program.warm_up_s < 0.0 {
            return Err(ScanProgramError::InvalidWarmUp(program.warm_up_s));
        }

        Ok(Self {
            program,
            elapsed_s: 0.0,
        })
    }

    /// Reset the scan-time counter, restarting the sweep.
    pub fn reset(&mut self) {
        self.elapsed_s = 0.0;
    }

    /// Scan time elapsed in the current sweep cycle.
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    /// Command quantum of the program.
    pub fn quantum_s(&self) -> f64 {
        self.program.quantum_s
    }

    /// Speed magnitude of the program.
    pub fn speed(&self) -> f64 {
        self.program.speed
    }

    /// Advance the sweep by one quantum.
    ///
    /// Returns the primitive to emit for this quantum, or
    /// [`ScanStep::Exhausted`] once the table is used up. Exhaustion does
    /// not advance the counter: the caller resets and steps again.
    pub fn step(&mut self) -> ScanStep {
        let last = *self
            .program
            .breakpoints_s
            .last()
            .expect("validated to be non-empty");

        if self.elapsed_s >= last {
            return ScanStep::Exhausted;
        }

        let primitive = if self.elapsed_s < self.program.warm_up_s {
            WARM_UP_PRIMITIVE
        } else {
            self.lookup(self.elapsed_s)
        };

        self.elapsed_s += self.program.quantum_s;

        ScanStep::Command(primitive)
    }

    /// Find the primitive for the unique interval containing `t`.
    ///
    /// Total for all `t` in `[0, t_last)` since the breakpoints start at
    /// zero and increase strictly.
    fn lookup(&self, t: f64) -> ScanPrimitive {
        let bp = &self.program.breakpoints_s;

        for i in 1..bp.len() {
            if bp[i - 1] <= t && t < bp[i] {
                return self.program.primitives[i - 1];
            }
        }

        // Unreachable for t in [0, t_last), callers guarantee the range
        *self
            .program
            .primitives
            .last()
            .expect("validated to be non-empty")
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_program() -> ScanProgramParams {
        ScanProgramParams {
            breakpoints_s: vec![0.0, 3.0, 4.0, 10.0, 11.0, 14.0],
            primitives: vec![
                ScanPrimitive::NegStrafe,
                ScanPrimitive::PosForward,
                ScanPrimitive::PosStrafe,
                ScanPrimitive::NegForward,
                ScanPrimitive::NegStrafe,
            ],
            warm_up_s: 1.0,
            quantum_s: 0.1,
            speed: 0.2,
        }
    }

    #[test]
    fn test_interval_lookup_scenario() {
        // At t = 3.5 the second interval [3, 4) is active
        let mut seq = ScanSequencer::new(test_program()).unwrap();

        for _ in 0..35 {
            seq.step();
        }
        assert!((seq.elapsed_s() - 3.5).abs() < 1e-9);

        assert_eq!(seq.step(), ScanStep::Command(ScanPrimitive::PosForward));
    }

    #[test]
    fn test_warm_up_overrides_table() {
        let mut program = test_program();
        // First table interval would be PosForward if the warm-up were
        // ignored
        program.primitives[0] = ScanPrimitive::PosForward;

        let mut seq = ScanSequencer::new(program).unwrap();

        for _ in 0..10 {
            assert_eq!(seq.step(), ScanStep::Command(WARM_UP_PRIMITIVE));
        }
    }

    #[test]
    fn test_lookup_total_and_cyclic() {
        // Exactly representable quantum so the step count is exact
        let mut program = test_program();
        program.quantum_s = 0.25;

        let mut seq = ScanSequencer::new(program).unwrap();

        // Every step on [0, 14) yields exactly one command
        let mut num_commands = 0;
        loop {
            match seq.step() {
                ScanStep::Command(_) => num_commands += 1,
                ScanStep::Exhausted => break,
            }

            assert!(num_commands <= 57, "sequencer never exhausted");
        }
        assert_eq!(num_commands, 56);

        // Exhaustion is sticky until reset
        assert_eq!(seq.step(), ScanStep::Exhausted);

        // After a reset the sweep restarts from the warm-up
        seq.reset();
        assert_eq!(seq.elapsed_s(), 0.0);
        assert_eq!(seq.step(), ScanStep::Command(WARM_UP_PRIMITIVE));
    }

    #[test]
    fn test_program_validation() {
        let mut program = test_program();
        program.breakpoints_s = vec![0.0];
        assert!(matches!(
            ScanSequencer::new(program),
            Err(ScanProgramError::TooFewBreakpoints(1))
        ));

        let mut program = test_program();
        program.breakpoints_s[0] = 0.5;
        assert!(matches!(
            ScanSequencer::new(program),
            Err(ScanProgramError::FirstBreakpointNonZero(_))
        ));

        let mut program = test_program();
        program.breakpoints_s[2] = 2.0;
        assert!(matches!(
            ScanSequencer::new(program),
            Err(ScanProgramError::NonMonotonicBreakpoints)
        ));

        let mut program = test_program();
        program.primitives.pop();
        assert!(matches!(
            ScanSequencer::new(program),
            Err(ScanProgramError::PrimitiveCountMismatch { .. })
        ));

        let mut program = test_program();
        program.quantum_s = 0.0;
        assert!(matches!(
            ScanSequencer::new(program),
            Err(ScanProgramError::InvalidQuantum(_))
        ));

        let mut program = test_program();
        program.warm_up_s = -1.0;
        assert!(matches!(
            ScanSequencer::new(program),
            Err(ScanProgramError::InvalidWarmUp(_))
        ));
    }
}
