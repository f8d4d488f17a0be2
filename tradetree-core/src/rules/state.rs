//! Small state machines shared by the rules.

/// Sentinel count meaning "no crossover observed yet".
pub const UNCROSSED: u64 = u64::MAX;

/// Tracks which of two series currently dominates and for how many updates.
///
/// Both counters start at [`UNCROSSED`]; the winning counter saturates there
/// until the first real flip, so counts before any crossover never equal a
/// finite patience. Ties count as B dominance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossoverState {
    a_over_b: u64,
    b_over_a: u64,
}

impl Default for CrossoverState {
    fn default() -> Self {
        Self {
            a_over_b: UNCROSSED,
            b_over_a: UNCROSSED,
        }
    }
}

impl CrossoverState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation of the two series.
    pub fn update(&mut self, a: f64, b: f64) {
        if a > b {
            self.a_over_b = self.a_over_b.saturating_add(1);
            self.b_over_a = 0;
        } else {
            self.b_over_a = self.b_over_a.saturating_add(1);
            self.a_over_b = 0;
        }
    }

    /// Consecutive updates with A strictly above B.
    pub fn a_over_b(&self) -> u64 {
        self.a_over_b
    }

    /// Consecutive updates with B at or above A.
    pub fn b_over_a(&self) -> u64 {
        self.b_over_a
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Unknown,
    Rising,
    Falling,
}

/// Tracks the sign of a delta series and how long that sign has held.
///
/// A zero delta continues the current direction. Until the first nonzero
/// delta the direction is [`Direction::Unknown`] and the run length is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionState {
    direction: Direction,
    run: u64,
}

impl DirectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, delta: f64) {
        let observed = if delta > 0.0 {
            Direction::Rising
        } else if delta < 0.0 {
            Direction::Falling
        } else {
            self.direction
        };

        if observed == Direction::Unknown {
            return;
        }
        if observed == self.direction {
            self.run = self.run.saturating_add(1);
        } else {
            self.direction = observed;
            self.run = 1;
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn run(&self) -> u64 {
        self.run
    }
}
