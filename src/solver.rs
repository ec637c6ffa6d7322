//! The single-threaded flip/plus transition engine.
//!
//! One [`Solver`] owns the decomposition state, the scalar parameters and a
//! 32-bit Mersenne Twister, and walks the flip graph until a termination
//! condition fires. Per iteration it:
//!
//! 1. samples a colliding component value and an ordered slot pair holding
//!    it, rejecting pairs within one symmetry group (and, under a size
//!    filter, pairs whose rewritten terms would violate the bound);
//! 2. applies the flip rewrite (XOR into one term's second component and
//!    the other's third) to the pair, and to its mirrored pair under 6-way
//!    symmetry;
//! 3. cascades: a term whose rewritten component became zero (or, 6-way,
//!    which became identical to its mirror) is removed outright, improving
//!    the rank;
//! 4. injects a rank-increasing *plus* transition when the scheduled flip
//!    count is reached, trading size for search diversity, checkpointing
//!    the run state to disk first when the recovery interval has passed;
//! 5. stops on the flip budget or the adaptive limit.
//!
//! The walk is a pure function of the starting masks, the parameters and
//! the seed: the generator is consumed strictly sequentially (one draw per
//! selection attempt, two per plus attempt, one per randomized plus
//! reschedule), and nothing else is random.

use crate::runfile::{self, ResultHeader};
use crate::state::SchemeState;
use crate::symmetry::{Cyclic, Dihedral, Symm, Symmetry};
use rand_mt::Mt;
use std::fmt;
use std::path::PathBuf;

/// Flips between run-state checkpoints.
pub const DEFAULT_RECOVERY_INTERVAL: u64 = 5_000_000_000;

/// Consecutive selection rejections tolerated under a size filter.
const SELECTION_RETRY_LIMIT: u32 = 1000;

/// Largest slot-list length the pair decode tables cover.
const PAIR_TABLE_MAX: usize = 80;

// ============================================================================
// Exit codes
// ============================================================================

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    /// The rank dropped to the target.
    TargetReached,
    /// The absolute flip budget was exhausted.
    FlipLimit,
    /// The adaptive limit fired before the absolute budget.
    EarlyLimit,
    /// No collisions remain after a cascade; no flip is possible.
    DeadEnd,
    /// A size filter rejected 1000 consecutive flip candidates.
    SizeRejection,
}

impl ExitCode {
    /// The integer code used in run files.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::TargetReached => 0,
            ExitCode::FlipLimit => 1,
            ExitCode::EarlyLimit => 2,
            ExitCode::DeadEnd => -1,
            ExitCode::SizeRejection => 6,
        }
    }

    /// Parses an integer code from a run file.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::TargetReached),
            1 => Some(ExitCode::FlipLimit),
            2 => Some(ExitCode::EarlyLimit),
            -1 => Some(ExitCode::DeadEnd),
            6 => Some(ExitCode::SizeRejection),
            _ => None,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitCode::TargetReached => "Target achieved",
            ExitCode::FlipLimit => "Flip limit reached",
            ExitCode::EarlyLimit => "Terminated early",
            ExitCode::DeadEnd => "State with zero neighbours",
            ExitCode::SizeRejection => "Escaped infinite loop",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Parameters and outcome
// ============================================================================

/// Scalar parameters of one run.
#[derive(Clone, Debug)]
pub struct SolveParams {
    /// Goal rank; the run succeeds when `achieved` drops this low.
    pub target: usize,
    /// Hard flip budget.
    pub flimit: u64,
    /// Plus-transition cadence: positive for fixed spacing, negative for
    /// random spacing with mean `|plimit|`.
    pub plimit: i64,
    /// Limit strategy: 0 = absolute wall, 1 = early (proportional), 2 =
    /// rolling reset; any other value is a secondary rank target for the
    /// two-phase strategy, with `split` the percent of budget allotted to
    /// reaching it.
    pub termination: i64,
    /// Percent of `flimit` for the first phase of the two-phase strategy.
    pub split: u64,
    /// Rank at or above which plus transitions are suppressed.
    pub maxplus: usize,
    /// Term size filter: 0 = none, positive = bound on the product of the
    /// three component weights, negative = each rewritten component must
    /// have weight at most `-maxsize`.
    pub maxsize: i64,
    /// Seed for the 32-bit Mersenne Twister.
    pub rseed: u32,
    /// Flip counter carried in from a resumed run.
    pub start_flips: u64,
    /// Flips between checkpoints.
    pub recovery_interval: u64,
    /// Where to write checkpoints; `None` disables them.
    pub checkpoint: Option<PathBuf>,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            target: 0,
            flimit: 1_000_000,
            plimit: 0,
            termination: 0,
            split: 0,
            maxplus: 0,
            maxsize: 0,
            rseed: 0,
            start_flips: 0,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            checkpoint: None,
        }
    }
}

/// Final counters of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Why the run stopped.
    pub rcode: ExitCode,
    /// Total flips performed (a multiple of the orbit size).
    pub flips: u64,
    /// Total term slots introduced by plus transitions.
    pub plus: u64,
    /// Nonzero slots at exit.
    pub achieved: usize,
    /// Lowest nonzero-slot count seen.
    pub minmuls: usize,
}

// ============================================================================
// Ordered-pair decode tables
// ============================================================================

/// Decode tables mapping one random draw to an ordered pair of distinct
/// positions within a slot list.
///
/// `combs[l]` is the number of ordered pairs for a list of length `l`
/// (`l * (l - 1)`); `ps[x]` / `qs[x]` give the pair for code `x`. Codes
/// below `combs[l]` only reference positions below `l`, because pairs are
/// enumerated in blocks of increasing larger coordinate.
struct PairTable {
    combs: Vec<usize>,
    ps: Vec<usize>,
    qs: Vec<usize>,
}

impl PairTable {
    fn new() -> Self {
        let mut combs = Vec::with_capacity(PAIR_TABLE_MAX + 1);
        combs.push(0);
        combs.push(0);
        let mut ps = Vec::with_capacity(PAIR_TABLE_MAX * (PAIR_TABLE_MAX - 1));
        let mut qs = Vec::with_capacity(PAIR_TABLE_MAX * (PAIR_TABLE_MAX - 1));
        for x in 1..PAIR_TABLE_MAX {
            for y in 0..x {
                ps.push(x);
                qs.push(y);
                ps.push(y);
                qs.push(x);
            }
            combs.push(ps.len());
        }
        Self { combs, ps, qs }
    }
}

// ============================================================================
// Solver
// ============================================================================

/// An accepted flip: the ordered slot pair and the two rewritten values.
struct FlipPick {
    p: usize,
    q: usize,
    mpen: u64,
    mqfn: u64,
}

/// One flip-graph walk over a decomposition.
pub struct Solver {
    state: SchemeState,
    params: SolveParams,
    symm: Symm,
    rng: Mt,
    pairs: PairTable,
    flips: u64,
    plus: u64,
    plusby: u64,
    limit: u64,
    recovery: u64,
}

impl Solver {
    /// Builds a solver over `masks` with the given symmetry and parameters.
    ///
    /// # Panics
    /// Panics if the slot count is not a multiple of the orbit size.
    pub fn new(masks: Vec<u64>, symm: Symm, params: SolveParams) -> Self {
        let state = SchemeState::new(masks, symm);
        let rng = Mt::new(params.rseed);
        let flips = params.start_flips;
        let recovery = params.recovery_interval;
        Self {
            state,
            params,
            symm,
            rng,
            pairs: PairTable::new(),
            flips,
            plus: 0,
            plusby: 0,
            limit: 0,
            recovery,
        }
    }

    /// Read access to the decomposition state (current masks, best, counters).
    pub fn state(&self) -> &SchemeState {
        &self.state
    }

    /// Mutable access to the state, for diagnostics and test harnesses.
    pub fn state_mut(&mut self) -> &mut SchemeState {
        &mut self.state
    }

    /// Runs the walk to completion and returns the final counters.
    pub fn run(&mut self) -> Outcome {
        self.reschedule_plus();
        self.limit = update_limit(
            self.flips,
            self.params.termination,
            self.params.split,
            self.state.achieved(),
            self.params.target,
            self.symm.group(),
            self.params.flimit,
        );
        let rcode = match self.symm {
            Symm::Cyclic3 => self.drive::<Cyclic>(),
            Symm::Dihedral6 => self.drive::<Dihedral>(),
        };
        Outcome {
            rcode,
            flips: self.flips,
            plus: self.plus,
            achieved: self.state.achieved(),
            minmuls: self.state.minmuls(),
        }
    }

    // ------------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------------

    fn drive<S: Symmetry>(&mut self) -> ExitCode {
        loop {
            self.flips += S::GROUP as u64;
            #[cfg(debug_assertions)]
            let mut audit = false;

            let Some(pick) = self.select_flip() else {
                return ExitCode::SizeRejection;
            };
            let FlipPick { p, q, mpen, mqfn } = pick;

            let (ep, fq) = (self.state.e(p), self.state.f(q));
            if S::MIRRORED {
                let (pp, qq) = (S::mirror(p), S::mirror(q));
                let (epp, fqq) = (self.state.e(pp), self.state.f(qq));
                let mppen = self.state.mask(self.state.e(qq)) ^ self.state.mask(epp);
                let mqqfn = self.state.mask(fqq) ^ self.state.mask(self.state.f(pp));
                self.state.rewrite(ep, mpen);
                self.state.rewrite(epp, mppen);
                self.state.rewrite(fq, mqfn);
                self.state.rewrite(fqq, mqqfn);
            } else {
                self.state.rewrite(ep, mpen);
                self.state.rewrite(fq, mqfn);
            }

            // A zeroed second component kills the first term; under 6-way
            // symmetry, so does the term coinciding with its mirror (the
            // pair then contributes nothing and both copies go).
            if mpen == 0 || (S::MIRRORED && self.term_equals_mirror::<S>(p)) {
                self.state.drop_term(p);
                if S::MIRRORED {
                    self.state.drop_term(S::mirror(p));
                }
                if let Some(rc) = self.note_reduction::<S>() {
                    return rc;
                }
                #[cfg(debug_assertions)]
                {
                    audit = true;
                }
            }

            // Symmetric cascade for the second term's third component.
            if mqfn == 0 || (S::MIRRORED && self.term_equals_mirror::<S>(q)) {
                self.state.drop_term(q);
                if S::MIRRORED {
                    self.state.drop_term(S::mirror(q));
                }
                if let Some(rc) = self.note_reduction::<S>() {
                    return rc;
                }
                #[cfg(debug_assertions)]
                {
                    audit = true;
                }
            }

            if self.flips >= self.plusby {
                if self.flips >= self.recovery {
                    self.recovery += self.params.recovery_interval;
                    self.write_checkpoint();
                }
                self.plus_transition::<S>();
                #[cfg(debug_assertions)]
                {
                    audit = true;
                }
            }

            // Coupling invariants hold at every iteration boundary (inside
            // a double cascade a freshly zeroed slot is transiently still
            // indexed). Audited in debug builds after the structure-changing
            // transitions; plain rewrites are covered by the index tests.
            #[cfg(debug_assertions)]
            if audit {
                self.state.assert_consistent();
            }

            if self.flips >= self.limit {
                return if self.flips >= self.params.flimit {
                    ExitCode::FlipLimit
                } else {
                    ExitCode::EarlyLimit
                };
            }
        }
    }

    // ------------------------------------------------------------------------
    // Flip selection
    // ------------------------------------------------------------------------

    /// Samples an ordered slot pair sharing a component value.
    ///
    /// One 32-bit draw decides everything: low bits pick the colliding
    /// value, bit 16 orders a two-slot list, and the bits above 16 decode
    /// an ordered pair within a longer list. Returns `None` when a size
    /// filter has rejected [`SELECTION_RETRY_LIMIT`] candidates in a row.
    fn select_flip(&mut self) -> Option<FlipPick> {
        let maxsize = self.params.maxsize;
        let mut tries = 0;
        loop {
            if maxsize != 0 {
                if tries == SELECTION_RETRY_LIMIT {
                    return None;
                }
                tries += 1;
            }

            let sample = self.rng.next_u32();
            let v = self
                .state
                .collision_at(sample as usize % self.state.collision_count());
            let list = self.state.slot_list(v);
            let l = list.len();
            let (p, q) = if l == 2 {
                if sample & 0x1_0000 != 0 {
                    (list[0] as usize, list[1] as usize)
                } else {
                    (list[1] as usize, list[0] as usize)
                }
            } else {
                let x = (sample >> 16) as usize % self.pairs.combs[l];
                (list[self.pairs.ps[x]] as usize, list[self.pairs.qs[x]] as usize)
            };
            if !self.state.allowed(p, q) {
                continue;
            }

            let mpe = self.state.mask(self.state.e(p));
            let mpf = self.state.mask(self.state.f(p));
            let mqe = self.state.mask(self.state.e(q));
            let mqf = self.state.mask(self.state.f(q));
            let mpen = mqe ^ mpe;
            let mqfn = mqf ^ mpf;

            let accept = if maxsize == 0 {
                true
            } else if maxsize > 0 {
                let psize = volume(self.state.mask(p), mpen, mpf);
                let qsize = volume(self.state.mask(q), mqe, mqfn);
                psize <= maxsize as u64 && qsize <= maxsize as u64
            } else {
                let exceed = 1 - maxsize;
                below_weight(mpen, exceed) && below_weight(mqfn, exceed)
            };
            if accept {
                return Some(FlipPick { p, q, mpen, mqfn });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Cascade bookkeeping
    // ------------------------------------------------------------------------

    /// Whether the term at `p` now equals its mirrored twin componentwise.
    fn term_equals_mirror<S: Symmetry>(&self, p: usize) -> bool {
        let pp = S::mirror(p);
        self.state.mask(p) == self.state.mask(pp)
            && self.state.mask(self.state.e(p)) == self.state.mask(self.state.e(pp))
            && self.state.mask(self.state.f(p)) == self.state.mask(self.state.f(pp))
    }

    /// Post-cascade bookkeeping: best tracking, limit and plus rescheduling,
    /// early exits, and the rescue trigger.
    fn note_reduction<S: Symmetry>(&mut self) -> Option<ExitCode> {
        let achieved = self.state.achieved();
        if achieved < self.state.minmuls() {
            self.state.set_minmuls(achieved);
            if achieved > self.params.target {
                self.limit = update_limit(
                    self.flips,
                    self.params.termination,
                    self.params.split,
                    achieved,
                    self.params.target,
                    S::GROUP,
                    self.params.flimit,
                );
            }
        }
        if achieved <= self.state.minmuls() {
            self.state.snapshot_best();
        }
        self.reschedule_plus();
        if self.state.collision_count() == 0 {
            return Some(ExitCode::DeadEnd);
        }
        if achieved <= self.params.target {
            return Some(ExitCode::TargetReached);
        }
        // If every remaining collision is confined to a single symmetry
        // group, no flip can ever be selected again; force an immediate
        // plus transition to break the stall.
        if self.collisions_confined::<S>() {
            self.plusby = self.flips;
        }
        None
    }

    /// Whether every colliding value's slots all lie in one symmetry group.
    fn collisions_confined<S: Symmetry>(&mut self) -> bool {
        for j in 0..self.state.collision_count() {
            let v = self.state.collision_at(j);
            let list = self.state.slot_list(v);
            let g = list[0] as usize / S::GROUP;
            if list[1..].iter().any(|&s| s as usize / S::GROUP != g) {
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------------
    // Plus transition
    // ------------------------------------------------------------------------

    /// Splits one term into three, filling a vacant term and raising the
    /// rank by one orbit. Retries candidate pairs without bound.
    fn plus_transition<S: Symmetry>(&mut self) {
        let n = self.state.slots();
        let r = self
            .state
            .masks()
            .iter()
            .position(|&m| m == 0)
            .expect("plus transition requires a vacant term");
        let maxsize = self.params.maxsize;

        let (p, q, mpd, mqe, mqf, mpen, mqfn, mrdn) = loop {
            let cp = self.rng.next_u32() as usize % n;
            let cq = self.rng.next_u32() as usize % n;
            let (cpd, cpe, cpf) = self.term(cp);
            let (cqd, cqe, cqf) = self.term(cq);
            let cpen = cpe ^ cqe;
            let cqfn = cpf ^ cqf;
            let crdn = cpd ^ cqd;

            let mut ok = if maxsize > 0 {
                let bound = maxsize as u64;
                volume(cpd, cpen, cpf) <= bound
                    && volume(cpd, cqe, cqfn) <= bound
                    && volume(crdn, cqe, cqf) <= bound
            } else if maxsize < 0 {
                let exceed = 1 - maxsize;
                below_weight(cpen, exceed)
                    && below_weight(cqfn, exceed)
                    && below_weight(crdn, exceed)
            } else {
                true
            };
            if cpd == 0 || cqd == 0 {
                ok = false;
            }
            if cpd == cqd || cpe == cqe || cpf == cqf {
                ok = false;
            }
            if S::MIRRORED {
                let (cppd, cppe, cppf) = self.term(S::mirror(cp));
                let (cqqd, cqqe, cqqf) = self.term(S::mirror(cq));
                if cppd == 0 || cqqd == 0 {
                    ok = false;
                }
                if cppd == cqqd || cppe == cqqe || cppf == cqqf {
                    ok = false;
                }
            }
            if !self.state.allowed(cp, cq) {
                ok = false;
            }
            if ok {
                break (cp, cq, cpd, cqe, cqf, cpen, cqfn, crdn);
            }
        };

        // Rewrite the split pair and populate the vacant term:
        //   term(p) <- (d_p, e_p ^ e_q, f_p)
        //   term(q) <- (d_p, e_q, f_p ^ f_q)
        //   term(r) <- (d_p ^ d_q, e_q, f_q)
        self.state.rewrite(self.state.e(p), mpen);
        self.state.rewrite(q, mpd);
        self.state.rewrite(self.state.f(q), mqfn);
        self.state.fill(r, mrdn);
        self.state.fill(self.state.e(r), mqe);
        self.state.fill(self.state.f(r), mqf);

        if S::MIRRORED {
            let (pp, qq) = (S::mirror(p), S::mirror(q));
            let rr = r + 3;
            let (mppd, mppe, mppf) = self.term(pp);
            let (mqqd, mqqe, mqqf) = self.term(qq);
            let mppen = mppe ^ mqqe;
            let mqqfn = mppf ^ mqqf;
            let mrrdn = mppd ^ mqqd;
            self.state.rewrite(self.state.e(pp), mppen);
            self.state.rewrite(qq, mppd);
            self.state.rewrite(self.state.f(qq), mqqfn);
            self.state.fill(rr, mrrdn);
            self.state.fill(self.state.e(rr), mqqe);
            self.state.fill(self.state.f(rr), mqqf);
        }

        self.plus += S::GROUP as u64;
        self.state.raise_achieved(S::GROUP);
        self.reschedule_plus();
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Recomputes the flip count at which the next plus transition fires.
    fn reschedule_plus(&mut self) {
        let group = self.symm.group() as u64;
        self.plusby = if self.state.achieved() >= self.params.maxplus {
            self.params.flimit.saturating_mul(1007)
        } else if self.params.plimit < 0 {
            let span = (-2 * self.params.plimit) as u64;
            self.flips + group + u64::from(self.rng.next_u32()) % span
        } else {
            self.flips + self.params.plimit as u64
        };
    }

    /// The term at slot `p`: its own mask and its two partners'.
    #[inline(always)]
    fn term(&self, p: usize) -> (u64, u64, u64) {
        (
            self.state.mask(p),
            self.state.mask(self.state.e(p)),
            self.state.mask(self.state.f(p)),
        )
    }

    /// Writes the current run state to the checkpoint path, if any.
    fn write_checkpoint(&self) {
        let Some(path) = &self.params.checkpoint else {
            return;
        };
        let header = ResultHeader {
            nomuls: self.state.slots(),
            flips: self.flips,
            rcode: ExitCode::EarlyLimit.code(),
            target: self.params.target,
            flimit: self.params.flimit,
            plimit: self.params.plimit,
            termination: self.params.termination,
            rseed: self.params.rseed,
            symm: self.symm,
            maxplus: self.params.maxplus,
            achieved: self.state.achieved(),
            minmuls: self.state.minmuls(),
            plus: self.plus,
        };
        let _ = runfile::write_result(path, &header, self.state.masks());
    }
}

// ============================================================================
// Limit strategies
// ============================================================================

/// Recomputes the adaptive flip limit after a rank improvement.
///
/// Strategies: `0` pins the limit to the absolute budget; `1` grants each
/// remaining reduction step an equal share of the remaining budget; `2`
/// restarts the full budget from the current flip count; any other value is
/// a secondary rank target: above it, the early formula runs against
/// `split` percent of the budget, below it against the full budget.
fn update_limit(
    flips: u64,
    termination: i64,
    split: u64,
    achieved: usize,
    target: usize,
    group: usize,
    flimit: u64,
) -> u64 {
    if termination == 0 {
        flimit
    } else if termination == 1 {
        let steps = ((achieved - target) / group) as u64;
        flips + flimit.saturating_sub(flips) / steps
    } else if termination == 2 {
        flips.saturating_add(flimit)
    } else {
        let slimit = split.saturating_mul(flimit) / 100;
        if achieved as i64 > termination {
            let steps = ((achieved - termination as usize) / group) as u64;
            flips + slimit.saturating_sub(flips) / steps
        } else {
            let steps = ((achieved - target) / group) as u64;
            flips + flimit.saturating_sub(flips) / steps
        }
    }
}

// ============================================================================
// Bit predicates
// ============================================================================

/// Product of the three component weights (the term's "cuboid volume").
#[inline(always)]
fn volume(d: u64, e: u64, f: u64) -> u64 {
    u64::from(d.count_ones()) * u64::from(e.count_ones()) * u64::from(f.count_ones())
}

/// Whether the component weight is strictly below `exceed`.
#[inline(always)]
fn below_weight(v: u64, exceed: i64) -> bool {
    i64::from(v.count_ones()) < exceed
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// The 2x2 multiplication tensor split into four cyclic orbits: two
    /// rotation-fixed corner orbits and two mixed orbits.
    fn start_2x2() -> Vec<u64> {
        vec![1, 1, 1, 1, 4, 2, 2, 4, 8, 8, 8, 8]
    }

    fn params(target: usize, flimit: u64) -> SolveParams {
        SolveParams {
            target,
            flimit,
            ..SolveParams::default()
        }
    }

    #[test]
    fn pair_table_counts_ordered_pairs() {
        let t = PairTable::new();
        for l in 2..PAIR_TABLE_MAX {
            assert_eq!(t.combs[l], l * (l - 1), "combs[{l}]");
        }
        // Codes below combs[l] enumerate exactly the ordered pairs of
        // distinct positions below l.
        for l in 2..8 {
            let mut seen = std::collections::HashSet::new();
            for x in 0..t.combs[l] {
                assert!(t.ps[x] < l && t.qs[x] < l, "pair out of range at {x}");
                assert_ne!(t.ps[x], t.qs[x]);
                assert!(seen.insert((t.ps[x], t.qs[x])), "duplicate pair at {x}");
            }
            assert_eq!(seen.len(), l * (l - 1));
        }
    }

    #[test]
    fn update_limit_strategies() {
        // Absolute wall.
        assert_eq!(update_limit(500, 0, 0, 30, 10, 3, 10_000), 10_000);
        // Early: remaining budget split across remaining reduction steps.
        // steps = (30 - 12) / 3 = 6; 1000 + (10_000 - 1000) / 6 = 2500.
        assert_eq!(update_limit(1000, 1, 0, 30, 12, 3, 10_000), 2500);
        // Rolling reset.
        assert_eq!(update_limit(7000, 2, 0, 30, 10, 3, 10_000), 17_000);
        // Two-phase above the secondary target: uses split% of the budget.
        // slimit = 50% of 10_000 = 5000; steps = (30 - 24) / 3 = 2.
        assert_eq!(update_limit(1000, 24, 50, 30, 10, 3, 10_000), 3000);
        // Two-phase at or below the secondary target: plain early formula.
        assert_eq!(update_limit(1000, 24, 50, 21, 12, 3, 10_000), 4000);
    }

    #[test]
    fn volume_and_weight_predicates() {
        assert_eq!(volume(0b111, 0b11, 0b1), 6);
        assert_eq!(volume(0, 0b11, 0b1), 0);
        assert!(below_weight(0b11, 3));
        assert!(!below_weight(0b111, 3));
        assert!(!below_weight(0b11, 2));
        // A zero component is below any positive threshold and no
        // non-positive one.
        assert!(below_weight(0, 1));
        assert!(!below_weight(0, 0));
    }

    #[test]
    fn colliding_pair_with_cancelling_components_dead_ends_at_rank() {
        // Two triples sharing first and second components; whichever pair
        // the sampler picks, one rewritten component cancels to zero, the
        // cascade removes a term, and no collision survives it.
        let masks = vec![3, 5, 9, 3, 5, 17];
        let mut solver = Solver::new(masks, Symm::Cyclic3, params(0, 1_000));
        let outcome = solver.run();
        assert_eq!(outcome.rcode, ExitCode::DeadEnd);
        assert_eq!(outcome.flips, 3);
        assert_eq!(outcome.achieved, 3);
        assert_eq!(outcome.minmuls, 3);
        solver.state_mut().assert_consistent();
        // The best snapshot was refreshed at the reduction.
        let best_nonzero = solver.state().best().iter().filter(|&&m| m != 0).count();
        assert_eq!(best_nonzero, 3);
    }

    #[test]
    fn runs_are_deterministic_per_seed() {
        let mut p = params(7, 5_000);
        p.plimit = 100;
        p.maxplus = 12;
        p.termination = 2;
        p.rseed = 99;

        let mut a = Solver::new(start_2x2(), Symm::Cyclic3, p.clone());
        let oa = a.run();
        let mut b = Solver::new(start_2x2(), Symm::Cyclic3, p);
        let ob = b.run();
        assert_eq!(oa, ob);
        assert_eq!(a.state().masks(), b.state().masks());
        assert_eq!(a.state().best(), b.state().best());

        // Budget accounting holds whatever the outcome.
        assert_eq!(oa.flips % 3, 0);
        if oa.rcode == ExitCode::FlipLimit {
            assert!(oa.flips >= 5_000);
        }
        a.state_mut().assert_consistent();
    }

    #[test]
    fn different_seeds_diverge() {
        let mut p = params(7, 5_000);
        p.plimit = 100;
        p.maxplus = 12;
        p.rseed = 1;
        let mut a = Solver::new(start_2x2(), Symm::Cyclic3, p.clone());
        let oa = a.run();
        p.rseed = 2;
        let mut b = Solver::new(start_2x2(), Symm::Cyclic3, p);
        let ob = b.run();
        // Outcomes can coincide, but full trajectories almost never do.
        assert!(oa != ob || a.state().masks() != b.state().masks());
    }

    #[test]
    fn unit_component_state_exhausts_volume_filter() {
        // Every selectable flip XORs two distinct unit vectors, so each
        // rewritten term has volume 2 and a bound of 1 rejects all 1000
        // candidates.
        let mut p = params(0, 1_000);
        p.maxsize = 1;
        let mut solver = Solver::new(start_2x2(), Symm::Cyclic3, p);
        let outcome = solver.run();
        assert_eq!(outcome.rcode, ExitCode::SizeRejection);
        assert_eq!(outcome.flips, 3);
        assert_eq!(solver.state().masks(), start_2x2().as_slice());
        solver.state_mut().assert_consistent();
    }

    #[test]
    fn weight_filter_exhaustion_reports_the_same_code() {
        // Threshold -1 demands rewritten components of weight at most 1;
        // all candidates here produce weight-2 components.
        let mut p = params(0, 1_000);
        p.maxsize = -1;
        let mut solver = Solver::new(start_2x2(), Symm::Cyclic3, p);
        let outcome = solver.run();
        assert_eq!(outcome.rcode, ExitCode::SizeRejection);
        assert_eq!(solver.state().masks(), start_2x2().as_slice());
    }

    #[test]
    fn mirror_identity_collapse_clears_both_triples() {
        // Two 6-blocks whose shared first component forces every selectable
        // flip to make one term coincide with its mirror; the cascade must
        // clear all six slots of that block, including the two rewritten
        // middle slots which hold a nonzero value at collapse time.
        let masks = vec![32, 64, 1, 32, 64, 2, 32, 128, 4, 32, 128, 7];
        let mut p = params(6, 100_000);
        p.rseed = 5;
        let mut solver = Solver::new(masks, Symm::Dihedral6, p);
        let outcome = solver.run();
        assert_eq!(outcome.rcode, ExitCode::TargetReached);
        assert_eq!(outcome.flips, 6);
        assert_eq!(outcome.achieved, 6);
        assert_eq!(outcome.minmuls, 6);

        let m = solver.state().masks();
        let dead_block = if m[0] == 0 { 0 } else { 6 };
        assert!(
            m[dead_block..dead_block + 6].iter().all(|&x| x == 0),
            "collapsed block not fully cleared: {m:?}"
        );
        assert_eq!(
            m.iter().filter(|&&x| x != 0).count(),
            6,
            "survivor block disturbed: {m:?}"
        );
        solver.state_mut().assert_consistent();
    }

    #[test]
    fn six_way_flips_advance_in_groups_of_six() {
        // Slightly perturbed mirror values so no flip here can cascade; the
        // run must walk to the budget in steps of six.
        let masks = vec![32, 64, 1, 33, 65, 2, 32, 128, 4, 34, 129, 7];
        let mut p = params(0, 12);
        p.rseed = 11;
        let mut solver = Solver::new(masks, Symm::Dihedral6, p);
        let outcome = solver.run();
        assert_eq!(outcome.rcode, ExitCode::FlipLimit);
        assert_eq!(outcome.flips, 12);
        solver.state_mut().assert_consistent();
    }

    #[test]
    fn random_plus_spacing_stays_in_range() {
        let mut p = params(0, 1_000_000);
        p.plimit = -100;
        p.maxplus = 1_000; // keep plus transitions enabled
        let mut solver = Solver::new(start_2x2(), Symm::Cyclic3, p);
        solver.flips = 3_000;
        for _ in 0..500 {
            solver.reschedule_plus();
            let gap = solver.plusby - solver.flips;
            assert!(
                (3..3 + 200).contains(&gap),
                "plus gap {gap} outside [3, 203)"
            );
        }
    }

    #[test]
    fn plus_disabled_at_or_above_maxplus() {
        let mut p = params(0, 1_000);
        p.plimit = 50;
        p.maxplus = 12; // equal to the current rank
        let mut solver = Solver::new(start_2x2(), Symm::Cyclic3, p);
        solver.reschedule_plus();
        assert_eq!(solver.plusby, 1_000 * 1007);
    }

    #[test]
    fn checkpoint_written_at_recovery_interval() {
        use crate::runfile::RunFile;

        let dir = std::env::temp_dir().join(format!(
            "flipgraph-ckpt-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run.txt");

        // One vacant triple from the start, so the first plus transition
        // fires on schedule at six flips and checkpoints first.
        let masks = vec![3, 5, 9, 3, 6, 17, 0, 0, 0];
        let mut p = params(0, 12);
        p.plimit = 6;
        p.maxplus = 9;
        p.recovery_interval = 6;
        p.checkpoint = Some(path.clone());
        let mut solver = Solver::new(masks, Symm::Cyclic3, p);
        let outcome = solver.run();
        assert!(outcome.flips >= 6, "run stopped before the checkpoint");

        let ckpt = RunFile::read(&path).expect("checkpoint should parse");
        assert_eq!(ckpt.header.rcode, 2);
        assert_eq!(ckpt.header.flips, 6);
        assert_eq!(ckpt.header.nomuls, 9);
        assert_eq!(ckpt.masks.len(), 9);
        // The replaced header fields carry the live counters.
        assert_eq!(ckpt.header.split, 6); // achieved at checkpoint time
        assert_eq!(ckpt.header.maxsize, 0); // plus count at checkpoint time

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn exit_codes_round_trip_through_integers() {
        for rc in [
            ExitCode::TargetReached,
            ExitCode::FlipLimit,
            ExitCode::EarlyLimit,
            ExitCode::DeadEnd,
            ExitCode::SizeRejection,
        ] {
            assert_eq!(ExitCode::from_code(rc.code()), Some(rc));
        }
        assert_eq!(ExitCode::from_code(9), None);
    }
}
