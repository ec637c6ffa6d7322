//! Parallel multi-run orchestration.
//!
//! A campaign stages one starting decomposition, then launches independent
//! engine runs over per-run seeds derived from a base seed. Runs execute on
//! a rayon pool; each worker streams its record over a crossbeam channel to
//! a coordinator thread that reports progress, appends the run log and
//! collects the summary. Every returned scheme is verified against the
//! target tensor before it is counted or saved; the engine's transitions
//! preserve the bilinear identity, so a verification failure is always a
//! bug, never bad luck.
//!
//! The engine itself stays single-threaded; parallelism lives entirely at
//! this layer.

use crate::construction::{build_start, diagonal_cube, full_cube, ConstructError};
use crate::scheme::{self, SchemeParseError};
use crate::solver::{ExitCode, Outcome, SolveParams, Solver};
use crate::symmetry::Symm;
use crate::validate::{self, ValidateError};
use crossbeam::channel;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// ============================================================================
// Configuration
// ============================================================================

/// When a run's scheme is archived under the results directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveRule {
    /// Never save.
    Never,
    /// Save schemes of rank at most the threshold.
    AtMost(usize),
    /// Save every scheme that improves on the starting rank.
    Improvements,
}

/// Campaign parameters.
#[derive(Clone, Debug)]
pub struct CampaignConfig {
    /// Matrix size n (multiplying n x n matrices).
    pub dim: usize,
    /// Diagonal seed-cube patterns, one `0`/`1` per diagonal cell.
    pub diagonal_cubes: Vec<String>,
    /// Full seed-cube patterns, one `0`/`1` per cell.
    pub full_cubes: Vec<String>,
    /// Goal rank, seed cubes included.
    pub target: usize,
    /// Orbit structure for the runs.
    pub symm: Symm,
    /// Number of independent runs.
    pub runs: usize,
    /// Hard flip budget per run.
    pub flimit: u64,
    /// Flips between plus transitions; 0 disables them.
    pub plus_after: u64,
    /// Space plus transitions randomly with mean `plus_after` instead of
    /// exactly.
    pub plus_random: bool,
    /// Overall rank budget for plus transitions; 0 leaves the start's rank
    /// as the cap.
    pub plus_limit: usize,
    /// Limit strategy selector (see the engine parameters).
    pub termination: i64,
    /// Percent of budget for the two-phase strategy.
    pub split: u64,
    /// Term size filter (see the engine parameters).
    pub maxsize: i64,
    /// Archival rule for returned schemes.
    pub save: SaveRule,
    /// Base seed; drawn fresh when absent.
    pub seed: Option<u64>,
    /// Worker threads; 0 lets rayon decide.
    pub jobs: usize,
    /// Directory for archived schemes.
    pub results_dir: PathBuf,
    /// Append one line per run (plus the summary) to this log file.
    pub log: Option<PathBuf>,
    /// Start from a saved scheme file instead of constructing a start.
    pub resume: Option<PathBuf>,
    /// Suppress progress printing.
    pub quiet: bool,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            diagonal_cubes: Vec::new(),
            full_cubes: Vec::new(),
            target: 7,
            symm: Symm::Cyclic3,
            runs: 1,
            flimit: 1_000_000,
            plus_after: 0,
            plus_random: false,
            plus_limit: 0,
            termination: 0,
            split: 0,
            maxsize: 0,
            save: SaveRule::Never,
            seed: None,
            jobs: 0,
            results_dir: PathBuf::from("results"),
            log: None,
            resume: None,
            quiet: false,
        }
    }
}

// ============================================================================
// Records and summary
// ============================================================================

/// One finished run.
#[derive(Clone, Debug)]
pub struct RunRecord {
    /// Run index within the campaign.
    pub run: usize,
    /// The engine seed this run used.
    pub rseed: u32,
    /// Best overall rank reached, seed cubes included.
    pub best: usize,
    /// Engine counters (exit code remapped: a dead end exactly at the
    /// target counts as the target achieved).
    pub outcome: Outcome,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Where the scheme was archived, if the save rule matched.
    pub saved: Option<PathBuf>,
}

impl RunRecord {
    /// Log/progress description of the run.
    pub fn describe(&self) -> String {
        let secs = self.elapsed.as_secs_f64();
        let speed = if secs > 0.0 {
            ((self.outcome.flips as f64 * 60.0 / secs / 1_000_000.0) as u64).to_string()
        } else {
            "N/A".to_string()
        };
        format!(
            "Best: {} {} - Flips: {} Speed: {} megaflips/min",
            self.best, self.outcome.rcode, self.outcome.flips, speed
        )
    }
}

/// Aggregate results of a campaign.
#[derive(Clone, Debug, Default)]
pub struct CampaignSummary {
    /// All run records, in run order.
    pub records: Vec<RunRecord>,
}

impl CampaignSummary {
    /// The lowest overall rank any run reached.
    pub fn best_rank(&self) -> Option<usize> {
        self.records.iter().map(|r| r.best).min()
    }

    /// Counts of runs per best rank.
    pub fn histogram(&self) -> BTreeMap<usize, usize> {
        let mut h = BTreeMap::new();
        for r in &self.records {
            *h.entry(r.best).or_insert(0) += 1;
        }
        h
    }

    /// The `rank/count` summary line.
    pub fn summary_line(&self) -> String {
        let mut s = String::from("Summary:");
        for (rank, count) in self.histogram() {
            s.push_str(&format!(" {rank}/{count}"));
        }
        s
    }
}

// ============================================================================
// Campaign driver
// ============================================================================

/// Runs a campaign to completion.
///
/// # Errors
/// Returns an error on bad cube patterns, an unusable resume file, a
/// thread-pool failure, or (fatally) a returned scheme that fails
/// verification.
pub fn run_campaign(cfg: &CampaignConfig) -> Result<CampaignSummary, CampaignError> {
    // Stage the starting decomposition and the cube set held out of it.
    let (slots, cubes, maxplus) = stage_start(cfg)?;
    let start_rank = slots.iter().filter(|&&m| m != 0).count() + cubes.len();
    let solver_target = cfg.target.saturating_sub(cubes.len());

    // A two-phase secondary target is given cubes-inclusive; rebase it to
    // engine ranks and align it to whole orbits.
    let mut termination = cfg.termination;
    if termination > 2 {
        termination -= cubes.len() as i64;
        termination -= termination % cfg.symm.group() as i64;
    }

    // A cadence of zero means "never": push the first plus past any budget.
    let mut plimit = cfg.plus_after as i64;
    if cfg.plus_random {
        plimit = -plimit;
    }
    if plimit == 0 {
        plimit = i64::try_from(cfg.flimit.saturating_mul(1007)).unwrap_or(i64::MAX);
    }

    let base_seed = cfg.seed.unwrap_or_else(rand::random);
    if !cfg.quiet {
        println!(
            "New campaign - Size: {} Cubes: {} Start: {} Target: {} Symm: {} Runs: {}",
            cfg.dim,
            cubes.len(),
            start_rank,
            cfg.target,
            cfg.symm,
            cfg.runs
        );
        println!(
            "Flip limit: {} Termination: {} Plus after: {}{} Base seed: {base_seed}",
            cfg.flimit,
            cfg.termination,
            cfg.plus_after,
            if cfg.plus_random { "(R)" } else { "" }
        );
    }

    // Coordinator: drains run records, reports and logs as they land.
    let (tx, rx) = channel::unbounded::<RunRecord>();
    let log_path = cfg.log.clone();
    let quiet = cfg.quiet;
    let seed_tag = base_seed % 10_000_000_000;
    let coordinator = std::thread::spawn(move || {
        let mut log = log_path.as_ref().and_then(|p| {
            OpenOptions::new().create(true).append(true).open(p).ok()
        });
        let mut records: Vec<RunRecord> = Vec::new();
        for rec in rx {
            if !quiet {
                println!("Run: {} {}", rec.run + 1, rec.describe());
            }
            if let Some(f) = log.as_mut() {
                let _ = writeln!(f, "{seed_tag:010}/{:03} {}", rec.run + 1, rec.describe());
            }
            records.push(rec);
        }
        records
    });

    let solve_one = |run: usize| -> Result<(), CampaignError> {
        let rseed = (splitmix64(base_seed ^ run as u64) % 1_000_000_000) as u32;
        let params = SolveParams {
            target: solver_target,
            flimit: cfg.flimit,
            plimit,
            termination,
            split: cfg.split,
            maxplus,
            maxsize: cfg.maxsize,
            rseed,
            ..SolveParams::default()
        };
        let started = Instant::now();
        let mut solver = Solver::new(slots.clone(), cfg.symm, params);
        let outcome = solver.run();
        let elapsed = started.elapsed();

        // A dead end exactly at the target is a success in disguise.
        let rcode = if outcome.rcode == ExitCode::DeadEnd && outcome.achieved == solver_target {
            ExitCode::TargetReached
        } else {
            outcome.rcode
        };

        let chosen = if outcome.minmuls < outcome.achieved {
            solver.state().best()
        } else {
            solver.state().masks()
        };
        let mut terms = validate::reconstruct_terms(chosen);
        for &x in &cubes {
            terms.push([x, x, x]);
        }
        validate::verify_terms(cfg.dim, &terms)
            .map_err(|source| CampaignError::IdentityViolation { run, source })?;

        let best = outcome.minmuls + cubes.len();
        let saved = archive(cfg, start_rank, best, rseed, &terms)
            .map_err(|e| CampaignError::Io(e.to_string()))?;

        let record = RunRecord {
            run,
            rseed,
            best,
            outcome: Outcome { rcode, ..outcome },
            elapsed,
            saved,
        };
        // The coordinator outlives every worker; a send cannot fail until
        // the campaign is over.
        let _ = tx.send(record);
        Ok(())
    };

    let result = if cfg.jobs > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.jobs)
            .build()
            .map_err(|e| CampaignError::ThreadPool(e.to_string()))?;
        pool.install(|| (0..cfg.runs).into_par_iter().try_for_each(solve_one))
    } else {
        (0..cfg.runs).into_par_iter().try_for_each(solve_one)
    };
    drop(tx);
    let mut records = coordinator.join().expect("campaign coordinator panicked");
    result?;

    records.sort_by_key(|r| r.run);
    let summary = CampaignSummary { records };
    if !cfg.quiet {
        println!("{}", summary.summary_line());
        println!("Total runs: {}", summary.records.len());
    }
    if let Some(path) = &cfg.log {
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(f, "{seed_tag:010} {}", summary.summary_line());
        }
    }
    Ok(summary)
}

// ============================================================================
// Staging
// ============================================================================

/// Builds (or loads) the starting slot array, the held-out cubes, and the
/// plus-transition rank cap.
fn stage_start(cfg: &CampaignConfig) -> Result<(Vec<u64>, Vec<u64>, usize), CampaignError> {
    if let Some(path) = &cfg.resume {
        let terms = scheme::read_scheme(path, cfg.dim)?;
        let mut cubes = Vec::new();
        let mut slots = Vec::new();
        for t in terms {
            if t[0] == t[1] && t[1] == t[2] {
                cubes.push(t[0]);
            } else {
                slots.push(t[0]);
            }
        }
        if slots.is_empty() || slots.len() % cfg.symm.group() != 0 {
            return Err(CampaignError::ResumeRagged {
                terms: slots.len(),
                symm: cfg.symm.group(),
            });
        }
        let nomuls = slots.len();
        let mut maxplus = nomuls;
        if cfg.plus_limit != 0 {
            let mut headroom = cfg.plus_limit as i64 - cubes.len() as i64 - nomuls as i64;
            headroom -= headroom.rem_euclid(cfg.symm.group() as i64);
            if headroom > 0 {
                slots.resize(nomuls + headroom as usize, 0);
                maxplus += headroom as usize;
            } else if headroom < 0 {
                maxplus = (maxplus as i64 + headroom) as usize;
            }
        }
        return Ok((slots, cubes, maxplus));
    }

    let mut cubes = Vec::new();
    for p in &cfg.diagonal_cubes {
        cubes.push(diagonal_cube(cfg.dim, p)?);
    }
    for p in &cfg.full_cubes {
        cubes.push(full_cube(cfg.dim, p)?);
    }
    let start = build_start(cfg.dim, &cubes, cfg.symm, cfg.plus_limit)?;
    Ok((start.slots, cubes, start.maxplus))
}

/// Archives a scheme when the save rule matches; returns the path used.
fn archive(
    cfg: &CampaignConfig,
    start_rank: usize,
    best: usize,
    rseed: u32,
    terms: &[[u64; 3]],
) -> std::io::Result<Option<PathBuf>> {
    let wanted = match cfg.save {
        SaveRule::Never => false,
        SaveRule::AtMost(threshold) => best <= threshold,
        SaveRule::Improvements => best < start_rank,
    };
    if !wanted {
        return Ok(None);
    }
    std::fs::create_dir_all(&cfg.results_dir)?;
    let mut tag = splitmix64(u64::from(rseed) ^ 0xA5CE_55ED) % 10_000_000_000;
    let path = loop {
        let candidate = cfg.results_dir.join(format!("m{best:03}r{tag:010}.txt"));
        if !candidate.exists() {
            break candidate;
        }
        tag += 1;
    };
    scheme::write_scheme(&path, cfg.dim, terms)?;
    Ok(Some(path))
}

/// SplitMix64 mixer for deriving per-run seeds from the base seed.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by a campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CampaignError {
    /// Staging the start failed.
    Construct(ConstructError),
    /// The resume file did not parse.
    Scheme(SchemeParseError),
    /// The resume file's non-cube terms do not fill whole orbits.
    ResumeRagged {
        /// Non-cube terms found.
        terms: usize,
        /// Orbit size required.
        symm: usize,
    },
    /// A returned scheme failed verification; the run state is corrupt.
    IdentityViolation {
        /// Which run produced it.
        run: usize,
        /// The verification failure.
        source: ValidateError,
    },
    /// The worker pool could not be built.
    ThreadPool(String),
    /// Archiving or logging failed.
    Io(String),
}

impl From<ConstructError> for CampaignError {
    fn from(e: ConstructError) -> Self {
        CampaignError::Construct(e)
    }
}

impl From<SchemeParseError> for CampaignError {
    fn from(e: SchemeParseError) -> Self {
        CampaignError::Scheme(e)
    }
}

impl fmt::Display for CampaignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignError::Construct(e) => write!(f, "start construction failed: {e}"),
            CampaignError::Scheme(e) => write!(f, "resume file unusable: {e}"),
            CampaignError::ResumeRagged { terms, symm } => write!(
                f,
                "resume file has {terms} non-cube terms, not a multiple of symmetry {symm}"
            ),
            CampaignError::IdentityViolation { run, source } => {
                write!(f, "run {run} returned a corrupt scheme: {source}")
            }
            CampaignError::ThreadPool(msg) => write!(f, "worker pool failed: {msg}"),
            CampaignError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for CampaignError {}

// ============================================================================
// Tests
// ============================================================================
