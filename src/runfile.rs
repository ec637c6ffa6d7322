//! Whitespace-token solver interchange files.
//!
//! A run file carries one decomposition plus the scalar parameters of a
//! run. The header is 13 integers:
//!
//! ```text
//! nomuls flips rcode target flimit plimit termination rseed symm maxplus split minmuls maxsize
//! ```
//!
//! followed by `nomuls` lines of one unsigned 64-bit bitmask each, the
//! component values flattened term by term in slot order.
//!
//! On output (final results and mid-run checkpoints) the last three header
//! positions change meaning: `split` and `maxsize` are replaced by the live
//! `achieved` and `plus` counters, with `minmuls` staying put between them.
//! Established tooling reads the positions this way, so the asymmetry is
//! part of the format: a freshly written file fed back in has `achieved`
//! parsed as `split` and `plus` as `maxsize`. Callers resuming runs must
//! restore those two parameters themselves.

use crate::solver::SolveParams;
use crate::symmetry::Symm;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

// ============================================================================
// Header and file
// ============================================================================

/// The 13-integer header of a run file, in input orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Number of term slots (and of mask lines).
    pub nomuls: usize,
    /// Flip counter carried over from a previous run segment.
    pub flips: u64,
    /// Exit code of the run that wrote the file (9 = not yet run).
    pub rcode: i32,
    /// Goal rank.
    pub target: usize,
    /// Hard flip budget.
    pub flimit: u64,
    /// Plus-transition cadence.
    pub plimit: i64,
    /// Limit strategy selector.
    pub termination: i64,
    /// Mersenne Twister seed.
    pub rseed: u32,
    /// Symmetry group size.
    pub symm: Symm,
    /// Rank at or above which plus transitions stop.
    pub maxplus: usize,
    /// Percent of budget for the two-phase strategy (`achieved` counter in
    /// a written result).
    pub split: u64,
    /// Lowest rank recorded so far.
    pub minmuls: usize,
    /// Term size filter (`plus` counter in a written result).
    pub maxsize: i64,
}

impl Header {
    /// Maps the header onto engine parameters for a (re)run.
    pub fn solve_params(&self) -> SolveParams {
        SolveParams {
            target: self.target,
            flimit: self.flimit,
            plimit: self.plimit,
            termination: self.termination,
            split: self.split,
            maxplus: self.maxplus,
            maxsize: self.maxsize,
            rseed: self.rseed,
            start_flips: self.flips,
            ..SolveParams::default()
        }
    }
}

/// A parsed run file: header plus the flattened slot masks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunFile {
    /// The scalar parameters.
    pub header: Header,
    /// One bitmask per term slot.
    pub masks: Vec<u64>,
}

impl RunFile {
    /// Wraps a slot array in a header with neutral parameters, the way a
    /// driver stages a fresh input (`rcode` 9 marks "not yet run").
    pub fn from_parts(masks: Vec<u64>, symm: Symm) -> Self {
        let nomuls = masks.len();
        Self {
            header: Header {
                nomuls,
                flips: 0,
                rcode: 9,
                target: 0,
                flimit: 1_000_000,
                plimit: 0,
                termination: 0,
                rseed: 0,
                symm,
                maxplus: nomuls,
                split: 0,
                minmuls: nomuls,
                maxsize: 0,
            },
            masks,
        }
    }

    /// Parses a run file from text.
    ///
    /// # Errors
    /// Returns an error on missing or malformed tokens, an unsupported
    /// symmetry, or a slot count that is not a multiple of the symmetry.
    pub fn parse(text: &str) -> Result<Self, RunFileError> {
        let mut tokens = text.split_whitespace();
        let nomuls: usize = next_field(&mut tokens, "nomuls")?;
        let flips: u64 = next_field(&mut tokens, "flips")?;
        let rcode: i32 = next_field(&mut tokens, "rcode")?;
        let target: usize = next_field(&mut tokens, "target")?;
        let flimit: u64 = next_field(&mut tokens, "flimit")?;
        let plimit: i64 = next_field(&mut tokens, "plimit")?;
        let termination: i64 = next_field(&mut tokens, "termination")?;
        let rseed: u32 = next_field(&mut tokens, "rseed")?;
        let symm_raw: i64 = next_field(&mut tokens, "symm")?;
        let symm = Symm::from_group(symm_raw)
            .ok_or(RunFileError::UnsupportedSymmetry { value: symm_raw })?;
        let maxplus: usize = next_field(&mut tokens, "maxplus")?;
        let split: u64 = next_field(&mut tokens, "split")?;
        let minmuls: usize = next_field(&mut tokens, "minmuls")?;
        let maxsize: i64 = next_field(&mut tokens, "maxsize")?;

        if nomuls % symm.group() != 0 {
            return Err(RunFileError::RaggedSlotCount {
                nomuls,
                symm: symm.group(),
            });
        }

        let mut masks = Vec::with_capacity(nomuls);
        for _ in 0..nomuls {
            masks.push(next_field(&mut tokens, "mask")?);
        }

        Ok(Self {
            header: Header {
                nomuls,
                flips,
                rcode,
                target,
                flimit,
                plimit,
                termination,
                rseed,
                symm,
                maxplus,
                split,
                minmuls,
                maxsize,
            },
            masks,
        })
    }

    /// Reads and parses a run file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, RunFileError> {
        let mut text = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut text))
            .map_err(|e| RunFileError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    /// Writes the file in input orientation.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        let h = &self.header;
        writeln!(
            w,
            "{} {} {} {} {} {} {} {} {} {} {} {} {}",
            h.nomuls,
            h.flips,
            h.rcode,
            h.target,
            h.flimit,
            h.plimit,
            h.termination,
            h.rseed,
            h.symm,
            h.maxplus,
            h.split,
            h.minmuls,
            h.maxsize
        )?;
        for m in &self.masks {
            writeln!(w, "{m}")?;
        }
        Ok(())
    }

    /// Saves the file in input orientation.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let f = File::create(path)?;
        self.write_to(BufWriter::new(f))
    }
}

// ============================================================================
// Result orientation
// ============================================================================

/// Header of a written result or checkpoint, with the live counters in the
/// last three positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultHeader {
    /// Number of term slots.
    pub nomuls: usize,
    /// Total flips performed.
    pub flips: u64,
    /// Exit code (2 for a mid-run checkpoint).
    pub rcode: i32,
    /// Goal rank.
    pub target: usize,
    /// Hard flip budget.
    pub flimit: u64,
    /// Plus-transition cadence.
    pub plimit: i64,
    /// Limit strategy selector.
    pub termination: i64,
    /// Mersenne Twister seed.
    pub rseed: u32,
    /// Symmetry group size.
    pub symm: Symm,
    /// Rank at or above which plus transitions stop.
    pub maxplus: usize,
    /// Nonzero slots when the file was written.
    pub achieved: usize,
    /// Lowest rank recorded.
    pub minmuls: usize,
    /// Slots introduced by plus transitions.
    pub plus: u64,
}

/// Formats a result or checkpoint to a writer.
///
/// # Errors
/// Returns an error if writing fails.
pub fn format_result<W: Write>(mut w: W, h: &ResultHeader, masks: &[u64]) -> io::Result<()> {
    writeln!(
        w,
        "{} {} {} {} {} {} {} {} {} {} {} {} {}",
        h.nomuls,
        h.flips,
        h.rcode,
        h.target,
        h.flimit,
        h.plimit,
        h.termination,
        h.rseed,
        h.symm,
        h.maxplus,
        h.achieved,
        h.minmuls,
        h.plus
    )?;
    for m in masks {
        writeln!(w, "{m}")?;
    }
    Ok(())
}

/// Writes a result or checkpoint file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_result(path: impl AsRef<Path>, h: &ResultHeader, masks: &[u64]) -> io::Result<()> {
    let f = File::create(path)?;
    format_result(BufWriter::new(f), h, masks)
}

// ============================================================================
// Parsing internals and errors
// ============================================================================

fn next_field<'a, T, I>(tokens: &mut I, field: &'static str) -> Result<T, RunFileError>
where
    T: std::str::FromStr,
    I: Iterator<Item = &'a str>,
{
    let token = tokens
        .next()
        .ok_or(RunFileError::MissingField { field })?;
    token.parse().map_err(|_| RunFileError::InvalidField {
        field,
        token: token.to_string(),
    })
}

/// Errors encountered while reading a run file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunFileError {
    /// I/O error (file not found, etc.).
    Io(String),
    /// The token stream ended before the named field.
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },
    /// A token did not parse as the named field's integer type.
    InvalidField {
        /// Name of the malformed field.
        field: &'static str,
        /// The offending token.
        token: String,
    },
    /// The symmetry field was neither 3 nor 6.
    UnsupportedSymmetry {
        /// The value found.
        value: i64,
    },
    /// The slot count is not a multiple of the symmetry group.
    RaggedSlotCount {
        /// The slot count found.
        nomuls: usize,
        /// The symmetry group size.
        symm: usize,
    },
}

impl fmt::Display for RunFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFileError::Io(msg) => write!(f, "I/O error: {msg}"),
            RunFileError::MissingField { field } => {
                write!(f, "run file ended before field {field}")
            }
            RunFileError::InvalidField { field, token } => {
                write!(f, "invalid value {token:?} for field {field}")
            }
            RunFileError::UnsupportedSymmetry { value } => {
                write!(f, "unsupported symmetry {value} (expected 3 or 6)")
            }
            RunFileError::RaggedSlotCount { nomuls, symm } => {
                write!(f, "slot count {nomuls} is not a multiple of symmetry {symm}")
            }
        }
    }
}

impl std::error::Error for RunFileError {}

// ============================================================================
// Tests
// ============================================================================
