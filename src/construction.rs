//! Initial symmetric decompositions from seed cubes.
//!
//! A run starts from the residual of the target tensor after a chosen set
//! of *cubes*, symmetric rank-one terms `(x, x, x)`, has been XORed away.
//! Every surviving residual bit is covered by one unit term per orbit
//! element: the three cyclic rotations of its index triple, plus their
//! three reflections when the residual is palindromic and 6-way symmetry is
//! requested. The terms are emitted in orbit order and flattened into the
//! solver's slot array (slot `i` carries the first component of term `i`;
//! the other two components are recovered through the partner tables).

use crate::symmetry::Symm;
use crate::tensor::{matmul_tensor, Tensor};
use std::fmt;

/// A constructed starting decomposition.
#[derive(Clone, Debug)]
pub struct Start {
    /// Flattened slot array for the engine, headroom included.
    pub slots: Vec<u64>,
    /// Rank cap for plus transitions.
    pub maxplus: usize,
    /// The orbit structure the slots were built with.
    pub symm: Symm,
}

// ============================================================================
// Cube patterns
// ============================================================================

/// Parses a diagonal cube pattern: one `0`/`1` per diagonal cell.
///
/// `"11"` for n = 2 is the identity cube, the classic Strassen seed.
///
/// # Errors
/// Returns an error if the pattern length is not `dim` or a character is
/// not `0`/`1`.
pub fn diagonal_cube(dim: usize, pattern: &str) -> Result<u64, ConstructError> {
    if pattern.len() != dim {
        return Err(ConstructError::PatternLength {
            pattern: pattern.to_string(),
            expected: dim,
        });
    }
    let mut mask = 0u64;
    for (y, ch) in pattern.bytes().enumerate() {
        match ch {
            b'0' => {}
            b'1' => mask |= 1 << (y * dim + y),
            _ => {
                return Err(ConstructError::PatternChar {
                    pattern: pattern.to_string(),
                    ch: ch as char,
                })
            }
        }
    }
    Ok(mask)
}

/// Parses a full cube pattern: one `0`/`1` per cell, row-major.
///
/// # Errors
/// Returns an error if the pattern length is not `dim * dim` or a
/// character is not `0`/`1`.
pub fn full_cube(dim: usize, pattern: &str) -> Result<u64, ConstructError> {
    if pattern.len() != dim * dim {
        return Err(ConstructError::PatternLength {
            pattern: pattern.to_string(),
            expected: dim * dim,
        });
    }
    let mut mask = 0u64;
    for (cell, ch) in pattern.bytes().enumerate() {
        match ch {
            b'0' => {}
            b'1' => mask |= 1 << cell,
            _ => {
                return Err(ConstructError::PatternChar {
                    pattern: pattern.to_string(),
                    ch: ch as char,
                })
            }
        }
    }
    Ok(mask)
}

// ============================================================================
// Start construction
// ============================================================================

/// The orbit structure a residual supports: 6-way when palindromic,
/// otherwise only 3-way.
pub fn detect_symmetry(residual: &Tensor) -> Symm {
    if residual.is_palindrome() {
        Symm::Dihedral6
    } else {
        Symm::Cyclic3
    }
}

/// Builds the starting slot array for `dim x dim` matrices.
///
/// `cubes` are the seed cube masks (already parsed); `symm` is the orbit
/// structure the run will use; `plus_limit`, when nonzero, is the overall
/// rank budget for plus transitions: vacant slots are appended (rounded
/// down to whole orbits) so growth up to that rank has room, and `maxplus`
/// is adjusted to match.
///
/// # Errors
/// Returns an error if 6-way symmetry is requested but the residual is not
/// palindromic, or if orbit expansion fails to consume the residual (a
/// self-mirrored orbit).
pub fn build_start(
    dim: usize,
    cubes: &[u64],
    symm: Symm,
    plus_limit: usize,
) -> Result<Start, ConstructError> {
    let mut residual = matmul_tensor(dim);
    for &x in cubes {
        residual.xor_term(x, x, x);
    }

    let detected = detect_symmetry(&residual);
    if symm == Symm::Dihedral6 && detected == Symm::Cyclic3 {
        return Err(ConstructError::AsymmetricResidual);
    }

    let mut slots = expand_orbits(&mut residual, symm)?;
    let nomuls = slots.len();

    // Plus-transition headroom: vacant orbits appended up to the requested
    // overall rank budget (which counts the cubes as well).
    let mut maxplus = nomuls;
    if plus_limit != 0 {
        let mut headroom = plus_limit as i64 - cubes.len() as i64 - nomuls as i64;
        headroom -= headroom.rem_euclid(symm.group() as i64);
        if headroom > 0 {
            slots.resize(nomuls + headroom as usize, 0);
            maxplus += headroom as usize;
        } else if headroom < 0 {
            maxplus = (maxplus as i64 + headroom) as usize;
        }
    }

    Ok(Start {
        slots,
        maxplus,
        symm,
    })
}

/// Walks the residual in index order, emitting one orbit of unit terms per
/// set bit and clearing the orbit's bits as it goes.
fn expand_orbits(residual: &mut Tensor, symm: Symm) -> Result<Vec<u64>, ConstructError> {
    let m = residual.side();
    let mut slots = Vec::new();
    for d in 0..residual.bits() {
        if !residual.get(d) {
            continue;
        }
        let a = d % m;
        let b = (d / m) % m;
        let c = d / (m * m);

        // Terms (a,b,c), (c,a,b), (b,c,a); the slot array stores each
        // term's first component, the partner tables supply the rest.
        slots.push(1 << a);
        slots.push(1 << c);
        slots.push(1 << b);
        residual.toggle(residual.position(a, b, c));
        residual.toggle(residual.position(c, a, b));
        residual.toggle(residual.position(b, c, a));

        if symm == Symm::Dihedral6 {
            let (ma, mb, mc) = (m - 1 - a, m - 1 - b, m - 1 - c);
            slots.push(1 << ma);
            slots.push(1 << mc);
            slots.push(1 << mb);
            residual.toggle(residual.position(ma, mb, mc));
            residual.toggle(residual.position(mc, ma, mb));
            residual.toggle(residual.position(mb, mc, ma));
        }
    }
    if !residual.is_zero() {
        return Err(ConstructError::OrbitClosure);
    }
    Ok(slots)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors building a starting decomposition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstructError {
    /// A cube pattern had the wrong length.
    PatternLength {
        /// The offending pattern.
        pattern: String,
        /// The length required.
        expected: usize,
    },
    /// A cube pattern contained a character other than `0`/`1`.
    PatternChar {
        /// The offending pattern.
        pattern: String,
        /// The character found.
        ch: char,
    },
    /// 6-way symmetry requested but the residual is not palindromic.
    AsymmetricResidual,
    /// Orbit expansion left residual bits behind.
    OrbitClosure,
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructError::PatternLength { pattern, expected } => {
                write!(f, "cube pattern {pattern:?} should have {expected} digits")
            }
            ConstructError::PatternChar { pattern, ch } => {
                write!(f, "cube pattern {pattern:?} contains {ch:?} (expected '0' or '1')")
            }
            ConstructError::AsymmetricResidual => {
                write!(f, "residual is not palindromic; 6-way symmetry unavailable")
            }
            ConstructError::OrbitClosure => {
                write!(f, "orbit expansion left residual bits behind")
            }
        }
    }
}

impl std::error::Error for ConstructError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_cube_patterns() {
        assert_eq!(diagonal_cube(2, "11").unwrap(), 0b1001);
        assert_eq!(diagonal_cube(2, "10").unwrap(), 0b0001);
        assert_eq!(diagonal_cube(3, "101").unwrap(), (1 << 0) | (1 << 8));
        assert!(matches!(
            diagonal_cube(2, "111"),
            Err(ConstructError::PatternLength { expected: 2, .. })
        ));
        assert!(matches!(
            diagonal_cube(2, "1x"),
            Err(ConstructError::PatternChar { ch: 'x', .. })
        ));
    }

    #[test]
    fn full_cube_patterns() {
        assert_eq!(full_cube(2, "1000").unwrap(), 0b0001);
        assert_eq!(full_cube(2, "0111").unwrap(), 0b1110);
        assert!(matches!(
            full_cube(2, "10"),
            Err(ConstructError::PatternLength { expected: 4, .. })
        ));
    }

    #[test]
    fn bare_target_expands_to_one_slot_per_index_triple() {
        // No cubes: every one of the 8 target bits joins an orbit, and the
        // two rotation-fixed corner orbits emit three copies each.
        let start = build_start(2, &[], Symm::Cyclic3, 0).unwrap();
        assert_eq!(start.slots.len(), 12);
        assert_eq!(start.maxplus, 12);
        assert!(start.slots.iter().all(|&s| s.is_power_of_two()));
    }

    #[test]
    fn strassen_seed_expands_to_twelve_slots() {
        let cube = diagonal_cube(2, "11").unwrap();
        let start = build_start(2, &[cube], Symm::Cyclic3, 0).unwrap();
        assert_eq!(start.slots.len(), 12);
    }

    #[test]
    fn six_way_expansion_pairs_orbits() {
        let cube = diagonal_cube(2, "11").unwrap();
        let start = build_start(2, &[cube], Symm::Dihedral6, 0).unwrap();
        assert_eq!(start.slots.len(), 12);
        assert_eq!(start.slots.len() % 6, 0);
        // Each 6-block's reflected half mirrors the primary half: the
        // reflection of a unit mask at cell x is the unit mask at m-1-x.
        for block in start.slots.chunks(6) {
            for off in 0..3 {
                let bit = block[off].trailing_zeros() as usize;
                let mirror_bit = block[off + 3].trailing_zeros() as usize;
                assert_eq!(mirror_bit, 3 - bit);
            }
        }
    }

    #[test]
    fn one_cube_three_by_three_supports_both_symmetries() {
        let cube = diagonal_cube(3, "111").unwrap();
        let c3 = build_start(3, &[cube], Symm::Cyclic3, 0).unwrap();
        let c6 = build_start(3, &[cube], Symm::Dihedral6, 0).unwrap();
        // Target and cube tensors hold 27 bits each and agree on the three
        // rotation-fixed diagonal triples, leaving 48 residual bits.
        assert_eq!(c3.slots.len(), 48);
        assert_eq!(c6.slots.len(), 48);
    }

    #[test]
    fn headroom_appends_whole_vacant_orbits() {
        let cube = diagonal_cube(2, "11").unwrap();
        // Budget 20 overall: 20 - 1 cube - 12 slots = 7, rounded down to 6.
        let start = build_start(2, &[cube], Symm::Cyclic3, 20).unwrap();
        assert_eq!(start.slots.len(), 18);
        assert_eq!(start.slots[12..], [0, 0, 0, 0, 0, 0]);
        assert_eq!(start.maxplus, 18);
    }

    #[test]
    fn tight_plus_budget_lowers_maxplus() {
        let cube = diagonal_cube(2, "11").unwrap();
        // Budget 10 overall: headroom 10 - 1 - 12 = -3.
        let start = build_start(2, &[cube], Symm::Cyclic3, 10).unwrap();
        assert_eq!(start.slots.len(), 12);
        assert_eq!(start.maxplus, 9);
    }

    #[test]
    fn asymmetric_residual_rejects_six_way() {
        // A lone off-diagonal cube breaks the palindrome.
        let cube = full_cube(2, "0100").unwrap();
        let err = build_start(2, &[cube], Symm::Dihedral6, 0).unwrap_err();
        assert_eq!(err, ConstructError::AsymmetricResidual);
        // 3-way construction still works.
        assert!(build_start(2, &[cube], Symm::Cyclic3, 0).is_ok());
    }
}
