//! Deterministic verification of the bilinear identity.
//!
//! Every transition the engine applies preserves the identity, so the XOR
//! of a returned decomposition's rank-one cubes (plus the seed cubes the
//! driver held back) must equal the target tensor exactly. A nonzero
//! residual therefore always indicates corrupted bookkeeping or a damaged
//! file, never an unlucky search.

use crate::symmetry::Partners;
use crate::tensor::matmul_tensor;
use std::fmt;

/// Rebuilds full `(d, e, f)` terms from a solver slot array.
///
/// Slot `i` holds the first component of term `i`; the partner tables
/// recover the other two from the cyclic structure. Vacant terms are
/// skipped.
pub fn reconstruct_terms(slots: &[u64]) -> Vec<[u64; 3]> {
    let partners = Partners::new(slots.len());
    let mut terms = Vec::with_capacity(slots.len());
    for (i, &d) in slots.iter().enumerate() {
        if d == 0 {
            continue;
        }
        terms.push([d, slots[partners.e(i)], slots[partners.f(i)]]);
    }
    terms
}

/// Number of tensor bits by which a scheme misses the target.
pub fn residual_weight(dim: usize, terms: &[[u64; 3]]) -> usize {
    let mut t = matmul_tensor(dim);
    for &[d, e, f] in terms {
        t.xor_term(d, e, f);
    }
    t.count_ones()
}

/// Checks that `terms` multiply `dim x dim` matrices exactly.
///
/// # Errors
/// Returns the residual weight if the identity does not hold.
pub fn verify_terms(dim: usize, terms: &[[u64; 3]]) -> Result<(), ValidateError> {
    let weight = residual_weight(dim, terms);
    if weight == 0 {
        Ok(())
    } else {
        Err(ValidateError::NonzeroResidual { weight })
    }
}

/// Checks a solver slot array together with the seed cubes it was built
/// without.
///
/// # Errors
/// Returns the residual weight if the identity does not hold.
pub fn verify_slots(dim: usize, slots: &[u64], cubes: &[u64]) -> Result<(), ValidateError> {
    let mut terms = reconstruct_terms(slots);
    for &x in cubes {
        terms.push([x, x, x]);
    }
    verify_terms(dim, &terms)
}

/// Errors from scheme verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidateError {
    /// The scheme's tensor differs from the target.
    NonzeroResidual {
        /// Number of differing tensor bits.
        weight: usize,
    },
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidateError::NonzeroResidual { weight } => {
                write!(f, "scheme misses the target tensor in {weight} bits")
            }
        }
    }
}

impl std::error::Error for ValidateError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::{build_start, diagonal_cube};
    use crate::solver::{SolveParams, Solver};
    use crate::symmetry::Symm;
    use crate::tensor::Tensor;

    /// One unit term per target bit is always a (large) valid scheme.
    fn unit_scheme(dim: usize) -> Vec<[u64; 3]> {
        let t = matmul_tensor(dim);
        let m = t.side();
        let mut terms = Vec::new();
        for idx in 0..t.bits() {
            if t.get(idx) {
                let a = idx % m;
                let b = (idx / m) % m;
                let c = idx / (m * m);
                terms.push([1 << a, 1 << b, 1 << c]);
            }
        }
        terms
    }

    #[test]
    fn unit_scheme_verifies() {
        for dim in 1..=3 {
            verify_terms(dim, &unit_scheme(dim)).unwrap();
        }
    }

    #[test]
    fn corrupted_scheme_is_rejected_with_its_weight() {
        let mut terms = unit_scheme(2);
        terms[0][1] ^= 0b10;
        let err = verify_terms(2, &terms).unwrap_err();
        let ValidateError::NonzeroResidual { weight } = err;
        assert!(weight > 0);
    }

    #[test]
    fn duplicated_term_cancels_and_fails() {
        let mut terms = unit_scheme(2);
        let first = terms[0];
        terms.push(first);
        // The duplicate XORs the original away, leaving that bit uncovered.
        assert!(verify_terms(2, &terms).is_err());
    }

    #[test]
    fn constructed_starts_verify_for_both_symmetries() {
        let start = build_start(2, &[], Symm::Cyclic3, 0).unwrap();
        verify_slots(2, &start.slots, &[]).unwrap();

        let cube = diagonal_cube(2, "11").unwrap();
        let start = build_start(2, &[cube], Symm::Dihedral6, 0).unwrap();
        verify_slots(2, &start.slots, &[cube]).unwrap();

        let cube3 = diagonal_cube(3, "111").unwrap();
        let start = build_start(3, &[cube3], Symm::Cyclic3, 0).unwrap();
        verify_slots(3, &start.slots, &[cube3]).unwrap();
    }

    #[test]
    fn reconstruct_skips_vacant_terms() {
        let slots = vec![3, 5, 9, 0, 0, 0];
        let terms = reconstruct_terms(&slots);
        assert_eq!(terms, vec![[3, 9, 5], [5, 3, 9], [9, 5, 3]]);
    }

    #[test]
    fn engine_walks_preserve_the_identity() {
        // Whatever the walk does (flips, cascades, plus transitions), the
        // current and best decompositions must keep multiplying matrices.
        let start = build_start(2, &[], Symm::Cyclic3, 0).unwrap();
        let params = SolveParams {
            target: 7,
            flimit: 20_000,
            plimit: 200,
            maxplus: start.maxplus,
            termination: 2,
            rseed: 4242,
            ..SolveParams::default()
        };
        let mut solver = Solver::new(start.slots, Symm::Cyclic3, params);
        let outcome = solver.run();
        verify_slots(2, solver.state().masks(), &[]).unwrap();
        verify_slots(2, solver.state().best(), &[]).unwrap();
        assert!(outcome.minmuls <= 12);
    }

    #[test]
    fn six_way_walks_preserve_the_identity() {
        let cube = diagonal_cube(2, "11").unwrap();
        let start = build_start(2, &[cube], Symm::Dihedral6, 0).unwrap();
        let params = SolveParams {
            target: 6,
            flimit: 20_000,
            plimit: 200,
            maxplus: start.maxplus,
            termination: 2,
            rseed: 777,
            ..SolveParams::default()
        };
        let mut solver = Solver::new(start.slots, Symm::Dihedral6, params);
        let outcome = solver.run();
        verify_slots(2, solver.state().masks(), &[cube]).unwrap();
        verify_slots(2, solver.state().best(), &[cube]).unwrap();
        assert_eq!(outcome.flips % 6, 0);
    }

    #[test]
    fn residual_weight_counts_misses() {
        let t = Tensor::zero(4);
        assert!(t.is_zero());
        // An empty scheme misses every target bit.
        assert_eq!(residual_weight(2, &[]), 8);
    }
}
