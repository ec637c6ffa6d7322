//! Human-readable solution files.
//!
//! A saved scheme lists one multiplication per line in the established
//! bracket notation, 1-indexed by row then column:
//!
//! ```text
//! (a11+a12)*(b11+b21)*(c11)
//! (a21+a22)*(b12+b22)*(c21+c22)
//! ```
//!
//! Bit `j` of a component mask corresponds to cell `(j / n, j mod n)`.
//! These files are what campaigns archive under `results/` and what
//! continuation runs start from.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// Formats one scheme to a writer.
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_scheme_to<W: Write>(mut w: W, dim: usize, terms: &[[u64; 3]]) -> io::Result<()> {
    for term in terms {
        let mut line = String::new();
        for (component, letter) in term.iter().zip(['a', 'b', 'c']) {
            if letter != 'a' {
                line.push('*');
            }
            line.push('(');
            let mut first = true;
            let mut bits = *component;
            while bits != 0 {
                let cell = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                if !first {
                    line.push('+');
                }
                first = false;
                line.push(letter);
                line.push(char::from(b'1' + (cell / dim) as u8));
                line.push(char::from(b'1' + (cell % dim) as u8));
            }
            line.push(')');
        }
        writeln!(w, "{line}")?;
    }
    Ok(())
}

/// Saves one scheme to a file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_scheme(path: impl AsRef<Path>, dim: usize, terms: &[[u64; 3]]) -> io::Result<()> {
    let f = File::create(path)?;
    write_scheme_to(BufWriter::new(f), dim, terms)
}

/// Parses a scheme from text.
///
/// # Errors
/// Returns an error on unexpected characters, out-of-range cell indices,
/// or terms missing one of the three factors.
pub fn parse_scheme(dim: usize, text: &str) -> Result<Vec<[u64; 3]>, SchemeParseError> {
    let mut terms = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut term = [0u64; 3];
        let mut bytes = line.bytes().enumerate();
        while let Some((col, ch)) = bytes.next() {
            let component = match ch {
                b'a' => 0,
                b'b' => 1,
                b'c' => 2,
                b'(' | b')' | b'+' | b'*' | b' ' | b'\t' => continue,
                other => {
                    return Err(SchemeParseError::UnexpectedChar {
                        line: lineno + 1,
                        ch: other as char,
                    })
                }
            };
            let row = digit(&mut bytes, dim, lineno, col)?;
            let column = digit(&mut bytes, dim, lineno, col)?;
            term[component] |= 1 << (row * dim + column);
        }
        for (component, letter) in term.iter().zip(['a', 'b', 'c']) {
            if *component == 0 {
                return Err(SchemeParseError::MissingFactor {
                    line: lineno + 1,
                    letter,
                });
            }
        }
        terms.push(term);
    }
    if terms.is_empty() {
        return Err(SchemeParseError::Empty);
    }
    Ok(terms)
}

/// Loads a scheme from a file.
///
/// # Errors
/// Returns an error if the file cannot be read or does not parse.
pub fn read_scheme(path: impl AsRef<Path>, dim: usize) -> Result<Vec<[u64; 3]>, SchemeParseError> {
    let mut text = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut text))
        .map_err(|e| SchemeParseError::Io(e.to_string()))?;
    parse_scheme(dim, &text)
}

fn digit<I: Iterator<Item = (usize, u8)>>(
    bytes: &mut I,
    dim: usize,
    lineno: usize,
    col: usize,
) -> Result<usize, SchemeParseError> {
    match bytes.next() {
        Some((_, d @ b'1'..=b'9')) if usize::from(d - b'1') < dim => Ok(usize::from(d - b'1')),
        _ => Err(SchemeParseError::BadCell {
            line: lineno + 1,
            column: col + 1,
        }),
    }
}

/// Errors encountered while parsing a scheme file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemeParseError {
    /// I/O error (file not found, etc.).
    Io(String),
    /// A character other than factors, separators and digits.
    UnexpectedChar {
        /// 1-based line number.
        line: usize,
        /// The character found.
        ch: char,
    },
    /// A cell index was absent or out of range for the matrix size.
    BadCell {
        /// 1-based line number.
        line: usize,
        /// 1-based column of the entry's letter.
        column: usize,
    },
    /// A term lacked one of its three factors.
    MissingFactor {
        /// 1-based line number.
        line: usize,
        /// The absent factor's letter.
        letter: char,
    },
    /// No terms at all.
    Empty,
}

impl fmt::Display for SchemeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeParseError::Io(msg) => write!(f, "I/O error: {msg}"),
            SchemeParseError::UnexpectedChar { line, ch } => {
                write!(f, "unexpected character {ch:?} on line {line}")
            }
            SchemeParseError::BadCell { line, column } => {
                write!(f, "bad cell index on line {line} near column {column}")
            }
            SchemeParseError::MissingFactor { line, letter } => {
                write!(f, "term on line {line} has no {letter}-factor")
            }
            SchemeParseError::Empty => write!(f, "scheme file holds no terms"),
        }
    }
}

impl std::error::Error for SchemeParseError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_bracket_notation() {
        let terms = [[0b0011u64, 0b0101, 0b1000]];
        let mut buf = Vec::new();
        write_scheme_to(&mut buf, 2, &terms).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "(a11+a12)*(b11+b21)*(c22)\n"
        );
    }

    #[test]
    fn parses_what_it_writes() {
        let terms = vec![
            [0b1001u64, 0b0110, 0b1111],
            [0b0001, 0b0010, 0b0100],
            [0b1110, 0b1001, 0b0011],
        ];
        let mut buf = Vec::new();
        write_scheme_to(&mut buf, 2, &terms).unwrap();
        let parsed = parse_scheme(2, std::str::from_utf8(&buf).unwrap()).unwrap();
        assert_eq!(parsed, terms);
    }

    #[test]
    fn round_trips_larger_matrices() {
        let terms = vec![[0x1FF_u64, 0x0A5, 0x111], [0x003, 0x1C0, 0x0FF]];
        let mut buf = Vec::new();
        write_scheme_to(&mut buf, 3, &terms).unwrap();
        let parsed = parse_scheme(3, std::str::from_utf8(&buf).unwrap()).unwrap();
        assert_eq!(parsed, terms);
    }

    #[test]
    fn skips_blank_lines() {
        let text = "(a11)*(b11)*(c11)\n\n(a22)*(b22)*(c22)\n";
        let parsed = parse_scheme(2, text).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn rejects_foreign_characters() {
        let err = parse_scheme(2, "(a11)*(b11)-(c11)\n").unwrap_err();
        assert_eq!(err, SchemeParseError::UnexpectedChar { line: 1, ch: '-' });
    }

    #[test]
    fn rejects_out_of_range_cells() {
        let err = parse_scheme(2, "(a13)*(b11)*(c11)\n").unwrap_err();
        assert!(matches!(err, SchemeParseError::BadCell { line: 1, .. }));
    }

    #[test]
    fn rejects_missing_factor() {
        let err = parse_scheme(2, "(a11)*()*(c11)\n").unwrap_err();
        assert_eq!(err, SchemeParseError::MissingFactor { line: 1, letter: 'b' });
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse_scheme(2, "\n \n").unwrap_err(), SchemeParseError::Empty);
    }

    #[test]
    fn file_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "flipgraph-scheme-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("m007.txt");

        let terms = vec![[0b1001u64, 0b0110, 0b1111]];
        write_scheme(&path, 2, &terms).unwrap();
        assert_eq!(read_scheme(&path, 2).unwrap(), terms);

        std::fs::remove_dir_all(&dir).ok();
    }
}
