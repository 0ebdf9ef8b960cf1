//! Fixed probe data shared by the optimizer's filter-before-map independence
//! check and by external differential-testing harnesses (`SPEC_FULL.md` §6,
//! §4.6.5).
//!
//! Grounded on `original_source/core/differential.py`'s fixed probe corpus:
//! rather than generating random inputs (which would make a single
//! optimizer run's behavior depend on an RNG seed), both the in-crate
//! rewrite check and any out-of-crate differential tester sample the exact
//! same sequences, so "the optimizer approved this rewrite" and "the
//! external tester replayed it" mean the same thing.

use crate::value::Value;

/// The fixed probe families: signed integers spanning zero, short strings
/// including the empty string, and small positive integers. Each inner
/// `Vec` is one probe sequence.
#[must_use]
pub fn probe_sequences() -> Vec<Vec<Value>> {
    vec![
        vec![
            Value::Int(-5),
            Value::Int(-1),
            Value::Int(0),
            Value::Int(1),
            Value::Int(2),
            Value::Int(7),
            Value::Int(100),
        ],
        vec![
            Value::Str(String::new()),
            Value::Str("a".to_string()),
            Value::Str("ab".to_string()),
            Value::Str("hello".to_string()),
            Value::Str("  ".to_string()),
        ],
        vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(5),
            Value::Int(8),
            Value::Int(13),
        ],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_sequences_are_nonempty_and_fixed() {
        let a = probe_sequences();
        let b = probe_sequences();
        assert!(!a.is_empty());
        assert!(a.iter().all(|seq| !seq.is_empty()));
        assert_eq!(a.len(), b.len());
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa, sb);
        }
    }

    #[test]
    fn integer_family_includes_zero_and_negatives() {
        let seqs = probe_sequences();
        let has_zero_and_negative = seqs.iter().any(|seq| {
            seq.contains(&Value::Int(0)) && seq.iter().any(|v| matches!(v, Value::Int(n) if *n < 0))
        });
        assert!(has_zero_and_negative);
    }

    #[test]
    fn string_family_includes_empty_string() {
        let seqs = probe_sequences();
        assert!(seqs.iter().any(|seq| seq.contains(&Value::Str(String::new()))));
    }
}
