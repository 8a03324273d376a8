//! Maps delivered randomness to a bounded discrete outcome

use crate::errors::DeriveError;
use crate::games::types::Position;
use std::num::NonZeroUsize;

const POSITION_COUNT: NonZeroUsize = match NonZeroUsize::new(Position::ALL.len()) {
    Some(count) => count,
    None => panic!("position ordering is empty"),
};

/// Stateless outcome derivation from oracle randomness.
///
/// Only the first byte is consumed and reduced modulo the option count.
/// When the option count does not divide 256 the mapping is slightly biased:
/// for three options residue 0 occurs 86 times in 256, residues 1 and 2 only
/// 85 times each. Existing outcomes depend on this mapping, so it must not
/// change.
pub struct OutcomeDeriver;

impl OutcomeDeriver {
    /// Reduce `bytes` to an index in `[0, option_count)`
    pub fn derive(bytes: &[u8], option_count: NonZeroUsize) -> Result<usize, DeriveError> {
        let first_byte = bytes.first().copied().ok_or(DeriveError::EmptyRandomness)?;
        Ok(first_byte as usize % option_count.get())
    }

    /// Derive the shot position using the `[left, center, right]` ordering
    pub fn derive_position(bytes: &[u8]) -> Result<Position, DeriveError> {
        let index = Self::derive(bytes, POSITION_COUNT)?;
        // index < ALL.len() by construction
        Ok(Position::ALL[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> NonZeroUsize {
        NonZeroUsize::new(3).unwrap()
    }

    #[test]
    fn test_known_values() {
        assert_eq!(OutcomeDeriver::derive(&[0], three()), Ok(0));
        assert_eq!(OutcomeDeriver::derive(&[1], three()), Ok(1));
        assert_eq!(OutcomeDeriver::derive(&[2], three()), Ok(2));
        assert_eq!(OutcomeDeriver::derive(&[3], three()), Ok(0));
        assert_eq!(OutcomeDeriver::derive(&[255], three()), Ok(0));
    }

    #[test]
    fn test_only_first_byte_counts() {
        assert_eq!(OutcomeDeriver::derive(&[4, 0, 0, 0], three()), Ok(1));
        assert_eq!(OutcomeDeriver::derive(&[4, 255, 17], three()), Ok(1));
    }

    #[test]
    fn test_empty_always_fails() {
        for count in 1..=300 {
            let count = NonZeroUsize::new(count).unwrap();
            assert_eq!(OutcomeDeriver::derive(&[], count), Err(DeriveError::EmptyRandomness));
        }
        assert_eq!(OutcomeDeriver::derive_position(&[]), Err(DeriveError::EmptyRandomness));
    }

    #[test]
    fn test_bounded_and_deterministic() {
        for count in 1..=300 {
            let count = NonZeroUsize::new(count).unwrap();
            for byte in 0..=255u8 {
                let bytes = [byte, byte.wrapping_mul(7)];
                let first = OutcomeDeriver::derive(&bytes, count).unwrap();
                assert!(first < count.get());
                assert_eq!(OutcomeDeriver::derive(&bytes, count).unwrap(), first);
            }
        }
    }

    #[test]
    fn test_position_mapping() {
        assert_eq!(OutcomeDeriver::derive_position(&[0]), Ok(Position::Left));
        assert_eq!(OutcomeDeriver::derive_position(&[1]), Ok(Position::Center));
        assert_eq!(OutcomeDeriver::derive_position(&[2]), Ok(Position::Right));
        assert_eq!(OutcomeDeriver::derive_position(&[255]), Ok(Position::Left));
    }

    #[test]
    fn test_modulo_bias_is_preserved() {
        let mut counts = [0usize; 3];
        for byte in 0..=255u8 {
            counts[OutcomeDeriver::derive(&[byte], three()).unwrap()] += 1;
        }
        assert_eq!(counts, [86, 85, 85]);
    }
}
