use anyhow::{Result, bail};

use crate::structs::rational::Rational;
use crate::utils::errors::WrapError;

pub const MAX_SAMPLE_SEQUENCE_LEN: usize = 32;

/// Number of sound samples per video frame, repeating cyclically.
///
/// Entry `i` is `round((i + 1) * r) - round(i * r)` with `r` the exact
/// samples-per-frame ratio, so any full cycle sums to the exact count.
pub fn sound_sample_sequence(sampling_rate: Rational, frame_rate: Rational) -> Result<Vec<u32>> {
    let num = sampling_rate.num as i64 * frame_rate.den as i64;
    let den = sampling_rate.den as i64 * frame_rate.num as i64;
    if num <= 0 || den <= 0 {
        bail!(WrapError::UnsupportedEssence {
            essence: "sound".into(),
            rate: format!("{sampling_rate} at {frame_rate}"),
        });
    }
    let g = gcd(num, den);
    let (p, q) = (num / g, den / g);

    if q as usize > MAX_SAMPLE_SEQUENCE_LEN {
        bail!(WrapError::CadenceTooLong {
            sampling_rate: sampling_rate.to_string(),
            frame_rate: frame_rate.to_string(),
            len: q as usize,
        });
    }

    // round half up
    let rounded = |i: i64| (2 * i * p + q) / (2 * q);
    Ok((0..q)
        .map(|i| (rounded(i + 1) - rounded(i)) as u32)
        .collect())
}

/// Rotates the sequence so that it starts at entry `offset`.
pub fn shift_sample_sequence(sequence: &[u32], offset: usize) -> Vec<u32> {
    if sequence.is_empty() {
        return Vec::new();
    }
    let mut shifted = sequence.to_vec();
    shifted.rotate_left(offset % sequence.len());
    shifted
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::rational::{
        FRAME_RATE_25, FRAME_RATE_2997, FRAME_RATE_5994, FRAME_RATE_23976, SAMPLING_RATE_48K,
        SAMPLING_RATE_96K, STANDARD_FRAME_RATES,
    };

    #[test]
    fn known_sequences() -> Result<()> {
        assert_eq!(sound_sample_sequence(SAMPLING_RATE_48K, FRAME_RATE_25)?, [1920]);
        assert_eq!(
            sound_sample_sequence(SAMPLING_RATE_48K, FRAME_RATE_2997)?,
            [1602, 1601, 1602, 1601, 1602]
        );
        assert_eq!(
            sound_sample_sequence(SAMPLING_RATE_48K, FRAME_RATE_5994)?,
            [801, 801, 800, 801, 801]
        );
        assert_eq!(sound_sample_sequence(SAMPLING_RATE_48K, FRAME_RATE_23976)?, [2002]);
        Ok(())
    }

    #[test]
    fn window_sums_match_exact_rate() -> Result<()> {
        for sampling_rate in [SAMPLING_RATE_48K, SAMPLING_RATE_96K] {
            for frame_rate in STANDARD_FRAME_RATES {
                let sequence = sound_sample_sequence(sampling_rate, frame_rate)?;
                let n = sequence.len() as i64;
                // any window of k entries, k a multiple of the cycle, is exact
                for offset in 0..sequence.len() {
                    let shifted = shift_sample_sequence(&sequence, offset);
                    let total: i64 = shifted
                        .iter()
                        .cycle()
                        .take(3 * n as usize)
                        .map(|&s| s as i64)
                        .sum();
                    let exact = 3 * n * sampling_rate.num as i64 * frame_rate.den as i64
                        / (sampling_rate.den as i64 * frame_rate.num as i64);
                    assert_eq!(total, exact, "{sampling_rate} at {frame_rate} offset {offset}");
                }
                // shorter windows are within one sample of exact
                for k in 1..=sequence.len() {
                    for start in 0..sequence.len() {
                        let sum: i64 = sequence
                            .iter()
                            .cycle()
                            .skip(start)
                            .take(k)
                            .map(|&s| s as i64)
                            .sum();
                        let exact = k as f64 * sampling_rate.to_f64() / frame_rate.to_f64();
                        assert!((sum as f64 - exact).abs() <= 1.0);
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn shift_rotates() {
        assert_eq!(shift_sample_sequence(&[1, 2, 3], 1), [2, 3, 1]);
        assert_eq!(shift_sample_sequence(&[1, 2, 3], 4), [2, 3, 1]);
        assert!(shift_sample_sequence(&[], 2).is_empty());
    }

    #[test]
    fn long_cycles_are_rejected() {
        let err = sound_sample_sequence(Rational::new(44_100, 1), FRAME_RATE_2997).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WrapError>(),
            Some(WrapError::CadenceTooLong { len: 100, .. })
        ));
    }
}
