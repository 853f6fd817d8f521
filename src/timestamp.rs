use essence::structs::rational::Rational;

/// `hh:mm:ss.mmm` for `edit_units` at `rate`, truncated to the millisecond.
pub fn time_str(edit_units: u64, rate: Rational) -> String {
    let ms = if rate.num > 0 && rate.den > 0 {
        (edit_units as u128 * 1000 * rate.den as u128 / rate.num as u128) as u64
    } else {
        0
    };
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

#[test]
fn test_time_str() {
    assert_eq!(time_str(90_061, Rational::new(25, 1)), "01:00:02.440");
    assert_eq!(time_str(30, Rational::new(30000, 1001)), "00:00:01.001");
    assert_eq!(time_str(48_000 * 61, Rational::new(48000, 1)), "00:01:01.000");
    assert_eq!(time_str(5, Rational::default()), "00:00:00.000");
}
