use std::time::Duration;

const UNITS: [(&str, i32); 4] = [("s", 0), ("ms", 3), ("µs", 6), ("ns", 9)];

/// Render a duration in the largest unit that keeps the value at or above one
pub fn format_duration(duration: Duration, fraction_digits: Option<usize>) -> String {
    let fraction_digits = fraction_digits.unwrap_or(1);
    let secs = duration.as_secs_f64();
    if secs < 1e-9 {
        return "< 1 ns".to_string();
    }

    let (unit, exponent) = UNITS
        .iter()
        .copied()
        .find(|(_, exponent)| secs >= 10f64.powi(-exponent))
        .unwrap_or(UNITS[UNITS.len() - 1]);
    let value = secs * 10f64.powi(exponent);

    if fraction_digits == 0 && value.fract() == 0.0 {
        format!("{value:.0} {unit}")
    } else {
        format!("{value:.fraction_digits$} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::seconds(Duration::from_millis(1_200), None, "1.2 s")]
    #[case::minutes_stay_in_seconds(Duration::from_secs(95), None, "95.0 s")]
    #[case::no_fraction(Duration::from_secs(3), Some(0), "3 s")]
    #[case::milliseconds(Duration::from_millis(350), None, "350.0 ms")]
    #[case::two_digits(Duration::from_micros(1_234), Some(2), "1.23 ms")]
    #[case::microseconds(Duration::from_micros(7), None, "7.0 µs")]
    #[case::nanoseconds(Duration::from_nanos(12), None, "12.0 ns")]
    #[case::zero(Duration::ZERO, None, "< 1 ns")]
    fn test_format_duration(
        #[case] duration: Duration,
        #[case] fraction_digits: Option<usize>,
        #[case] expected: &str,
    ) {
        assert_eq!(format_duration(duration, fraction_digits), expected);
    }
}
