//! Human-readable labels for finishing gaps measured in bashin.
use crate::numbers::round_f64_to_i64;

const LABELS: [(f64, &str); 9] = [
    (0.05, "Nose"),
    (0.125, "Head"),
    (0.25, "Neck"),
    (0.5, "1/2 L"),
    (0.875, "3/4 L"),
    (1.125, "1 L"),
    (1.375, "1 1/4 L"),
    (1.625, "1 1/2 L"),
    (1.875, "1 3/4 L"),
];

const LAST_COUNTED: f64 = 10.5;

/// Label for a gap regardless of which runner is ahead.
#[must_use]
pub fn format_bashin(bashin: f64) -> String {
    let gap = bashin.abs();
    if let Some((_, label)) = LABELS.iter().find(|(below, _)| gap < *below) {
        return (*label).to_string();
    }
    if gap < LAST_COUNTED {
        return format!("{} L", round_f64_to_i64(gap));
    }
    "Distance".to_string()
}

/// Label with the raw magnitude, e.g. `Neck (0.18)`.
#[must_use]
pub fn format_bashin_with_raw(bashin: f64) -> String {
    format!("{} ({:.2})", format_bashin(bashin), bashin.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_finishes_use_named_margins() {
        assert_eq!(format_bashin(0.01), "Nose");
        assert_eq!(format_bashin(-0.1), "Head");
        assert_eq!(format_bashin(0.2), "Neck");
        assert_eq!(format_bashin(0.3), "1/2 L");
        assert_eq!(format_bashin(1.5), "1 1/2 L");
    }

    #[test]
    fn whole_lengths_then_distance() {
        assert_eq!(format_bashin(1.9), "2 L");
        assert_eq!(format_bashin(-5.4), "5 L");
        assert_eq!(format_bashin(10.4), "10 L");
        assert_eq!(format_bashin(10.5), "Distance");
    }

    #[test]
    fn raw_suffix_is_absolute() {
        assert_eq!(format_bashin_with_raw(-0.18), "Neck (0.18)");
        assert_eq!(format_bashin_with_raw(5.234), "5 L (5.23)");
    }
}
