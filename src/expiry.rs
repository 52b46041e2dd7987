// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::ExpiryConfig;
use std::fmt;

/// Severity band for the days left on a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryBand {
    Critical,
    Warning,
    Ok,
}

impl fmt::Display for ExpiryBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExpiryBand::Critical => "critical",
            ExpiryBand::Warning => "warning",
            ExpiryBand::Ok => "ok",
        };
        f.write_str(label)
    }
}

/// Classify whole days remaining. Both thresholds are strict upper bounds,
/// so exactly `critical_days` is already a warning.
pub fn classify(days: i64, thresholds: &ExpiryConfig) -> ExpiryBand {
    if days < thresholds.critical_days {
        ExpiryBand::Critical
    } else if days < thresholds.warning_days {
        ExpiryBand::Warning
    } else {
        ExpiryBand::Ok
    }
}

/// Human-readable remaining time, e.g. `42 days` or `expired 3 days ago`.
pub fn describe_days(days: i64) -> String {
    match days {
        d if d < 0 => format!("expired {} day{} ago", -d, if d == -1 { "" } else { "s" }),
        1 => "1 day".to_string(),
        d => format!("{} days", d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let t = ExpiryConfig::default();
        assert_eq!(classify(29, &t), ExpiryBand::Critical);
        assert_eq!(classify(30, &t), ExpiryBand::Warning);
        assert_eq!(classify(89, &t), ExpiryBand::Warning);
        assert_eq!(classify(90, &t), ExpiryBand::Ok);
        assert_eq!(classify(91, &t), ExpiryBand::Ok);
    }

    #[test]
    fn test_classify_expired_is_critical() {
        let t = ExpiryConfig::default();
        assert_eq!(classify(0, &t), ExpiryBand::Critical);
        assert_eq!(classify(-1, &t), ExpiryBand::Critical);
        assert_eq!(classify(-400, &t), ExpiryBand::Critical);
    }

    #[test]
    fn test_classify_custom_thresholds() {
        let t = ExpiryConfig {
            critical_days: 7,
            warning_days: 14,
        };
        assert_eq!(classify(6, &t), ExpiryBand::Critical);
        assert_eq!(classify(7, &t), ExpiryBand::Warning);
        assert_eq!(classify(14, &t), ExpiryBand::Ok);
    }

    #[test]
    fn test_describe_days() {
        assert_eq!(describe_days(365), "365 days");
        assert_eq!(describe_days(1), "1 day");
        assert_eq!(describe_days(0), "0 days");
        assert_eq!(describe_days(-1), "expired 1 day ago");
        assert_eq!(describe_days(-5), "expired 5 days ago");
    }
}
