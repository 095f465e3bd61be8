//! Verbosity-gated logging for the round search.
//!
//! Silent searches (verbosity 0) skip formatting entirely. Levels:
//! - 0: silent
//! - 1: changes (committed subrounds, completed rounds, escalations)
//! - 2: checks (every oracle verdict and binary-search candidate)
//! - 3: debug (partition sizes, scale factors, capacities)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Whether a search running at `verbosity` reports messages of `level`.
#[inline]
pub fn enabled(verbosity: u8, level: u8) -> bool {
    level != VERBOSITY_SILENT && verbosity >= level
}

#[doc(hidden)]
#[macro_export]
macro_rules! log_at {
    ($level:expr, $verbosity:expr, $($arg:tt)*) => {
        if $crate::logging::enabled($verbosity, $level) {
            eprintln!($($arg)*);
        }
    };
}

/// Committed subrounds, round completion, escalation results.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::log_at!($crate::logging::VERBOSITY_CHANGES, $verbosity, $($arg)*)
    };
}

/// Oracle verdicts (INFEASIBLE and INCONCLUSIVE are kept apart), expansion steps,
/// binary-search candidates.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::log_at!($crate::logging::VERBOSITY_CHECKS, $verbosity, $($arg)*)
    };
}

/// Small/big partition, scale factors, scaled capacities.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::log_at!($crate::logging::VERBOSITY_DEBUG, $verbosity, $($arg)*)
    };
}

/// Name of a verbosity level, for config reprs. Anything above 3 reads as debug.
pub fn level_name(verbosity: u8) -> &'static str {
    match verbosity {
        VERBOSITY_SILENT => "silent",
        VERBOSITY_CHANGES => "changes",
        VERBOSITY_CHECKS => "checks",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_name(VERBOSITY_SILENT), "silent");
        assert_eq!(level_name(VERBOSITY_CHECKS), "checks");
        assert_eq!(level_name(7), "debug");
    }

    #[test]
    fn test_levels_are_cumulative() {
        assert!(!enabled(VERBOSITY_SILENT, VERBOSITY_CHANGES));
        assert!(enabled(VERBOSITY_CHECKS, VERBOSITY_CHANGES));
        assert!(enabled(VERBOSITY_CHECKS, VERBOSITY_CHECKS));
        assert!(!enabled(VERBOSITY_CHECKS, VERBOSITY_DEBUG));
        assert!(enabled(9, VERBOSITY_DEBUG));
        // silent is a verbosity, never a message level
        assert!(!enabled(VERBOSITY_DEBUG, VERBOSITY_SILENT));
    }

    #[test]
    fn test_log_macros_expand_silently() {
        let verbosity = VERBOSITY_SILENT;
        log_changes!(verbosity, "subround {}", 1);
        log_checks!(verbosity, "verdict {}", "INFEASIBLE");
        log_debug!(verbosity, "scale {}", 12);
    }
}
