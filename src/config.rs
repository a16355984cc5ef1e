use chrono::NaiveDateTime;

use crate::apply::ApplyMode;
use crate::backfill::BackfillOptions;
use crate::import::ImportOptions;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
/// Widest backfill window accepted, about ten school years.
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Engine knobs gathered from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub lookback_days: i64,
    /// Shortest name fragment the substring tier may match on; 0 disables the guard.
    pub min_substring_len: usize,
    pub snap_to_schedule_day: bool,
    pub dry_run: bool,
    pub skip_students: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            min_substring_len: 0,
            snap_to_schedule_day: false,
            dry_run: false,
            skip_students: false,
        }
    }
}

impl EngineConfig {
    pub fn mode(&self) -> ApplyMode {
        ApplyMode::from_dry_run(self.dry_run)
    }

    pub fn backfill_options(&self, now: NaiveDateTime) -> BackfillOptions {
        BackfillOptions {
            lookback_days: self.lookback_days,
            now,
            mode: self.mode(),
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            mode: self.mode(),
            skip_students: self.skip_students,
            snap_to_schedule_day: self.snap_to_schedule_day,
            min_substring_len: self.min_substring_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_nightly_job() {
        let config = EngineConfig::default();
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.mode(), ApplyMode::Commit);
        assert_eq!(config.import_options().min_substring_len, 0);
    }

    #[test]
    fn dry_run_flag_selects_rollback_mode() {
        let config = EngineConfig {
            dry_run: true,
            skip_students: true,
            ..EngineConfig::default()
        };
        let options = config.import_options();
        assert_eq!(options.mode, ApplyMode::DryRun);
        assert!(options.skip_students);
    }
}
