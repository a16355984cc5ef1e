use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::apply::Outcome;
use crate::backfill::{cutoff_for, BackfillSummary, KindTally};
use crate::import::{ImportCounts, ImportSummary};

fn mode_line<S>(outcome: &Outcome<S>) -> &'static str {
    if outcome.committed {
        "committed"
    } else {
        "dry run, rolled back"
    }
}

fn backfill_row(output: &mut String, label: &str, tally: &KindTally) {
    let _ = writeln!(
        output,
        "| {} | {} | {} | {} |",
        label, tally.created, tally.existing, tally.errors
    );
}

pub fn build_backfill_report(
    outcome: &Outcome<BackfillSummary>,
    lookback_days: i64,
    now: NaiveDateTime,
) -> String {
    let summary = &outcome.counts;
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Backfill Report");
    let _ = writeln!(
        output,
        "Run {} at {} ({})",
        outcome.run_id,
        now.format("%Y-%m-%d %H:%M"),
        mode_line(outcome)
    );
    match cutoff_for(now, lookback_days) {
        Ok(cutoff) => {
            let _ = writeln!(
                output,
                "Window: {} days, cutoff {}",
                lookback_days,
                cutoff.date()
            );
        }
        Err(_) => {
            let _ = writeln!(output, "Window: {} days", lookback_days);
        }
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "| Kind | Created | Already recorded | Errors |");
    let _ = writeln!(output, "|---|---|---|---|");
    backfill_row(&mut output, "Teaching sessions", &summary.teaching);
    backfill_row(&mut output, "Activities", &summary.activities);
    backfill_row(&mut output, "Meetings", &summary.meetings);
    let _ = writeln!(output);

    if summary.created() == 0 {
        let _ = writeln!(output, "No missing attendance found for this window.");
    } else {
        let _ = writeln!(
            output,
            "{} records marked absent.",
            summary.created()
        );
    }
    if summary.errors() > 0 {
        let _ = writeln!(
            output,
            "{} records could not be built; see the run log for details.",
            summary.errors()
        );
    }

    output
}

fn import_row(output: &mut String, label: &str, counts: &ImportCounts) {
    let _ = writeln!(
        output,
        "| {} | {} | {} | {} | {} | {} |",
        label, counts.imported, counts.skipped, counts.errors, counts.unmatched, counts.merged
    );
}

pub fn build_import_report(
    outcome: &Outcome<ImportSummary>,
    now: NaiveDateTime,
    skip_students: bool,
) -> String {
    let summary = &outcome.counts;
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Import Report");
    let _ = writeln!(
        output,
        "Run {} at {} ({})",
        outcome.run_id,
        now.format("%Y-%m-%d %H:%M"),
        mode_line(outcome)
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "| Source | Imported | Skipped | Errors | Unmatched | Merged |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    import_row(&mut output, "Teaching sessions", &summary.teaching);
    if skip_students {
        let _ = writeln!(output, "| Students | skipped | - | - | - | - |");
    } else {
        import_row(&mut output, "Students", &summary.students);
    }
    let _ = writeln!(output);

    if summary.teaching.dates_corrected > 0 {
        let _ = writeln!(
            output,
            "- {} teaching rows moved onto their scheduled weekday",
            summary.teaching.dates_corrected
        );
    }
    if summary.sessions_refreshed > 0 {
        let _ = writeln!(
            output,
            "- {} sessions had their student tallies recomputed",
            summary.sessions_refreshed
        );
    }
    if summary.errors() > 0 {
        let _ = writeln!(
            output,
            "- {} rows rejected; see the run log for row numbers",
            summary.errors()
        );
    }

    output
}
