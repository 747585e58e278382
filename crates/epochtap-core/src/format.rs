//! Human-readable rendering of status reports.

use indoc::formatdoc;

use crate::cycle::StatusReport;
use crate::tier::TIERS;

/// Status text shown with every periodic or forced update.
pub fn render_status(report: &StatusReport) -> String {
    formatdoc! {"
        📊 24-Hour Cycle Status

        ⏱️ Cycle Progress: Epoch {epoch} / {total}
        ⌛ Remaining in Cycle: {remaining} epochs

        👤 Tapping Progress
        ✅ Tapped Epochs: {tapped}
        🏆 Reward Tier: {tier}
        ➡️ Remaining Epochs in This Tier: {in_tier}

        📈 Tap Statistics
        🟢 Total Taps Used: {used}
        🔵 Remaining Taps: {left} / {max}",
        epoch = report.current_epoch,
        total = report.total_epochs,
        remaining = report.remaining_epochs,
        tapped = report.tapped_epochs,
        tier = report.tier_name(),
        in_tier = report.remaining_in_tier,
        used = report.used_taps,
        left = report.remaining_taps,
        max = report.max_taps,
    }
}

/// The tier table as aligned text, one range per line.
pub fn render_tier_table() -> String {
    TIERS
        .iter()
        .map(|t| format!("{:>3}-{:<3}  {}", t.lower, t.upper, t.name))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::EpochEngine;

    #[test]
    fn status_text_shows_all_counters() {
        let report = EpochEngine::default().report(2, 1);
        let text = render_status(&report);
        assert!(text.contains("Epoch 2 / 288"));
        assert!(text.contains("Remaining in Cycle: 286 epochs"));
        assert!(text.contains("Reward Tier: Extremely High"));
        assert!(text.contains("Remaining Epochs in This Tier: 13"));
        assert!(text.contains("Total Taps Used: 70"));
        assert!(text.contains("Remaining Taps: 11930 / 12000"));
    }

    #[test]
    fn tier_table_has_twelve_lines() {
        let table = render_tier_table();
        assert_eq!(table.lines().count(), 12);
        assert!(table.lines().next().unwrap().contains("Extremely High"));
    }
}
