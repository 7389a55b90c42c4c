//! Colored outcome reporting

use colored::{ColoredString, Colorize};
use stratus_core::{Mode, Outcome};
use stratus_reconcile::PassReport;

pub fn print_report(report: &PassReport, mode: Mode) {
    for step in &report.steps {
        println!("{:>14}  {}", colorize(&step.outcome), step.label);
        if let Some(diff) = step.outcome.diff() {
            for entry in &diff.changes {
                println!("{:>14}  {}", "", entry);
            }
            for entry in &diff.removals {
                println!("{:>14}  untag {}", "", entry.path);
            }
        }
    }

    let summary = format!(
        "{} changed, {} total",
        report.changed(),
        report.steps.len()
    );
    if mode.is_preview() {
        println!("{}", format!("preview: {}", summary).cyan());
    } else {
        println!("{}", summary);
    }
}

fn colorize(outcome: &Outcome) -> ColoredString {
    let label = outcome.label();
    match outcome {
        Outcome::Created => label.green(),
        Outcome::Updated { .. } => label.yellow(),
        Outcome::Deleted => label.red(),
        Outcome::WouldCreate | Outcome::WouldUpdate { .. } | Outcome::WouldDelete => label.cyan(),
        Outcome::Unchanged | Outcome::Absent => label.dimmed(),
    }
}
