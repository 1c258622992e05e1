//! Table rendering of merge reports.

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use mergeorder_core::scoring::{ScoreProvenance, ScoreResult};
use mergeorder_core::search::{MergeReport, OrderReport, RankingReport, SearchOutcome, StepOutcome};

use crate::style;

const REASON_WIDTH: usize = 60;

pub fn print_report(report: &MergeReport) {
    println!();
    match &report.outcome {
        SearchOutcome::Exhaustive(order) => {
            println!("{}", style::header("Best merge order (exhaustive simulation)"));
            println!();
            println!("{}", order_table(order));
            println!();
            println!(
                "Cumulative score : {}",
                style::cumulative(order.order.cumulative_score)
            );
            println!(
                "Permutations     : {} evaluated, {} pruned",
                order.permutations_evaluated, order.permutations_pruned
            );
            println!("Resolution       : {}", order.resolution);
        }
        SearchOutcome::Independent(ranking) => {
            println!("{}", style::header("Branch difficulty ranking (independent)"));
            println!();
            println!("{}", ranking_table(ranking));
            println!();
            println!("{}", style::dim(&format!("Note: {}", ranking.note)));
        }
    }
    println!(
        "Base             : {} ({})",
        report.base.name,
        short_revision(&report.base.revision)
    );
    println!(
        "Generated        : {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if report.has_degraded_scores() {
        println!();
        println!(
            "{}",
            style::warn(
                "Some advisory scores fell back to the neutral value; see the Scorers column."
            )
        );
    }
}

pub fn order_table(report: &OrderReport) -> Table {
    let mut table = new_table(vec![
        "#", "Branch", "Merge", "Conflicts", "Structural", "Advisory", "Final", "Scorers",
        "Rationale",
    ]);
    for (idx, step) in report.steps.iter().enumerate() {
        let merge_cell = match step.outcome {
            StepOutcome::Clean => Cell::new("clean").fg(Color::Green),
            StepOutcome::Conflict => Cell::new("conflict").fg(Color::Red),
        };
        let mut row = vec![
            Cell::new(idx + 1),
            Cell::new(&step.branch),
            merge_cell,
            Cell::new(step.signal.to_string()),
        ];
        row.extend(score_cells(&step.score));
        table.add_row(row);
    }
    table
}

pub fn ranking_table(report: &RankingReport) -> Table {
    let mut table = new_table(vec![
        "Rank", "Branch", "Revision", "Conflicts", "Structural", "Advisory", "Final", "Scorers",
        "Rationale",
    ]);
    for (idx, ranked) in report.ranking.iter().enumerate() {
        let mut row = vec![
            Cell::new(idx + 1),
            Cell::new(&ranked.branch.name),
            Cell::new(short_revision(&ranked.branch.revision)),
            Cell::new(ranked.signal.to_string()),
        ];
        row.extend(score_cells(&ranked.score));
        table.add_row(row);
    }
    table
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn score_cells(score: &ScoreResult) -> Vec<Cell> {
    let advisory = match score.provenance {
        ScoreProvenance::Blended | ScoreProvenance::BlendedDegraded { .. } => {
            format!("{:.2}", score.advisory_score)
        }
        _ => "-".to_string(),
    };
    let scorers = match &score.provenance {
        degraded @ ScoreProvenance::BlendedDegraded { .. } => {
            Cell::new(degraded.to_string()).fg(Color::Yellow)
        }
        other => Cell::new(other.to_string()),
    };
    vec![
        Cell::new(format!("{:.2}", score.structural_score)),
        Cell::new(advisory),
        Cell::new(format!("{:.2}", score.final_score)),
        scorers,
        Cell::new(truncate(&score.advisory_reason, REASON_WIDTH)),
    ]
}

fn short_revision(revision: &str) -> &str {
    revision.get(..10).unwrap_or(revision)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
