//! Colorful console output for rota runs.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::Duration;

use crate::domain::RosterSnapshot;
use crate::planner::{RangeReport, UnitStatus};

/// ASCII art banner for server startup.
pub fn print_banner() {
    let banner = r#"
  ____        _           ____       _
 |  _ \ _   _| |_ _   _  |  _ \ ___ | |_ __ _
 | | | | | | | __| | | | | |_) / _ \| __/ _` |
 | |_| | |_| | |_| |_| | |  _ < (_) | || (_| |
 |____/ \__,_|\__|\__, | |_| \_\___/ \__\__,_|
                  |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Floor Duty Rota".bright_cyan()
    );
}

/// Prints the size of the loaded roster.
pub fn print_config(snapshot: &RosterSnapshot) {
    println!(
        "{} {} {} Roster: floors ({}), tasks ({}), employees ({}), time off ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Planner]".bright_cyan(),
        snapshot.floors.len().to_formatted_string(&Locale::en).bright_yellow(),
        snapshot.tasks.len().to_formatted_string(&Locale::en).bright_yellow(),
        snapshot.employees.len().to_formatted_string(&Locale::en).bright_yellow(),
        snapshot.unavailability.len().to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints one line per failed unit, then a summary box.
pub fn print_run_summary(report: &RangeReport, total_duration: Duration) {
    for unit in report.failed_units() {
        let status = match unit.status {
            UnitStatus::InternalError => unit.status.as_str().bright_red().bold().to_string(),
            _ => unit.status.as_str().yellow().to_string(),
        };
        println!(
            "{} {} {} {} {} {}",
            timestamp().bright_black(),
            "WARN".yellow(),
            "[Planner]".bright_cyan(),
            format!("{} {}", unit.date, unit.floor).white().bold(),
            status,
            unit.error.as_deref().unwrap_or("").bright_black()
        );
    }

    let units = report.units.len();
    let solved = report.solved_count();
    let records: usize = report.units.iter().map(|u| u.assignments.len()).sum();
    let nodes: u64 = report.units.iter().map(|u| u.nodes).sum();
    let units_per_sec = if total_duration.as_secs_f64() > 0.0 {
        (units as f64 / total_duration.as_secs_f64()) as u64
    } else {
        0
    };

    // 60 chars wide, 56 char content area
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let status_text = if solved == units {
        "✓ ALL UNITS SOLVED".to_string()
    } else {
        format!("✗ {} OF {} UNITS FAILED", units - solved, units)
    };
    let status_colored = if solved == units {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_red().bold().to_string()
    };
    let status_padding = 56usize.saturating_sub(status_text.chars().count());
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());
    let rows = [
        ("Range:", format!("{} .. {}", report.start, report.end)),
        ("Units Solved:", format!("{} / {}", solved, units)),
        ("Records:", records.to_formatted_string(&Locale::en)),
        ("Search Nodes:", nodes.to_formatted_string(&Locale::en)),
        ("Planning Time:", format_duration(total_duration)),
        ("Unit Speed:", format!("{}/sec", units_per_sec.to_formatted_string(&Locale::en))),
    ];
    for (label, value) in rows {
        println!(
            "{}  {:<18}{:>36}  {}",
            "║".bright_cyan(),
            label,
            value,
            "║".bright_cyan()
        );
    }
    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Formats a duration nicely.
///
/// ```
/// use duty_rota::console::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
/// ```
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0.000".to_string())
}
