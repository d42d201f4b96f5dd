use std::fmt::Write;

use anyhow::Result;
use chrono::NaiveDate;

use crate::{
    cli::args::PlanArgs,
    plan::{self, calendar},
};

pub fn plan(args: &PlanArgs) -> Result<String> {
    render(args, calendar::today())
}

/// One line per request, with fallback candidates indented beneath it.
fn render(args: &PlanArgs, today: NaiveDate) -> Result<String> {
    let request = args.to_request(today)?;
    let plan = plan::plan(&request)?;

    let mut out = String::new();
    for planned in &plan.requests {
        for (i, chunk) in planned.candidates.iter().enumerate() {
            let indent = if i == 0 { "" } else { "  fallback " };
            writeln!(
                out,
                "{indent}{:<12} {:>5} days  {}  {}",
                chunk.label,
                chunk.window.num_days(),
                chunk.window,
                chunk.artifact_name
            )?;
        }
    }
    let days: i64 = plan.primaries().map(|c| c.window.num_days()).sum();
    write!(
        out,
        "{} requests covering {days} days, {} granularity, {} variables",
        plan.len(),
        request.granularity,
        request.variables.len()
    )?;

    Ok(out)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        plan: PlanArgs,
    }

    fn args(argv: &[&str]) -> PlanArgs {
        let mut full = vec!["era5land"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().plan
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 3).unwrap()
    }

    #[test]
    fn should_render_yearly_plan() {
        let text = render(&args(&["--format", "csv"]), today()).unwrap();

        assert!(text.starts_with("2005 "));
        assert!(text.contains("2025-01-01..2025-10-02"));
        assert!(text.ends_with("21 requests covering 7580 days, yearly granularity, 18 variables"));
    }

    #[test]
    fn should_render_fallback_candidates() {
        let text = render(
            &args(&["-g", "latest-day", "--fallback-depth", "2", "--format", "csv"]),
            today(),
        )
        .unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("2025-10-02"));
        assert!(lines[1].starts_with("  fallback 2025-10-01"));
        assert_eq!(lines[2], "1 requests covering 1 days, latest-day granularity, 18 variables");
    }

    #[test]
    fn should_reject_invalid_range() {
        let err = render(&args(&["--start", "2025-01-01", "--end", "2024-01-01"]), today());
        assert!(err.is_err());
    }
}
