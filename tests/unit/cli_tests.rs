use clap::Parser;
use dataspy::cli::{Cli, OutputFormat, Tier};

#[test]
fn test_minimal_invocation() {
    let cli = Cli::try_parse_from(["dataspy", "analytics", "dev_jane"]).unwrap();

    assert_eq!(cli.database, "analytics");
    assert_eq!(cli.schema, "dev_jane");
    assert_eq!(cli.tier, "all");
    assert_eq!(cli.format, "pretty");
    assert!(cli.regex.is_none());
    assert!(cli.output.is_none());
    assert!(cli.concurrency.is_none());
    assert!(!cli.no_writeback);
    assert!(!cli.no_progress);
}

#[test]
fn test_all_flags() {
    let cli = Cli::try_parse_from([
        "dataspy",
        "analytics",
        "dev_jane",
        "--regex",
        "fct_orders",
        "--tier",
        "row",
        "--format",
        "json",
        "--output",
        "report.json",
        "--concurrency",
        "2",
        "--query-timeout",
        "30",
        "--no-writeback",
        "--no-progress",
        "-v",
    ])
    .unwrap();

    assert_eq!(cli.regex.as_deref(), Some("fct_orders"));
    assert_eq!(Tier::parse(&cli.tier).unwrap(), Tier::Row);
    assert_eq!(OutputFormat::parse(&cli.format).unwrap(), OutputFormat::Json);
    assert_eq!(cli.output.as_deref().and_then(|p| p.to_str()), Some("report.json"));
    assert_eq!(cli.query_timeout, Some(30));
    assert!(cli.no_progress);
    assert!(cli.verbose);
}

#[test]
fn test_invalid_numbers_rejected() {
    assert!(Cli::try_parse_from(["dataspy", "a", "b", "--concurrency", "zero"]).is_err());
    assert!(Cli::try_parse_from(["dataspy", "a", "b", "--query-timeout", "0"]).is_err());
}

#[test]
fn test_tier_selection() {
    let summary = Tier::parse("summary").unwrap();
    assert!(summary.includes_summary());
    assert!(!summary.includes_column());
    assert!(!summary.includes_row());

    let all = Tier::parse("ALL").unwrap();
    assert!(all.includes_summary() && all.includes_column() && all.includes_row());

    assert!(Tier::parse("pivot").is_err());
}
