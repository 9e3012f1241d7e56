use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

#[test]
fn cli_parse_config() {
    match parse(&["throttle", "config"]) {
        CliCommand::Config { path } => assert!(!path),
        _ => panic!("expected Config"),
    }
}

#[test]
fn cli_parse_config_path() {
    match parse(&["throttle", "config", "--path"]) {
        CliCommand::Config { path } => assert!(path),
        _ => panic!("expected Config"),
    }
}

#[test]
fn cli_parse_global_config_after_subcommand() {
    let cli = Cli::try_parse_from(["throttle", "config", "--config", "/tmp/t.toml"]).unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
}

#[test]
fn cli_parse_replay_defaults() {
    match parse(&["throttle", "replay", "backlog.json"]) {
        CliCommand::Replay {
            file,
            batch_size,
            max_retries,
            records,
            json,
        } => {
            assert_eq!(file, PathBuf::from("backlog.json"));
            assert!(batch_size.is_none());
            assert!(max_retries.is_none());
            assert!(records.is_none());
            assert!(!json);
        }
        _ => panic!("expected Replay"),
    }
}

#[test]
fn cli_parse_replay_flags() {
    match parse(&[
        "throttle",
        "replay",
        "backlog.json",
        "--batch-size",
        "5",
        "--max-retries",
        "1",
        "--records",
        "out.jsonl",
        "--json",
    ]) {
        CliCommand::Replay {
            batch_size,
            max_retries,
            records,
            json,
            ..
        } => {
            assert_eq!(batch_size, Some(5));
            assert_eq!(max_retries, Some(1));
            assert_eq!(records, Some(PathBuf::from("out.jsonl")));
            assert!(json);
        }
        _ => panic!("expected Replay"),
    }
}

#[test]
fn cli_parse_replay_requires_file() {
    assert!(Cli::try_parse_from(["throttle", "replay"]).is_err());
}

#[test]
fn cli_parse_completions() {
    match parse(&["throttle", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
}
