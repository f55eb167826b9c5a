//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;
use vidgrab_core::model::Quality;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_run_defaults() {
    match parse(&["vidgrab", "run", "--items", "queue.toml"]) {
        CliCommand::Run {
            items,
            threads,
            quality,
            dir,
        } => {
            assert_eq!(items, PathBuf::from("queue.toml"));
            assert!(threads.is_none());
            assert!(quality.is_none());
            assert!(dir.is_none());
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_all_flags() {
    match parse(&[
        "vidgrab", "run", "--items", "q.toml", "--threads", "3", "--quality", "720p", "--dir",
        "/media/tv",
    ]) {
        CliCommand::Run {
            threads,
            quality,
            dir,
            ..
        } => {
            assert_eq!(threads, Some(3));
            assert_eq!(quality, Some(Quality::P720));
            assert_eq!(dir, Some(PathBuf::from("/media/tv")));
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_run_requires_items() {
    assert!(Cli::try_parse_from(["vidgrab", "run"]).is_err());
}

#[test]
fn cli_rejects_unknown_quality() {
    assert!(Cli::try_parse_from(["vidgrab", "run", "--items", "q.toml", "--quality", "4k"]).is_err());
}

#[test]
fn cli_parse_status() {
    match parse(&["vidgrab", "status"]) {
        CliCommand::Status => {}
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_remove() {
    match parse(&["vidgrab", "remove", "show-s01e01", "p1080"]) {
        CliCommand::Remove {
            slug,
            quality,
            delete_file,
        } => {
            assert_eq!(slug, "show-s01e01");
            assert_eq!(quality, Quality::P1080);
            assert!(!delete_file);
        }
        _ => panic!("expected Remove"),
    }
}

#[test]
fn cli_parse_remove_delete_file() {
    match parse(&["vidgrab", "remove", "movie", "480", "--delete-file"]) {
        CliCommand::Remove {
            quality,
            delete_file,
            ..
        } => {
            assert_eq!(quality, Quality::P480);
            assert!(delete_file);
        }
        _ => panic!("expected Remove"),
    }
}

#[test]
fn cli_parse_config() {
    match parse(&["vidgrab", "config"]) {
        CliCommand::Config => {}
        _ => panic!("expected Config"),
    }
}
