//! Folder hierarchy check tool.
//!
//! # Responsibility
//! - Open a folder document database and report hierarchy violations.
//! - Apply the reconciliation pass when `--repair` is given.
//!
//! Exit code is 0 for a clean hierarchy, 1 when issues remain unrepaired,
//! 2 for usage or storage errors.

use clap::Parser;
use notevault_core::{FolderService, SqliteFolderStore};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "notevault")]
#[command(about = "Check and repair a NoteVault folder hierarchy", long_about = None)]
struct Args {
    /// Path to the folder database
    db_path: PathBuf,

    /// Rewrite inconsistent back-references instead of only reporting them
    #[arg(long)]
    repair: bool,

    /// trace | debug | info | warn | error
    #[arg(long, default_value_t = notevault_core::default_log_level().to_string())]
    log_level: String,
}

fn run(args: Args) -> Result<bool, String> {
    notevault_core::init_stderr_logging(&args.log_level).map_err(|err| err.to_string())?;

    let store = SqliteFolderStore::open(&args.db_path).map_err(|err| err.to_string())?;
    let service = FolderService::new(store);
    let folders = service.list_folders().map_err(|err| err.to_string())?;
    println!("notevault version={}", notevault_core::core_version());
    println!("folders={}", folders.len());

    if args.repair {
        let report = service.repair_hierarchy().map_err(|err| err.to_string())?;
        for issue in &report.issues {
            println!("issue {issue:?}");
        }
        println!(
            "repaired issues={} pruned={} reparented={} cycles_broken={}",
            report.issues.len(),
            report.pruned_children,
            report.reparented.len(),
            report.cycles_broken.len()
        );
        let remaining = service.check_hierarchy().map_err(|err| err.to_string())?;
        println!("remaining_issues={}", remaining.len());
        return Ok(remaining.is_empty());
    }

    let issues = service.check_hierarchy().map_err(|err| err.to_string())?;
    for issue in &issues {
        println!("issue {issue:?}");
    }
    println!("issues={}", issues.len());
    Ok(issues.is_empty())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            // --help and --version also arrive here and are not failures.
            return if err.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::{CommandFactory, Parser};
    use std::path::Path;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_path_and_flags() {
        let args =
            Args::try_parse_from(["notevault", "vault.db", "--repair", "--log-level", "warn"])
                .unwrap();
        assert_eq!(args.db_path, Path::new("vault.db"));
        assert!(args.repair);
        assert_eq!(args.log_level, "warn");
    }

    #[test]
    fn defaults_to_report_only_with_build_log_level() {
        let args = Args::try_parse_from(["notevault", "vault.db"]).unwrap();
        assert!(!args.repair);
        assert_eq!(args.log_level, notevault_core::default_log_level());
    }

    #[test]
    fn rejects_missing_path_and_unknown_flags() {
        assert!(Args::try_parse_from(["notevault", "--repair"]).is_err());
        assert!(Args::try_parse_from(["notevault", "vault.db", "--force"]).is_err());
        assert!(Args::try_parse_from(["notevault", "a.db", "b.db"]).is_err());
    }
}
