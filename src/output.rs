//! Shared output formatting for datum CLI commands.

use serde::Serialize;

use crate::dataset::{Dataset, DatasetTag};
use crate::datasets::FileRecord;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Emit a command result: a JSON envelope or plain human lines.
pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: &[String],
) -> Result<()> {
    if options.json {
        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            command: &'a str,
            status: &'static str,
            data: &'a T,
        }

        let payload = Envelope {
            command,
            status: "success",
            data,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    for line in human {
        println!("{line}");
    }
    Ok(())
}

/// Emit an error to stderr (or a JSON envelope to stdout).
pub fn emit_error(command: &str, err: &crate::error::Error, json: bool) -> Result<()> {
    if json {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            message: String,
            code: i32,
            kind: &'a str,
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            command: &'a str,
            status: &'static str,
            error: ErrorBody<'a>,
        }

        let payload = Envelope {
            command,
            status: "error",
            error: ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: if err.is_parameter_error() {
                    "parameter_error"
                } else {
                    "usage_error"
                },
            },
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    Ok(())
}

/// Render datasets as aligned rows.
pub fn dataset_lines(datasets: &[Dataset]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<24}  {:<36}  {}",
        "SHORT NAME", "IDENTIFIER", "NAME"
    )];
    for dataset in datasets {
        lines.push(format!(
            "{:<24}  {:<36}  {}",
            dataset.short_name, dataset.identifier, dataset.name
        ));
    }
    lines
}

/// Render file records as aligned rows.
pub fn file_lines(records: &[FileRecord]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<20}  {:<24}  {}",
        "ADDED", "DATASET", "PATH"
    )];
    for record in records {
        lines.push(format!(
            "{:<20}  {:<24}  {}",
            record.file.added.format("%Y-%m-%d %H:%M:%S"),
            record.dataset,
            record.file.path.display()
        ));
    }
    lines
}

/// Render tags as aligned rows.
pub fn tag_lines(tags: &[DatasetTag]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<16}  {:<40}  {}",
        "NAME", "COMMIT", "DESCRIPTION"
    )];
    for tag in tags {
        lines.push(format!(
            "{:<16}  {:<40}  {}",
            tag.name, tag.commit, tag.description
        ));
    }
    lines
}

/// Best-effort command name for error envelopes, from raw args.
pub fn infer_command_name_from_args() -> String {
    let mut args = std::env::args().skip(1);
    let mut command = None;
    let mut subcommand = None;

    for arg in args.by_ref() {
        if arg.starts_with('-') {
            continue;
        }
        command = Some(arg);
        break;
    }

    let command = match command {
        Some(cmd) => cmd,
        None => return "datum".to_string(),
    };

    if command == "dataset" {
        for arg in args {
            if arg.starts_with('-') {
                continue;
            }
            subcommand = Some(arg);
            break;
        }
    }

    match subcommand {
        Some(sub) => format!("{command} {sub}"),
        None => command,
    }
}
