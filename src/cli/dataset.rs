//! `datum dataset` subcommands.
//!
//! Each function wires one subcommand: resolve the project, pick the
//! transactional discipline the operation needs, call into the dataset
//! engine, and render the result.

use crate::cli::{confirm, prompt_line, CommandContext, DatasetCommands};
use crate::datasets;
use crate::error::Result;
use crate::output;
use crate::project::Project;
use crate::transaction::{Transaction, TransactionOptions};

pub fn run(context: CommandContext, command: DatasetCommands) -> Result<()> {
    match command {
        DatasetCommands::Ls => run_ls(context),
        DatasetCommands::Create {
            name,
            short_name,
            description,
            creators,
        } => run_create(context, name, short_name, description, creators),
        DatasetCommands::Add {
            name,
            urls,
            sources,
            destination,
            reference,
            create,
            force,
        } => run_add(context, name, urls, sources, destination, reference, create, force),
        DatasetCommands::LsFiles {
            names,
            creators,
            include,
            exclude,
        } => run_ls_files(context, names, creators, include, exclude),
        DatasetCommands::Unlink {
            name,
            include,
            exclude,
            yes,
        } => run_unlink(context, name, include, exclude, yes),
        DatasetCommands::Rm { names } => run_rm(context, names),
        DatasetCommands::Edit { name, file } => run_edit(context, name, file),
        DatasetCommands::Export {
            name,
            provider,
            publish,
            tag,
        } => run_export(context, name, provider, publish, tag),
        DatasetCommands::Import {
            uri,
            short_name,
            yes,
        } => run_import(context, uri, short_name, yes),
        DatasetCommands::Update {
            names,
            creators,
            include,
            exclude,
            reference,
            delete,
        } => run_update(context, names, creators, include, exclude, reference, delete),
        DatasetCommands::Tag {
            name,
            tag,
            description,
            force,
        } => run_tag(context, name, tag, description, force),
        DatasetCommands::LsTags { name } => run_ls_tags(context, name),
        DatasetCommands::RmTags { name, tags } => run_rm_tags(context, name, tags),
    }
}

fn open_project(context: &CommandContext) -> Result<Project> {
    Project::discover(context.repo.as_deref())
}

fn split_creators(creators: Option<String>) -> Vec<String> {
    creators
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn run_ls(context: CommandContext) -> Result<()> {
    let project = open_project(&context)?;
    let datasets = datasets::list_datasets(&project)?;
    output::emit_success(
        context.output_options(),
        "dataset ls",
        &datasets,
        &output::dataset_lines(&datasets),
    )
}

fn run_create(
    context: CommandContext,
    name: String,
    short_name: Option<String>,
    description: Option<String>,
    creators: Vec<String>,
) -> Result<()> {
    let project = open_project(&context)?;
    let creators = datasets::parse_creators(&creators)?;

    let dataset = Transaction::run(
        &project,
        TransactionOptions::metadata_only(&project),
        |project| datasets::create_dataset(project, &name, short_name, description, creators),
    )?;

    output::emit_success(
        context.output_options(),
        "dataset create",
        &dataset,
        &[format!(
            "Created dataset '{}' ({})",
            dataset.short_name, dataset.identifier
        )],
    )
}

#[allow(clippy::too_many_arguments)]
fn run_add(
    context: CommandContext,
    name: String,
    urls: Vec<String>,
    sources: Vec<String>,
    destination: Option<String>,
    reference: Option<String>,
    create: bool,
    force: bool,
) -> Result<()> {
    let project = open_project(&context)?;

    let options = TransactionOptions {
        commit_empty: false,
        raise_if_empty: true,
        ..TransactionOptions::diff()
    };
    let added = Transaction::run(&project, options, |project| {
        datasets::add_to_dataset(
            project,
            &urls,
            &name,
            datasets::AddOptions {
                sources,
                destination,
                reference,
                force,
                create,
            },
        )
    })?;

    let lines: Vec<String> = added
        .iter()
        .map(|file| format!("Added {}", file.path.display()))
        .collect();
    output::emit_success(context.output_options(), "dataset add", &added, &lines)
}

fn run_ls_files(
    context: CommandContext,
    names: Vec<String>,
    creators: Option<String>,
    include: Vec<String>,
    exclude: Vec<String>,
) -> Result<()> {
    let project = open_project(&context)?;
    let records = datasets::list_files(
        &project,
        &names,
        &split_creators(creators),
        &include,
        &exclude,
    )?;

    let lines = output::file_lines(&records);
    let files: Vec<_> = records.iter().map(|r| &r.file).collect();
    output::emit_success(context.output_options(), "dataset ls-files", &files, &lines)
}

fn run_unlink(
    context: CommandContext,
    name: String,
    include: Vec<String>,
    exclude: Vec<String>,
    yes: bool,
) -> Result<()> {
    let project = open_project(&context)?;

    let removed = Transaction::run(&project, TransactionOptions::diff(), |project| {
        datasets::unlink_files(project, &name, &include, &exclude, |records| {
            if yes {
                return Ok(true);
            }
            for record in records {
                eprintln!("  {}", record.file.path.display());
            }
            confirm(&format!(
                "Remove {} file(s) from dataset '{name}'?",
                records.len()
            ))
        })
    })?;

    let lines: Vec<String> = removed
        .iter()
        .map(|file| format!("Unlinked {}", file.path.display()))
        .collect();
    output::emit_success(context.output_options(), "dataset unlink", &removed, &lines)
}

fn run_rm(context: CommandContext, names: Vec<String>) -> Result<()> {
    let project = open_project(&context)?;

    let removed = Transaction::run(&project, TransactionOptions::diff(), |project| {
        datasets::remove_datasets(project, &names)
    })?;

    let lines: Vec<String> = removed
        .iter()
        .map(|dataset| format!("Removed dataset '{}'", dataset.short_name))
        .collect();
    output::emit_success(context.output_options(), "dataset rm", &removed, &lines)
}

fn run_edit(context: CommandContext, name: String, file: std::path::PathBuf) -> Result<()> {
    let project = open_project(&context)?;
    let document = std::fs::read_to_string(&file)?;

    let dataset = Transaction::run(
        &project,
        TransactionOptions::metadata_only(&project),
        |project| datasets::edit_dataset(project, &name, &document),
    )?;

    output::emit_success(
        context.output_options(),
        "dataset edit",
        &dataset,
        &[format!("Updated dataset '{}'", dataset.short_name)],
    )
}

fn run_export(
    context: CommandContext,
    name: String,
    provider: String,
    publish: bool,
    tag: Option<String>,
) -> Result<()> {
    let project = open_project(&context)?;

    let options = TransactionOptions {
        clean: true,
        ignore_std_streams: true,
        ..TransactionOptions::diff()
    };
    let destination = Transaction::run(&project, options, |project| {
        datasets::export_dataset(
            project,
            &name,
            &provider,
            publish,
            tag.as_deref(),
            |exporter| {
                eprintln!("An access token is required.");
                eprintln!("Create one at: {}", exporter.access_token_url());
                let token = prompt_line("Access token")?;
                Ok(if token.is_empty() { None } else { Some(token) })
            },
        )
    })?;

    output::emit_success(
        context.output_options(),
        "dataset export",
        &destination,
        &[format!("Exported to: {destination}")],
    )
}

fn run_import(
    context: CommandContext,
    uri: String,
    short_name: Option<String>,
    yes: bool,
) -> Result<()> {
    let project = open_project(&context)?;

    let dataset = Transaction::run(&project, TransactionOptions::diff(), |project| {
        datasets::import_dataset(project, &uri, short_name, |record| {
            if yes {
                return Ok(true);
            }
            if let Some(latest) = &record.latest_url {
                eprintln!("Newer version found at {latest}");
            }
            confirm("Do you wish to download this version?")
        })
    })?;

    output::emit_success(
        context.output_options(),
        "dataset import",
        &dataset,
        &[format!(
            "Imported dataset '{}' ({} file(s))",
            dataset.short_name,
            dataset.files.len()
        )],
    )
}

#[allow(clippy::too_many_arguments)]
fn run_update(
    context: CommandContext,
    names: Vec<String>,
    creators: Option<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    reference: Option<String>,
    delete: bool,
) -> Result<()> {
    let project = open_project(&context)?;

    let options = TransactionOptions {
        clean: true,
        ignore_std_streams: true,
        commit_empty: false,
        ..TransactionOptions::diff()
    };
    let outcome = Transaction::run(&project, options, |project| {
        datasets::update_datasets(
            project,
            &names,
            &split_creators(creators.clone()),
            &include,
            &exclude,
            reference.as_deref(),
            delete,
        )
    })?;

    let mut lines: Vec<String> = outcome
        .updated
        .iter()
        .map(|path| format!("Updated {}", path.display()))
        .collect();
    for path in &outcome.deleted {
        if delete {
            lines.push(format!("Deleted {}", path.display()));
        } else {
            lines.push(format!("Deleted upstream (kept locally): {}", path.display()));
        }
    }
    if !outcome.deleted.is_empty() && !delete {
        lines.push(
            "Some files were deleted upstream. Run update with `--delete` to remove them locally."
                .to_string(),
        );
    }

    #[derive(serde::Serialize)]
    struct UpdateData<'a> {
        updated: &'a [std::path::PathBuf],
        deleted: &'a [std::path::PathBuf],
    }
    output::emit_success(
        context.output_options(),
        "dataset update",
        &UpdateData {
            updated: &outcome.updated,
            deleted: &outcome.deleted,
        },
        &lines,
    )
}

fn run_tag(
    context: CommandContext,
    name: String,
    tag: String,
    description: String,
    force: bool,
) -> Result<()> {
    let project = open_project(&context)?;

    let tag = Transaction::run(&project, TransactionOptions::diff(), |project| {
        datasets::tag_dataset(project, &name, &tag, &description, None, force)
    })?;

    output::emit_success(
        context.output_options(),
        "dataset tag",
        &tag,
        &[format!("Tagged '{name}' as '{}' at {}", tag.name, tag.commit)],
    )
}

fn run_ls_tags(context: CommandContext, name: String) -> Result<()> {
    let project = open_project(&context)?;
    let tags = datasets::list_tags(&project, &name)?;
    output::emit_success(
        context.output_options(),
        "dataset ls-tags",
        &tags,
        &output::tag_lines(&tags),
    )
}

fn run_rm_tags(context: CommandContext, name: String, tags: Vec<String>) -> Result<()> {
    let project = open_project(&context)?;

    let removed = Transaction::run(&project, TransactionOptions::diff(), |project| {
        datasets::remove_tags(project, &name, &tags)
    })?;

    let lines: Vec<String> = removed
        .iter()
        .map(|tag| format!("Removed tag '{}'", tag.name))
        .collect();
    output::emit_success(context.output_options(), "dataset rm-tags", &removed, &lines)
}
