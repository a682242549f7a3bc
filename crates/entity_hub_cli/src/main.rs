//! Command-line smoke tool for the entity hub.
//!
//! # Responsibility
//! - Open a SQLite reference store and drive an `EntityHub` against it.
//! - Print the hydrated hierarchy in a stable, greppable layout.

use clap::{Parser, Subcommand};
use entity_hub_core::{
    core_version, init_logging, open_db, slugify_name, EntityHub, EntityServer, EntityType,
    HubConfig, LoggingConfig, NewFolder, NewTask, ProjectRecord, SqliteEntityServer,
    TypeDescriptor,
};
use log::info;
use serde_json::Map;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "entity_hub_cli", about = "Inspect an entity store through the hub", version)]
struct Cli {
    /// SQLite store file
    #[arg(long)]
    db: PathBuf,

    /// Absolute directory for rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the project hierarchy
    Tree {
        project: String,
        /// Hide published-content markers
        #[arg(long)]
        plain: bool,
    },
    /// Create a small demo project through a hub commit
    SeedDemo { project: String },
    /// Print the crate version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = &cli.log_dir {
        init_logging(&LoggingConfig::new(log_dir).with_level(cli.log_level.as_str()))?;
    }

    match cli.command {
        Command::Version => {
            println!("entity_hub_core version={}", core_version());
            Ok(())
        }
        Command::Tree { project, plain } => {
            let conn = open_db(&cli.db)?;
            let server = SqliteEntityServer::try_new(&conn)?;
            print_tree(EntityHub::new(HubConfig::new(project), server), !plain)
        }
        Command::SeedDemo { project } => {
            let conn = open_db(&cli.db)?;
            let server = SqliteEntityServer::try_new(&conn)?;
            seed_demo(&server, &project)?;
            info!("event=cli_seed module=cli status=ok project={project}");
            print_tree(EntityHub::new(HubConfig::new(project), server), true)
        }
    }
}

fn print_tree<S: EntityServer>(
    mut hub: EntityHub<S>,
    show_markers: bool,
) -> Result<(), Box<dyn Error>> {
    hub.query_entities_from_server()?;
    let project_id = hub.project()?.id().to_string();

    let mut stack = vec![(project_id, 0usize)];
    while let Some((entity_id, depth)) = stack.pop() {
        let immutable = show_markers && hub.immutable_for_hierarchy(&entity_id)?;
        let Some(entity) = hub.get_entity_by_id(&entity_id) else {
            continue;
        };
        println!(
            "{indent}{kind} {name} id={id}{marker}",
            indent = "  ".repeat(depth),
            kind = entity.entity_type(),
            name = entity.name().unwrap_or("<unnamed>"),
            id = entity.id(),
            marker = if immutable { " [immutable]" } else { "" },
        );

        let mut children = hub
            .get_entity_children(&entity_id, true)?
            .known()
            .unwrap_or_default();
        // Reverse name order so the stack pops siblings alphabetically.
        let name_of = |id: &str| hub.get_entity_by_id(id).and_then(|entity| entity.name());
        children.sort_by(|left, right| name_of(right).cmp(&name_of(left)));
        stack.extend(children.into_iter().map(|child_id| (child_id, depth + 1)));
    }
    Ok(())
}

fn seed_demo(server: &SqliteEntityServer<'_>, project: &str) -> Result<(), Box<dyn Error>> {
    if server.get_project(project)?.is_none() {
        server.insert_project(&ProjectRecord {
            name: project.to_string(),
            code: slugify_name(project, "_"),
            library: false,
            folder_types: vec![TypeDescriptor::new("Sequence"), TypeDescriptor::new("Shot")],
            task_types: vec![TypeDescriptor::new("Compositing"), TypeDescriptor::new("Tracking")],
            own_attrib: Map::new(),
            data: None,
            active: true,
        })?;
        server.set_attribute_schema(EntityType::Folder, &["fps", "frameStart", "frameEnd"])?;
        server.set_attribute_schema(EntityType::Task, &["fps"])?;
    }

    let mut hub = EntityHub::new(HubConfig::new(project), server);
    hub.query_entities_from_server()?;
    let sequence_id = hub.add_new_folder(NewFolder::new("seq01", "Sequence", project))?;
    let shot_id = hub.add_new_folder(NewFolder::new("sh010", "Shot", sequence_id.as_str()))?;
    if let Some(shot) = hub.get_entity_by_id_mut(&shot_id) {
        shot.attribs_mut().set("fps", 25)?;
    }
    hub.add_new_task(NewTask::new("comp", "Compositing", shot_id.as_str()))?;
    hub.add_new_task(NewTask::new("track", "Tracking", shot_id.as_str()))?;
    let summary = hub.commit_changes()?;
    println!("seeded created={} updated={}", summary.created, summary.updated);
    Ok(())
}
