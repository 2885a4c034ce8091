//! Sessionbox CLI - manage per-session application sandboxes

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use sessionbox::cli::{Args, SubCommand};
use sessionbox::output::{CommandReport, CommandResult};
use sessionbox::{format_output, OutputFormat, Sessionbox};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let ctx = Sessionbox::new(args.settings.to_settings());
    let format = if args.json { OutputFormat::Json } else { OutputFormat::Human };

    let report = execute(&ctx, args.command).await?;
    println!("{}", format_output(&report, &format));
    Ok(())
}

async fn execute(ctx: &Sessionbox, command: SubCommand) -> anyhow::Result<CommandReport> {
    let containers = ctx.containers();
    let files = ctx.files();

    let report: CommandReport = match command {
        SubCommand::Build { session } => {
            let outcome = containers.build_image(&session).await?;
            CommandReport::from_outcome(outcome, CommandResult::Image)
        }
        SubCommand::Create { image, session } => {
            CommandResult::Created(containers.create_container(&image, &session).await?).into()
        }
        SubCommand::Start { id } => {
            CommandResult::Started(containers.start_container(&id).await?).into()
        }
        SubCommand::Stop { id } => {
            containers.stop_container(&id).await?;
            CommandResult::Stopped(id).into()
        }
        SubCommand::Delete { id } => {
            let outcome = containers.delete_container(&id).await?;
            CommandReport::from_outcome(outcome, CommandResult::Deleted)
        }
        SubCommand::List => {
            CommandReport::from_outcome(containers.list_containers().await, CommandResult::Containers)
        }
        SubCommand::Tree { container, path, content } => {
            let outcome = if content {
                files.file_content_tree(&container, path.as_deref()).await
            } else {
                files.file_tree(&container, path.as_deref()).await
            };
            CommandReport::from_outcome(outcome, CommandResult::Tree)
        }
        SubCommand::Read { container, path } => {
            CommandResult::Content(files.read_file(&container, &path).await?).into()
        }
        SubCommand::Write { container, path, content } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("Failed to read content from stdin")?;
                    buf
                }
            };
            let outcome = files.write_file(&container, &path, &content).await?;
            let path = files.resolve(&path);
            let bytes = content.len() as u64;
            CommandReport::from_outcome(outcome, |_| CommandResult::Written { path, bytes })
        }
        SubCommand::Rename { container, from, to } => {
            files.rename_file(&container, &from, &to).await?;
            CommandResult::Renamed {
                from: files.resolve(&from),
                to: files.resolve(&to),
            }
            .into()
        }
        SubCommand::Rm { container, path } => {
            files.remove_file(&container, &path).await?;
            CommandResult::Removed(files.resolve(&path)).into()
        }
    };

    Ok(report)
}
