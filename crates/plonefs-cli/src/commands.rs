//! Command dispatch over [`PloneFs`].

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;
use tokio::sync::broadcast;

use plonefs_kernel::{
    ChangeEvent, DirEntry, FileType, FsOps, PloneFs, RenameOptions, WriteOptions,
};

use crate::Command;

pub async fn run(fs: &PloneFs, command: Command) -> Result<()> {
    let mut events = fs.subscribe();
    let mutated = execute(fs, command).await?;
    if mutated {
        // Let the last batch leave the debounce window before exiting.
        tokio::time::sleep(fs.notifier().window() * 2).await;
        log_changes(&mut events);
    }
    Ok(())
}

/// Run one command; returns true if it changed anything remotely.
async fn execute(fs: &PloneFs, command: Command) -> Result<bool> {
    match command {
        Command::Ls { path } => {
            let mut entries = fs.read_dir(&path).await?;
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            let mut out = std::io::stdout().lock();
            for entry in &entries {
                writeln!(out, "{}", format_dir_entry(entry))?;
            }
            Ok(false)
        }
        Command::Stat { path } => {
            let stat = fs.stat(&path).await?;
            println!("{}", serde_json::to_string_pretty(&stat)?);
            Ok(false)
        }
        Command::Cat { path } => {
            let data = fs.read_file(&path).await?;
            std::io::stdout().lock().write_all(&data)?;
            Ok(false)
        }
        Command::Put {
            path,
            file,
            create,
            overwrite,
        } => {
            let content = match file {
                Some(file) => std::fs::read(&file)
                    .with_context(|| format!("reading {}", file.display()))?,
                None => {
                    let mut buffer = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut buffer)
                        .context("reading stdin")?;
                    buffer
                }
            };
            fs.write_file(&path, &content, WriteOptions { create, overwrite })
                .await?;
            Ok(true)
        }
        Command::Mv {
            from,
            to,
            overwrite,
        } => {
            fs.rename(&from, &to, RenameOptions { overwrite }).await?;
            Ok(true)
        }
        Command::Cp { from, to } => {
            let copied = fs.copy(&from, &to).await?;
            println!("{copied}");
            Ok(true)
        }
        Command::Mkdir { path } => {
            fs.create_directory(&path).await?;
            Ok(true)
        }
        Command::State { path, action } => match action {
            Some(action) => {
                let state = fs.change_state(&path, action).await?;
                println!("{state}");
                Ok(true)
            }
            None => {
                match fs.workflow_state(&path).await? {
                    Some(state) => {
                        let actions: Vec<String> = state
                            .allowed_actions()
                            .iter()
                            .map(ToString::to_string)
                            .collect();
                        println!("{state} ({})", state.label());
                        println!("actions: {}", actions.join(", "));
                    }
                    None => println!("no workflow state"),
                }
                Ok(false)
            }
        },
        Command::Checkout { path } => {
            let working = fs.check_out(&path).await?;
            println!("{}", working.uri());
            Ok(true)
        }
        Command::Checkin { path, message } => {
            let original = fs.check_in(&path, &message).await?;
            println!("{original}");
            Ok(true)
        }
        Command::CancelCheckout { path } => {
            fs.cancel_check_out(&path).await?;
            Ok(true)
        }
        Command::Download { path, output } => {
            let download = fs.download(&path).await?;
            tracing::info!(
                content_type = ?download.content_type,
                language = %download.language,
                bytes = download.data.len(),
                "downloaded"
            );
            match output {
                Some(output) => write_output(&output, &download.data)?,
                None => std::io::stdout().lock().write_all(&download.data)?,
            }
            Ok(false)
        }
    }
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

fn format_dir_entry(entry: &DirEntry) -> String {
    let marker = match entry.file_type() {
        FileType::Directory => 'd',
        FileType::File => '-',
    };
    format!("{marker} {:<16} {}", entry.kind.to_string(), entry.name)
}

fn log_changes(events: &mut broadcast::Receiver<Vec<ChangeEvent>>) {
    while let Ok(batch) = events.try_recv() {
        for event in batch {
            tracing::info!(kind = %event.kind, uri = %event.uri, "changed");
        }
    }
}
