//! Command dispatch

use super::args::Command;
use anyhow::{Context, Result};
use docvault::document::{DocumentStore, ListQuery, MoveOutcome, Upload};
use docvault::metrics;
use serde_json::json;
use tokio::io::AsyncWriteExt;

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute one command against the store
pub async fn run(command: Command, store: &DocumentStore) -> Result<()> {
    match command {
        Command::Put {
            path,
            name,
            mime,
            backend,
        } => {
            let mut upload = Upload::from_path(&path, mime.as_deref())
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if let Some(name) = name {
                upload.name = name;
            }

            let mut record = match backend {
                Some(backend) => docvault::DocumentRecord::from_upload(upload, backend),
                None => store.document_from_upload(upload)?,
            };
            store.save(&mut record).await.context("Failed to store document")?;
            print_json(&serde_json::to_value(record.info())?)?;
        }

        Command::Get { id, output, refetch } => {
            let mut record = store.find_with_contents(&id).await?;
            let bytes = store.get_contents(&mut record, refetch).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(bytes).await?;
                    stdout.flush().await?;
                }
            }
        }

        Command::Info { id } => {
            let record = store.find(&id).await?;
            print_json(&serde_json::to_value(record.info())?)?;
        }

        Command::List {
            backend,
            limit,
            offset,
        } => {
            let records = store
                .list(&ListQuery {
                    backend_id: backend,
                    limit,
                    offset,
                })
                .await?;
            let infos: Vec<_> = records.iter().map(|r| r.info()).collect();
            print_json(&serde_json::to_value(infos)?)?;
        }

        Command::Move { id, backend } => {
            let mut record = store.find_with_contents(&id).await?;
            store.ensure_loaded(&mut record).await?;
            let outcome = store
                .move_to(&mut record, &backend)
                .await
                .with_context(|| format!("Failed to move document {} to '{}'", id, backend))?;
            let from = match outcome {
                MoveOutcome::Unchanged => None,
                MoveOutcome::Moved { from } => Some(from),
            };
            let moved = from.is_some();
            print_json(&json!({
                "id": id,
                "from": from,
                "to": backend,
                "moved": moved,
            }))?;
        }

        Command::Migrate {
            from,
            to,
            batch_size,
        } => {
            let report = store.migrate_backend(&from, &to, batch_size).await?;
            print_json(&serde_json::to_value(&report)?)?;
            if !report.failed.is_empty() {
                anyhow::bail!("{} documents could not be migrated", report.failed.len());
            }
        }

        Command::Delete { id } => {
            store.delete_by_id(&id).await?;
            print_json(&json!({ "id": id, "deleted": true }))?;
        }

        Command::Backends => {
            let registry = store.registry();
            let counts = store.count_by_backend().await?;
            print_json(&json!({
                "default": registry.default_backend_id()?,
                "registered": registry.backend_ids(),
                "documents": counts
                    .into_iter()
                    .map(|(backend, count)| json!({ "backend": backend, "count": count }))
                    .collect::<Vec<_>>(),
            }))?;
        }

        Command::Metrics => {
            print!("{}", metrics::render_metrics()?);
        }
    }

    Ok(())
}
