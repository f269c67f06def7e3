//! Purpose: Hold top-level CLI command dispatch for `lmpx`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Bytes are rendered lossily as UTF-8; engine slices never outlive their txn.
//! Invariants: Missing keys surface as `NotFound` so the exit code reflects them.

use bstr::ByteSlice;

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    env: &Environment,
    target: &DbTarget,
) -> Result<(), Error> {
    match command {
        Command::Get { key } => {
            let value = env.view(|txn| {
                let db = target.open(txn)?;
                Ok(txn.get(db, key.as_bytes())?.map(render))
            })?;
            let value = value.ok_or_else(|| {
                Error::new(ErrorKind::NotFound).with_message(format!("key not found: {key}"))
            })?;
            emit_json(json!({ "db": target.label(), "key": key, "value": value }));
            Ok(())
        }
        Command::Put {
            key,
            value,
            no_overwrite,
            append,
        } => {
            let mode = put_mode(no_overwrite, append);
            env.update(|txn| {
                let db = txn.create_db(target.name.as_deref(), target.flags)?;
                txn.put(db, key.as_bytes(), value.as_bytes(), mode)
            })
            .map_err(|err| {
                if err.kind() == ErrorKind::KeyExists {
                    err.with_message(format!("key already exists: {key}"))
                } else {
                    err
                }
            })?;
            emit_json(json!({ "db": target.label(), "key": key, "value": value }));
            Ok(())
        }
        Command::Del { key, value } => {
            let deleted = env.update(|txn| {
                let db = txn
                    .open_db(target.name.as_deref(), DbFlags::empty())
                    .map_err(|err| target.missing_db(err))?;
                txn.del(db, key.as_bytes(), value.as_deref().map(str::as_bytes))
            })?;
            if !deleted {
                return Err(
                    Error::new(ErrorKind::NotFound).with_message(format!("key not found: {key}"))
                );
            }
            emit_json(json!({ "db": target.label(), "key": key, "deleted": true }));
            Ok(())
        }
        Command::Scan { from, limit } => {
            let rows = env.view(|txn| {
                let db = target.open(txn)?;
                let mut cursor = txn.open_cursor(db)?;
                let limit = limit.unwrap_or(usize::MAX);
                let mut rows = Vec::new();
                let mut entry = match &from {
                    Some(from) => cursor.seek_range(from.as_bytes())?.map(render_entry),
                    None => cursor.first()?.map(render_entry),
                };
                while let Some(row) = entry {
                    if rows.len() >= limit {
                        break;
                    }
                    rows.push(row);
                    entry = cursor.next()?.map(render_entry);
                }
                Ok(rows)
            })?;
            for (key, value) in rows {
                emit_json_line(json!({ "key": key, "value": value }));
            }
            Ok(())
        }
        Command::Stat => {
            let (stat, dup_sort) = env.view(|txn| {
                let db = target.open(txn)?;
                Ok((txn.stat(db)?, db.allows_duplicates()))
            })?;
            let info = env.info()?;
            emit_json(json!({
                "path": env.path().display().to_string(),
                "db": target.label(),
                "dup_sort": dup_sort,
                "entries": stat.entries,
                "depth": stat.depth,
                "page_size": stat.page_size,
                "branch_pages": stat.branch_pages,
                "leaf_pages": stat.leaf_pages,
                "overflow_pages": stat.overflow_pages,
                "map_size": info.map_size,
                "last_txn_id": info.last_txn_id,
                "readers": { "used": info.num_readers, "max": info.max_readers },
            }));
            Ok(())
        }
        Command::Copy { dest, compact } => {
            if env.path().is_dir() {
                std::fs::create_dir_all(&dest).map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to create copy destination")
                        .with_path(&dest)
                        .with_source(err)
                })?;
            }
            env.copy_to(&dest, compact)?;
            emit_json(json!({
                "from": env.path().display().to_string(),
                "to": dest.display().to_string(),
                "compact": compact,
            }));
            Ok(())
        }
    }
}

fn render(bytes: &[u8]) -> String {
    bytes.to_str_lossy().into_owned()
}

fn render_entry((key, value): (&[u8], &[u8])) -> (String, String) {
    (render(key), render(value))
}
