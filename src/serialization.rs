//! Replica serialization: export/import between a data directory and JSON.
//!
//! An export is the `{users, bids}` document served by `GET /data`, plus a
//! `peerstore_export` envelope.  Imports accept either form, so a dump taken
//! with `curl /data` can be loaded into a data directory directly.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::store::{Namespace, ReplicaStore, Snapshot};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const EXPORT_VERSION: i64 = 1;

const ENVELOPE: &str = "peerstore_export";
const REDACTED: &str = "REDACTED";

#[derive(Default)]
pub struct ExportOptions {
    /// Keep user passwords in the output instead of `REDACTED`.
    pub include_passwords: bool,
}

#[derive(Default)]
pub struct ImportOptions {
    /// Replace both namespaces instead of merging into them.
    pub replace: bool,
}

pub struct ImportResult {
    /// Keys written per namespace.
    pub counts: BTreeMap<String, usize>,
    /// Keys left out per namespace.
    pub skipped: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
}

fn is_redacted(document: &Value) -> bool {
    document.get("password").and_then(Value::as_str) == Some(REDACTED)
}

pub fn export_snapshot(store: &ReplicaStore, opts: &ExportOptions) -> anyhow::Result<String> {
    let mut snapshot = store.snapshot()?;
    if !opts.include_passwords {
        for document in snapshot.users.values_mut() {
            if let Some(fields) = document.as_object_mut() {
                if fields.contains_key("password") {
                    fields.insert("password".to_string(), Value::String(REDACTED.to_string()));
                }
            }
        }
    }

    let mut result = Map::new();
    result.insert(
        ENVELOPE.to_string(),
        json!({
            "source": format!("peerstore/{VERSION}"),
            "version": EXPORT_VERSION,
        }),
    );
    for ns in Namespace::ALL {
        result.insert(
            ns.to_string(),
            serde_json::to_value(snapshot.namespace(ns))?,
        );
    }

    Ok(serde_json::to_string_pretty(&result)?)
}

pub fn import_snapshot(
    store: &ReplicaStore,
    json_str: &str,
    opts: &ImportOptions,
) -> anyhow::Result<ImportResult> {
    let data: Map<String, Value> = serde_json::from_str(json_str)?;

    if let Some(envelope) = data.get(ENVELOPE) {
        let version = envelope.get("version").and_then(Value::as_i64).unwrap_or(0);
        if !(1..=EXPORT_VERSION).contains(&version) {
            anyhow::bail!("unsupported export version: {version}");
        }
    }
    if !Namespace::ALL.iter().any(|ns| data.contains_key(ns.as_str())) {
        anyhow::bail!("input has neither a users nor a bids section");
    }

    let current = store.snapshot()?;
    let mut incoming = Snapshot::default();
    let mut result = ImportResult {
        counts: BTreeMap::new(),
        skipped: BTreeMap::new(),
        warnings: Vec::new(),
    };

    for ns in Namespace::ALL {
        let documents = match data.get(ns.as_str()) {
            Some(Value::Object(documents)) => documents,
            Some(_) => anyhow::bail!("section '{ns}' is not a JSON object"),
            None => continue,
        };

        let mut written = 0usize;
        let mut skipped = 0usize;
        for (key, document) in documents {
            if ns == Namespace::Users && is_redacted(document) {
                skipped += 1;
                result
                    .warnings
                    .push(format!("user '{key}' skipped: password is {REDACTED}"));
                continue;
            }
            if opts.replace || current.namespace(ns).get(key) != Some(document) {
                written += 1;
            }
            incoming.namespace_mut(ns).insert(key.clone(), document.clone());
        }
        result.counts.insert(ns.to_string(), written);
        result.skipped.insert(ns.to_string(), skipped);
    }

    if opts.replace {
        store.replace(&incoming)?;
    } else {
        store.merge(&incoming)?;
    }
    Ok(result)
}
