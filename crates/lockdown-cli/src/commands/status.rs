//! `lockdown status`: what the registry tracks and what is on disk.

use serde::Serialize;

use lockdown_core::{DocumentId, DocumentStore, Envelope, FsDocumentStore, LockdownError};

use crate::app::AppContext;
use crate::cli::StatusArgs;
use crate::helpers::document_id;
use crate::ui::{hint, print, table, Column};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDisk {
    Encrypted,
    /// An envelope that decodes but is not in canonical form.
    NeedsRepair,
    /// Marked as encrypted but nothing recoverable.
    Damaged,
    Plaintext,
    Missing,
}

impl OnDisk {
    fn as_str(&self) -> &'static str {
        match self {
            OnDisk::Encrypted => "encrypted",
            OnDisk::NeedsRepair => "needs_repair",
            OnDisk::Damaged => "damaged",
            OnDisk::Plaintext => "plaintext",
            OnDisk::Missing => "missing",
        }
    }

    pub fn classify(content: &str) -> Self {
        if !Envelope::is_envelope(content) {
            return OnDisk::Plaintext;
        }
        match Envelope::decode(content) {
            Ok(envelope) if envelope.repetition_half().is_some() => OnDisk::NeedsRepair,
            Ok(envelope) if content.trim_end() == envelope.to_string() => OnDisk::Encrypted,
            Ok(_) => OnDisk::NeedsRepair,
            Err(_) => OnDisk::Damaged,
        }
    }
}

#[derive(Debug, Serialize)]
struct DocumentStatus {
    id: String,
    on_disk: OnDisk,
}

#[derive(Debug, Serialize)]
struct ContainerStatus {
    id: String,
    documents: usize,
    encrypted: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    root: String,
    documents: Vec<DocumentStatus>,
    containers: Vec<ContainerStatus>,
}

async fn on_disk(store: &FsDocumentStore, id: &DocumentId) -> anyhow::Result<OnDisk> {
    match store.read(id).await {
        Ok(content) => Ok(OnDisk::classify(&content)),
        Err(LockdownError::NotFound(_)) => Ok(OnDisk::Missing),
        Err(e) => Err(e.into()),
    }
}

fn matches_filter(id: &str, filter: Option<&DocumentId>) -> bool {
    match filter {
        None => true,
        Some(f) => id == f.as_str() || DocumentId::new(id).is_within(f.as_str()),
    }
}

pub async fn handle_status(ctx: &AppContext<'_>, args: &StatusArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(args.json, args.format.as_deref());
    let store = ctx.store()?;
    let registry = ctx.registry(&store)?;
    let filter = match &args.path {
        Some(raw) => Some(document_id(&store, raw)?),
        None => None,
    };

    let mut documents = Vec::new();
    for id in registry.locked_documents() {
        if !matches_filter(id, filter.as_ref()) {
            continue;
        }
        let doc = DocumentId::new(id);
        documents.push(DocumentStatus {
            id: id.to_string(),
            on_disk: on_disk(&store, &doc).await?,
        });
    }

    let mut containers = Vec::new();
    for container in registry.locked_containers() {
        if !matches_filter(container, filter.as_ref()) {
            continue;
        }
        let members = if store.exists(container).await? {
            store.list(container).await?
        } else {
            Vec::new()
        };
        let mut encrypted = 0;
        for id in &members {
            if on_disk(&store, id).await? != OnDisk::Plaintext {
                encrypted += 1;
            }
        }
        containers.push(ContainerStatus {
            id: container.to_string(),
            documents: members.len(),
            encrypted,
        });
    }

    if ui.mode.is_json() {
        let report = StatusReport {
            root: store.root().display().to_string(),
            documents,
            containers,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if documents.is_empty() && containers.is_empty() {
        if !ctx.quiet() {
            print(&ui, "No locked documents");
            print(&ui, &hint(&ui, "lockdown lock <PATH>"));
        }
        return Ok(());
    }

    let mut rows: Vec<Vec<String>> = documents
        .iter()
        .map(|d| {
            vec![
                d.id.clone(),
                "document".to_string(),
                d.on_disk.as_str().to_string(),
            ]
        })
        .collect();
    rows.extend(containers.iter().map(|c| {
        vec![
            format!("{}/", c.id),
            "folder".to_string(),
            format!("{}/{} encrypted", c.encrypted, c.documents),
        ]
    }));
    print(
        &ui,
        &table(
            &ui,
            &[Column::new("PATH"), Column::new("KIND"), Column::new("STATE")],
            &rows,
        ),
    );

    if documents
        .iter()
        .any(|d| matches!(d.on_disk, OnDisk::NeedsRepair | OnDisk::Damaged))
    {
        print(&ui, &hint(&ui, "lockdown repair <PATH>"));
    } else if documents.iter().any(|d| d.on_disk == OnDisk::Missing) {
        print(&ui, &hint(&ui, "lockdown prune"));
    }
    Ok(())
}
