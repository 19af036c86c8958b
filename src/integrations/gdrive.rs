//! Google Drive backend: document sharing and a personal onboarding folder.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::DriveConfig;
use crate::error::IntegrationError;
use crate::integrations::{
    BackendMode, DispatchContext, DispatchOutput, Integration, check_status, unsupported,
};
use crate::workflow::{TaskAction, TaskCategory};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const SHARE_ROLE: &str = "reader";

/// A shareable item in the company document library.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Document {
    pub key: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

const DOCUMENTS: &[Document] = &[
    Document {
        key: "company-handbook",
        id: "doc-handbook-001",
        name: "ACME Corp Company Handbook",
        url: "https://drive.google.com/file/d/mock-handbook/view",
        kind: "document",
    },
    Document {
        key: "engineering-handbook",
        id: "doc-eng-001",
        name: "Engineering Handbook",
        url: "https://drive.google.com/file/d/mock-eng-handbook/view",
        kind: "document",
    },
    Document {
        key: "architecture-docs",
        id: "folder-arch-001",
        name: "Architecture & Design Docs",
        url: "https://drive.google.com/drive/folders/mock-arch/",
        kind: "folder",
    },
    Document {
        key: "brand-guidelines",
        id: "doc-brand-001",
        name: "Brand Guidelines & Assets",
        url: "https://drive.google.com/file/d/mock-brand/view",
        kind: "document",
    },
    Document {
        key: "hr-documents",
        id: "folder-hr-001",
        name: "HR Documents & Forms",
        url: "https://drive.google.com/drive/folders/mock-hr/",
        kind: "folder",
    },
    Document {
        key: "benefits-info",
        id: "doc-benefits-001",
        name: "Benefits & Perks Guide",
        url: "https://drive.google.com/file/d/mock-benefits/view",
        kind: "document",
    },
    Document {
        key: "onboarding-checklist",
        id: "doc-checklist-001",
        name: "Onboarding Checklist Template",
        url: "https://drive.google.com/file/d/mock-checklist/view",
        kind: "spreadsheet",
    },
    Document {
        key: "team-directory",
        id: "doc-directory-001",
        name: "Team Directory & Org Chart",
        url: "https://drive.google.com/file/d/mock-directory/view",
        kind: "spreadsheet",
    },
];

/// Every document the library knows about.
pub fn catalog() -> &'static [Document] {
    DOCUMENTS
}

pub fn find_document(key: &str) -> Option<&'static Document> {
    DOCUMENTS.iter().find(|d| d.key == key)
}

/// Resolve every key up front so an unknown key fails before anything is shared.
fn resolve_docs(keys: &[String]) -> Result<Vec<&'static Document>, IntegrationError> {
    keys.iter()
        .map(|key| find_document(key).ok_or_else(|| IntegrationError::UnknownDocument { key: key.clone() }))
        .collect()
}

pub fn personal_folder_name(ctx: &DispatchContext) -> String {
    format!("Onboarding: {} ({})", ctx.name, ctx.team)
}

fn shared_entry(doc: &Document) -> Value {
    json!({
        "doc_key": doc.key,
        "name": doc.name,
        "url": doc.url,
        "type": doc.kind,
        "permission": SHARE_ROLE,
    })
}

/// Answers every Drive action without network access.
pub struct MockDrive;

#[async_trait]
impl Integration for MockDrive {
    fn category(&self) -> TaskCategory {
        TaskCategory::Gdrive
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Mock
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        match action {
            Some(TaskAction::GdriveShareDocs) => {
                let docs = resolve_docs(&ctx.docs)?;
                tracing::info!(email = %ctx.email, docs = docs.len(), "[mock] Shared Drive documents");
                Ok(DispatchOutput::mock(
                    format!("Shared {} documents", docs.len()),
                    json!({ "shared": docs.iter().map(|d| shared_entry(d)).collect::<Vec<_>>() }),
                ))
            }
            Some(TaskAction::GdriveCreatePersonalFolder) => {
                let folder_name = personal_folder_name(ctx);
                tracing::info!(email = %ctx.email, folder = %folder_name, "[mock] Created personal folder");
                Ok(DispatchOutput::mock(
                    format!("Created folder \"{folder_name}\""),
                    json!({
                        "folder_name": folder_name,
                        "folder_id": "folder-personal-001",
                        "url": "https://drive.google.com/drive/folders/mock-personal/",
                    }),
                ))
            }
            other => Err(unsupported("gdrive", other)),
        }
    }
}

/// Drive v3 REST backend authenticated with an OAuth access token.
pub struct LiveDrive {
    client: reqwest::Client,
    config: DriveConfig,
    base_url: String,
}

impl LiveDrive {
    pub fn new(client: reqwest::Client, config: DriveConfig) -> Self {
        Self {
            client,
            config,
            base_url: DRIVE_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn grant(&self, file_id: &str, email: &str, role: &str) -> Result<(), IntegrationError> {
        let resp = self
            .client
            .post(format!("{}/files/{file_id}/permissions", self.base_url))
            .bearer_auth(self.config.access_token.expose_secret())
            .query(&[("sendNotificationEmail", "true")])
            .json(&json!({ "type": "user", "role": role, "emailAddress": email }))
            .send()
            .await?;
        check_status("gdrive", resp).await?;
        Ok(())
    }

    async fn share_docs(&self, ctx: &DispatchContext) -> Result<DispatchOutput, IntegrationError> {
        let docs = resolve_docs(&ctx.docs)?;
        for doc in &docs {
            self.grant(doc.id, &ctx.email, SHARE_ROLE).await?;
            tracing::info!(email = %ctx.email, doc = doc.key, "Shared Drive document");
        }
        Ok(DispatchOutput::live(
            format!("Shared {} documents", docs.len()),
            json!({ "shared": docs.iter().map(|d| shared_entry(d)).collect::<Vec<_>>() }),
        ))
    }

    async fn create_folder(&self, ctx: &DispatchContext) -> Result<DispatchOutput, IntegrationError> {
        let folder_name = personal_folder_name(ctx);
        let resp = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&json!({ "name": folder_name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await?;
        let data: Value = check_status("gdrive", resp).await?.json().await?;
        let folder_id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| IntegrationError::Api {
                integration: "gdrive".into(),
                reason: "folder creation returned no id".into(),
            })?
            .to_string();

        self.grant(&folder_id, &ctx.email, "writer").await?;
        Ok(DispatchOutput::live(
            format!("Created folder \"{folder_name}\""),
            json!({
                "folder_name": folder_name,
                "folder_id": folder_id,
                "url": format!("https://drive.google.com/drive/folders/{folder_id}"),
            }),
        ))
    }
}

#[async_trait]
impl Integration for LiveDrive {
    fn category(&self) -> TaskCategory {
        TaskCategory::Gdrive
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        match action {
            Some(TaskAction::GdriveShareDocs) => self.share_docs(ctx).await,
            Some(TaskAction::GdriveCreatePersonalFolder) => self.create_folder(ctx).await,
            other => Err(unsupported("gdrive", other)),
        }
    }
}
