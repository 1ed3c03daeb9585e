use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;

use crate::blobs::FsBlobStore;
use crate::config::Config;
use crate::credentials::Argon2Hasher;
use crate::tokens::TokenService;
use crate::{db, identity};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Identity assertion for authenticated methods.
    #[serde(default)]
    pub token: Option<String>,
}

/// Collaborators built once from `Config` and shared by every handler.
pub struct Services {
    pub tokens: TokenService,
    pub hasher: Argon2Hasher,
    pub admin_password: String,
    pub admin_name: String,
}

impl Services {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            tokens: TokenService::new(config.token_secret.as_bytes(), config.token_ttl()),
            hasher: Argon2Hasher::new()?,
            admin_password: config.admin_password.clone(),
            admin_name: config.admin_name.trim().to_string(),
        })
    }
}

pub struct Workspace {
    pub path: PathBuf,
    /// Audience for session tokens issued here.
    pub id: String,
    pub db: Connection,
    pub blobs: FsBlobStore,
}

pub struct AppState {
    pub services: Services,
    pub workspace: Option<Workspace>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            workspace: None,
        }
    }

    /// Opens (or creates) the workspace and seeds the admin account.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        let id = db::workspace_id(&conn)?;
        identity::ensure_seed_admin(
            &conn,
            &self.services.hasher,
            &self.services.admin_password,
            &self.services.admin_name,
        )?;
        let blobs = FsBlobStore::open(&path.join("attachments"))?;
        self.workspace = Some(Workspace {
            path: path.to_path_buf(),
            id,
            db: conn,
            blobs,
        });
        Ok(())
    }
}
