use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One JSON line from the caller. `params` defaults to null so methods
/// without arguments stay one-liners.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state: the selected workspace and its open database. Both stay
/// empty until workspace.select succeeds.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
