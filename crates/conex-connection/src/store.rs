use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use conex_config::ConnectionDef;

use crate::ConnectionProvider;
use crate::error::ConnectionError;

/// Connection provider holding definitions in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnectionStore {
  connections: HashMap<String, ConnectionDef>,
}

impl InMemoryConnectionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_connections(connections: impl IntoIterator<Item = ConnectionDef>) -> Self {
    let mut store = Self::new();
    for conn in connections {
      store.insert(conn);
    }
    store
  }

  /// Load a JSON array of connection definitions.
  pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
    let path = path.as_ref();
    let load_err = |message: String| ConnectionError::Load {
      path: path.to_path_buf(),
      message,
    };

    let contents = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| load_err(e.to_string()))?;
    let connections: Vec<ConnectionDef> =
      serde_json::from_str(&contents).map_err(|e| load_err(e.to_string()))?;

    Ok(Self::from_connections(connections))
  }

  /// Insert or replace a connection.
  pub fn insert(&mut self, conn: ConnectionDef) {
    self.connections.insert(conn.id.clone(), conn);
  }

  pub fn len(&self) -> usize {
    self.connections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.connections.is_empty()
  }
}

#[async_trait]
impl ConnectionProvider for InMemoryConnectionStore {
  async fn get_connection(&self, connection_id: &str) -> Result<ConnectionDef, ConnectionError> {
    self
      .connections
      .get(connection_id)
      .cloned()
      .ok_or_else(|| ConnectionError::NotFound(connection_id.to_string()))
  }
}
