//! Named conversation sessions, one JSON file per name.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{Message, Role};
use crate::error::{QuillError, Result};
use crate::storage::AppPaths;

/// One persisted turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A named conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub name: String,
    #[serde(default)]
    pub messages: Vec<SessionTurn>,
    /// Actual spend accumulated across the session, in USD. Read by the
    /// budget guard in cumulative mode.
    #[serde(default)]
    pub cumulative_cost: f64,
}

impl Session {
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: Vec::new(),
            cumulative_cost: 0.0,
        }
    }

    /// Prior turns as request messages, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|turn| Message {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }

    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(SessionTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Human-readable transcript for `session export --format text`.
    #[must_use]
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.messages {
            let speaker = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push_str(&format!(
                "[{}] {speaker}:\n{}\n\n",
                turn.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                turn.content
            ));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            dir: paths.sessions_dir(),
        }
    }

    /// Path for a session name, after checking the name stays inside the
    /// sessions directory.
    fn session_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(std::path::is_separator)
        {
            return Err(QuillError::InvalidSessionName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Load a session; a missing file is an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::SessionIo`] if the file exists but cannot be
    /// read or parsed. A damaged session is not silently replaced. Rejects
    /// names that would resolve outside the sessions directory.
    pub fn load(&self, name: &str) -> Result<Session> {
        let path = self.session_path(name)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Session::empty(name));
            }
            Err(err) => {
                return Err(QuillError::SessionIo {
                    name: name.to_string(),
                    message: format!("failed to read {}: {err}", path.display()),
                });
            }
        };
        serde_json::from_str(&content).map_err(|err| QuillError::SessionIo {
            name: name.to_string(),
            message: format!("session file is not valid JSON: {err}"),
        })
    }

    /// Persist a session atomically.
    pub fn save(&self, session: &Session) -> Result<()> {
        let content = serde_json::to_vec_pretty(session)?;
        let path = self.session_path(&session.name)?;
        super::write_atomic(&path, &content).map_err(|err| QuillError::SessionIo {
            name: session.name.clone(),
            message: format!("failed to write {}: {err}", path.display()),
        })
    }

    /// Names of all stored sessions, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Delete a stored session.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::SessionIo`] if the session does not exist.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.session_path(name)?;
        std::fs::remove_file(&path).map_err(|err| QuillError::SessionIo {
            name: name.to_string(),
            message: if err.kind() == std::io::ErrorKind::NotFound {
                "no such session".to_string()
            } else {
                format!("failed to delete {}: {err}", path.display())
            },
        })
    }

    /// Import a session from an exported JSON file, stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::SessionImport`] when the input is not the
    /// structured export form.
    pub fn import(&self, name: &str, content: &str) -> Result<Session> {
        let mut session: Session = serde_json::from_str(content)
            .map_err(|err| QuillError::SessionImport(format!("not a valid session export: {err}")))?;
        if session.messages.iter().any(|turn| turn.content.is_empty()) {
            return Err(QuillError::SessionImport(
                "session export contains an empty turn".to_string(),
            ));
        }
        session.name = name.to_string();
        self.save(&session)?;
        Ok(session)
    }
}
