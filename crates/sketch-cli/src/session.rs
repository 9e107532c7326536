//! Session management for saving and resuming conversation threads

use serde::{Deserialize, Serialize};
use sketch_agent::Conversation;
use sketch_ai::Message;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Session entry types for JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// Session metadata
    Metadata {
        thread_id: String,
        created_at: i64,
        model: String,
    },
    /// A message in the conversation
    Message { message: Message, timestamp: i64 },
    /// Snapshot of the code state after a turn
    Fragments {
        import_fragment: String,
        body_fragment: String,
        resolved_code: String,
        image_location: Option<PathBuf>,
        timestamp: i64,
    },
}

/// Session manager persisting one conversation thread to a JSONL file
#[derive(Debug)]
pub struct SessionManager {
    thread_id: String,
    writer: BufWriter<File>,
}

impl SessionManager {
    /// Get the sessions directory
    pub fn sessions_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sketch")
            .join("sessions")
    }

    fn session_path(thread_id: &str) -> PathBuf {
        Self::sessions_dir().join(format!("{}.jsonl", thread_id))
    }

    /// Create a new session file for a thread
    pub fn new(thread_id: &str, model: &str) -> std::io::Result<Self> {
        let sessions_dir = Self::sessions_dir();
        fs::create_dir_all(&sessions_dir)?;

        let file = File::create(Self::session_path(thread_id))?;
        let mut writer = BufWriter::new(file);

        let metadata = SessionEntry::Metadata {
            thread_id: thread_id.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            model: model.to_string(),
        };
        writeln!(writer, "{}", serde_json::to_string(&metadata)?)?;
        writer.flush()?;

        Ok(Self {
            thread_id: thread_id.to_string(),
            writer,
        })
    }

    /// Load a thread's session, reconstructing its conversation state from
    /// the message log and the most recent fragments snapshot.
    pub fn load(thread_id: &str) -> std::io::Result<(Self, Conversation)> {
        let path = Self::session_path(thread_id);

        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Session not found: {}", thread_id),
            ));
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);

        let mut conversation = Conversation::default();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<SessionEntry>(&line) {
                Ok(SessionEntry::Message { message, .. }) => {
                    conversation.messages.push(message);
                }
                Ok(SessionEntry::Fragments {
                    import_fragment,
                    body_fragment,
                    resolved_code,
                    image_location,
                    ..
                }) => {
                    conversation.import_fragment = import_fragment;
                    conversation.body_fragment = body_fragment;
                    conversation.resolved_code = resolved_code;
                    conversation.image_location = image_location;
                }
                _ => {}
            }
        }

        // Open for appending
        let file = File::options().append(true).open(&path)?;
        let writer = BufWriter::new(file);

        Ok((
            Self {
                thread_id: thread_id.to_string(),
                writer,
            },
            conversation,
        ))
    }

    /// Open the thread's session if one exists, otherwise create it
    pub fn open(thread_id: &str, model: &str) -> std::io::Result<(Self, Conversation)> {
        if Self::session_path(thread_id).exists() {
            Self::load(thread_id)
        } else {
            Ok((Self::new(thread_id, model)?, Conversation::default()))
        }
    }

    /// Get the thread id
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Append a message to the session
    pub fn append_message(&mut self, message: &Message) -> std::io::Result<()> {
        let entry = SessionEntry::Message {
            message: message.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        writeln!(self.writer, "{}", serde_json::to_string(&entry)?)?;
        self.writer.flush()
    }

    /// Append a snapshot of the conversation's code state
    pub fn append_fragments(&mut self, conversation: &Conversation) -> std::io::Result<()> {
        let entry = SessionEntry::Fragments {
            import_fragment: conversation.import_fragment.clone(),
            body_fragment: conversation.body_fragment.clone(),
            resolved_code: conversation.resolved_code.clone(),
            image_location: conversation.image_location.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        writeln!(self.writer, "{}", serde_json::to_string(&entry)?)?;
        self.writer.flush()
    }

    /// List all sessions
    pub fn list_sessions() -> std::io::Result<Vec<SessionInfo>> {
        let sessions_dir = Self::sessions_dir();
        if !sessions_dir.exists() {
            return Ok(vec![]);
        }

        let mut sessions = Vec::new();

        for entry in fs::read_dir(&sessions_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                if let Some(info) = Self::read_session_info(&path) {
                    sessions.push(info);
                }
            }
        }

        // Newest first
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(sessions)
    }

    fn read_session_info(path: &PathBuf) -> Option<SessionInfo> {
        let file = File::open(path).ok()?;
        let reader = BufReader::new(file);
        let first_line = reader.lines().next()?.ok()?;

        if let Ok(SessionEntry::Metadata {
            thread_id,
            created_at,
            model,
        }) = serde_json::from_str(&first_line)
        {
            let file = File::open(path).ok()?;
            let reader = BufReader::new(file);
            let message_count = reader
                .lines()
                .map_while(Result::ok)
                .filter(|l| l.contains("\"type\":\"message\""))
                .count();

            Some(SessionInfo {
                thread_id,
                created_at,
                model,
                message_count,
            })
        } else {
            None
        }
    }
}

/// Information about a saved session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub thread_id: String,
    pub created_at: i64,
    pub model: String,
    pub message_count: usize,
}

impl SessionInfo {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
