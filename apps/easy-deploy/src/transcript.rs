//! Ordered, classified record of what the executor said during a session.

use deploy_proto::InboundEvent;
use time::OffsetDateTime;

use crate::build::markers::{BUILD_PUSH_SUCCESS, CLONE_SUCCESS, DOCKERFILE_SUCCESS};

pub const CONNECTION_ESTABLISHED: &str = "connection established";
pub const LOGIN_SUCCESS: &str = "login success";
/// Status polling noise from the console executor. Never stored.
pub const RESOURCE_STATUS_RUNNING: &str = "resource_status_running";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    ConnectionEstablished,
    CloneComplete,
    DockerfileComplete,
    BuildComplete,
    LoginComplete,
    BuildLog,
    Info,
    Error,
    /// The frame could not be decoded at all.
    Malformed,
}

impl Tag {
    pub fn label(self) -> &'static str {
        match self {
            Tag::ConnectionEstablished => "connected",
            Tag::CloneComplete => "cloned",
            Tag::DockerfileComplete => "dockerfile",
            Tag::BuildComplete => "built",
            Tag::LoginComplete => "login",
            Tag::BuildLog => "log",
            Tag::Info => "info",
            Tag::Error => "error",
            Tag::Malformed => "malformed",
        }
    }
}

// Checked in order; the first contained marker decides the tag.
const TAGGED_MARKERS: [(&str, Tag); 5] = [
    (CLONE_SUCCESS, Tag::CloneComplete),
    (DOCKERFILE_SUCCESS, Tag::DockerfileComplete),
    (BUILD_PUSH_SUCCESS, Tag::BuildComplete),
    (LOGIN_SUCCESS, Tag::LoginComplete),
    (CONNECTION_ESTABLISHED, Tag::ConnectionEstablished),
];

/// Tags an inbound event, or `None` when it must not be stored.
pub fn classify(event: &InboundEvent) -> Option<Tag> {
    let message = event.message.as_str();
    if message.contains(RESOURCE_STATUS_RUNNING) {
        return None;
    }
    if !event.success {
        return Some(Tag::Error);
    }
    if let Some((_, tag)) = TAGGED_MARKERS
        .iter()
        .find(|(marker, _)| message.contains(marker))
    {
        return Some(*tag);
    }
    if message.starts_with('#') {
        return Some(Tag::BuildLog);
    }
    Some(Tag::Info)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub message: String,
    pub tag: Tag,
    /// Command output carried in `data.result`, when present.
    pub detail: Option<String>,
    pub at: OffsetDateTime,
}

impl Entry {
    pub fn clock(&self) -> String {
        let time = self.at.time();
        format!(
            "{:02}:{:02}:{:02}",
            time.hour(),
            time.minute(),
            time.second()
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decoded event. Returns the stored entry, or `None` when the
    /// event was suppressed.
    pub fn record(&mut self, event: &InboundEvent) -> Option<&Entry> {
        let tag = classify(event)?;
        self.push(
            event.message.clone(),
            tag,
            event.result().map(str::to_owned),
        );
        self.entries.last()
    }

    pub fn record_malformed(&mut self, raw: &str, reason: &str) -> Option<&Entry> {
        self.push(raw.to_owned(), Tag::Malformed, Some(reason.to_owned()));
        self.entries.last()
    }

    pub fn push(&mut self, message: String, tag: Tag, detail: Option<String>) {
        self.entries.push(Entry {
            message,
            tag,
            detail,
            at: OffsetDateTime::now_utc(),
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
