//! Domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Deployment variant
///
/// Selects both the work-resolution rule of the assignment ledger and the
/// write policy of the annotation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Any annotator may claim any unannotated image; one live row per image
    SinglePool,
    /// Admin-managed per-user queues; annotations keyed to assignments
    MultiUser,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::SinglePool => "single_pool",
            Mode::MultiUser => "multi_user",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_pool" | "single" => Ok(Mode::SinglePool),
            "multi_user" | "multi" => Ok(Mode::MultiUser),
            other => Err(Error::Config(format!("Unknown mode: {}", other))),
        }
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Annotator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Annotator => "annotator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "annotator" => Ok(Role::Annotator),
            "admin" => Ok(Role::Admin),
            other => Err(Error::InvalidPayload(format!("Unknown role: {}", other))),
        }
    }
}

/// Verified caller identity, as yielded by the access gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Capability check for admin-only operations
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "User '{}' is not an administrator",
                self.username
            )))
        }
    }
}

/// Account record (credential columns are never loaded into this struct)
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Annotatable item
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub id: String,
    pub source: String,
    pub image_path: String,
    pub image_url: Option<String>,
    /// Opaque seed metadata, never interpreted
    pub metadata: serde_json::Value,
    pub annotation_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Completed => "completed",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AssignmentStatus::Pending),
            "completed" => Ok(AssignmentStatus::Completed),
            other => Err(Error::Internal(format!("Unknown assignment status: {}", other))),
        }
    }
}

/// Unit of work binding one user to one image (multi-user mode)
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: String,
    pub user_id: String,
    pub image_id: String,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of one annotate/reject/report action
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub id: String,
    pub image_id: String,
    pub user_id: String,
    pub assignment_id: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub is_approved: Option<bool>,
    pub is_reported: bool,
    pub pass_number: i64,
    pub annotated_at: DateTime<Utc>,
}
