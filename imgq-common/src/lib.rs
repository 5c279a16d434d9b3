//! # IMGQ Common Library
//!
//! Shared code for the IMGQ annotation service:
//! - Error taxonomy shared by every core operation
//! - Domain models (images, users, assignments, annotations)
//! - Database bootstrap and schema
//! - Bootstrap configuration loading
//! - Password hashing, id and timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod password;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use models::{
    Annotation, Assignment, AssignmentStatus, Identity, Image, Mode, Role, User,
};
