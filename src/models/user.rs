// src/models/user.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Account role. Every permission check matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Professor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Admin => "admin",
        }
    }

    /// Professors and admins may act on any student's records.
    pub fn is_staff(&self) -> bool {
        match self {
            Role::Student => false,
            Role::Professor | Role::Admin => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "professor" => Ok(Role::Professor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub role: Role,

    /// Set by an admin; unapproved accounts cannot log in.
    pub approved: bool,

    pub batch: Option<String>,
    pub section: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Insert payload handed to the store once the password is hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub approved: bool,
    pub batch: Option<String>,
    pub section: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_student_placement))]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    /// Only 'student' or 'professor' may self-register.
    #[serde(default = "default_role")]
    pub role: Role,
    #[validate(length(min = 1, max = 20))]
    pub batch: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub section: Option<String>,
    #[validate(range(min = 1, max = 6))]
    pub year: Option<i32>,
    #[validate(range(min = 1, max = 2))]
    pub semester: Option<i32>,
}

fn default_role() -> Role {
    Role::Student
}

/// Students are ranked by batch and class, so both must be known up front.
fn validate_student_placement(req: &CreateUserRequest) -> Result<(), validator::ValidationError> {
    match req.role {
        Role::Student => {
            if req.batch.is_none() || req.section.is_none() {
                return Err(validator::ValidationError::new("student_requires_batch_and_section"));
            }
            Ok(())
        }
        Role::Professor => Ok(()),
        Role::Admin => Err(validator::ValidationError::new("admin_cannot_self_register")),
    }
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Query parameters for the admin user listing.
#[derive(Debug, Deserialize)]
pub struct UserListParams {
    /// When true, only accounts awaiting approval are returned.
    #[serde(default)]
    pub pending: bool,
}
