//! Request/response shapes for the HTTP surface (spec §6).
//!
//! `camelCase` on the wire, matching the teacher's
//! `api/handlers.rs::CreateScanRequest` convention; default-value helper
//! functions for optional fields instead of `Default` derives, same as the
//! teacher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{CreateType, Link, Status, ValidType};

fn default_with_lock() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    pub gid: String,
    #[validate(url)]
    pub original_url: String,
    pub create_type: Option<CreateType>,
    pub valid_type: Option<ValidType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub desc: Option<String>,
    pub favicon: Option<String>,
    #[serde(default = "default_with_lock")]
    pub with_lock: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkBatchRequest {
    #[validate(length(min = 1))]
    pub links: Vec<CreateLinkRequest>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLinkRequest {
    pub short_uri: String,
    pub gid: Option<String>,
    #[validate(url)]
    pub original_url: Option<String>,
    pub status: Option<Status>,
    pub valid_type: Option<ValidType>,
    pub end_date: Option<DateTime<Utc>>,
    pub desc: Option<String>,
}

fn default_page_current() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub gid: Option<String>,
    #[serde(default = "default_page_current")]
    pub current: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub id: i64,
    pub gid: String,
    pub short_uri: String,
    pub full_short_url: String,
    pub original_url: String,
    pub status: Status,
    pub create_type: CreateType,
    pub valid_type: ValidType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub favicon: Option<String>,
    pub desc: Option<String>,
}

impl LinkResponse {
    pub fn from_link(link: &Link, domain: &str, use_ssl: bool) -> Self {
        Self {
            id: link.id,
            gid: link.gid.clone(),
            short_uri: link.short_uri.clone(),
            full_short_url: link.full_short_url(domain, use_ssl),
            original_url: link.original_url.clone(),
            status: link.status,
            create_type: link.create_type,
            valid_type: link.valid_date.valid_type,
            start_date: link.valid_date.start_date,
            end_date: link.valid_date.end_date,
            favicon: link.favicon.clone(),
            desc: link.desc.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub total: i64,
    pub current: i64,
    pub size: i64,
    pub records: Vec<T>,
}
