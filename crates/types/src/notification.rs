//! `NotificationRecord` (spec §3, §4.12).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::enums::NotificationType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub priority: u8,
    pub created_at: i64,
    pub last_shown_at: Option<i64>,
    pub show_count: u32,
    pub dismissed: bool,
}

/// On-disk shape of `notifications.json` (spec §6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationStoreFile {
    #[serde(default)]
    pub records: HashMap<NotificationType, NotificationRecord>,
}
