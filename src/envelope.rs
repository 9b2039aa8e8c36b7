use chrono::{SecondsFormat, Utc};
use ticket_core::model::{Acknowledgment, ItemType};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub id: String,
    pub received_at: String,
}

impl Receipt {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            received_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn acknowledge(self, item_type: ItemType, ticket_id: String, ticket_url: String) -> Acknowledgment {
        Acknowledgment {
            request_id: self.id,
            item_type,
            ticket_id,
            ticket_url,
            received_at: self.received_at,
        }
    }
}

impl Default for Receipt {
    fn default() -> Self {
        Self::new()
    }
}
