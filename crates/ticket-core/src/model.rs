use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Story,
    Bug,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Story => "story",
            ItemType::Bug => "bug",
        }
    }

    pub fn endpoint_path(self) -> &'static str {
        match self {
            ItemType::Story => "/stories",
            ItemType::Bug => "/bugs",
        }
    }

    pub fn entity_key(self) -> &'static str {
        match self {
            ItemType::Story => "Story",
            ItemType::Bug => "Bug",
        }
    }

    pub fn title_field(self) -> &'static str {
        match self {
            ItemType::Story => "name",
            ItemType::Bug => "title",
        }
    }

    pub fn web_path(self) -> &'static str {
        match self {
            ItemType::Story => "prong/stories/view",
            ItemType::Bug => "bugtrace/bugs/view",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "story" | "需求" | "需求单" | "requirement" => Ok(ItemType::Story),
            "bug" | "缺陷" | "缺陷单" | "defect" => Ok(ItemType::Bug),
            _ => Err("unsupported item type"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingCallback {
    pub item_type: String,
    pub fields: Map<String, Value>,
}

impl IncomingCallback {
    pub fn new(item_type: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            item_type: item_type.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub item_type: ItemType,
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub request_id: String,
    pub item_type: ItemType,
    pub ticket_id: String,
    pub ticket_url: String,
    pub received_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_english_and_chinese_markers() {
        assert_eq!("story".parse::<ItemType>(), Ok(ItemType::Story));
        assert_eq!(" Story ".parse::<ItemType>(), Ok(ItemType::Story));
        assert_eq!("需求单".parse::<ItemType>(), Ok(ItemType::Story));
        assert_eq!("requirement".parse::<ItemType>(), Ok(ItemType::Story));
        assert_eq!("BUG".parse::<ItemType>(), Ok(ItemType::Bug));
        assert_eq!("缺陷".parse::<ItemType>(), Ok(ItemType::Bug));
        assert_eq!("defect".parse::<ItemType>(), Ok(ItemType::Bug));
    }

    #[test]
    fn rejects_tasks_and_unknown_markers() {
        assert!("task".parse::<ItemType>().is_err());
        assert!("任务".parse::<ItemType>().is_err());
        assert!("".parse::<ItemType>().is_err());
    }

    #[test]
    fn item_type_routes_to_tapd_endpoints() {
        assert_eq!(ItemType::Story.endpoint_path(), "/stories");
        assert_eq!(ItemType::Bug.endpoint_path(), "/bugs");
        assert_eq!(ItemType::Story.title_field(), "name");
        assert_eq!(ItemType::Bug.title_field(), "title");
    }
}
