use crate::images::extract_image_urls;
use crate::model::ItemType;
use crate::values::{clean_date_value, clean_value, is_date_field};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

pub const CUSTOM_FIELD_PREFIXES: &[&str] = &["cus_", "custom_field_", "custom_plan_field_"];

const IMAGES_TARGET: &str = "_images";
const WORKITEM_CATEGORY_TARGET: &str = "_workitem_category";

const STORY_FIELDS: &[&str] = &[
    "workspace_id",
    "name",
    "priority",
    "priority_label",
    "business_value",
    "version",
    "module",
    "test_focus",
    "size",
    "owner",
    "cc",
    "creator",
    "developer",
    "begin",
    "due",
    "iteration_id",
    "templated_id",
    "parent_id",
    "effort",
    "effort_completed",
    "remain",
    "exceed",
    "category_id",
    "workitem_type_id",
    "release_id",
    "source",
    "description",
    "label",
    "feature",
    "tech_risk",
];

const BUG_FIELDS: &[&str] = &[
    "workspace_id",
    "title",
    "description",
    "priority",
    "priority_label",
    "severity",
    "module",
    "feature",
    "release_id",
    "version_report",
    "version_test",
    "version_fix",
    "version_close",
    "baseline_find",
    "baseline_join",
    "baseline_test",
    "baseline_close",
    "current_owner",
    "cc",
    "reporter",
    "participator",
    "te",
    "de",
    "auditer",
    "confirmer",
    "fixer",
    "closer",
    "lastmodify",
    "in_progress_time",
    "resolved",
    "verify_time",
    "reject_time",
    "reopen_time",
    "audit_time",
    "suspend_time",
    "due",
    "begin",
    "deadline",
    "os",
    "platform",
    "testmode",
    "testphase",
    "testtype",
    "source",
    "bugtype",
    "frequency",
    "originphase",
    "sourcephase",
    "resolution",
    "estimate",
    "effort",
    "iteration_id",
    "label",
];

const STORY_ALIASES: &[(&str, &str)] = &[
    ("标题", "name"),
    ("名称", "name"),
    ("需求名称", "name"),
    ("描述", "description"),
    ("详细描述", "description"),
    ("处理人", "owner"),
    ("负责人", "owner"),
    ("创建人", "creator"),
    ("抄送人", "cc"),
    ("优先级", "priority_label"),
    ("标签", "label"),
    ("标签类型", WORKITEM_CATEGORY_TARGET),
    ("需求类别", WORKITEM_CATEGORY_TARGET),
    ("迭代", "iteration_id"),
    ("版本", "version"),
    ("模块", "module"),
    ("预计开始", "begin"),
    ("预计结束", "due"),
    ("图片", IMAGES_TARGET),
    ("截图", IMAGES_TARGET),
    ("附件图片", IMAGES_TARGET),
];

const BUG_ALIASES: &[(&str, &str)] = &[
    ("标题", "title"),
    ("缺陷标题", "title"),
    ("描述", "description"),
    ("详细描述", "description"),
    ("处理人", "current_owner"),
    ("负责人", "current_owner"),
    ("当前处理人", "current_owner"),
    ("创建人", "reporter"),
    ("报告人", "reporter"),
    ("抄送人", "cc"),
    ("优先级", "priority_label"),
    ("严重程度", "severity"),
    ("标签", "label"),
    ("迭代", "iteration_id"),
    ("版本", "version_report"),
    ("发现版本", "version_report"),
    ("模块", "module"),
    ("预计开始", "begin"),
    ("预计结束", "due"),
    ("图片", IMAGES_TARGET),
    ("截图", IMAGES_TARGET),
    ("附件图片", IMAGES_TARGET),
];

const PRIORITY_VALUES: &[(&str, &str)] = &[
    ("紧急", "urgent"),
    ("高", "high"),
    ("中", "middle"),
    ("低", "low"),
    ("无关紧要", "insignificant"),
    ("1", "urgent"),
    ("2", "high"),
    ("3", "middle"),
    ("4", "low"),
];

const SEVERITY_VALUES: &[(&str, &str)] = &[
    ("致命", "fatal"),
    ("严重", "serious"),
    ("一般", "general"),
    ("提示", "prompt"),
    ("建议", "advice"),
];

pub fn is_custom_field(name: &str) -> bool {
    CUSTOM_FIELD_PREFIXES
        .iter()
        .any(|prefix| name.len() > prefix.len() && name.starts_with(prefix))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MappingOverrides {
    #[serde(default)]
    pub workitem_types: BTreeMap<String, String>,
    #[serde(default)]
    pub story_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub bug_aliases: BTreeMap<String, String>,
}

impl MappingOverrides {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("parse mapping overrides")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read mapping file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("load {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct FieldMapping {
    item_type: ItemType,
    native: HashSet<&'static str>,
    aliases: HashMap<String, String>,
    required: [&'static str; 2],
}

impl FieldMapping {
    fn builtin(item_type: ItemType) -> Self {
        let (native, aliases) = match item_type {
            ItemType::Story => (STORY_FIELDS, STORY_ALIASES),
            ItemType::Bug => (BUG_FIELDS, BUG_ALIASES),
        };

        Self {
            item_type,
            native: native.iter().copied().collect(),
            aliases: aliases
                .iter()
                .map(|(alias, target)| ((*alias).to_string(), (*target).to_string()))
                .collect(),
            required: ["workspace_id", item_type.title_field()],
        }
    }

    fn add_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        let alias = alias.trim();
        let target = target.trim();
        if alias.is_empty() {
            return Err(anyhow!("{} alias cannot be empty", self.item_type));
        }

        let special_allowed = target == IMAGES_TARGET
            || (target == WORKITEM_CATEGORY_TARGET && self.item_type == ItemType::Story);
        if !special_allowed && !self.is_recognized(target) {
            return Err(anyhow!(
                "{} alias {alias} targets unknown TAPD field {target}",
                self.item_type
            ));
        }

        self.aliases.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    pub fn is_recognized(&self, name: &str) -> bool {
        self.native.contains(name) || is_custom_field(name)
    }

    pub fn first_missing_required(&self, fields: &BTreeMap<String, String>) -> Option<&'static str> {
        self.required.iter().copied().find(|name| {
            fields
                .get(*name)
                .is_none_or(|value| value.trim().is_empty())
        })
    }

    fn resolve(&self, source_name: &str) -> Option<Resolved> {
        let name = source_name.trim();
        if is_custom_field(name) {
            return Some(Resolved::Field { name: name.to_string(), from_alias: false });
        }

        if self.native.contains(name) {
            return Some(Resolved::Field { name: name.to_string(), from_alias: false });
        }

        match self.aliases.get(name).map(String::as_str) {
            Some(IMAGES_TARGET) => Some(Resolved::Images),
            Some(WORKITEM_CATEGORY_TARGET) => Some(Resolved::WorkitemCategory),
            Some(target) => Some(Resolved::Field { name: target.to_string(), from_alias: true }),
            None => None,
        }
    }
}

enum Resolved {
    Field { name: String, from_alias: bool },
    Images,
    WorkitemCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedFields {
    pub fields: BTreeMap<String, String>,
    pub image_urls: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FieldMappings {
    story: FieldMapping,
    bug: FieldMapping,
    workitem_types: BTreeMap<String, String>,
}

impl Default for FieldMappings {
    fn default() -> Self {
        Self {
            story: FieldMapping::builtin(ItemType::Story),
            bug: FieldMapping::builtin(ItemType::Bug),
            workitem_types: BTreeMap::new(),
        }
    }
}

impl FieldMappings {
    pub fn with_overrides(overrides: MappingOverrides) -> Result<Self> {
        let mut mappings = Self::default();
        for (alias, target) in &overrides.story_aliases {
            mappings.story.add_alias(alias, target)?;
        }
        for (alias, target) in &overrides.bug_aliases {
            mappings.bug.add_alias(alias, target)?;
        }
        mappings.workitem_types = overrides
            .workitem_types
            .into_iter()
            .map(|(label, id)| (label.trim().to_string(), id.trim().to_string()))
            .filter(|(label, id)| !label.is_empty() && !id.is_empty())
            .collect();
        Ok(mappings)
    }

    pub fn for_item(&self, item_type: ItemType) -> &FieldMapping {
        match item_type {
            ItemType::Story => &self.story,
            ItemType::Bug => &self.bug,
        }
    }

    pub fn workitem_types(&self) -> &BTreeMap<String, String> {
        &self.workitem_types
    }

    /// Exact label first, then its upper-case spelling.
    pub fn workitem_type_id(&self, label: &str) -> Option<&str> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        self.workitem_types
            .get(label)
            .or_else(|| self.workitem_types.get(&label.to_uppercase()))
            .map(String::as_str)
    }

    pub fn map_fields(&self, item_type: ItemType, record: &Map<String, Value>) -> MappedFields {
        let mapping = self.for_item(item_type);
        let mut mapped = MappedFields::default();
        let mut category_labels = Vec::new();

        for (source_name, value) in record {
            let Some(resolved) = mapping.resolve(source_name) else {
                mapped.dropped.push(source_name.clone());
                continue;
            };

            match resolved {
                Resolved::Images => mapped.image_urls.extend(extract_image_urls(value)),
                Resolved::WorkitemCategory => {
                    if let Some(label) = clean_value(value) {
                        category_labels.push(label);
                    }
                }
                Resolved::Field { name, from_alias } => {
                    let Some(cleaned) = convert_value(&name, value) else {
                        continue;
                    };
                    if from_alias && mapped.fields.contains_key(&name) {
                        continue;
                    }
                    mapped.fields.insert(name, cleaned);
                }
            }
        }

        for label in category_labels {
            if let Some(type_id) = self.workitem_type_id(&label) {
                mapped
                    .fields
                    .entry("workitem_type_id".to_string())
                    .or_insert_with(|| type_id.to_string());
            }
            mapped.fields.entry("label".to_string()).or_insert(label);
        }

        mapped
    }
}

fn convert_value(field: &str, value: &Value) -> Option<String> {
    match field {
        "priority" | "priority_label" => clean_value(value).map(|raw| translate(PRIORITY_VALUES, raw)),
        "severity" => clean_value(value).map(|raw| translate(SEVERITY_VALUES, raw)),
        _ if is_date_field(field) => clean_date_value(value),
        _ => clean_value(value),
    }
}

fn translate(table: &[(&str, &str)], raw: String) -> String {
    table
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or(raw)
}
