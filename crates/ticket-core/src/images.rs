use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".svg"];
const ATTACHMENT_URL_KEYS: &[&str] = &["url", "file_url", "src", "tmp_url"];
const IMAGE_MAX_WIDTH: &str = "800px";

static URL_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\n]+").expect("url separator pattern must compile"));

pub fn is_image_url(url: &str) -> bool {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }

    let path = url.split(['?', '#']).next().unwrap_or_default().to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) || path.contains("image")
}

pub fn extract_image_urls(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => URL_SEPARATORS
            .split(text)
            .map(str::trim)
            .filter(|candidate| is_image_url(candidate))
            .map(ToString::to_string)
            .collect(),
        Value::Array(items) => items.iter().flat_map(extract_image_urls).collect(),
        Value::Object(object) => ATTACHMENT_URL_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|url| is_image_url(url))
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub fn images_to_html(urls: &[String]) -> String {
    urls.iter()
        .enumerate()
        .map(|(index, url)| {
            let number = index + 1;
            format!(
                r#"<p>图片{number}:</p><img src="{}" alt="图片{number}" style="max-width: {IMAGE_MAX_WIDTH};" />"#,
                escape_attribute(url)
            )
        })
        .collect::<Vec<_>>()
        .join("<br/>")
}

pub fn append_images(description: Option<&str>, urls: &[String]) -> Option<String> {
    if urls.is_empty() {
        return description.map(ToString::to_string);
    }

    let html = images_to_html(urls);
    match description.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => Some(format!("{text}<br/><br/>{html}")),
        None => Some(html),
    }
}

fn escape_attribute(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
