use crate::config::Config;
use crate::envelope::Receipt;
use crate::tapd::TicketApi;
use std::sync::Arc;
use ticket_core::error::ForwardError;
use ticket_core::images::append_images;
use ticket_core::mapping::FieldMappings;
use ticket_core::model::{Acknowledgment, IncomingCallback, ItemType, OutboundRequest};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

const TRANSPORT_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct ForwarderSettings {
    pub api_base: String,
    pub web_base: String,
    pub default_workspace_id: Option<String>,
    pub retry_delay: Duration,
    pub embed_images: bool,
}

impl ForwarderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base: config.tapd_api_base.clone(),
            web_base: config.tapd_web_base.clone(),
            default_workspace_id: config.tapd_workspace_id.clone(),
            retry_delay: Duration::from_millis(config.tapd_retry_delay_ms),
            embed_images: config.embed_images,
        }
    }
}

#[derive(Clone)]
pub struct Forwarder {
    api: Arc<dyn TicketApi>,
    mappings: Arc<FieldMappings>,
    settings: ForwarderSettings,
}

impl Forwarder {
    pub fn new(api: Arc<dyn TicketApi>, mappings: Arc<FieldMappings>, settings: ForwarderSettings) -> Self {
        Self {
            api,
            mappings,
            settings,
        }
    }

    pub fn mappings(&self) -> &FieldMappings {
        &self.mappings
    }

    pub async fn handle(&self, callback: IncomingCallback) -> Result<Acknowledgment, ForwardError> {
        let receipt = Receipt::new();
        let request = match self.prepare(&callback) {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    request_id = %receipt.id,
                    item_type = %callback.item_type,
                    error = %error,
                    "rejected callback before forwarding"
                );
                return Err(error);
            }
        };

        let item_type = request.item_type;
        let workspace_id = request
            .fields
            .get("workspace_id")
            .cloned()
            .unwrap_or_default();

        let ticket_id = self.send_with_retry(&receipt, &request).await?;
        let ticket_url = self.ticket_url(item_type, &workspace_id, &ticket_id);
        info!(
            request_id = %receipt.id,
            item_type = %item_type,
            ticket_id = %ticket_id,
            "created tapd item"
        );

        Ok(receipt.acknowledge(item_type, ticket_id, ticket_url))
    }

    pub fn prepare(&self, callback: &IncomingCallback) -> Result<OutboundRequest, ForwardError> {
        let item_type = callback
            .item_type
            .parse::<ItemType>()
            .map_err(|_| ForwardError::UnsupportedItemType(callback.item_type.clone()))?;

        let mapping = self.mappings.for_item(item_type);
        let mut mapped = self.mappings.map_fields(item_type, &callback.fields);
        if !mapped.dropped.is_empty() {
            debug!(item_type = %item_type, dropped = ?mapped.dropped, "dropped unmapped fields");
        }

        if let Some(workspace_id) = &self.settings.default_workspace_id {
            mapped
                .fields
                .entry("workspace_id".to_string())
                .or_insert_with(|| workspace_id.clone());
        }

        if let Some(missing) = mapping.first_missing_required(&mapped.fields) {
            return Err(ForwardError::MissingRequiredField(missing.to_string()));
        }

        if !mapped.image_urls.is_empty() {
            if self.settings.embed_images {
                let description = mapped.fields.get("description").map(String::as_str);
                if let Some(description) = append_images(description, &mapped.image_urls) {
                    mapped.fields.insert("description".to_string(), description);
                }
            } else {
                debug!(item_type = %item_type, count = mapped.image_urls.len(), "image embedding disabled");
            }
        }

        Ok(OutboundRequest {
            item_type,
            url: format!("{}{}", self.settings.api_base, item_type.endpoint_path()),
            fields: mapped.fields,
        })
    }

    async fn send_with_retry(&self, receipt: &Receipt, request: &OutboundRequest) -> Result<String, ForwardError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.api.create(request).await {
                Ok(ticket_id) => return Ok(ticket_id),
                Err(error) if error.is_retryable() && attempt < TRANSPORT_ATTEMPTS => {
                    warn!(
                        request_id = %receipt.id,
                        item_type = %request.item_type,
                        attempt,
                        retry_delay_ms = self.settings.retry_delay.as_millis() as u64,
                        error = %error,
                        "tapd transport failed; retrying"
                    );
                    sleep(self.settings.retry_delay).await;
                }
                Err(error) => {
                    warn!(
                        request_id = %receipt.id,
                        item_type = %request.item_type,
                        attempt,
                        error = %error,
                        "tapd create failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    pub fn ticket_url(&self, item_type: ItemType, workspace_id: &str, ticket_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.settings.web_base,
            workspace_id,
            item_type.web_path(),
            ticket_id
        )
    }
}
