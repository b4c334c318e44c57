use async_trait::async_trait;
use conex_config::RawConfig;
use conex_host_http::{Body, HttpRequest, Method};
use conex_template::{FieldPolicy, stringify};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use super::parse_config;
use crate::runner::{NodeRunner, RunContext, RunnerError};
use crate::schema::coerce_number;

const DEFAULT_PRICING_TABLE: &str = "Pricing Table";
const SHARE_LINK_BASE: &str = "https://app.pandadoc.com/a/#/documents";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentConfig {
  api_key: String,
  template_id: String,
  #[serde(default)]
  document_name: Option<String>,
  recipient: Recipient,
  #[serde(default)]
  line_items: Vec<LineItem>,
  #[serde(default)]
  tokens: Map<String, Value>,
  #[serde(default)]
  pricing_table_name: Option<String>,
  #[serde(default)]
  base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
  email: String,
  #[serde(default)]
  first_name: String,
  #[serde(default)]
  last_name: String,
}

/// Amounts stay untyped until templates are resolved.
#[derive(Debug, Deserialize)]
struct LineItem {
  name: String,
  #[serde(default)]
  description: String,
  price: Value,
  #[serde(default = "default_quantity")]
  quantity: Value,
  #[serde(default)]
  discount: Option<Value>,
}

fn default_quantity() -> Value {
  json!(1)
}

impl DocumentConfig {
  fn document_name(&self) -> String {
    match self.document_name.as_deref().map(str::trim) {
      Some(name) if !name.is_empty() => name.to_string(),
      _ => {
        let full_name = format!("{} {}", self.recipient.first_name, self.recipient.last_name);
        let full_name = full_name.trim();
        if full_name.is_empty() {
          format!("Quotation - {}", self.recipient.email)
        } else {
          format!("Quotation - {}", full_name)
        }
      }
    }
  }
}

fn amount(item: &LineItem, field: &str, value: &Value) -> Result<f64, RunnerError> {
  coerce_number(value).ok_or_else(|| {
    RunnerError::validation(format!(
      "line item '{}': {} must be numeric, got {}",
      item.name, field, value
    ))
  })
}

/// Builds the document-creation payload.
fn build_payload(config: &DocumentConfig, name: &str) -> Result<Value, RunnerError> {
  let mut rows = Vec::with_capacity(config.line_items.len());
  for item in &config.line_items {
    let price = amount(item, "price", &item.price)?;
    let quantity = amount(item, "quantity", &item.quantity)?;
    let discount = match &item.discount {
      None | Some(Value::Null) => 0.0,
      Some(value) => amount(item, "discount", value)?,
    };
    rows.push(json!({
      "data": {
        "Name": item.name,
        "Description": item.description,
        "Price": price,
        "QTY": quantity,
        "Discount": { "type": "percent", "value": discount },
      },
      "options": {
        "optional": false,
        "optional_selected": true,
        "qty_editable": false,
      },
    }));
  }

  let tokens: Vec<Value> = config
    .tokens
    .iter()
    .map(|(name, value)| json!({ "name": name, "value": stringify(value) }))
    .collect();

  let table_name = config
    .pricing_table_name
    .as_deref()
    .filter(|n| !n.trim().is_empty())
    .unwrap_or(DEFAULT_PRICING_TABLE);

  Ok(json!({
    "name": name,
    "template_uuid": config.template_id,
    "recipients": [{
      "email": config.recipient.email,
      "first_name": config.recipient.first_name,
      "last_name": config.recipient.last_name,
    }],
    "tokens": tokens,
    "pricing_tables": [{
      "name": table_name,
      "data_merge": true,
      "options": {},
      "sections": [{
        "title": table_name,
        "default": true,
        "rows": rows,
      }],
    }],
  }))
}

/// Creates a document from a template through the document API.
///
/// Output: `{documentId, documentName, status, shareLink}`.
#[derive(Debug, Default)]
pub struct DocumentGenerationRunner;

#[async_trait]
impl NodeRunner for DocumentGenerationRunner {
  fn validate(&self, config: &RawConfig) -> Result<(), RunnerError> {
    let config: DocumentConfig = parse_config(config)?;
    if config.api_key.trim().is_empty() {
      return Err(RunnerError::validation("apiKey is required"));
    }
    if config.template_id.trim().is_empty() {
      return Err(RunnerError::validation("templateId is required"));
    }
    if config.recipient.email.trim().is_empty() {
      return Err(RunnerError::validation("recipient.email is required"));
    }
    Ok(())
  }

  fn field_policy(&self) -> FieldPolicy {
    FieldPolicy::new(&[
      "apiKey",
      "templateId",
      "recipient.email",
      "lineItems[].price",
      "lineItems[].quantity",
      "lineItems[].discount",
      "baseUrl",
    ])
  }

  async fn run(&self, config: RawConfig, ctx: &RunContext) -> Result<Value, RunnerError> {
    let config: DocumentConfig = parse_config(&config)?;
    let api_key = config.api_key.trim();
    if api_key.is_empty() {
      return Err(RunnerError::validation("apiKey resolved to an empty value"));
    }
    if config.recipient.email.trim().is_empty() {
      return Err(RunnerError::validation("recipient.email resolved to an empty value"));
    }

    let name = config.document_name();
    let payload = build_payload(&config, &name)?;

    let base_url = config
      .base_url
      .as_deref()
      .filter(|u| !u.trim().is_empty())
      .unwrap_or(ctx.config.document_api_base_url.as_str());
    let url = format!("{}/documents", base_url.trim().trim_end_matches('/'));

    let request = HttpRequest::new(Method::POST, &url)?
      .header("Authorization", format!("API-Key {}", api_key))
      .header("User-Agent", ctx.config.user_agent.clone())
      .timeout(ctx.config.http_timeout)
      .body(Body::Json(payload));

    let response = ctx.transport.send(request).await?;
    if !response.is_success() {
      let detail: String = response.text().chars().take(200).collect();
      return Err(RunnerError::upstream(
        response.status,
        format!("document API returned {} {}: {}", response.status, response.status_text, detail),
      ));
    }

    let body = response.parsed_body();
    let document_id = body
      .get("id")
      .and_then(Value::as_str)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| RunnerError::mapping("document API response has no 'id'"))?;
    let share_link = body
      .pointer("/links/share")
      .and_then(Value::as_str)
      .map(str::to_string)
      .unwrap_or_else(|| format!("{}/{}", SHARE_LINK_BASE, document_id));

    info!(
      execution_id = %ctx.execution_id,
      node_id = %ctx.node_id,
      document_id,
      "document_created"
    );

    Ok(json!({
      "documentId": document_id,
      "documentName": body.get("name").and_then(Value::as_str).unwrap_or(name.as_str()),
      "status": body.get("status").cloned().unwrap_or(Value::Null),
      "shareLink": share_link,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runner::ErrorKind;
  use crate::runners::test_support::{Scripted, context_with, run_context};
  use conex_host_http::HttpResponse;

  fn config() -> Value {
    json!({
      "apiKey": "pd-key",
      "templateId": "tmpl-1",
      "documentName": "Quote for Acme",
      "recipient": { "email": "ana@acme.test", "firstName": "Ana", "lastName": "Ruiz" },
      "lineItems": [
        { "name": "Seats", "price": "12.5", "quantity": 4, "discount": 10 }
      ],
      "tokens": { "client": "Acme" },
      "baseUrl": "https://docs.example.com/v1/"
    })
  }

  #[tokio::test]
  async fn test_creates_document() {
    let transport = Scripted::new(vec![Ok(HttpResponse::new(201).with_json(&json!({
      "id": "doc-1",
      "name": "Quote for Acme",
      "status": "document.uploaded"
    })))]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let output = DocumentGenerationRunner.run(config(), &ctx).await.unwrap();
    assert_eq!(
      output,
      json!({
        "documentId": "doc-1",
        "documentName": "Quote for Acme",
        "status": "document.uploaded",
        "shareLink": "https://app.pandadoc.com/a/#/documents/doc-1"
      })
    );

    let sent = transport.sent();
    assert_eq!(sent[0].url.as_str(), "https://docs.example.com/v1/documents");
    assert_eq!(sent[0].get_header("authorization"), Some("API-Key pd-key"));
    let Some(Body::Json(payload)) = &sent[0].body else {
      panic!("expected a JSON body");
    };
    assert_eq!(payload["template_uuid"], json!("tmpl-1"));
    assert_eq!(payload["recipients"][0]["first_name"], json!("Ana"));
    assert_eq!(payload["tokens"], json!([{ "name": "client", "value": "Acme" }]));
    let row = &payload["pricing_tables"][0]["sections"][0]["rows"][0];
    assert_eq!(row["data"]["Price"], json!(12.5));
    assert_eq!(row["data"]["QTY"], json!(4.0));
    assert_eq!(row["data"]["Discount"], json!({ "type": "percent", "value": 10.0 }));
  }

  #[tokio::test]
  async fn test_share_link_from_response() {
    let transport = Scripted::new(vec![Ok(HttpResponse::new(201).with_json(&json!({
      "id": "doc-2",
      "status": "document.draft",
      "links": { "share": "https://share.test/doc-2" }
    })))]);
    let ctx = run_context(transport, context_with(json!({}), &[]), &[], vec![]);

    let output = DocumentGenerationRunner.run(config(), &ctx).await.unwrap();
    assert_eq!(output["shareLink"], json!("https://share.test/doc-2"));
    assert_eq!(output["documentName"], json!("Quote for Acme"));
  }

  #[tokio::test]
  async fn test_non_numeric_price_is_validation_error() {
    let transport = Scripted::new(vec![]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);
    let mut config = config();
    config["lineItems"][0]["price"] = json!("twelve");

    let err = DocumentGenerationRunner.run(config, &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(transport.sent().is_empty());
  }

  #[tokio::test]
  async fn test_rejected_key_is_upstream_4xx() {
    let transport = Scripted::new(vec![Ok(HttpResponse::new(401))]);
    let ctx = run_context(transport, context_with(json!({}), &[]), &[], vec![]);

    let err = DocumentGenerationRunner.run(config(), &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Upstream4xx);
  }

  #[test]
  fn test_default_document_name() {
    let mut raw = config();
    raw.as_object_mut().unwrap().remove("documentName");
    let config: DocumentConfig = serde_json::from_value(raw).unwrap();
    assert_eq!(config.document_name(), "Quotation - Ana Ruiz");
  }

  #[test]
  fn test_validate_requires_recipient() {
    let mut raw = config();
    raw.as_object_mut().unwrap().remove("recipient");
    assert!(DocumentGenerationRunner.validate(&raw).is_err());
    assert!(DocumentGenerationRunner.validate(&config()).is_ok());
  }
}
