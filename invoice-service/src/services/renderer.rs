//! Invoice document rendering.
//!
//! The assembler treats the renderer as a black box behind the
//! `DocumentRenderer` trait. The shipped implementation writes a
//! self-contained HTML invoice under a configured directory.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::fmt::Write as _;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

use crate::services::tax::TaxBucket;

/// Fully-populated view model handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDocument {
    pub number: String,
    pub date: NaiveDate,
    pub client: ClientView,
    pub lines: Vec<LineView>,
    pub tax_breakdown: Vec<TaxBucket>,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientView {
    pub name: String,
    pub address: String,
    pub locality: String,
    pub postal_code: String,
    pub region: String,
    pub tax_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineView {
    pub name: String,
    pub description: String,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Handle to a rendered document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReference {
    pub file_name: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, document: &InvoiceDocument) -> Result<DocumentReference, AppError>;
}

/// Renders invoices as `INVOICE_<number>.html` files under `output_dir`.
pub struct HtmlRenderer {
    output_dir: PathBuf,
}

impl HtmlRenderer {
    pub async fn new(output_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let output_dir = output_dir.into();
        if !output_dir.exists() {
            fs::create_dir_all(&output_dir).await.map_err(|e| {
                AppError::RendererError(anyhow::anyhow!(
                    "Failed to create document directory {}: {}",
                    output_dir.display(),
                    e
                ))
            })?;
        }
        Ok(Self { output_dir })
    }
}

#[async_trait]
impl DocumentRenderer for HtmlRenderer {
    #[instrument(skip(self, document), fields(number = %document.number))]
    async fn render(&self, document: &InvoiceDocument) -> Result<DocumentReference, AppError> {
        let file_name = format!("INVOICE_{}.html", document.number);
        let path = self.output_dir.join(&file_name);

        let html = render_html(document);
        fs::write(&path, html).await.map_err(|e| {
            AppError::RendererError(anyhow::anyhow!("Failed to write {}: {}", file_name, e))
        })?;

        info!(file = %path.display(), "Invoice document rendered");

        Ok(DocumentReference { file_name, path })
    }
}

fn render_html(document: &InvoiceDocument) -> String {
    let mut html = String::with_capacity(4096);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>Invoice {}</title>", escape(&document.number));
    html.push_str(
        "<style>\n\
         body { font-family: sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; width: 100%; margin-bottom: 1.5em; }\n\
         th, td { border: 1px solid #999; padding: 0.4em 0.6em; text-align: left; }\n\
         td.amount, th.amount { text-align: right; }\n\
         .grand-total { font-size: 1.2em; font-weight: bold; text-align: right; }\n\
         </style>\n</head>\n<body>\n",
    );

    let _ = writeln!(html, "<h1>Invoice {}</h1>", escape(&document.number));
    let _ = writeln!(html, "<p>Date: {}</p>", document.date.format("%Y-%m-%d"));

    let client = &document.client;
    html.push_str("<h2>Client</h2>\n<p>");
    let _ = write!(html, "{}", escape(&client.name));
    if !client.tax_id.is_empty() {
        let _ = write!(html, " ({})", escape(&client.tax_id));
    }
    html.push_str("<br>");
    for field in [
        &client.address,
        &client.locality,
        &client.postal_code,
        &client.region,
    ] {
        if !field.is_empty() {
            let _ = write!(html, "{}<br>", escape(field));
        }
    }
    html.push_str("</p>\n");

    html.push_str(
        "<h2>Lines</h2>\n<table>\n<tr>\
         <th>Product</th><th>Description</th>\
         <th class=\"amount\">Unit price</th><th class=\"amount\">Tax %</th>\
         <th class=\"amount\">Qty</th><th class=\"amount\">Total</th></tr>\n",
    );
    for line in &document.lines {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td>\
             <td class=\"amount\">{}</td><td class=\"amount\">{}</td>\
             <td class=\"amount\">{}</td><td class=\"amount\">{}</td></tr>",
            escape(&line.name),
            escape(&line.description),
            money(line.unit_price),
            rate(line.tax_rate),
            line.quantity,
            money(line.line_total),
        );
    }
    html.push_str("</table>\n");

    html.push_str(
        "<h2>Tax breakdown</h2>\n<table>\n<tr>\
         <th>Rate</th><th class=\"amount\">Base</th>\
         <th class=\"amount\">Tax</th><th class=\"amount\">Total</th></tr>\n",
    );
    for bucket in &document.tax_breakdown {
        let _ = writeln!(
            html,
            "<tr><td>{}%</td><td class=\"amount\">{}</td>\
             <td class=\"amount\">{}</td><td class=\"amount\">{}</td></tr>",
            rate(bucket.rate),
            money(bucket.base),
            money(bucket.tax),
            money(bucket.total),
        );
    }
    html.push_str("</table>\n");

    let _ = writeln!(
        html,
        "<p class=\"grand-total\">Total: {}</p>",
        money(document.grand_total)
    );
    html.push_str("</body>\n</html>\n");

    html
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

fn rate(value: Decimal) -> String {
    value.normalize().to_string()
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn sample_document() -> InvoiceDocument {
        InvoiceDocument {
            number: "1003".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            client: ClientView {
                name: "ACME <Holdings>".to_string(),
                address: "Main St 1".to_string(),
                locality: String::new(),
                postal_code: String::new(),
                region: String::new(),
                tax_id: "B123".to_string(),
            },
            lines: vec![LineView {
                name: "Bolt".to_string(),
                description: String::new(),
                unit_price: dec("1.21"),
                tax_rate: dec("21"),
                quantity: 10,
                line_total: dec("12.10"),
            }],
            tax_breakdown: vec![TaxBucket {
                rate: dec("21"),
                base: dec("10.00"),
                tax: dec("2.10"),
                total: dec("12.10"),
            }],
            grand_total: dec("12.10"),
        }
    }

    #[test]
    fn html_contains_totals_and_escapes_markup() {
        let html = render_html(&sample_document());

        assert!(html.contains("Invoice 1003"));
        assert!(html.contains("ACME &lt;Holdings&gt;"));
        assert!(html.contains("12.10"));
        assert!(html.contains("21%"));
        assert!(!html.contains("<Holdings>"));
    }

    #[tokio::test]
    async fn renders_to_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = HtmlRenderer::new(dir.path()).await.unwrap();

        let reference = renderer.render(&sample_document()).await.unwrap();

        assert_eq!(reference.file_name, "INVOICE_1003.html");
        let written = std::fs::read_to_string(&reference.path).unwrap();
        assert!(written.contains("Total: 12.10"));
    }
}
