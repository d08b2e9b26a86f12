use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Unit;
use crate::sales::{LineItem, Sale, SaleComposer, DEFAULT_CUSTOMER_NAME};
use crate::settings::{BusinessSettings, ReceiptLayout};

const DEFAULT_BUSINESS_NAME: &str = "POS System";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: f64,
    pub unit: Unit,
    pub price: f64,
    pub total: f64,
}

impl From<&LineItem> for ReceiptItem {
    fn from(line: &LineItem) -> Self {
        Self {
            name: line.item.name.clone(),
            quantity: line.quantity,
            unit: line.item.unit,
            price: line.item.price,
            total: line.total,
        }
    }
}

/// Everything a receipt needs, detached from where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptDoc {
    pub invoice_number: String,
    pub created_at: String,
    pub customer_name: String,
    pub items: Vec<ReceiptItem>,
    pub total: f64,
}

fn invoice_number(reference: &str) -> String {
    let chars: Vec<char> = reference.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("INV-{tail}")
}

fn display_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn customer_label(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_CUSTOMER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

impl ReceiptDoc {
    pub fn from_sale(sale: &Sale) -> Self {
        Self {
            invoice_number: invoice_number(&sale.id),
            created_at: display_date(&sale.date),
            customer_name: customer_label(&sale.customer_name),
            items: sale.items.iter().map(ReceiptItem::from).collect(),
            total: sale.total,
        }
    }

    /// Receipt for a cart that has not been completed yet.
    pub fn from_cart(composer: &SaleComposer, now: DateTime<Utc>) -> Self {
        let reference = composer
            .editing_sale_id()
            .map(str::to_string)
            .unwrap_or_else(|| now.timestamp_millis().to_string());
        Self {
            invoice_number: invoice_number(&reference),
            created_at: display_date(&now.to_rfc3339()),
            customer_name: customer_label(composer.customer_name()),
            items: composer.lines().iter().map(ReceiptItem::from).collect(),
            total: composer.total(),
        }
    }
}

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn qty(value: f64) -> String {
    if (value.round() - value).abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn layout_class(layout: ReceiptLayout) -> &'static str {
    match layout {
        ReceiptLayout::ModernClean => "layout-modern",
        ReceiptLayout::ProfessionalTable => "layout-table",
        ReceiptLayout::MinimalSimple => "layout-minimal",
        _ => "layout-dark",
    }
}

fn html_shell(title: &str, body_class: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
@page {{ margin: 0; size: 80mm auto; }}
@media print {{ html, body {{ height: auto !important; overflow: visible !important; }} body {{ print-color-adjust: exact; -webkit-print-color-adjust: exact; }} }}
html, body {{ margin: 0; padding: 0; }}
body {{ font-family: 'Courier New', monospace; width: 72mm; padding: 3mm; font-size: 12px; line-height: 1.5; color: #000; background: #fff; font-weight: 700; }}
.center {{ text-align: center; }}
.right {{ text-align: right; }}
.dashed-line {{ border-bottom: 1px dashed #000; margin: 1mm 0; }}
table {{ width: 100%; border-collapse: collapse; margin: 0; }}
th, td {{ padding: 2mm 1mm; vertical-align: top; font-size: 12px; }}
h2 {{ margin: 2mm 0; font-size: 16px; font-weight: 800; }}
p {{ margin: 1mm 0; }}
.logo {{ width: 80px; height: 80px; margin: 0 auto 3mm; }}
.footer-logo {{ width: 60px; height: 60px; margin: 2mm auto; }}
.payment-qr {{ width: 80px; height: 80px; margin: 2mm auto; display: block; }}
.grand-total td {{ font-size: 14px; font-weight: 800; }}
.no-break {{ page-break-inside: avoid; }}
.layout-table th, .layout-table td {{ border: 1px solid #000; }}
.layout-minimal {{ font-weight: 400; }}
.layout-minimal .logo {{ display: none; }}
.layout-minimal th, .layout-minimal td {{ padding: 1mm 0; }}
.layout-dark .header {{ background: #000; color: #fff; padding: 2mm; }}
.layout-modern .header h2 {{ letter-spacing: 1px; }}
</style>
</head>
<body class="{}">{}</body>
</html>"#,
        esc(title),
        body_class,
        body
    )
}

fn append_header(body: &mut String, settings: &BusinessSettings) {
    body.push_str("<div class=\"center header\">");
    if let Some(logo) = non_empty(&settings.logo) {
        body.push_str(&format!(
            "<img src=\"{}\" alt=\"Logo\" class=\"logo\"/>",
            esc(logo)
        ));
    }
    body.push_str(&format!(
        "<h2>{}</h2>",
        esc(non_empty(&settings.business_name).unwrap_or(DEFAULT_BUSINESS_NAME))
    ));
    if let Some(address) = non_empty(&settings.address) {
        body.push_str(&format!("<p>{}</p>", esc(address)));
    }
    let contact: Vec<&str> = [non_empty(&settings.phone), non_empty(&settings.email)]
        .into_iter()
        .flatten()
        .collect();
    if !contact.is_empty() {
        body.push_str(&format!("<p>{}</p>", esc(&contact.join(" | "))));
    }
    body.push_str("</div>");
    if let Some(header_text) = non_empty(&settings.header_text) {
        body.push_str(&format!(
            "<div class=\"center\"><p><strong>{}</strong></p></div>",
            esc(header_text)
        ));
    }
}

fn append_items(body: &mut String, doc: &ReceiptDoc) {
    body.push_str(
        "<table><tr><th>#</th><th>ITEM NAME</th><th>QTY</th><th>PRICE</th>\
         <th class=\"right\">AMOUNT</th></tr>",
    );
    for (position, item) in doc.items.iter().enumerate() {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"center\">{} {}</td>\
             <td class=\"right\">{}</td><td class=\"right\">{}</td></tr>",
            position + 1,
            esc(&item.name),
            qty(item.quantity),
            item.unit.as_str(),
            money(item.price),
            money(item.total)
        ));
    }
    body.push_str("</table>");
}

fn append_footer(body: &mut String, settings: &BusinessSettings) {
    body.push_str("<div class=\"center\">");
    body.push_str(&format!(
        "<p><strong>{}</strong></p>",
        esc(&settings.thank_you_text)
    ));
    body.push_str(&format!("<p>{}</p>", esc(&settings.visit_again_text)));
    if let Some(footer_text) = non_empty(&settings.footer_text) {
        body.push_str(&format!("<p>{}</p>", esc(footer_text)));
    }
    body.push_str("</div>");

    let footer_logo = non_empty(&settings.footer_logo);
    let payment_qr = non_empty(&settings.payment_qr);
    if footer_logo.is_none() && payment_qr.is_none() {
        return;
    }
    body.push_str("<div class=\"center\">");
    if let Some(src) = footer_logo {
        body.push_str(&format!(
            "<img src=\"{}\" alt=\"Footer Logo\" class=\"footer-logo\"/>",
            esc(src)
        ));
    }
    if let Some(src) = payment_qr {
        body.push_str(&format!(
            "<img src=\"{}\" alt=\"Payment QR\" class=\"payment-qr\"/>",
            esc(src)
        ));
    }
    if let Some(payment_text) = non_empty(&settings.payment_text) {
        body.push_str(&format!("<p>{}</p>", esc(payment_text)));
    }
    body.push_str("</div>");
}

/// Render a printable, self-contained HTML receipt.
pub fn render_html(doc: &ReceiptDoc, settings: &BusinessSettings) -> String {
    let mut body = String::from("<div class=\"no-break\">");
    append_header(&mut body, settings);
    body.push_str("<div class=\"center\"><h2>CASH SALE INVOICE</h2></div>");
    body.push_str(&format!(
        "<p><strong>Invoice No:</strong> {}</p>\
         <p><strong>Date:</strong> {}</p>\
         <p><strong>Customer:</strong> {}</p>",
        esc(&doc.invoice_number),
        esc(&doc.created_at),
        esc(&doc.customer_name)
    ));
    body.push_str("<div class=\"dashed-line\"></div>");
    append_items(&mut body, doc);
    body.push_str("<div class=\"dashed-line\"></div>");
    body.push_str(&format!(
        "<table><tr class=\"grand-total\"><td><strong>TOTAL AMOUNT:</strong></td>\
         <td class=\"right\"><strong>{} {}</strong></td></tr></table>",
        esc(settings.currency_label()),
        money(doc.total)
    ));
    body.push_str("<div class=\"dashed-line\"></div>");
    append_footer(&mut body, settings);
    body.push_str("</div>");
    html_shell("Receipt", layout_class(settings.receipt_layout), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Item;

    fn milk_line(quantity: f64) -> LineItem {
        LineItem {
            item: Item {
                id: "1".to_string(),
                name: "Milk".to_string(),
                price: 2.5,
                category: "Dairy".to_string(),
                unit: Unit::Liter,
                index: 1,
            },
            quantity,
            total: 2.5 * quantity,
        }
    }

    fn sale() -> Sale {
        Sale {
            id: "1700000001234".to_string(),
            customer_name: "Ayesha".to_string(),
            items: vec![milk_line(2.0)],
            total: 5.0,
            date: "2023-11-14T22:13:20+00:00".to_string(),
        }
    }

    #[test]
    fn test_renders_header_items_and_total() {
        let settings = BusinessSettings {
            business_name: "Corner Mart".to_string(),
            address: "12 Mall Road".to_string(),
            phone: "0300-1234567".to_string(),
            email: "hi@corner.example".to_string(),
            ..BusinessSettings::default()
        };
        let html = render_html(&ReceiptDoc::from_sale(&sale()), &settings);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("@page"));
        assert!(html.contains("<h2>Corner Mart</h2>"));
        assert!(html.contains("0300-1234567 | hi@corner.example"));
        assert!(html.contains("INV-1234"));
        assert!(html.contains("14/11/2023 22:13:20"));
        assert!(html.contains("Ayesha"));
        assert!(html.contains("<td>1</td><td>Milk</td>"));
        assert!(html.contains("2 liter"));
        assert!(html.contains("PKR 5.00"));
        assert!(html.contains("Thank you for your business!"));
        assert!(!html.contains("Payment QR"));
        assert!(!html.contains("alt=\"Logo\""));
    }

    #[test]
    fn test_defaults_and_escaping() {
        let mut sale = sale();
        sale.customer_name = "<script>".to_string();
        let html = render_html(&ReceiptDoc::from_sale(&sale), &BusinessSettings::default());
        assert!(html.contains("<h2>POS System</h2>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_footer_assets_render_when_present() {
        let settings = BusinessSettings {
            logo: "data:image/png;base64,AAA=".to_string(),
            payment_qr: "data:image/png;base64,QQQ=".to_string(),
            payment_text: "Scan to pay".to_string(),
            footer_text: "No returns after 7 days".to_string(),
            currency: "USD".to_string(),
            ..BusinessSettings::default()
        };
        let html = render_html(&ReceiptDoc::from_sale(&sale()), &settings);
        assert!(html.contains("alt=\"Logo\""));
        assert!(html.contains("alt=\"Payment QR\""));
        assert!(html.contains("Scan to pay"));
        assert!(html.contains("No returns after 7 days"));
        assert!(!html.contains("Footer Logo"));
        assert!(html.contains("USD 5.00"));
    }

    #[test]
    fn test_layout_selects_stylesheet_variant() {
        let doc = ReceiptDoc::from_sale(&sale());
        let render = |layout| {
            render_html(
                &doc,
                &BusinessSettings {
                    receipt_layout: layout,
                    ..BusinessSettings::default()
                },
            )
        };
        assert!(render(ReceiptLayout::ProfessionalTable).contains("<body class=\"layout-table\">"));
        assert!(render(ReceiptLayout::MinimalSimple).contains("<body class=\"layout-minimal\">"));
        assert!(render(ReceiptLayout::LuxuryGold).contains("<body class=\"layout-dark\">"));
    }

    #[test]
    fn test_cart_receipt_uses_live_totals() {
        let mut composer = SaleComposer::new();
        composer.add_item(&milk_line(1.0).item, 1.5).unwrap();
        let now = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let doc = ReceiptDoc::from_cart(&composer, now);
        assert_eq!(doc.customer_name, DEFAULT_CUSTOMER_NAME);
        assert_eq!(doc.total, 3.75);
        assert_eq!(doc.items[0].quantity, 1.5);
        let html = render_html(&doc, &BusinessSettings::default());
        assert!(html.contains("1.50 liter"));
        assert!(html.contains("PKR 3.75"));
    }

    #[test]
    fn test_short_ids_keep_whole_reference() {
        assert_eq!(invoice_number("42"), "INV-42");
        assert_eq!(invoice_number("1700000009876"), "INV-9876");
    }
}
