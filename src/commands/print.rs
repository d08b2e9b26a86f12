use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::payload_arg0_as_string;
use crate::receipt_renderer::{render_html, ReceiptDoc};
use crate::{db, print, sales, settings, AppState};

fn parse_sale_id_payload(arg0: Option<Value>) -> Result<String, String> {
    payload_arg0_as_string(arg0, &["saleId", "sale_id", "id"]).ok_or("Missing saleId".into())
}

fn render_for_sale(state: &AppState, sale_id: &str) -> Result<(ReceiptDoc, String), String> {
    let sale = sales::find_sale(&state.db, sale_id).map_err(|e| e.to_string())?;
    let profile = settings::get_settings(&state.db).map_err(|e| e.to_string())?;
    let doc = ReceiptDoc::from_sale(&sale);
    let html = render_html(&doc, &profile);
    Ok((doc, html))
}

fn render_for_cart(state: &AppState) -> Result<(ReceiptDoc, String), String> {
    let doc = {
        let composer = state.composer.lock().map_err(|e| e.to_string())?;
        if composer.is_empty() {
            return Err("Sale has no items".into());
        }
        ReceiptDoc::from_cart(&composer, Utc::now())
    };
    let profile = settings::get_settings(&state.db).map_err(|e| e.to_string())?;
    let html = render_html(&doc, &profile);
    Ok((doc, html))
}

pub fn receipt_render_sale(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let sale_id = parse_sale_id_payload(arg0)?;
    let (doc, html) = render_for_sale(state, &sale_id)?;
    Ok(json!({ "invoiceNumber": doc.invoice_number, "html": html }))
}

pub fn receipt_render_current(state: &AppState) -> Result<Value, String> {
    let (doc, html) = render_for_cart(state)?;
    Ok(json!({ "invoiceNumber": doc.invoice_number, "html": html }))
}

/// Print and record the attempt. A failed print is reported in the result,
/// never as a command error.
async fn print_and_record(state: &AppState, doc: &ReceiptDoc, html: &str) -> Value {
    let outcome = print::print_document(state.printer.as_ref(), html, state.print_timing).await;

    let attempt_id = outcome
        .document_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    match state.db.conn.lock() {
        Ok(conn) => {
            if let Err(e) = db::record_print_attempt(
                &conn,
                &attempt_id,
                &doc.invoice_number,
                outcome.error.as_deref(),
            ) {
                warn!(error = %e, "Failed to record print attempt");
            }
        }
        Err(e) => warn!(error = %e, "Print attempt not recorded"),
    }

    info!(
        invoice = %doc.invoice_number,
        printed = outcome.printed,
        "Receipt print finished"
    );
    json!({
        "success": outcome.printed,
        "invoiceNumber": doc.invoice_number,
        "outcome": outcome,
    })
}

pub async fn print_sale(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let sale_id = parse_sale_id_payload(arg0)?;
    let (doc, html) = render_for_sale(state, &sale_id)?;
    Ok(print_and_record(state, &doc, &html).await)
}

pub async fn print_current(state: &AppState) -> Result<Value, String> {
    let (doc, html) = render_for_cart(state)?;
    Ok(print_and_record(state, &doc, &html).await)
}
