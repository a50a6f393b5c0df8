use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{InvoiceStatus, PaymentMethod, RecordLifecycle};

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub amount: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Subtotal, tax and total of an invoice. Always derived, never supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amounts {
    pub sub_total: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
}

/// An invoice for one appointment. `P` and `A` are the patient and
/// appointment references (ids when stored, summaries when expanded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice<P = Uuid, A = Uuid> {
    pub id: Uuid,
    pub invoice_no: String,
    pub patient: P,
    pub appointment: A,
    pub line_items: Vec<LineItem>,
    pub tax_percent: f64,
    pub discount_amount: f64,
    #[serde(flatten)]
    pub amounts: Amounts,
    pub status: InvoiceStatus,
    pub payment_method: PaymentMethod,
    pub paid_at: Option<DateTime<Utc>>,
    pub lifecycle: RecordLifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<P, A> Invoice<P, A> {
    pub fn is_active(&self) -> bool {
        self.lifecycle == RecordLifecycle::Active
    }

    pub fn expand<P2, A2>(self, patient: P2, appointment: A2) -> Invoice<P2, A2> {
        Invoice {
            id: self.id,
            invoice_no: self.invoice_no,
            patient,
            appointment,
            line_items: self.line_items,
            tax_percent: self.tax_percent,
            discount_amount: self.discount_amount,
            amounts: self.amounts,
            status: self.status,
            payment_method: self.payment_method,
            paid_at: self.paid_at,
            lifecycle: self.lifecycle,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_no: String,
    pub patient_id: Uuid,
    pub appointment_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub tax_percent: f64,
    pub discount_amount: f64,
    pub payment_method: PaymentMethod,
}

/// Partial invoice update. Derived amounts are not part of it.
#[derive(Debug, Clone, Default)]
pub struct InvoiceChanges {
    pub line_items: Option<Vec<LineItem>>,
    pub tax_percent: Option<f64>,
    pub discount_amount: Option<f64>,
    pub status: Option<InvoiceStatus>,
    pub payment_method: Option<PaymentMethod>,
}

impl InvoiceChanges {
    pub fn is_empty(&self) -> bool {
        self.line_items.is_none()
            && self.tax_percent.is_none()
            && self.discount_amount.is_none()
            && self.status.is_none()
            && self.payment_method.is_none()
    }

    /// Whether any input of the amount computation changes.
    pub fn touches_amounts(&self) -> bool {
        self.line_items.is_some() || self.tax_percent.is_some() || self.discount_amount.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_defaults_to_one() {
        let item: LineItem =
            serde_json::from_str(r#"{"description":"Consultation","amount":50}"#).unwrap();
        assert_eq!(item.quantity, 1);
    }

    #[test]
    fn negative_quantity_does_not_deserialize() {
        let item: Result<LineItem, _> =
            serde_json::from_str(r#"{"description":"X","amount":5,"quantity":-1}"#);
        assert!(item.is_err());
    }

    #[test]
    fn status_only_change_does_not_touch_amounts() {
        let changes = InvoiceChanges {
            status: Some(InvoiceStatus::Paid),
            ..Default::default()
        };
        assert!(!changes.is_empty());
        assert!(!changes.touches_amounts());
    }
}
