//! Business records scanned by the reminder job

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub tenant_id: String,
    pub quote_number: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub status: QuoteStatus,
    pub valid_until: NaiveDate,
    pub total_amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivableStatus {
    Outstanding,
    Partial,
    Paid,
    WrittenOff,
}

impl ReceivableStatus {
    /// Still owes money
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Outstanding | Self::Partial)
    }
}

/// Accounts-receivable record for an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receivable {
    pub id: Uuid,
    pub tenant_id: String,
    pub invoice_number: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub status: ReceivableStatus,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub is_primary: bool,
}

/// Customer email: the customer record first, then contacts (primary first)
pub fn resolve_customer_email(customer: Option<&Customer>, contacts: &[Contact]) -> Option<String> {
    fn usable(email: Option<&String>) -> Option<String> {
        email.map(|e| e.trim()).filter(|e| !e.is_empty()).map(|e| e.to_string())
    }

    if let Some(email) = customer.and_then(|c| usable(c.email.as_ref())) {
        return Some(email);
    }

    contacts
        .iter()
        .filter(|c| c.is_primary)
        .chain(contacts.iter().filter(|c| !c.is_primary))
        .find_map(|c| usable(c.email.as_ref()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    QuoteExpiry,
    InvoiceDue,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuoteExpiry => "quote_expiry",
            Self::InvoiceDue => "invoice_due",
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient view over a quote or receivable eligible for a reminder
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderCandidate {
    pub kind: ReminderKind,
    pub entity_id: Uuid,
    pub tenant_id: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    /// Quote or invoice number
    pub reference: String,
    /// Expiry date for quotes, due date for invoices
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
}

impl From<&Quote> for ReminderCandidate {
    fn from(quote: &Quote) -> Self {
        Self {
            kind: ReminderKind::QuoteExpiry,
            entity_id: quote.id,
            tenant_id: quote.tenant_id.clone(),
            customer_id: quote.customer_id,
            customer_name: quote.customer_name.clone(),
            reference: quote.quote_number.clone(),
            date: quote.valid_until,
            amount: quote.total_amount,
            currency: quote.currency.clone(),
        }
    }
}

impl From<&Receivable> for ReminderCandidate {
    fn from(receivable: &Receivable) -> Self {
        Self {
            kind: ReminderKind::InvoiceDue,
            entity_id: receivable.id,
            tenant_id: receivable.tenant_id.clone(),
            customer_id: receivable.customer_id,
            customer_name: receivable.customer_name.clone(),
            reference: receivable.invoice_number.clone(),
            date: receivable.due_date,
            amount: receivable.amount_due,
            currency: receivable.currency.clone(),
        }
    }
}

impl ReminderCandidate {
    pub fn formatted_amount(&self) -> String {
        format!("{} {:.2}", self.currency, self.amount.round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: Option<&str>, is_primary: bool) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            customer_id: Uuid::nil(),
            name: "Contact".to_string(),
            email: email.map(|e| e.to_string()),
            is_primary,
        }
    }

    #[test]
    fn customer_email_wins_over_contacts() {
        let customer = Customer {
            id: Uuid::nil(),
            tenant_id: "t1".to_string(),
            name: "Acme".to_string(),
            email: Some("c@x.com".to_string()),
        };
        let contacts = vec![contact(Some("other@x.com"), true)];
        assert_eq!(
            resolve_customer_email(Some(&customer), &contacts).as_deref(),
            Some("c@x.com")
        );
    }

    #[test]
    fn falls_back_to_primary_contact() {
        let customer = Customer {
            id: Uuid::nil(),
            tenant_id: "t1".to_string(),
            name: "Acme".to_string(),
            email: Some("  ".to_string()),
        };
        let contacts = vec![
            contact(Some("second@x.com"), false),
            contact(Some("primary@x.com"), true),
        ];
        assert_eq!(
            resolve_customer_email(Some(&customer), &contacts).as_deref(),
            Some("primary@x.com")
        );
        assert_eq!(resolve_customer_email(None, &[contact(None, true)]), None);
    }

    #[test]
    fn formats_amounts_with_two_decimals() {
        let candidate = ReminderCandidate {
            kind: ReminderKind::InvoiceDue,
            entity_id: Uuid::nil(),
            tenant_id: "t1".to_string(),
            customer_id: None,
            customer_name: None,
            reference: "INV-1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            amount: Decimal::new(12345, 1),
            currency: "KES".to_string(),
        };
        assert_eq!(candidate.formatted_amount(), "KES 1234.50");
    }
}
