//! Orders, checkout validation and pricing, and order list views.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartItem};
use crate::types::{Email, Money, OrderId, OrderStatus};

/// Orders over this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 100;
/// Flat shipping fee below the threshold.
pub const FLAT_SHIPPING_FEE: i64 = 15;
/// Sales tax, percent of subtotal.
pub const TAX_PERCENT: u32 = 8;
/// Longest accepted order note.
pub const MAX_NOTES_CHARS: usize = 200;

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\+?[0-9]{10,15}$").unwrap()
});

// =============================================================================
// Checkout
// =============================================================================

/// Payment methods. Only cash on delivery is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "COD")]
    CashOnDelivery,
}

/// Raw checkout form input, as typed by the shopper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutForm {
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub payment: String,
    #[serde(default)]
    pub notes: String,
}

/// One failing checkout field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// All failing fields of a checkout form.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid checkout form: {}", summarize(.0))]
pub struct CheckoutValidationError(pub Vec<FieldError>);

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CheckoutValidationError {
    /// Message for a given field, if it failed.
    #[must_use]
    pub fn message_for(&self, field: &str) -> Option<&'static str> {
        self.0.iter().find(|e| e.field == field).map(|e| e.message)
    }
}

/// A checkout form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidCheckout {
    pub email: Email,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub payment: PaymentMethod,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl CheckoutForm {
    /// Prefill from the signed-in user: email and a display name split
    /// into first and last name.
    #[must_use]
    pub fn prefilled(email: Option<&Email>, display_name: Option<&str>) -> Self {
        let mut names = display_name.unwrap_or_default().split_whitespace();
        Self {
            email: email.map(ToString::to_string).unwrap_or_default(),
            first_name: names.next().unwrap_or_default().to_owned(),
            last_name: names.next().unwrap_or_default().to_owned(),
            payment: "COD".to_owned(),
            ..Self::default()
        }
    }

    /// Validate every field, collecting all failures.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutValidationError`] listing each invalid field.
    pub fn validate(&self) -> Result<ValidCheckout, CheckoutValidationError> {
        let mut errors = Vec::new();
        let mut fail = |field, message| errors.push(FieldError { field, message });

        let email = if self.email.trim().is_empty() {
            fail("email", "Email is required");
            None
        } else {
            Email::parse(&self.email)
                .inspect_err(|_| fail("email", "Invalid email"))
                .ok()
        };

        let phone = self.phone.trim();
        if phone.is_empty() {
            fail("phone", "Phone number is required");
        } else if !PHONE_RE.is_match(phone) {
            fail("phone", "Please enter a valid phone number");
        }

        let required = [
            ("firstName", &self.first_name, "First name is required"),
            ("lastName", &self.last_name, "Last name is required"),
            ("address", &self.address, "Address is required"),
            ("city", &self.city, "City is required"),
            ("postalCode", &self.postal_code, "Postal code is required"),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                fail(field, message);
            }
        }

        if self.payment.trim().is_empty() {
            fail("payment", "Payment method is required");
        } else if self.payment.trim() != "COD" {
            fail("payment", "Only Cash on Delivery available");
        }

        if self.notes.chars().count() > MAX_NOTES_CHARS {
            fail("notes", "Notes cannot exceed 200 characters");
        }

        match email {
            Some(email) if errors.is_empty() => Ok(ValidCheckout {
                email,
                phone: phone.to_owned(),
                first_name: self.first_name.trim().to_owned(),
                last_name: self.last_name.trim().to_owned(),
                address: self.address.trim().to_owned(),
                city: self.city.trim().to_owned(),
                postal_code: self.postal_code.trim().to_owned(),
                payment: PaymentMethod::CashOnDelivery,
                notes: self.notes.clone(),
            }),
            _ => Err(CheckoutValidationError(errors)),
        }
    }
}

/// Checkout price breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub grand_total: Money,
}

impl OrderTotals {
    /// Free shipping strictly above the threshold, flat fee otherwise;
    /// tax on the subtotal; every component rounded to cents.
    #[must_use]
    pub fn for_subtotal(subtotal: Money) -> Self {
        let shipping = if subtotal > Money::from_dollars(FREE_SHIPPING_THRESHOLD) {
            Money::ZERO
        } else {
            Money::from_dollars(FLAT_SHIPPING_FEE)
        };
        let tax = subtotal.percent(TAX_PERCENT).round_cents();
        let subtotal = subtotal.round_cents();
        Self {
            subtotal,
            shipping,
            tax,
            grand_total: subtotal + shipping + tax,
        }
    }

    #[must_use]
    pub fn for_cart(cart: &Cart) -> Self {
        Self::for_subtotal(cart.total())
    }
}

/// Fixed two-decimal string, the form the orders endpoint expects.
fn money_string(m: Money) -> String {
    format!("{:.2}", m.round_cents().amount())
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(flatten)]
    pub contact: ValidCheckout,
    pub items: Vec<CartItem>,
    pub subtotal: String,
    pub shipping: String,
    pub tax: String,
    pub grand_total: String,
}

impl NewOrder {
    #[must_use]
    pub fn new(contact: ValidCheckout, cart: &Cart) -> Self {
        let totals = OrderTotals::for_cart(cart);
        Self {
            contact,
            items: cart.items().to_vec(),
            subtotal: money_string(totals.subtotal),
            shipping: money_string(totals.shipping),
            tax: money_string(totals.tax),
            grand_total: money_string(totals.grand_total),
        }
    }
}

// =============================================================================
// Stored orders
// =============================================================================

/// A line on a stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub product_id: Option<String>,
    pub name: String,
    pub price: Money,
    #[serde(default, alias = "qty")]
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// An order as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub grand_total: Option<Money>,
    #[serde(default)]
    pub total: Option<Money>,
    #[serde(default)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// The order total, whichever field the backend filled.
    #[must_use]
    pub fn amount(&self) -> Money {
        self.grand_total.or(self.total).unwrap_or(Money::ZERO)
    }
}

/// Count of orders in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    #[serde(rename = "_id")]
    pub status: OrderStatus,
    pub count: u64,
}

/// Orders and revenue for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub orders: u64,
    #[serde(default)]
    pub revenue: Money,
}

/// Dashboard statistics from `GET /orders/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    #[serde(default)]
    pub total_orders: u64,
    #[serde(default)]
    pub total_revenue: Money,
    #[serde(default)]
    pub orders_by_status: Vec<StatusCount>,
    #[serde(default)]
    pub monthly_stats: Vec<MonthlyStat>,
}

// =============================================================================
// Order list views
// =============================================================================

/// Date window on the admin order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateWindow {
    #[default]
    All,
    /// Since midnight UTC.
    Today,
    Week,
    Month,
    Year,
}

impl DateWindow {
    /// Earliest accepted `created_at`, or `None` for no bound.
    #[must_use]
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::All => None,
            Self::Today => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                .single(),
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => now.checked_sub_months(Months::new(1)),
            Self::Year => now.checked_sub_months(Months::new(12)),
        }
    }
}

/// Order list ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    #[default]
    Newest,
    Oldest,
    TotalHigh,
    TotalLow,
}

/// Search, status and date filtering over an order list.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub search: String,
    /// `None` shows every status.
    pub status: Option<OrderStatus>,
    pub window: DateWindow,
    pub sort: OrderSort,
    /// Keep only the first N rows (the dashboard's "recent orders" card).
    pub limit: Option<usize>,
}

impl OrderQuery {
    #[must_use]
    pub fn apply<'a>(&self, orders: &'a [Order], now: DateTime<Utc>) -> Vec<&'a Order> {
        let raw = self.search.trim();
        let needle = raw.to_lowercase();
        let start = self.window.start(now);

        let mut rows: Vec<&Order> = orders
            .iter()
            .filter(|o| raw.is_empty() || order_matches(o, &needle, raw))
            .filter(|o| self.status.is_none_or(|s| o.status == s))
            .filter(|o| start.is_none_or(|start| o.created_at >= start))
            .collect();

        match self.sort {
            OrderSort::Newest => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            OrderSort::Oldest => rows.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            OrderSort::TotalHigh => rows.sort_by(|a, b| b.amount().cmp(&a.amount())),
            OrderSort::TotalLow => rows.sort_by(|a, b| a.amount().cmp(&b.amount())),
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

fn order_matches(order: &Order, needle: &str, raw: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(needle);
    contains(order.id.as_str())
        || order.user_email.as_deref().is_some_and(contains)
        || order.first_name.as_deref().is_some_and(contains)
        || order.last_name.as_deref().is_some_and(contains)
        // phone numbers match on the raw input
        || order.phone.as_deref().is_some_and(|p| p.contains(raw))
        || order.items.iter().any(|i| contains(&i.name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::product::Product;
    use crate::types::Size;

    fn valid_form() -> CheckoutForm {
        CheckoutForm {
            email: "jane@shop.io".to_owned(),
            phone: "+15551234567".to_owned(),
            first_name: "Jane".to_owned(),
            last_name: "Doe".to_owned(),
            address: "1 Main St".to_owned(),
            city: "Springfield".to_owned(),
            postal_code: "12345".to_owned(),
            payment: "COD".to_owned(),
            notes: String::new(),
        }
    }

    fn order(id: &str, total: i64, status: OrderStatus, created_at: DateTime<Utc>) -> Order {
        Order {
            id: OrderId::new(id),
            user_email: Some(format!("{id}@shop.io")),
            first_name: None,
            last_name: None,
            phone: Some("5551234567".to_owned()),
            address: None,
            city: None,
            items: vec![],
            grand_total: Some(Money::from_dollars(total)),
            total: None,
            status,
            created_at,
        }
    }

    #[test]
    fn test_valid_form_passes() {
        let valid = valid_form().validate().unwrap();
        assert_eq!(valid.email.as_str(), "jane@shop.io");
        assert_eq!(valid.payment, PaymentMethod::CashOnDelivery);
    }

    #[test]
    fn test_validation_collects_every_field() {
        let form = CheckoutForm {
            email: "bad".to_owned(),
            phone: "12".to_owned(),
            payment: "CARD".to_owned(),
            notes: "x".repeat(201),
            ..CheckoutForm::default()
        };
        let err = form.validate().unwrap_err();
        assert_eq!(err.message_for("email"), Some("Invalid email"));
        assert_eq!(err.message_for("phone"), Some("Please enter a valid phone number"));
        assert_eq!(err.message_for("city"), Some("City is required"));
        assert_eq!(err.message_for("payment"), Some("Only Cash on Delivery available"));
        assert_eq!(err.message_for("notes"), Some("Notes cannot exceed 200 characters"));
        assert_eq!(err.0.len(), 9);
    }

    #[test]
    fn test_prefill_splits_display_name() {
        let email = Email::parse("jane@shop.io").unwrap();
        let form = CheckoutForm::prefilled(Some(&email), Some("Jane Q Doe"));
        assert_eq!(form.first_name, "Jane");
        assert_eq!(form.last_name, "Q");
        assert_eq!(form.payment, "COD");
    }

    #[test]
    fn test_totals_shipping_threshold() {
        let at_threshold = OrderTotals::for_subtotal(Money::from_dollars(100));
        assert_eq!(at_threshold.shipping, Money::from_dollars(15));
        assert_eq!(at_threshold.tax, Money::from_dollars(8));
        assert_eq!(at_threshold.grand_total, Money::from_dollars(123));

        let above = OrderTotals::for_subtotal(Money::from_cents(10001));
        assert_eq!(above.shipping, Money::ZERO);
    }

    #[test]
    fn test_new_order_body() {
        let product: Product =
            serde_json::from_value(serde_json::json!({"_id": "p1", "name": "Tee", "price": 20})).unwrap();
        let mut cart = Cart::new();
        cart.add_item(&product, Size::default(), Utc::now());
        cart.add_item(&product, Size::default(), Utc::now());

        let body = NewOrder::new(valid_form().validate().unwrap(), &cart);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["subtotal"], "40.00");
        assert_eq!(json["shipping"], "15.00");
        assert_eq!(json["tax"], "3.20");
        assert_eq!(json["grandTotal"], "58.20");
        assert_eq!(json["payment"], "COD");
        assert_eq!(json["firstName"], "Jane");
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_order_query_filters() {
        let now = Utc::now();
        let orders = vec![
            order("a1", 50, OrderStatus::Shipped, now - Duration::days(2)),
            order("b2", 90, OrderStatus::Pending, now - Duration::days(40)),
            order("c3", 10, OrderStatus::Pending, now - Duration::hours(1)),
        ];

        let pending = OrderQuery {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        };
        assert_eq!(pending.apply(&orders, now).len(), 2);

        let week = OrderQuery {
            window: DateWindow::Week,
            sort: OrderSort::TotalHigh,
            ..Default::default()
        };
        let ids: Vec<_> = week.apply(&orders, now).iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["a1", "c3"]);

        let search = OrderQuery {
            search: "B2@SHOP".to_owned(),
            ..Default::default()
        };
        assert_eq!(search.apply(&orders, now)[0].id.as_str(), "b2");

        let recent = OrderQuery {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(recent.apply(&orders, now)[0].id.as_str(), "c3");
    }

    #[test]
    fn test_stats_deserialize_defaults() {
        let stats: OrderStats = serde_json::from_str(
            r#"{"totalOrders":3,"totalRevenue":120.5,"ordersByStatus":[{"_id":"pending","count":2}]}"#,
        )
        .unwrap();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.orders_by_status[0].status, OrderStatus::Pending);
        assert!(stats.monthly_stats.is_empty());
    }
}
