//! Canonical reservation model shared by the mapper, the business rules
//! and the reservation-engine client.

/// Pax counts per internal pax-type bucket, after age-band aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaxCounts {
    pub adults: i32,
    pub infants: i32,
    pub children: i32,
    pub foc: i32,
    pub udef1: i32,
}

impl PaxCounts {
    pub fn total(&self) -> i32 {
        self.adults + self.infants + self.children + self.foc + self.udef1
    }
}

/// Normalized reservation fields forwarded to the reservation engine.
/// Invariant: every required field is non-empty before a backend write is
/// attempted (enforced by the mapper's required-field check).
#[derive(Debug, Clone, Default)]
pub struct Reservation {
    pub host_id: String,
    pub tour_code: String,
    pub voucher_number: String,
    /// Backend date format, `YYYY-Mon-DD`.
    pub tour_date: String,
    pub basis_id: String,
    pub sub_basis_id: String,
    pub tour_time_id: String,
    pub pax: PaxCounts,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub pickup_key: String,
    /// `key=value` clauses joined by `;`, insertion order.
    pub general_comments: String,
}

impl Reservation {
    pub fn append_comment(&mut self, key: &str, value: &str) {
        if !self.general_comments.is_empty() {
            self.general_comments.push(';');
        }
        self.general_comments.push_str(key);
        self.general_comments.push('=');
        self.general_comments.push_str(value);
    }
}
