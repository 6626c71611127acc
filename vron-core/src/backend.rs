//! Seam to the reservation engine.
//!
//! The dispatcher only sees these traits; the XML-RPC implementation lives
//! in the `vron-ron` crate and tests substitute an in-process mock.

use async_trait::async_trait;

use crate::model::Reservation;

/// A pickup location/time offered by the host for a tour/time/basis combo.
#[derive(Debug, Clone, PartialEq)]
pub struct PickupRecord {
    pub pickup_key: String,
    pub pickup_name: String,
    pub pickup_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TourTime {
    pub tour_time_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TourBasis {
    pub basis_id: String,
    pub sub_basis_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TourRecord {
    pub tour_code: String,
    pub tour_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebDetails {
    pub tour_name: String,
    pub description: String,
}

/// One availability question: a tour, a date (backend format) and a
/// basis/sub-basis/time triple.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityQuery {
    pub tour_code: String,
    pub tour_date: String,
    pub basis_id: String,
    pub sub_basis_id: String,
    pub tour_time_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityDay {
    pub tour_code: String,
    pub tour_date: String,
    pub basis_id: String,
    pub sub_basis_id: String,
    pub tour_time_id: String,
    pub vacancies: i32,
}

/// A logged-in conversation with the reservation engine, scoped to one
/// inbound request. Reads return `None` on an RPC fault (or timeout) and
/// record the fault text for retrieval via `last_fault`.
#[async_trait]
pub trait RonApi: Send {
    fn set_host(&mut self, host_id: &str);

    /// Must be called exactly once per inbound request before any other
    /// call. On success the session token is carried on every later call.
    async fn login(&mut self, reseller_id: &str) -> bool;

    async fn read_tour_pickups(
        &mut self,
        tour_code: &str,
        tour_time_id: &str,
        basis_id: &str,
    ) -> Option<Vec<PickupRecord>>;

    async fn read_tour_times(&mut self, tour_code: &str) -> Option<Vec<TourTime>>;

    async fn read_tour_bases(&mut self, tour_code: &str) -> Option<Vec<TourBasis>>;

    async fn read_tours(&mut self) -> Option<Vec<TourRecord>>;

    async fn read_tour_web_details(&mut self, tour_code: &str) -> Option<WebDetails>;

    async fn read_tour_availability_range(
        &mut self,
        queries: &[AvailabilityQuery],
    ) -> Option<Vec<AvailabilityDay>>;

    async fn read_payment_options(&mut self) -> Option<Vec<String>>;

    /// The sole side-effecting call. Returns the confirmation number on
    /// success; on fault records the fault text and returns `None`.
    async fn write_reservation(
        &mut self,
        reservation: &Reservation,
        payment_option: &str,
    ) -> Option<String>;

    fn last_fault(&self) -> Option<&str>;
}

/// Hands out one `RonApi` session per inbound request. Sessions are never
/// shared across requests, so no locking is required around them.
pub trait RonConnector: Send + Sync {
    fn connect(&self) -> Box<dyn RonApi>;
}
