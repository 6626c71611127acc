//! Request dispatcher.
//!
//! Owns the end-to-end flow for one inbound document: identify the request
//! kind by root tag, validate, authenticate against the reservation
//! engine, apply the business rules, call the backend, log, respond. Every
//! failure short-circuits into a well-formed partner response; nothing
//! escapes this boundary as an error.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::backend::{AvailabilityQuery, RonApi, RonConnector};
use crate::repository::{AuditSender, IssuedKey, KeyRepository, LogStatus, OperatorNotifier};
use crate::response::{self, AvailabilityBlock, RequestError, TourBlock, TourOptionBlock};
use crate::rules::{self, FaultKind, PaymentPolicy};
use crate::viator::{self, ViatorRequest, AVAILABILITY_FIELDS, BOOKING_FIELDS, TOUR_LIST_FIELDS};
use crate::xml::XmlDocument;
use crate::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Booking,
    Availability,
    TourList,
    BatchAvailability,
}

impl RequestKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BookingRequest" => Some(RequestKind::Booking),
            "AvailabilityRequest" => Some(RequestKind::Availability),
            "TourListRequest" => Some(RequestKind::TourList),
            "BatchAvailabilityRequest" => Some(RequestKind::BatchAvailability),
            _ => None,
        }
    }
}

/// Connector-level configuration: the issued-key prefix, the payment
/// rotation policy and the backend fault markers that trigger the pickup
/// retry.
#[derive(Debug, Clone)]
pub struct ConnectorPolicy {
    pub base_key: String,
    pub payment: PaymentPolicy,
    pub pickup_fault_markers: Vec<String>,
}

/// A failure mapped onto the partner error taxonomy, plus the detail kept
/// for the audit record (missing-field descriptor or backend fault text).
struct Failure {
    error: RequestError,
    detail: String,
}

impl Failure {
    fn new(code: ErrorCode, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Failure {
            detail: tag.clone(),
            error: RequestError::new(code, tag),
        }
    }

    fn with_detail(code: ErrorCode, tag: impl Into<String>, detail: impl Into<String>) -> Self {
        Failure {
            error: RequestError::new(code, tag.into()),
            detail: detail.into(),
        }
    }
}

enum BookingFailure {
    Request(Failure),
    /// The backend rejected the write; the request itself was fine.
    Rejected(String),
}

impl From<Failure> for BookingFailure {
    fn from(failure: Failure) -> Self {
        BookingFailure::Request(failure)
    }
}

pub struct Connector {
    pub ron: Arc<dyn RonConnector>,
    pub keys: Arc<dyn KeyRepository>,
    pub notifier: Arc<dyn OperatorNotifier>,
    pub audit: AuditSender,
    pub policy: ConnectorPolicy,
}

impl Connector {
    /// Entry point: always returns a serialized XML response.
    pub async fn handle(&self, raw: &[u8]) -> Vec<u8> {
        let doc = XmlDocument::parse(raw);
        if !doc.validated {
            let message = doc
                .error_message
                .clone()
                .unwrap_or_else(|| "Invalid XML".to_string());
            tracing::warn!("rejecting unparseable request: {}", message);
            return response::error_response(&message);
        }

        let root_tag = doc.root_tag().unwrap_or("").to_string();
        let kind = match RequestKind::from_tag(&root_tag) {
            Some(kind) => kind,
            None => {
                tracing::warn!("unsupported request root tag: {}", root_tag);
                return response::error_response(&format!("Unsupported request: {root_tag}"));
            }
        };

        match kind {
            RequestKind::BatchAvailability => {
                response::error_response("BatchAvailabilityRequest is not implemented")
            }
            kind => {
                let request = ViatorRequest::extract(doc);
                self.audit
                    .record(request.external_reference(), LogStatus::Pending, None, None);
                match kind {
                    RequestKind::Availability => self.handle_availability(&request).await,
                    RequestKind::TourList => self.handle_tour_list(&request).await,
                    _ => self.handle_booking(&request).await,
                }
            }
        }
    }

    async fn handle_booking(&self, request: &ViatorRequest) -> Vec<u8> {
        match self.booking_flow(request).await {
            Ok(confirmation) => {
                tracing::info!(
                    external_reference = request.external_reference(),
                    confirmation = %confirmation,
                    "booking confirmed"
                );
                self.audit.record(
                    request.external_reference(),
                    LogStatus::CompleteAccepted,
                    None,
                    Some(confirmation.clone()),
                );
                response::booking_response(request, Some(&confirmation), None, None)
            }
            Err(BookingFailure::Rejected(fault)) => {
                tracing::info!(
                    external_reference = request.external_reference(),
                    "booking rejected by backend: {}",
                    fault
                );
                self.audit.record(
                    request.external_reference(),
                    LogStatus::CompleteRejected,
                    Some(fault.clone()),
                    None,
                );
                response::booking_response(request, None, Some(&fault), None)
            }
            Err(BookingFailure::Request(failure)) => {
                self.audit.record(
                    request.external_reference(),
                    LogStatus::Error,
                    Some(failure.detail.clone()),
                    None,
                );
                response::booking_response(request, None, None, Some(&failure.error))
            }
        }
    }

    async fn booking_flow(&self, request: &ViatorRequest) -> Result<String, BookingFailure> {
        request.check_required(BOOKING_FIELDS).map_err(|missing| {
            Failure::new(ErrorCode::MalformedElements, missing.to_string())
        })?;

        let (key, mut ron, payment_option) = self.authenticate(request).await?;

        // The pickup list is advisory for the write: an empty or failed
        // read just leaves the partner's default pickup in place.
        let tour_time_id = request.tour_time_id.clone().unwrap_or_default();
        let basis_id = request.basis_id.clone().unwrap_or_default();
        let pickups = ron
            .read_tour_pickups(request.tour_code(), &tour_time_id, &basis_id)
            .await
            .unwrap_or_default();

        let resolved = rules::resolve_pickup(
            request.pickup_point.as_deref(),
            request.default_pickup_key.as_deref().unwrap_or(""),
            &pickups,
        );
        let mut reservation = request.to_reservation(&key.host_id, resolved.pickup_key);
        if let Some((note_key, note_value)) = &resolved.fallback_note {
            reservation.append_comment(note_key, note_value);
        }

        if let Some(confirmation) = ron.write_reservation(&reservation, &payment_option).await {
            return Ok(confirmation);
        }
        let fault = ron.last_fault().unwrap_or("").to_string();

        // One bounded retry: the backend insists on a pickup, so force the
        // first one it advertises and try again.
        if rules::classify_fault(&fault, &self.policy.pickup_fault_markers)
            == FaultKind::PickupMandatory
        {
            if let Some(forced) = rules::force_first_pickup(request.pickup_point.as_deref(), &pickups)
            {
                tracing::info!(
                    external_reference = request.external_reference(),
                    "pickup mandatory, retrying with forced pickup key {}",
                    forced.pickup_key
                );
                reservation.pickup_key = forced.pickup_key;
                if resolved.fallback_note.is_none() {
                    if let Some((note_key, note_value)) = &forced.fallback_note {
                        reservation.append_comment(note_key, note_value);
                    }
                }
                if let Some(confirmation) =
                    ron.write_reservation(&reservation, &payment_option).await
                {
                    return Ok(confirmation);
                }
                return Err(BookingFailure::Rejected(
                    ron.last_fault().unwrap_or("").to_string(),
                ));
            }
        }

        Err(BookingFailure::Rejected(fault))
    }

    async fn handle_availability(&self, request: &ViatorRequest) -> Vec<u8> {
        match self.availability_flow(request).await {
            Ok(blocks) => {
                self.audit.record(
                    request.external_reference(),
                    LogStatus::CompleteAccepted,
                    None,
                    None,
                );
                response::availability_response(request, None, &blocks)
            }
            Err(failure) => {
                self.audit.record(
                    request.external_reference(),
                    LogStatus::Error,
                    Some(failure.detail.clone()),
                    None,
                );
                response::availability_response(request, Some(&failure.error), &[])
            }
        }
    }

    async fn availability_flow(
        &self,
        request: &ViatorRequest,
    ) -> Result<Vec<AvailabilityBlock>, Failure> {
        request.check_required(AVAILABILITY_FIELDS).map_err(|missing| {
            Failure::new(ErrorCode::MalformedElements, missing.to_string())
        })?;

        // Either an explicit date range or a single travel date.
        let dates: Vec<NaiveDate> = match (request.start_date, request.end_date) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(Failure::new(
                        ErrorCode::MalformedElements,
                        "StartDate - start_date",
                    ));
                }
                start.iter_days().take_while(|d| *d <= end).collect()
            }
            _ => match request
                .travel_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            {
                Some(date) => vec![date],
                None => {
                    return Err(Failure::new(
                        ErrorCode::MalformedElements,
                        "TravelDate - tour_date",
                    ))
                }
            },
        };

        let (_key, mut ron, _payment_option) = self.authenticate(request).await?;

        // No explicit basis: enumerate every tour-time x tour-basis combo
        // the backend knows for this tour.
        let combos: Vec<(String, String, String)> = match request.basis_triple() {
            Some(triple) => vec![triple],
            None => {
                let times = ron
                    .read_tour_times(request.tour_code())
                    .await
                    .unwrap_or_default();
                let bases = ron
                    .read_tour_bases(request.tour_code())
                    .await
                    .unwrap_or_default();
                if times.is_empty() || bases.is_empty() {
                    return Err(Failure::with_detail(
                        ErrorCode::NothingReturned,
                        "SupplierProductCode",
                        format!("no tour times or bases for {}", request.tour_code()),
                    ));
                }
                let mut combos = Vec::with_capacity(times.len() * bases.len());
                for time in &times {
                    for basis in &bases {
                        combos.push((
                            basis.basis_id.clone(),
                            basis.sub_basis_id.clone(),
                            time.tour_time_id.clone(),
                        ));
                    }
                }
                combos
            }
        };

        let mut queries = Vec::with_capacity(dates.len() * combos.len());
        for date in &dates {
            let tour_date = date.format("%Y-%b-%d").to_string();
            for (basis_id, sub_basis_id, tour_time_id) in &combos {
                queries.push(AvailabilityQuery {
                    tour_code: request.tour_code().to_string(),
                    tour_date: tour_date.clone(),
                    basis_id: basis_id.clone(),
                    sub_basis_id: sub_basis_id.clone(),
                    tour_time_id: tour_time_id.clone(),
                });
            }
        }

        let days = ron
            .read_tour_availability_range(&queries)
            .await
            .unwrap_or_default();
        if days.is_empty() {
            return Err(Failure::with_detail(
                ErrorCode::NothingReturned,
                "SupplierProductCode",
                ron.last_fault().unwrap_or("empty availability result").to_string(),
            ));
        }

        Ok(days
            .iter()
            .map(|day| AvailabilityBlock {
                tour_code: day.tour_code.clone(),
                travel_date: viator::from_backend_date(&day.tour_date)
                    .unwrap_or_else(|| day.tour_date.clone()),
                available: day.vacancies > 0,
                vacancies: day.vacancies,
                basis: viator::compose_basis(
                    &day.basis_id,
                    &day.sub_basis_id,
                    &day.tour_time_id,
                ),
            })
            .collect())
    }

    async fn handle_tour_list(&self, request: &ViatorRequest) -> Vec<u8> {
        match self.tour_list_flow(request).await {
            Ok(tours) => {
                self.audit.record(
                    request.external_reference(),
                    LogStatus::CompleteAccepted,
                    None,
                    None,
                );
                response::tour_list_response(request, None, &tours)
            }
            Err(failure) => {
                self.audit.record(
                    request.external_reference(),
                    LogStatus::Error,
                    Some(failure.detail.clone()),
                    None,
                );
                response::tour_list_response(request, Some(&failure.error), &[])
            }
        }
    }

    async fn tour_list_flow(&self, request: &ViatorRequest) -> Result<Vec<TourBlock>, Failure> {
        request.check_required(TOUR_LIST_FIELDS).map_err(|missing| {
            Failure::new(ErrorCode::MalformedElements, missing.to_string())
        })?;

        let (_key, mut ron, _payment_option) = self.authenticate(request).await?;

        let tours = ron.read_tours().await.unwrap_or_default();
        if tours.is_empty() {
            return Err(Failure::with_detail(
                ErrorCode::NothingReturned,
                "TourListRequest",
                ron.last_fault().unwrap_or("no publicly visible tours").to_string(),
            ));
        }

        let mut blocks = Vec::new();
        for tour in &tours {
            // A tour is only listed when times, bases and web details are
            // all present; anything less is skipped, not an error.
            let times = ron
                .read_tour_times(&tour.tour_code)
                .await
                .unwrap_or_default();
            let bases = ron
                .read_tour_bases(&tour.tour_code)
                .await
                .unwrap_or_default();
            let details = ron.read_tour_web_details(&tour.tour_code).await;
            let (Some(details), false, false) = (details, times.is_empty(), bases.is_empty())
            else {
                tracing::debug!(tour_code = %tour.tour_code, "tour skipped: incomplete data");
                continue;
            };

            let mut options = Vec::with_capacity(times.len() * bases.len());
            for time in &times {
                for basis in &bases {
                    options.push(TourOptionBlock {
                        basis: viator::compose_basis(
                            &basis.basis_id,
                            &basis.sub_basis_id,
                            &time.tour_time_id,
                        ),
                        basis_name: basis.name.clone(),
                        tour_time: time.name.clone(),
                    });
                }
            }
            blocks.push(TourBlock {
                tour_code: tour.tour_code.clone(),
                tour_name: tour.tour_name.clone(),
                description: details.description,
                options,
            });
        }

        if blocks.is_empty() {
            return Err(Failure::with_detail(
                ErrorCode::NothingReturned,
                "TourListRequest",
                "no tour with complete times, bases and web details".to_string(),
            ));
        }
        Ok(blocks)
    }

    /// Steps shared by every kind: API-key validation, backend login and
    /// payment-option rotation.
    async fn authenticate(
        &self,
        request: &ViatorRequest,
    ) -> Result<(IssuedKey, Box<dyn RonApi>, String), Failure> {
        let host_id = match request.api_key().strip_prefix(self.policy.base_key.as_str()) {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => return Err(Failure::new(ErrorCode::InvalidApiKey, "ApiKey")),
        };
        let Some(key) = self.keys.find_by_host(&host_id).await else {
            return Err(Failure::new(ErrorCode::InvalidApiKey, "ApiKey"));
        };

        let mut ron = self.ron.connect();
        ron.set_host(&host_id);
        if !ron.login(request.distributor_id()).await {
            let fault = ron.last_fault().unwrap_or("login failed").to_string();
            tracing::warn!(host_id = %host_id, "backend login failed: {}", fault);
            return Err(Failure::with_detail(
                ErrorCode::BackendAuthFailed,
                "SupplierId",
                fault,
            ));
        }

        let payment_option = rules::rotate_payment_option(
            ron.as_mut(),
            self.keys.as_ref(),
            self.notifier.as_ref(),
            &self.policy.payment,
            &key,
            Utc::now(),
        )
        .await;

        Ok((key, ron, payment_option))
    }
}
