//! Outbound partner-protocol documents.
//!
//! Three builders, one per request kind, plus the generic error document
//! used when a request cannot even be dispatched. Every builder echoes the
//! identifying fields, stamps a `RequestStatus` block and serializes
//! pretty-printed UTF-8 with an XML declaration.

use crate::viator::ViatorRequest;
use crate::xml::{serialize, Element, PARTNER_XMLNS};
use crate::ErrorCode;

/// A dispatched request that failed before (or at) the backend: taxonomy
/// code plus the offending tag/field descriptor rendered into
/// `ErrorDetails`.
#[derive(Debug, Clone)]
pub struct RequestError {
    pub code: ErrorCode,
    pub tag: String,
}

impl RequestError {
    pub fn new(code: ErrorCode, tag: impl Into<String>) -> Self {
        RequestError {
            code,
            tag: tag.into(),
        }
    }
}

/// One availability answer: a tour/date/option combination.
#[derive(Debug, Clone)]
pub struct AvailabilityBlock {
    pub tour_code: String,
    /// Partner date format, `YYYY-MM-DD`.
    pub travel_date: String,
    pub available: bool,
    pub vacancies: i32,
    /// Recomposed `B=..;S=..;T=..` option triple.
    pub basis: String,
}

#[derive(Debug, Clone)]
pub struct TourOptionBlock {
    pub basis: String,
    pub basis_name: String,
    pub tour_time: String,
}

#[derive(Debug, Clone)]
pub struct TourBlock {
    pub tour_code: String,
    pub tour_name: String,
    pub description: String,
    pub options: Vec<TourOptionBlock>,
}

fn response_root(tag: &str, request: &ViatorRequest) -> Element {
    let mut root = Element::with_attr(tag, "xmlns", PARTNER_XMLNS);
    root.add_text_child("ApiKey", request.api_key());
    root.add_text_child("ResellerId", request.distributor_id());
    if let Some(supplier) = request.doc().element("SupplierId") {
        root.add_child(supplier.clone());
    }
    root.add_text_child("ExternalReference", request.external_reference());
    root.add_text_child("Timestamp", request.timestamp.as_deref().unwrap_or(""));
    root
}

fn add_request_status(root: &mut Element, error: Option<&RequestError>) {
    let mut status = Element::new("RequestStatus");
    match error {
        None => status.add_text_child("Status", "SUCCESS"),
        Some(error) => {
            status.add_text_child("Status", "ERROR");
            let mut detail = Element::new("Error");
            detail.add_text_child("ErrorCode", error.code.code());
            detail.add_text_child("ErrorMessage", error.code.message());
            detail.add_text_child("ErrorDetails", &format!("Error on TAG {}", error.tag));
            status.add_child(detail);
        }
    }
    root.add_child(status);
}

/// Booking response: request status, transaction status and the supplier
/// confirmation number (empty on rejection).
pub fn booking_response(
    request: &ViatorRequest,
    confirmation_number: Option<&str>,
    transaction_error: Option<&str>,
    request_error: Option<&RequestError>,
) -> Vec<u8> {
    let mut root = response_root("BookingResponse", request);
    add_request_status(&mut root, request_error);
    root.add_text_child("TravellerIdentifier", request.traveller_identifier());

    let mut transaction = Element::new("TransactionStatus");
    match confirmation_number {
        Some(_) => transaction.add_text_child("Status", "CONFIRMED"),
        None => {
            transaction.add_text_child("Status", "REJECTED");
            if let Some(fault) = transaction_error {
                transaction
                    .add_text_child("RejectionReasonDetails", &format!("Error on RON: {fault}"));
                transaction.add_text_child("RejectionReason", "OTHER");
            }
        }
    }
    root.add_child(transaction);

    root.add_text_child(
        "SupplierConfirmationNumber",
        confirmation_number.unwrap_or(""),
    );
    serialize(&root)
}

/// Availability response: one `TourAvailability` block per date and option
/// combination.
pub fn availability_response(
    request: &ViatorRequest,
    request_error: Option<&RequestError>,
    blocks: &[AvailabilityBlock],
) -> Vec<u8> {
    let mut root = response_root("AvailabilityResponse", request);
    add_request_status(&mut root, request_error);

    for block in blocks {
        let mut availability = Element::new("TourAvailability");
        availability.add_text_child("SupplierProductCode", &block.tour_code);
        availability.add_text_child("TravelDate", &block.travel_date);
        availability.add_text_child(
            "Status",
            if block.available { "AVAILABLE" } else { "UNAVAILABLE" },
        );
        availability.add_text_child("Vacancies", &block.vacancies.to_string());
        let options = availability.add_child(Element::new("TourOptions"));
        let option = options.add_child(Element::new("Option"));
        option.add_text_child("Name", "Basis");
        option.add_text_child("Value", &block.basis);
        root.add_child(availability);
    }
    serialize(&root)
}

/// Tour-list response: one `Tour` block per publicly visible tour, each
/// carrying its bookable option combinations.
pub fn tour_list_response(
    request: &ViatorRequest,
    request_error: Option<&RequestError>,
    tours: &[TourBlock],
) -> Vec<u8> {
    let mut root = response_root("TourListResponse", request);
    add_request_status(&mut root, request_error);

    for tour in tours {
        let mut element = Element::new("Tour");
        element.add_text_child("SupplierProductCode", &tour.tour_code);
        element.add_text_child("TourName", &tour.tour_name);
        element.add_text_child("TourDescription", &tour.description);
        for option in &tour.options {
            let block = element.add_child(Element::new("TourOption"));
            block.add_text_child("Basis", &option.basis);
            block.add_text_child("BasisName", &option.basis_name);
            block.add_text_child("TourTime", &option.tour_time);
        }
        root.add_child(element);
    }
    serialize(&root)
}

/// Fallback document for requests that cannot be dispatched at all:
/// unparseable bodies, unknown root tags, unimplemented request kinds.
pub fn error_response(message: &str) -> Vec<u8> {
    let mut root = Element::with_attr("ErrorResponse", "xmlns", PARTNER_XMLNS);
    let mut status = Element::new("RequestStatus");
    status.add_text_child("Status", "ERROR");
    let mut detail = Element::new("Error");
    detail.add_text_child("ErrorCode", ErrorCode::MalformedElements.code());
    detail.add_text_child("ErrorMessage", ErrorCode::MalformedElements.message());
    detail.add_text_child("ErrorDetails", message);
    status.add_child(detail);
    root.add_child(status);
    serialize(&root)
}
