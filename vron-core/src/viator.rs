//! Partner-protocol mapper.
//!
//! Reads the distribution partner's request dialect into the canonical
//! reservation model. Field names follow the reservation engine's
//! vocabulary so the mapping tables read left-to-right: canonical field,
//! partner tag, required flag.

use chrono::NaiveDate;

use crate::model::{PaxCounts, Reservation};
use crate::xml::XmlDocument;

/// One row of a declarative mapping table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: &'static str,
    pub tag: &'static str,
    pub required: bool,
}

const fn spec(field: &'static str, tag: &'static str, required: bool) -> FieldSpec {
    FieldSpec { field, tag, required }
}

pub static BOOKING_FIELDS: &[FieldSpec] = &[
    spec("api_key", "ApiKey", true),
    spec("external_reference", "ExternalReference", true),
    spec("timestamp", "Timestamp", true),
    spec("distributor_id", "ResellerId", true),
    spec("tour_code", "SupplierProductCode", true),
    spec("tour_date", "TravelDate", true),
    spec("voucher_number", "BookingReference", true),
    spec("basis_id", "TourOptions", true),
    spec("sub_basis_id", "TourOptions", true),
    spec("tour_time_id", "TourOptions", true),
    spec("pax_adults", "AgeBandMap", true),
    spec("pax_infants", "AgeBandMap", true),
    spec("pax_child", "AgeBandMap", true),
    spec("pax_foc", "AgeBandMap", true),
    spec("pax_udef1", "AgeBandMap", true),
    spec("default_pickup_key", "TourOptions", true),
    spec("pickup_point", "PickupPoint", true),
    spec("first_name", "GivenName", true),
    spec("last_name", "Surname", true),
    spec("traveller_identifier", "TravellerIdentifier", true),
    spec("email", "ContactValue", false),
    spec("mobile", "ContactValue", false),
];

pub static AVAILABILITY_FIELDS: &[FieldSpec] = &[
    spec("api_key", "ApiKey", true),
    spec("external_reference", "ExternalReference", true),
    spec("timestamp", "Timestamp", true),
    spec("distributor_id", "ResellerId", true),
    spec("tour_code", "SupplierProductCode", true),
    spec("tour_date", "TravelDate", false),
    spec("start_date", "StartDate", false),
    spec("end_date", "EndDate", false),
    spec("basis_id", "TourOptions", false),
    spec("sub_basis_id", "TourOptions", false),
    spec("tour_time_id", "TourOptions", false),
];

pub static TOUR_LIST_FIELDS: &[FieldSpec] = &[
    spec("api_key", "ApiKey", true),
    spec("external_reference", "ExternalReference", true),
    spec("timestamp", "Timestamp", true),
    spec("distributor_id", "ResellerId", true),
];

/// The field/tag pair a required-field check failed on. Rendered verbatim
/// into the error response details.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{tag} - {field}")]
pub struct MissingField {
    pub tag: &'static str,
    pub field: &'static str,
}

/// Partner `YYYY-MM-DD` to backend `YYYY-Mon-DD`.
pub fn to_backend_date(partner: &str) -> Option<String> {
    NaiveDate::parse_from_str(partner, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%b-%d").to_string())
}

/// Backend `YYYY-Mon-DD` to partner `YYYY-MM-DD`.
pub fn from_backend_date(backend: &str) -> Option<String> {
    NaiveDate::parse_from_str(backend, "%Y-%b-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Splits a compound basis value (`"B=30;S=37;T=38"`, any key order) into
/// the (basis, sub-basis, tour-time) triple. Unknown keys are ignored;
/// malformed pairs leave the corresponding slot `None`.
pub fn decompose_basis(content: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut basis_id = None;
    let mut sub_basis_id = None;
    let mut tour_time_id = None;
    let parts: Vec<&str> = content.split(';').collect();
    if parts.len() > 1 {
        for part in parts {
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "B" => basis_id = Some(value.to_string()),
                    "S" => sub_basis_id = Some(value.to_string()),
                    "T" => tour_time_id = Some(value.to_string()),
                    _ => {}
                }
            }
        }
    }
    (basis_id, sub_basis_id, tour_time_id)
}

/// Inverse of `decompose_basis`; used when echoing option triples back to
/// the partner.
pub fn compose_basis(basis_id: &str, sub_basis_id: &str, tour_time_id: &str) -> String {
    format!("B={basis_id};S={sub_basis_id};T={tour_time_id}")
}

/// Maps the five partner age bands onto the five internal pax-type buckets
/// and sums the `TravellerMix` quantities into them.
///
/// The map value looks like `"A=P1;C=P1;Y=P1;I=P5;S=P1"`. All five
/// category keys must be present or aggregation is abandoned, which later
/// fails the required-field check on the `AgeBandMap` tag.
pub fn aggregate_age_bands(map_value: &str, doc: &XmlDocument) -> Option<PaxCounts> {
    let parts: Vec<&str> = map_value.split(';').collect();
    if parts.len() <= 1 {
        return None;
    }

    let mut band_map: Vec<(&str, &str)> = Vec::new();
    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            band_map.push((key, value));
        }
    }
    let bucket_for = |code: &str| band_map.iter().find(|(k, _)| *k == code).map(|(_, v)| *v);
    for code in ["A", "C", "Y", "I", "S"] {
        bucket_for(code)?;
    }

    let mix = doc.element("TravellerMix")?;
    let categories = [
        ("A", "Adult"),
        ("C", "Child"),
        ("Y", "Youth"),
        ("I", "Infant"),
        ("S", "Senior"),
    ];
    // Buckets P1..P5 in order.
    let mut buckets = [0i32; 5];
    let mut total = 0i32;
    for (code, tag) in categories {
        let Some(quantity) = doc.text_in(tag, mix) else {
            continue;
        };
        let Ok(quantity) = quantity.trim().parse::<i32>() else {
            continue;
        };
        let slot = match bucket_for(code) {
            Some("P1") => 0,
            Some("P2") => 1,
            Some("P3") => 2,
            Some("P4") => 3,
            Some("P5") => 4,
            _ => continue,
        };
        buckets[slot] += quantity;
        total += quantity;
    }

    if total > 0 {
        Some(PaxCounts {
            adults: buckets[0],
            infants: buckets[1],
            children: buckets[2],
            foc: buckets[3],
            udef1: buckets[4],
        })
    } else {
        None
    }
}

/// A fully extracted partner request. Extraction is one eager pass over
/// the parsed document; every downstream consumer works off these owned
/// fields instead of re-querying the tree.
#[derive(Debug)]
pub struct ViatorRequest {
    doc: XmlDocument,
    pub api_key: Option<String>,
    pub external_reference: Option<String>,
    pub timestamp: Option<String>,
    pub distributor_id: Option<String>,
    pub tour_code: Option<String>,
    /// Raw partner-format travel date.
    pub travel_date: Option<String>,
    /// Travel date converted to the backend format; `None` when the raw
    /// value is absent or unparseable, which fails the required check.
    pub tour_date: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub voucher_number: Option<String>,
    pub basis_id: Option<String>,
    pub sub_basis_id: Option<String>,
    pub tour_time_id: Option<String>,
    pub pax: Option<PaxCounts>,
    pub default_pickup_key: Option<String>,
    pub pickup_point: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub traveller_identifier: Option<String>,
    pub age_band: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    /// Optional free-text signals, in order of appearance.
    pub comments: Vec<(String, String)>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ViatorRequest {
    pub fn extract(doc: XmlDocument) -> Self {
        let api_key = non_empty(doc.text_of("ApiKey"));
        let external_reference = non_empty(doc.text_of("ExternalReference"));
        let timestamp = non_empty(doc.text_of("Timestamp"));
        let distributor_id = non_empty(doc.text_of("ResellerId"));
        let tour_code = non_empty(doc.text_of("SupplierProductCode"));
        let voucher_number = non_empty(doc.text_of("BookingReference"));
        let pickup_point = non_empty(doc.text_of("PickupPoint"));

        let travel_date = non_empty(doc.text_of("TravelDate"));
        let tour_date = travel_date.as_deref().and_then(to_backend_date);
        let start_date = non_empty(doc.text_of("StartDate"))
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());
        let end_date = non_empty(doc.text_of("EndDate"))
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

        // TourOptions carries named Option pairs: Basis, AgeBandMap,
        // DefaultPickup.
        let mut basis_id = None;
        let mut sub_basis_id = None;
        let mut tour_time_id = None;
        let mut default_pickup_key = None;
        let mut age_band_map = None;
        if let Some(tour_options) = doc.element("TourOptions") {
            for option in &tour_options.children {
                let name = doc.text_in("Name", option);
                let value = non_empty(doc.text_in("Value", option));
                let (Some(name), Some(value)) = (name, value) else {
                    continue;
                };
                match name {
                    "Basis" => {
                        let (b, s, t) = decompose_basis(&value);
                        basis_id = b;
                        sub_basis_id = s;
                        tour_time_id = t;
                    }
                    "AgeBandMap" => age_band_map = Some(value),
                    "DefaultPickup" => default_pickup_key = Some(value),
                    _ => {}
                }
            }
        }
        let pax = age_band_map
            .as_deref()
            .and_then(|map_value| aggregate_age_bands(map_value, &doc));

        // Lead traveller supplies the name fields.
        let mut first_name = None;
        let mut last_name = None;
        let mut traveller_identifier = None;
        let mut age_band = None;
        for traveller in doc.elements("Traveller") {
            if doc.text_in("LeadTraveller", traveller) == Some("true") {
                first_name = non_empty(doc.text_in("GivenName", traveller));
                last_name = non_empty(doc.text_in("Surname", traveller));
                traveller_identifier = non_empty(doc.text_in("TravellerIdentifier", traveller));
                age_band = non_empty(doc.text_in("AgeBand", traveller));
                break;
            }
        }

        let mut email = None;
        let mut mobile = None;
        if let Some(contact) = doc.element("ContactDetail") {
            match doc.text_in("ContactType", contact) {
                Some("MOBILE") => mobile = non_empty(doc.text_in("ContactValue", contact)),
                Some("EMAIL") => email = non_empty(doc.text_in("ContactValue", contact)),
                _ => {}
            }
        }

        // Optional free-text signals, aggregated into the general comments
        // forwarded to the backend. Insertion order is the wire order.
        let mut comments: Vec<(String, String)> = Vec::new();
        if let Some(value) = non_empty(doc.text_of("LanguageCode")) {
            comments.push(("language_code".to_string(), value));
        }
        if let Some(value) = non_empty(doc.text_of("LanguageOption")) {
            comments.push(("language_option".to_string(), value));
        }
        if let Some(value) = age_band.clone() {
            comments.push(("age_band".to_string(), value));
        }
        for qa in doc.elements("QuestionAnswer") {
            let question = non_empty(doc.text_in("Question", qa));
            let answer = non_empty(doc.text_in("Answer", qa));
            if let (Some(question), Some(answer)) = (question, answer) {
                comments.push((question, answer));
            }
        }
        if let Some(value) = non_empty(doc.text_of("SpecialRequirement")) {
            comments.push(("special_requirement".to_string(), value));
        }
        if let Some(value) = non_empty(doc.text_of("SupplierNote")) {
            comments.push(("supplier_note".to_string(), value));
        }
        if let Some(value) = non_empty(doc.text_of("AdditionalRemarks")) {
            comments.push(("additional_remarks".to_string(), value));
        }

        ViatorRequest {
            doc,
            api_key,
            external_reference,
            timestamp,
            distributor_id,
            tour_code,
            travel_date,
            tour_date,
            start_date,
            end_date,
            voucher_number,
            basis_id,
            sub_basis_id,
            tour_time_id,
            pax,
            default_pickup_key,
            pickup_point,
            first_name,
            last_name,
            traveller_identifier,
            age_band,
            email,
            mobile,
            comments,
        }
    }

    pub fn doc(&self) -> &XmlDocument {
        &self.doc
    }

    /// Iterates the mapping table in declaration order and fails closed on
    /// the first missing required field.
    pub fn check_required(&self, table: &[FieldSpec]) -> Result<(), MissingField> {
        for entry in table {
            if entry.required && !self.has_field(entry.field) {
                return Err(MissingField {
                    tag: entry.tag,
                    field: entry.field,
                });
            }
        }
        Ok(())
    }

    fn has_field(&self, field: &str) -> bool {
        match field {
            "api_key" => self.api_key.is_some(),
            "external_reference" => self.external_reference.is_some(),
            "timestamp" => self.timestamp.is_some(),
            "distributor_id" => self.distributor_id.is_some(),
            "tour_code" => self.tour_code.is_some(),
            "tour_date" => self.tour_date.is_some(),
            "start_date" => self.start_date.is_some(),
            "end_date" => self.end_date.is_some(),
            "voucher_number" => self.voucher_number.is_some(),
            "basis_id" => self.basis_id.is_some(),
            "sub_basis_id" => self.sub_basis_id.is_some(),
            "tour_time_id" => self.tour_time_id.is_some(),
            "pax_adults" | "pax_infants" | "pax_child" | "pax_foc" | "pax_udef1" => {
                self.pax.is_some()
            }
            "default_pickup_key" => self.default_pickup_key.is_some(),
            "pickup_point" => self.pickup_point.is_some(),
            "first_name" => self.first_name.is_some(),
            "last_name" => self.last_name.is_some(),
            "traveller_identifier" => self.traveller_identifier.is_some(),
            "email" => self.email.is_some(),
            "mobile" => self.mobile.is_some(),
            _ => false,
        }
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or("")
    }

    pub fn external_reference(&self) -> &str {
        self.external_reference.as_deref().unwrap_or("")
    }

    pub fn distributor_id(&self) -> &str {
        self.distributor_id.as_deref().unwrap_or("")
    }

    pub fn tour_code(&self) -> &str {
        self.tour_code.as_deref().unwrap_or("")
    }

    pub fn traveller_identifier(&self) -> &str {
        self.traveller_identifier.as_deref().unwrap_or("")
    }

    /// Whether the partner supplied a complete basis/sub-basis/time triple.
    pub fn basis_triple(&self) -> Option<(String, String, String)> {
        match (&self.basis_id, &self.sub_basis_id, &self.tour_time_id) {
            (Some(b), Some(s), Some(t)) => Some((b.clone(), s.clone(), t.clone())),
            _ => None,
        }
    }

    /// Builds the canonical reservation from the extracted fields. Only
    /// valid after `check_required(BOOKING_FIELDS)` has passed.
    pub fn to_reservation(&self, host_id: &str, pickup_key: String) -> Reservation {
        let mut reservation = Reservation {
            host_id: host_id.to_string(),
            tour_code: self.tour_code().to_string(),
            voucher_number: self.voucher_number.clone().unwrap_or_default(),
            tour_date: self.tour_date.clone().unwrap_or_default(),
            basis_id: self.basis_id.clone().unwrap_or_default(),
            sub_basis_id: self.sub_basis_id.clone().unwrap_or_default(),
            tour_time_id: self.tour_time_id.clone().unwrap_or_default(),
            pax: self.pax.unwrap_or_default(),
            first_name: self.first_name.clone().unwrap_or_default(),
            last_name: self.last_name.clone().unwrap_or_default(),
            email: self.email.clone(),
            mobile: self.mobile.clone(),
            pickup_key,
            general_comments: String::new(),
        };
        for (key, value) in &self.comments {
            reservation.append_comment(key, value);
        }
        reservation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn booking_doc(tour_options: &str, traveller_mix: &str) -> XmlDocument {
        let raw = format!(
            r#"<BookingRequest>
                <ApiKey>vronkeyhost1</ApiKey>
                <ExternalReference>REF-1</ExternalReference>
                <Timestamp>2024-03-01T10:00:00Z</Timestamp>
                <ResellerId>1000</ResellerId>
                <SupplierId>1004</SupplierId>
                <SupplierProductCode>GBR001</SupplierProductCode>
                <TravelDate>2024-04-05</TravelDate>
                <BookingReference>VCH-9</BookingReference>
                <TourOptions>{tour_options}</TourOptions>
                {traveller_mix}
                <PickupPoint>Town Hall</PickupPoint>
                <Traveller>
                    <LeadTraveller>true</LeadTraveller>
                    <GivenName>Jane</GivenName>
                    <Surname>Doe</Surname>
                    <TravellerIdentifier>T-1</TravellerIdentifier>
                    <AgeBand>ADULT</AgeBand>
                </Traveller>
                <ContactDetail>
                    <ContactType>EMAIL</ContactType>
                    <ContactValue>jane@example.com</ContactValue>
                </ContactDetail>
            </BookingRequest>"#
        );
        XmlDocument::parse(raw.as_bytes())
    }

    fn full_options() -> &'static str {
        "<Option><Name>Basis</Name><Value>B=30;S=37;T=38</Value></Option>\
         <Option><Name>AgeBandMap</Name><Value>A=P1;C=P3;Y=P1;I=P2;S=P1</Value></Option>\
         <Option><Name>DefaultPickup</Name><Value>PK-DEFAULT</Value></Option>"
    }

    fn full_mix() -> &'static str {
        "<TravellerMix><Adult>2</Adult><Child>1</Child><Youth>0</Youth><Infant>1</Infant><Senior>0</Senior></TravellerMix>"
    }

    #[test_case("B=30;S=37;T=38"; "canonical order")]
    #[test_case("T=38;B=30;S=37"; "time first")]
    #[test_case("S=37;T=38;B=30"; "sub first")]
    fn test_basis_round_trip(content: &str) {
        let (b, s, t) = decompose_basis(content);
        let recomposed = compose_basis(b.as_deref().unwrap(), s.as_deref().unwrap(), t.as_deref().unwrap());
        assert_eq!(recomposed, "B=30;S=37;T=38");
    }

    #[test]
    fn test_basis_malformed_pairs_stay_unset() {
        let (b, s, t) = decompose_basis("B=30;S;T=38");
        assert_eq!(b.as_deref(), Some("30"));
        assert!(s.is_none());
        assert_eq!(t.as_deref(), Some("38"));

        // a single pair is not a compound value
        let (b, s, t) = decompose_basis("B=30");
        assert!(b.is_none() && s.is_none() && t.is_none());
    }

    #[test_case("2024-01-05"; "january")]
    #[test_case("2024-12-31"; "december")]
    #[test_case("2023-02-28"; "february")]
    fn test_date_round_trip(date: &str) {
        let backend = to_backend_date(date).unwrap();
        assert_eq!(from_backend_date(&backend).as_deref(), Some(date));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(to_backend_date("2024-04-05").as_deref(), Some("2024-Apr-05"));
        assert_eq!(from_backend_date("2024-Apr-05").as_deref(), Some("2024-04-05"));
        assert!(to_backend_date("05/04/2024").is_none());
    }

    #[test]
    fn test_extract_full_booking() {
        let req = ViatorRequest::extract(booking_doc(full_options(), full_mix()));
        assert_eq!(req.api_key(), "vronkeyhost1");
        assert_eq!(req.tour_date.as_deref(), Some("2024-Apr-05"));
        assert_eq!(req.basis_id.as_deref(), Some("30"));
        assert_eq!(req.sub_basis_id.as_deref(), Some("37"));
        assert_eq!(req.tour_time_id.as_deref(), Some("38"));
        assert_eq!(req.default_pickup_key.as_deref(), Some("PK-DEFAULT"));
        let pax = req.pax.unwrap();
        // Adult 2 + Youth 0 + Senior 0 -> P1; Child 1 -> P3; Infant 1 -> P2
        assert_eq!(pax.adults, 2);
        assert_eq!(pax.children, 1);
        assert_eq!(pax.infants, 1);
        assert_eq!(pax.total(), 4);
        assert_eq!(req.first_name.as_deref(), Some("Jane"));
        assert_eq!(req.email.as_deref(), Some("jane@example.com"));
        assert!(req.check_required(BOOKING_FIELDS).is_ok());
    }

    #[test]
    fn test_age_band_map_missing_category_fails_on_tag() {
        // Youth is missing from the map
        let options = "<Option><Name>Basis</Name><Value>B=30;S=37;T=38</Value></Option>\
             <Option><Name>AgeBandMap</Name><Value>A=P1;C=P3;I=P2;S=P1</Value></Option>\
             <Option><Name>DefaultPickup</Name><Value>PK-DEFAULT</Value></Option>";
        let req = ViatorRequest::extract(booking_doc(options, full_mix()));
        assert!(req.pax.is_none());
        let missing = req.check_required(BOOKING_FIELDS).unwrap_err();
        assert_eq!(missing.tag, "AgeBandMap");
    }

    #[test]
    fn test_missing_traveller_mix_abandons_aggregation() {
        let req = ViatorRequest::extract(booking_doc(full_options(), ""));
        assert!(req.pax.is_none());
    }

    #[test]
    fn test_check_required_names_first_missing_field() {
        let doc = XmlDocument::parse(b"<BookingRequest><ApiKey>k</ApiKey></BookingRequest>");
        let req = ViatorRequest::extract(doc);
        let missing = req.check_required(BOOKING_FIELDS).unwrap_err();
        assert_eq!(missing.tag, "ExternalReference");
        assert_eq!(missing.to_string(), "ExternalReference - external_reference");
    }

    #[test]
    fn test_invalid_travel_date_fails_required_check() {
        let raw = br#"<BookingRequest><TravelDate>not-a-date</TravelDate></BookingRequest>"#;
        let req = ViatorRequest::extract(XmlDocument::parse(raw));
        assert!(req.travel_date.is_some());
        assert!(req.tour_date.is_none());
    }

    #[test]
    fn test_comment_aggregation_order() {
        let raw = br#"<BookingRequest>
            <LanguageCode>en</LanguageCode>
            <QuestionAnswer><Question>dietary</Question><Answer>vegetarian</Answer></QuestionAnswer>
            <SpecialRequirement>wheelchair</SpecialRequirement>
            <Traveller><LeadTraveller>true</LeadTraveller><AgeBand>ADULT</AgeBand></Traveller>
        </BookingRequest>"#;
        let req = ViatorRequest::extract(XmlDocument::parse(raw));
        let reservation = req.to_reservation("host1", "PK-1".to_string());
        assert_eq!(
            reservation.general_comments,
            "language_code=en;age_band=ADULT;dietary=vegetarian;special_requirement=wheelchair"
        );
    }

    #[test]
    fn test_mobile_contact_routing() {
        let raw = br#"<BookingRequest>
            <ContactDetail><ContactType>MOBILE</ContactType><ContactValue>+61400000000</ContactValue></ContactDetail>
        </BookingRequest>"#;
        let req = ViatorRequest::extract(XmlDocument::parse(raw));
        assert_eq!(req.mobile.as_deref(), Some("+61400000000"));
        assert!(req.email.is_none());
    }
}
