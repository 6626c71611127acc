//! Typed RON client over the XML-RPC codec.
//!
//! One `Ron` instance serves exactly one inbound partner request: login
//! acquires the session token, every later call carries it on the URL, and
//! the first fault leaves its text behind for the dispatcher to surface.

use std::time::Duration;

use async_trait::async_trait;

use vron_core::backend::{
    AvailabilityDay, AvailabilityQuery, PickupRecord, RonApi, RonConnector, TourBasis,
    TourRecord, TourTime, WebDetails,
};
use vron_core::model::Reservation;

use crate::xmlrpc::{self, RonError, Value};

/// Endpoint selection. Never changes mid-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Live,
}

impl Mode {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("live") {
            Mode::Live
        } else {
            Mode::Train
        }
    }
}

#[derive(Debug, Clone)]
pub struct RonConfig {
    pub username: String,
    pub password: String,
    pub test_url: String,
    pub live_url: String,
    pub mode: Mode,
    pub timeout_secs: u64,
}

impl RonConfig {
    pub fn endpoint(&self) -> &str {
        match self.mode {
            Mode::Live => &self.live_url,
            Mode::Train => &self.test_url,
        }
    }
}

/// Hands out one request-scoped `Ron` session per inbound call, sharing
/// the HTTP connection pool underneath.
pub struct RonGateway {
    config: RonConfig,
    http: reqwest::Client,
}

impl RonGateway {
    pub fn new(config: RonConfig) -> Result<Self, RonError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(RonGateway { config, http })
    }
}

impl RonConnector for RonGateway {
    fn connect(&self) -> Box<dyn RonApi> {
        Box::new(Ron::new(self.http.clone(), &self.config))
    }
}

pub struct Ron {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    host_id: String,
    session_id: String,
    error_message: Option<String>,
}

impl Ron {
    pub fn new(http: reqwest::Client, config: &RonConfig) -> Self {
        Ron {
            http,
            url: config.endpoint().to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            host_id: String::new(),
            session_id: String::new(),
            error_message: None,
        }
    }

    /// The session token rides on the query string after login, unless the
    /// configured URL already pins one.
    fn call_url(&self) -> String {
        if !self.session_id.is_empty() && !self.url.contains("PHPSESSID") {
            format!("{}&{}", self.url, self.session_id)
        } else {
            self.url.clone()
        }
    }

    async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, RonError> {
        let body = xmlrpc::encode_call(method, &params);
        tracing::debug!(method, url = %self.call_url(), "ron call");
        let response = self
            .http
            .post(self.call_url())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?;
        let text = response.text().await?;
        xmlrpc::decode_response(&text)
    }

    /// Collapses a call result to the `Option` contract: `None` on fault,
    /// with the fault text captured for the caller.
    fn capture<T>(&mut self, result: Result<T, RonError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!("ron fault: {}", error);
                self.error_message = Some(error.fault_text());
                None
            }
        }
    }
}

fn pickup_from(value: &Value) -> Option<PickupRecord> {
    Some(PickupRecord {
        pickup_key: value.field("strPickupKey")?.text_value()?,
        pickup_name: value.field("strPickupName")?.text_value()?,
        pickup_time: value.field("dtePickupTime").and_then(Value::text_value),
    })
}

fn tour_time_from(value: &Value) -> Option<TourTime> {
    Some(TourTime {
        tour_time_id: value.field("intTimeID")?.text_value()?,
        name: value
            .field("strTourTime")
            .and_then(Value::text_value)
            .unwrap_or_default(),
    })
}

fn tour_basis_from(value: &Value) -> Option<TourBasis> {
    Some(TourBasis {
        basis_id: value.field("intBasisID")?.text_value()?,
        sub_basis_id: value
            .field("intSubBasisID")
            .and_then(Value::text_value)
            .unwrap_or_default(),
        name: value
            .field("strBasisName")
            .and_then(Value::text_value)
            .unwrap_or_default(),
    })
}

fn tour_from(value: &Value) -> Option<TourRecord> {
    Some(TourRecord {
        tour_code: value.field("strTourCode")?.text_value()?,
        tour_name: value
            .field("strTourName")
            .and_then(Value::text_value)
            .unwrap_or_default(),
    })
}

fn availability_day_from(value: &Value) -> Option<AvailabilityDay> {
    Some(AvailabilityDay {
        tour_code: value.field("strTourCode")?.text_value()?,
        tour_date: value.field("dteTourDate")?.text_value()?,
        basis_id: value
            .field("intBasisID")
            .and_then(Value::text_value)
            .unwrap_or_default(),
        sub_basis_id: value
            .field("intSubBasisID")
            .and_then(Value::text_value)
            .unwrap_or_default(),
        tour_time_id: value
            .field("intTimeID")
            .and_then(Value::text_value)
            .unwrap_or_default(),
        vacancies: value
            .field("intVacancy")
            .and_then(Value::as_i32)
            .unwrap_or_default(),
    })
}

fn reservation_struct(reservation: &Reservation) -> Value {
    Value::Struct(vec![
        (
            "strTourCode".to_string(),
            Value::string(&reservation.tour_code),
        ),
        (
            "strVoucherNumber".to_string(),
            Value::string(&reservation.voucher_number),
        ),
        (
            "dteTourDate".to_string(),
            Value::string(&reservation.tour_date),
        ),
        (
            "intBasisID".to_string(),
            Value::string(&reservation.basis_id),
        ),
        (
            "intSubBasisID".to_string(),
            Value::string(&reservation.sub_basis_id),
        ),
        (
            "intTimeID".to_string(),
            Value::string(&reservation.tour_time_id),
        ),
        ("intPaxAdults".to_string(), Value::Int(reservation.pax.adults)),
        (
            "intPaxInfants".to_string(),
            Value::Int(reservation.pax.infants),
        ),
        (
            "intPaxChildren".to_string(),
            Value::Int(reservation.pax.children),
        ),
        ("intPaxFOC".to_string(), Value::Int(reservation.pax.foc)),
        ("intPaxUDef1".to_string(), Value::Int(reservation.pax.udef1)),
        (
            "strPickupKey".to_string(),
            Value::string(&reservation.pickup_key),
        ),
        (
            "strFirstName".to_string(),
            Value::string(&reservation.first_name),
        ),
        (
            "strLastName".to_string(),
            Value::string(&reservation.last_name),
        ),
        (
            "strEmailAddress".to_string(),
            Value::string(reservation.email.clone().unwrap_or_default()),
        ),
        (
            "strMobile".to_string(),
            Value::string(reservation.mobile.clone().unwrap_or_default()),
        ),
        (
            "strGeneralComment".to_string(),
            Value::string(&reservation.general_comments),
        ),
    ])
}

#[async_trait]
impl RonApi for Ron {
    fn set_host(&mut self, host_id: &str) {
        self.host_id = host_id.to_string();
    }

    async fn login(&mut self, reseller_id: &str) -> bool {
        let params = vec![
            Value::string(&self.username),
            Value::string(&self.password),
            Value::string(reseller_id),
        ];
        let result = self.call("login", params).await;
        match self.capture(result) {
            Some(value) => match value.text_value() {
                Some(session) if !session.is_empty() => {
                    self.session_id = session;
                    true
                }
                _ => {
                    self.error_message = Some("login returned no session token".to_string());
                    false
                }
            },
            None => false,
        }
    }

    async fn read_tour_pickups(
        &mut self,
        tour_code: &str,
        tour_time_id: &str,
        basis_id: &str,
    ) -> Option<Vec<PickupRecord>> {
        let params = vec![
            Value::string(&self.host_id),
            Value::string(tour_code),
            Value::string(tour_time_id),
            Value::string(basis_id),
        ];
        let result = self.call("readTourPickups", params).await;
        self.capture(result)
            .map(|value| value.items().iter().filter_map(pickup_from).collect())
    }

    async fn read_tour_times(&mut self, tour_code: &str) -> Option<Vec<TourTime>> {
        let params = vec![Value::string(&self.host_id), Value::string(tour_code)];
        let result = self.call("readTourTimes", params).await;
        self.capture(result)
            .map(|value| value.items().iter().filter_map(tour_time_from).collect())
    }

    async fn read_tour_bases(&mut self, tour_code: &str) -> Option<Vec<TourBasis>> {
        let params = vec![Value::string(&self.host_id), Value::string(tour_code)];
        let result = self.call("readTourBases", params).await;
        self.capture(result)
            .map(|value| value.items().iter().filter_map(tour_basis_from).collect())
    }

    async fn read_tours(&mut self) -> Option<Vec<TourRecord>> {
        let params = vec![Value::string(&self.host_id)];
        let result = self.call("readTours", params).await;
        self.capture(result)
            .map(|value| value.items().iter().filter_map(tour_from).collect())
    }

    async fn read_tour_web_details(&mut self, tour_code: &str) -> Option<WebDetails> {
        // Third argument suppresses base64 image payloads.
        let params = vec![
            Value::string(&self.host_id),
            Value::string(tour_code),
            Value::Bool(false),
        ];
        let result = self.call("readTourWebDetails", params).await;
        self.capture(result).map(|value| WebDetails {
            tour_name: value
                .field("strTourName")
                .and_then(Value::text_value)
                .unwrap_or_default(),
            description: value
                .field("strDescription")
                .and_then(Value::text_value)
                .unwrap_or_default(),
        })
    }

    async fn read_tour_availability_range(
        &mut self,
        queries: &[AvailabilityQuery],
    ) -> Option<Vec<AvailabilityDay>> {
        let data = Value::Array(
            queries
                .iter()
                .map(|query| {
                    Value::Struct(vec![
                        ("strHostID".to_string(), Value::string(&self.host_id)),
                        ("strTourCode".to_string(), Value::string(&query.tour_code)),
                        ("dteTourDate".to_string(), Value::string(&query.tour_date)),
                        ("intBasisID".to_string(), Value::string(&query.basis_id)),
                        (
                            "intSubBasisID".to_string(),
                            Value::string(&query.sub_basis_id),
                        ),
                        ("intTimeID".to_string(), Value::string(&query.tour_time_id)),
                    ])
                })
                .collect(),
        );
        let result = self.call("readTourAvailabilityRange", vec![data]).await;
        self.capture(result).map(|value| {
            value
                .items()
                .iter()
                .filter_map(availability_day_from)
                .collect()
        })
    }

    async fn read_payment_options(&mut self) -> Option<Vec<String>> {
        let params = vec![Value::string(&self.host_id)];
        let result = self.call("readPaymentOptions", params).await;
        self.capture(result).map(|value| {
            value
                .items()
                .iter()
                .filter_map(|item| {
                    item.field("strPaymentOption")
                        .and_then(Value::text_value)
                        .or_else(|| item.text_value())
                })
                .collect()
        })
    }

    async fn write_reservation(
        &mut self,
        reservation: &Reservation,
        payment_option: &str,
    ) -> Option<String> {
        let params = vec![
            Value::string(&self.host_id),
            Value::Int(-1),
            reservation_struct(reservation),
            Value::Struct(vec![(
                "strPaymentOption".to_string(),
                Value::string(payment_option),
            )]),
            Value::Struct(Vec::new()),
        ];
        let result = self.call("writeReservation", params).await;
        self.capture(result).and_then(|value| {
            value
                .text_value()
                .or_else(|| {
                    value
                        .field("strConfirmationNumber")
                        .and_then(Value::text_value)
                })
                .filter(|confirmation| !confirmation.is_empty())
        })
    }

    fn last_fault(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(url: &str) -> RonConfig {
        RonConfig {
            username: "vron".to_string(),
            password: "secret".to_string(),
            test_url: url.to_string(),
            live_url: "https://live.invalid/ron?api=1".to_string(),
            mode: Mode::Train,
            timeout_secs: 5,
        }
    }

    fn session(url: &str) -> Ron {
        Ron::new(reqwest::Client::new(), &config(url))
    }

    const LOGIN_OK: &str = r#"<methodResponse><params><param>
        <value><string>PHPSESSID=abc123</string></value>
    </param></params></methodResponse>"#;

    #[test]
    fn test_mode_selects_endpoint() {
        let mut cfg = config("https://test.invalid/ron?api=1");
        assert_eq!(cfg.endpoint(), "https://test.invalid/ron?api=1");
        cfg.mode = Mode::parse("LIVE");
        assert_eq!(cfg.endpoint(), "https://live.invalid/ron?api=1");
        assert_eq!(Mode::parse("anything-else"), Mode::Train);
    }

    #[test]
    fn test_call_url_appends_session_once() {
        let mut ron = session("https://test.invalid/ron?api=1");
        assert_eq!(ron.call_url(), "https://test.invalid/ron?api=1");
        ron.session_id = "PHPSESSID=abc123".to_string();
        assert_eq!(
            ron.call_url(),
            "https://test.invalid/ron?api=1&PHPSESSID=abc123"
        );

        // a URL that already pins a session is left alone
        let mut pinned = session("https://test.invalid/ron?PHPSESSID=fixed");
        pinned.session_id = "PHPSESSID=abc123".to_string();
        assert_eq!(pinned.call_url(), "https://test.invalid/ron?PHPSESSID=fixed");
    }

    #[tokio::test]
    async fn test_login_stores_session_token() {
        let server = MockServer::start();
        let login_mock = server.mock(|when, then| {
            when.method(POST).path("/ron");
            then.status(200)
                .header("content-type", "text/xml")
                .body(LOGIN_OK);
        });

        let mut ron = session(&server.url("/ron?api=1"));
        ron.set_host("host1");
        assert!(ron.login("1000").await);
        login_mock.assert();
        assert_eq!(ron.session_id, "PHPSESSID=abc123");
        assert!(ron.last_fault().is_none());
    }

    #[tokio::test]
    async fn test_logged_in_calls_carry_session_on_url() {
        let server = MockServer::start();
        let tours_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ron")
                .query_param("PHPSESSID", "abc123");
            then.status(200).header("content-type", "text/xml").body(
                r#"<methodResponse><params><param><value><array><data>
                    <value><struct>
                        <member><name>strTourCode</name><value>GBR001</value></member>
                        <member><name>strTourName</name><value>Reef Cruise</value></member>
                    </struct></value>
                </data></array></value></param></params></methodResponse>"#,
            );
        });

        let mut ron = session(&server.url("/ron?api=1"));
        ron.set_host("host1");
        ron.session_id = "PHPSESSID=abc123".to_string();

        let tours = ron.read_tours().await.unwrap();
        tours_mock.assert();
        assert_eq!(tours.len(), 1);
        assert_eq!(tours[0].tour_code, "GBR001");
        assert_eq!(tours[0].tour_name, "Reef Cruise");
    }

    #[tokio::test]
    async fn test_login_fault_captures_text() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ron");
            then.status(200).header("content-type", "text/xml").body(
                r#"<methodResponse><fault><value><struct>
                    <member><name>faultCode</name><value><int>4</int></value></member>
                    <member><name>faultString</name><value><string>bad credentials</string></value></member>
                </struct></value></fault></methodResponse>"#,
            );
        });

        let mut ron = session(&server.url("/ron?api=1"));
        assert!(!ron.login("1000").await);
        assert_eq!(ron.last_fault(), Some("bad credentials"));
    }

    #[tokio::test]
    async fn test_write_reservation_scalar_confirmation() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ron");
            then.status(200).header("content-type", "text/xml").body(
                r#"<methodResponse><params><param>
                    <value><string>CONF-42</string></value>
                </param></params></methodResponse>"#,
            );
        });

        let mut ron = session(&server.url("/ron?api=1"));
        ron.set_host("host1");
        let reservation = Reservation {
            tour_code: "GBR001".to_string(),
            ..Default::default()
        };
        let confirmation = ron.write_reservation(&reservation, "full-agent").await;
        assert_eq!(confirmation.as_deref(), Some("CONF-42"));
    }

    #[tokio::test]
    async fn test_transport_error_is_a_fault() {
        // nothing listens here; reqwest fails fast on the refused connection
        let mut ron = session("http://127.0.0.1:9/ron?api=1");
        let pickups = ron.read_tour_pickups("GBR001", "38", "30").await;
        assert!(pickups.is_none());
        assert!(ron.last_fault().is_some());
    }
}
