//! Request ids and per-request tracing spans.
//!
//! [`RequestIdFairing`] opens a span for every incoming request and echoes
//! the request id back in the `X-Request-Id` response header. Handlers that
//! need to log inside the request span take a [`TracingSpan`] guard.
use std::fmt;

use rocket::{
    Data, Response,
    fairing::{Fairing, Info, Kind},
    http::Status,
    request::{self, FromRequest, Request},
};
use sentry::configure_scope;
use tracing::Span;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RequestId {
    /// Uses the id supplied by an upstream proxy when it looks sane,
    /// otherwise mints a new one.
    fn from_header(header: Option<&str>) -> RequestId {
        match header {
            Some(id)
                if !id.is_empty()
                    && id.len() <= 128
                    && id.bytes().all(|b| b.is_ascii_graphic()) =>
            {
                RequestId(id.to_string())
            }
            _ => RequestId(Uuid::new_v4().to_string()),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestId {
    type Error = ();

    async fn from_request(
        request: &'r Request<'_>,
    ) -> request::Outcome<Self, Self::Error> {
        // cached so that every guard in one request sees the same id
        request::Outcome::Success(
            request
                .local_cache(|| {
                    RequestId::from_header(
                        request.headers().get_one(REQUEST_ID_HEADER),
                    )
                })
                .clone(),
        )
    }
}

/// Tags error reports sent from the current sentry scope with the id.
pub fn tag_scope(request_id: &RequestId) {
    configure_scope(|scope| {
        scope.set_tag("request_id", request_id);
    });
}

pub struct TracingSpan<T = tracing::Span>(pub T);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TracingSpan {
    type Error = ();

    async fn from_request(
        request: &'r Request<'_>,
    ) -> rocket::request::Outcome<Self, ()> {
        match request.local_cache(|| TracingSpan::<Option<Span>>(None)) {
            TracingSpan(Some(span)) => {
                rocket::request::Outcome::Success(TracingSpan(span.to_owned()))
            }
            TracingSpan(None) => rocket::request::Outcome::Error((
                Status::InternalServerError,
                (),
            )),
        }
    }
}

pub struct RequestIdFairing;

#[rocket::async_trait]
impl Fairing for RequestIdFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request ID fairing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let request_id = req.guard::<RequestId>().await;
        let user_agent = req.headers().get_one("User-Agent").unwrap_or("");

        if let request::Outcome::Success(request_id) = request_id {
            let span = tracing::info_span!(
                "request",
                http.method = %req.method(),
                http.route = %req.uri().path(),
                http.user_agent = %user_agent,
                http.status_code = tracing::field::Empty,
                request_id = %request_id,
            );
            span.in_scope(|| {
                tracing::debug!("received request");
                tag_scope(&request_id);
            });
            req.local_cache(|| {
                TracingSpan::<Option<tracing::Span>>(Some(span))
            });
        }
    }

    async fn on_response<'r>(
        &self,
        req: &'r Request<'_>,
        res: &mut Response<'r>,
    ) {
        let request_id = req.guard::<RequestId>().await;

        if let Some(span) = req
            .local_cache(|| TracingSpan::<Option<Span>>(None))
            .0
            .to_owned()
        {
            let entered = span.entered();
            entered.record("http.status_code", res.status().code);
            if res.status().code >= 500 {
                tracing::warn!(status = %res.status(), "request failed");
            } else {
                tracing::debug!(status = %res.status(), "request finished");
            }
        }

        if let request::Outcome::Success(request_id) = request_id {
            res.set_raw_header(REQUEST_ID_HEADER, request_id.to_string());
        }
    }
}
