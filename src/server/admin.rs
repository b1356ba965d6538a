use super::AdminState;
use crate::engine::HealthStatus;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use serde::Serialize;
use std::collections::BTreeMap;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<BoxBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static(content_type));
    resp
}

fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<BoxBody> {
    match serde_json::to_string_pretty(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "application/json",
            format!(r#"{{"error":"{}"}}"#, e),
        ),
    }
}

pub fn handle_admin<B>(req: Request<B>, state: AdminState) -> Result<Response<BoxBody>, hyper::Error> {
    let engine = &state.engine;
    let resp = match req.uri().path() {
        "/health" | "/healthz" => {
            let report = engine.health_status();
            let status = match report.status {
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
                HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            };
            json(status, &report)
        }

        "/metrics" => match state.metrics {
            Some(ref m) => respond(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                m.render(),
            ),
            None => respond(StatusCode::NOT_FOUND, "application/json", r#"{"error":"metrics disabled"}"#),
        },

        "/routes" => {
            let routes = engine.routes();
            let routes: Vec<_> = routes.iter().map(|r| r.as_ref()).collect();
            json(StatusCode::OK, &routes)
        }

        "/routes/metrics" => {
            let all: BTreeMap<_, _> = engine.all_metrics().into_iter().collect();
            json(StatusCode::OK, &all)
        }

        "/circuit-breakers" => {
            let all: BTreeMap<_, _> = engine.circuit_breaker_states().into_iter().collect();
            json(StatusCode::OK, &all)
        }

        _ => respond(StatusCode::NOT_FOUND, "application/json", r#"{"error":"not found"}"#),
    };
    Ok(resp)
}
