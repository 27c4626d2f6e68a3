use axum::http::{HeaderName, HeaderValue};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

/// Header carrying the correlation id across services and log lines.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone, Default)]
pub struct MakeUuidCorrelationId;

impl MakeRequestId for MakeUuidCorrelationId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Assign a correlation id to requests that arrive without one.
pub fn correlation_id_layer() -> SetRequestIdLayer<MakeUuidCorrelationId> {
    SetRequestIdLayer::new(
        HeaderName::from_static(CORRELATION_ID_HEADER),
        MakeUuidCorrelationId,
    )
}

/// Echo the request's correlation id on the response.
///
/// Apply inside `correlation_id_layer()`:
/// `.layer(propagate_correlation_id_layer()).layer(correlation_id_layer())`.
pub fn propagate_correlation_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(CORRELATION_ID_HEADER))
}
