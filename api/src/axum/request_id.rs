use http::{HeaderValue, Request};
use sentry::types::Uuid;
use tower_http::request_id::{MakeRequestId, RequestId};

/// Stamps every request with a random UUID.
#[derive(Clone, Default)]
pub struct RequestIdMaker {}

impl MakeRequestId for RequestIdMaker {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}
