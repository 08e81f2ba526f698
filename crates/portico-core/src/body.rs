//! Request and response body types.
//!
//! Requests carry a streaming, boxed body so the JSON decoder can read frame by
//! frame and stop at its ceiling. Responses are always fully buffered.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::BoxError;

/// Streaming request body.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// HTTP request flowing through the pipeline.
pub type Request = http::Request<Body>;

/// HTTP response produced by the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Boxes any compatible body into [`Body`].
pub fn boxed<B>(body: B) -> Body
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A body with the given bytes.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty body.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}
