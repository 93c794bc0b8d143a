use crate::ProviderError;
use serde::Serialize;
use serde_json::Value;
use std::{future::Future, pin::Pin};

// Helper type alias
pub(crate) type PinBoxFut<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Serializes a value into a JSON value which can be placed in a request's
/// `params` array. Only used for types whose serialization cannot fail.
pub(crate) fn serialize<T: Serialize>(t: &T) -> Value {
    serde_json::to_value(t).expect("Failed to serialize value")
}

/// Calls the future if `item` is None, otherwise returns a `futures::ok`
pub(crate) async fn maybe<F, T, E>(item: Option<T>, f: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    if let Some(item) = item {
        futures_util::future::ok(item).await
    } else {
        f.await
    }
}
