use std::error::Error;
use std::sync::Arc;

/// Failure cause carried by a [`Slot::Failed`] marker.
///
/// Shared so that one failure can be handed verbatim to every consumer of a hub.
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// One entry of a relay's ring.
///
/// At most one terminal marker (`Completed` or `Failed`) ever enters a relay,
/// and it is always the last slot consumed.
#[derive(Debug)]
pub enum Slot<T> {
    /// A value written by the producer.
    Value(T),
    /// Normal end of stream.
    Completed,
    /// Abnormal end of stream.
    Failed(Cause),
}

impl<T> Slot<T> {
    /// Returns `true` for `Completed` and `Failed`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Value(_))
    }

    /// Copies a terminal marker, independent of the value type.
    ///
    /// Returns `None` for `Value`, since values are never replayed.
    pub fn terminal<U>(&self) -> Option<Slot<U>> {
        match self {
            Self::Value(_) => None,
            Self::Completed => Some(Slot::Completed),
            Self::Failed(cause) => Some(Slot::Failed(Arc::clone(cause))),
        }
    }
}
