use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    #[error("link not ready")]
    NotReady,
    #[error("transfer failed")]
    Io,
    #[error("frame of {0} bytes exceeds the link limit")]
    TooLarge(usize),
}

/// Byte sink for complete frames. One call is one atomic send: either the whole buffer
/// went out or the call reports failure.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes).await
    }
}
