//! Scoped ownership of an open transport.

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use super::traits::{Transport, TransportError, TransportKind};

/// Opens a transport on construction and closes it when dropped.
///
/// Release runs on every exit path of the owning scope, including early
/// returns through `?` and unwinding. Close errors are logged, not raised.
pub struct PortGuard<T: Transport> {
    inner: Option<T>,
}

impl<T: Transport> PortGuard<T> {
    pub fn open(mut transport: T) -> Result<Self, TransportError> {
        if !transport.is_open() {
            transport.open()?;
        }
        Ok(Self {
            inner: Some(transport),
        })
    }

    /// Close now and surface the result instead of logging it.
    pub fn close(mut self) -> Result<(), TransportError> {
        match self.inner.take() {
            Some(mut transport) => transport.close(),
            None => Ok(()),
        }
    }

    /// Give up scoped ownership without closing.
    pub fn into_inner(mut self) -> Option<T> {
        self.inner.take()
    }
}

impl<T: Transport> Deref for PortGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // `inner` is only None after `close`/`into_inner`, which consume self.
        self.inner.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Transport> DerefMut for PortGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.inner.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Transport> Transport for PortGuard<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn is_available(&self) -> Option<bool> {
        (**self).is_available()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(len)
    }

    fn kind(&self) -> Option<TransportKind> {
        (**self).kind()
    }
}

impl<T: Transport> Drop for PortGuard<T> {
    fn drop(&mut self) {
        if let Some(transport) = self.inner.as_mut() {
            if let Err(e) = transport.close() {
                warn!(error = %e, "Close on scope exit failed");
            } else {
                debug!("Transport closed on scope exit");
            }
        }
    }
}
