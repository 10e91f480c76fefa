//! Exclusive ownership of engine resources.
//!
//! Every façade object keeps its engine state inside a [`Handle`]. The handle
//! is move-only: it can be closed explicitly or dropped, and the resource is
//! released exactly once either way. Access after `close()` is a typed
//! [`XtrustError::Closed`] instead of a dangling reference.

use crate::XtrustError;

/// An engine resource that can live inside a [`Handle`].
pub trait EngineResource {
    /// Short name of the resource kind, used in logs and errors.
    const KIND: &'static str;
}

/// Owning wrapper around exactly one engine resource.
pub struct Handle<T: EngineResource> {
    resource: Option<T>,
}

impl<T: EngineResource> Handle<T> {
    pub(crate) fn new(resource: T) -> Self {
        tracing::trace!(kind = T::KIND, "handle acquired");
        Handle {
            resource: Some(resource),
        }
    }

    /// Borrow the resource, failing if the handle was closed.
    pub fn get(&self) -> Result<&T, XtrustError> {
        self.resource
            .as_ref()
            .ok_or(XtrustError::Closed { kind: T::KIND })
    }

    /// Mutably borrow the resource, failing if the handle was closed.
    pub fn get_mut(&mut self) -> Result<&mut T, XtrustError> {
        self.resource
            .as_mut()
            .ok_or(XtrustError::Closed { kind: T::KIND })
    }

    /// Release the resource. Closing an already-closed handle does nothing.
    pub fn close(&mut self) {
        if self.resource.take().is_some() {
            tracing::trace!(kind = T::KIND, "handle released");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.resource.is_none()
    }
}

impl<T: EngineResource> Drop for Handle<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: EngineResource> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &T::KIND)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counted(Rc<Cell<u32>>);

    impl EngineResource for Counted {
        const KIND: &'static str = "counted";
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn close_releases_once() {
        let releases = Rc::new(Cell::new(0));
        let mut handle = Handle::new(Counted(releases.clone()));
        handle.close();
        handle.close();
        drop(handle);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn drop_releases_unclosed_handle() {
        let releases = Rc::new(Cell::new(0));
        {
            let _handle = Handle::new(Counted(releases.clone()));
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn use_after_close_is_an_error() {
        let mut handle = Handle::new(Counted(Rc::new(Cell::new(0))));
        assert!(handle.get().is_ok());
        handle.close();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.get(),
            Err(XtrustError::Closed { kind: "counted" })
        ));
        assert!(handle.get_mut().is_err());
    }
}
