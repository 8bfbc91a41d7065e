//! Opaque caller-supplied context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Arbitrary value a caller attaches to a request.
///
/// It travels with the request to listeners and cache-key factories for
/// attribution and debugging. It never affects cache-key equality.
#[derive(Clone)]
pub struct CallerContext(Arc<dyn Any + Send + Sync>);

impl CallerContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for CallerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.downcast_ref::<&'static str>() {
            Some(label) => write!(f, "CallerContext({label})"),
            None => match self.downcast_ref::<String>() {
                Some(label) => write!(f, "CallerContext({label})"),
                None => f.write_str("CallerContext(..)"),
            },
        }
    }
}
