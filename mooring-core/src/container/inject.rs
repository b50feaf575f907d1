use std::{
    any::type_name,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use super::{service::ErasedValue, ContainerError};

/// Injection target for a dependency's value.
///
/// The container fills it right before the dependent's start body runs and
/// clears it after the dependent has stopped.
pub struct InjectedValue<T>(Arc<RwLock<Option<Arc<T>>>>);

impl<T> Clone for InjectedValue<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for InjectedValue<T> {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(None)))
    }
}

impl<T> fmt::Debug for InjectedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedValue")
            .field("type", &type_name::<T>())
            .field("injected", &self.get().is_some())
            .finish()
    }
}

impl<T> InjectedValue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Like [`get`](Self::get), failing when nothing is injected.
    pub fn value(&self) -> Result<Arc<T>, ContainerError> {
        self.get().ok_or(ContainerError::NoValue(type_name::<T>()))
    }

    fn set(&self, value: Option<Arc<T>>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

pub(crate) trait ErasedInjector: Send + Sync {
    fn inject(&self, value: Option<ErasedValue>) -> Result<(), ContainerError>;
    fn uninject(&self);
}

impl<T: Send + Sync + 'static> ErasedInjector for InjectedValue<T> {
    fn inject(&self, value: Option<ErasedValue>) -> Result<(), ContainerError> {
        match value {
            None => {
                self.set(None);
                Ok(())
            }
            Some(value) => {
                let typed = value
                    .downcast::<T>()
                    .map_err(|_| ContainerError::WrongValueType(type_name::<T>()))?;
                self.set(Some(typed));
                Ok(())
            }
        }
    }

    fn uninject(&self) {
        self.set(None);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ErasedInjector, InjectedValue};
    use crate::container::{service::ErasedValue, ContainerError};

    #[test]
    fn test_inject_checks_value_type() {
        let target = InjectedValue::<String>::new();
        let good: ErasedValue = Arc::new("hello".to_string());
        target.inject(Some(good)).unwrap();
        assert_eq!("hello", target.value().unwrap().as_str());

        let bad: ErasedValue = Arc::new(7u32);
        assert!(matches!(
            target.inject(Some(bad)),
            Err(ContainerError::WrongValueType(_))
        ));
        target.uninject();
        assert!(target.get().is_none());
    }
}
