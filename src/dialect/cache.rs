use crate::error::InitError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

type Entry = Result<Arc<dyn Any + Send + Sync>, InitError>;

/// Lazily computed value per Rust type. Each type is initialized at most once,
/// concurrent callers wait for the first computation, and failures are cached
/// like successes.
#[derive(Default)]
pub(crate) struct TypeCache {
    slots: RwLock<HashMap<TypeId, Arc<OnceLock<Entry>>>>,
}

impl TypeCache {
    pub(crate) fn get_or_init<T>(
        &self,
        key: TypeId,
        init: impl FnOnce() -> Result<T, InitError>,
    ) -> Result<Arc<T>, InitError>
    where
        T: Send + Sync + 'static,
    {
        let slot = self.slot(key);
        let entry = slot.get_or_init(|| init().map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>));
        match entry {
            Ok(value) => Arc::clone(value).downcast::<T>().map_err(|_| {
                InitError::new(
                    std::any::type_name::<T>(),
                    "cached metadata has an unexpected type",
                )
            }),
            Err(err) => Err(err.clone()),
        }
    }

    fn slot(&self, key: TypeId) -> Arc<OnceLock<Entry>> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_initializes_once() {
        let cache = TypeCache::default();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = cache
                .get_or_init(TypeId::of::<u8>(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(41u32 + 1)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_cached() {
        let cache = TypeCache::default();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let err = cache
                .get_or_init::<u32>(TypeId::of::<u16>(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(InitError::new("Broken", "no fields"))
                })
                .unwrap_err();
            assert_eq!(err.message, "no fields");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_value() {
        let cache = Arc::new(TypeCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache
                        .get_or_init(TypeId::of::<String>(), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(String::from("shared"))
                        })
                        .unwrap()
                })
            })
            .collect();
        let values: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
