use std::sync::{Arc, Mutex};

use crate::error::{AppError, AppResult};

/// Holds one expensive resource together with the parameters it was built
/// from. Asking again with equal parameters hands back the same instance;
/// different parameters replace it.
pub struct Memo<K, V> {
    slot: Mutex<Option<(K, Arc<V>)>>,
}

impl<K: PartialEq + Clone, V> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_build<E>(
        &self,
        key: &K,
        build: impl FnOnce(&K) -> Result<V, E>,
    ) -> AppResult<Arc<V>>
    where
        AppError: From<E>,
    {
        let mut slot = self.slot.lock()?;
        if let Some((cached_key, value)) = slot.as_ref() {
            if cached_key == key {
                return Ok(Arc::clone(value));
            }
        }

        let value = Arc::new(build(key)?);
        tracing::debug!("rebuilt memoized resource");
        *slot = Some((key.clone(), Arc::clone(&value)));
        Ok(value)
    }
}

impl<K: PartialEq + Clone, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_same_key_reuses_instance() {
        let memo: Memo<String, String> = Memo::new();
        let builds = Cell::new(0);
        let build = |k: &String| {
            builds.set(builds.get() + 1);
            Ok::<_, AppError>(format!("client for {k}"))
        };

        let a = memo.get_or_build(&"deepseek".to_string(), build).unwrap();
        let b = memo.get_or_build(&"deepseek".to_string(), build).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.get(), 1);
    }

    #[test]
    fn test_changed_key_rebuilds() {
        let memo: Memo<u16, u16> = Memo::new();
        let a = memo.get_or_build(&1, |k| Ok::<_, AppError>(*k)).unwrap();
        let b = memo.get_or_build(&2, |k| Ok::<_, AppError>(*k)).unwrap();
        assert_eq!((*a, *b), (1, 2));

        let c = memo.get_or_build(&2, |_| Ok::<_, AppError>(99)).unwrap();
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[test]
    fn test_failed_build_keeps_previous() {
        let memo: Memo<u16, u16> = Memo::new();
        memo.get_or_build(&1, |k| Ok::<_, AppError>(*k)).unwrap();

        let err = memo.get_or_build(&2, |_| Err(AppError::Internal("boom".into())));
        assert!(err.is_err());

        let again = memo.get_or_build(&1, |_| Ok::<_, AppError>(42)).unwrap();
        assert_eq!(*again, 1);
    }
}
