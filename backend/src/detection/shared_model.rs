use std::sync::{Mutex, PoisonError};

/// A loaded model behind a lock that survives a panicking forward pass.
///
/// Model weights are never mutated by inference, so a guard left poisoned
/// by an earlier panic is taken over instead of failing every later call.
pub struct SharedModel<M> {
    inner: Mutex<M>,
}

impl<M> SharedModel<M> {
    pub fn new(model: M) -> Self {
        Self {
            inner: Mutex::new(model),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn runs_closure_against_the_model() {
        let model = SharedModel::new(vec![1, 2, 3]);
        assert_eq!(model.with(|m| m.len()), 3);
    }

    #[test]
    fn keeps_serving_after_a_panic_inside_inference() {
        let model = SharedModel::new(41);

        let crashed = panic::catch_unwind(AssertUnwindSafe(|| {
            model.with(|value| {
                if *value == 41 {
                    panic!("forward pass failed");
                }
            });
        }));
        assert!(crashed.is_err());

        assert_eq!(model.with(|m| m + 1), 42);
    }
}
