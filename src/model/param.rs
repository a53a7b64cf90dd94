//! Named parameter buffers with gradients.
//!
//! A [`Param`] is a shared handle: cloning it clones the handle, not the
//! buffer, so a model and an optimizer can hold the same parameter without
//! borrow gymnastics. All access goes through closures, which keeps the
//! locking invisible at call sites.

use std::sync::{Arc, RwLock};

struct Inner {
    data: Vec<f32>,
    grad: Vec<f32>,
}

/// A flat f32 parameter with an accumulated gradient of the same shape.
#[derive(Clone)]
pub struct Param {
    name: String,
    inner: Arc<RwLock<Inner>>,
}

impl Param {
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        let grad = vec![0.0; data.len()];
        Self {
            name: name.into(),
            inner: Arc::new(RwLock::new(Inner { data, grad })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.inner.read().expect("param lock poisoned").data.len()
    }

    /// Read-only view of the values.
    pub fn with_data<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        f(&self.inner.read().expect("param lock poisoned").data)
    }

    /// Mutable view of values and gradient together (the optimizer's view).
    pub fn update<R>(&self, f: impl FnOnce(&mut [f32], &mut [f32]) -> R) -> R {
        let mut inner = self.inner.write().expect("param lock poisoned");
        let Inner { data, grad } = &mut *inner;
        f(data, grad)
    }

    /// Add to the gradient buffer (accumulating, as backward passes do).
    pub fn accumulate_grad(&self, f: impl FnOnce(&mut [f32])) {
        f(&mut self.inner.write().expect("param lock poisoned").grad)
    }

    pub fn zero_grad(&self) {
        self.inner
            .write()
            .expect("param lock poisoned")
            .grad
            .fill(0.0);
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.inner.read().expect("param lock poisoned").data.clone()
    }

    pub fn grad_vec(&self) -> Vec<f32> {
        self.inner.read().expect("param lock poisoned").grad.clone()
    }

    /// Overwrite the values; lengths must match.
    pub fn set_data(&self, values: &[f32]) {
        let mut inner = self.inner.write().expect("param lock poisoned");
        debug_assert_eq!(inner.data.len(), values.len());
        inner.data.copy_from_slice(values);
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
