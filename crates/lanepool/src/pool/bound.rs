use super::ObjectId;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Objects bound to a lane, keyed by [`ObjectId`].
///
/// Each lane owns exactly one table. The pool only reaches it through the
/// routing layer, so all traffic for one object lands on the same table.
pub struct BoundObjects<O> {
    objects: RwLock<HashMap<ObjectId, O>>,
}

impl<O> Default for BoundObjects<O> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }
}

fn check_id(id: ObjectId) -> Result<()> {
    if id <= 0 {
        return Err(Error::invalid(format!("object id must be positive, got {id}")));
    }
    Ok(())
}

impl<O> BoundObjects<O> {
    /// Binds `object` to `id`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id <= 0`.
    pub fn update(&self, id: ObjectId, object: O) -> Result<()> {
        check_id(id)?;
        self.objects.write().insert(id, object);
        Ok(())
    }

    /// Unbinds `id`, returning the object if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id <= 0`.
    pub fn remove(&self, id: ObjectId) -> Result<Option<O>> {
        check_id(id)?;
        let mut objects = self.objects.write();
        let removed = objects.remove(&id);
        if objects.is_empty() {
            objects.shrink_to_fit();
        }
        Ok(removed)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Bound ids, in no particular order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.read().keys().copied().collect()
    }

    /// Runs `f` with shared access to the whole table.
    pub fn with<T>(&self, f: impl FnOnce(&HashMap<ObjectId, O>) -> T) -> T {
        f(&self.objects.read())
    }

    /// Runs `f` with exclusive access to the whole table.
    pub fn with_mut<T>(&self, f: impl FnOnce(&mut HashMap<ObjectId, O>) -> T) -> T {
        f(&mut self.objects.write())
    }
}

impl<O: Clone> BoundObjects<O> {
    /// Returns a copy of the object bound to `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `id <= 0`.
    /// - [`Error::NoSuchObject`] if nothing is bound to `id`.
    pub fn get(&self, id: ObjectId) -> Result<O> {
        check_id(id)?;
        self.objects
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::NoSuchObject { object: id })
    }

    /// Copies the whole table.
    pub fn snapshot(&self) -> HashMap<ObjectId, O> {
        self.objects.read().clone()
    }
}
