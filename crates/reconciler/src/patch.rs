//! Create/update/delete instructions computed by a resource.

/// Up to three change payloads bridging current state to desired state.
///
/// Slots left `None` are skipped by the pipeline. Producers are expected to
/// leave a slot empty rather than fill it with an empty collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch<T> {
    create: Option<T>,
    update: Option<T>,
    delete: Option<T>,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Patch<T> {
    /// Create an empty patch.
    pub const fn new() -> Self {
        Self {
            create: None,
            update: None,
            delete: None,
        }
    }

    /// Build a patch from its three slots.
    pub const fn from_parts(create: Option<T>, update: Option<T>, delete: Option<T>) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }

    /// Set the create change.
    #[must_use]
    pub fn with_create(mut self, change: T) -> Self {
        self.create = Some(change);
        self
    }

    /// Set the update change.
    #[must_use]
    pub fn with_update(mut self, change: T) -> Self {
        self.update = Some(change);
        self
    }

    /// Set the delete change.
    #[must_use]
    pub fn with_delete(mut self, change: T) -> Self {
        self.delete = Some(change);
        self
    }

    /// The create change, if any.
    pub const fn create(&self) -> Option<&T> {
        self.create.as_ref()
    }

    /// The update change, if any.
    pub const fn update(&self) -> Option<&T> {
        self.update.as_ref()
    }

    /// The delete change, if any.
    pub const fn delete(&self) -> Option<&T> {
        self.delete.as_ref()
    }

    /// Whether no slot carries a change.
    pub const fn is_empty(&self) -> bool {
        self.create.is_none() && self.update.is_none() && self.delete.is_none()
    }

    /// Map every present slot through `f`.
    pub fn map<U, F>(self, mut f: F) -> Patch<U>
    where
        F: FnMut(T) -> U,
    {
        Patch {
            create: self.create.map(&mut f),
            update: self.update.map(&mut f),
            delete: self.delete.map(&mut f),
        }
    }

    /// Split the patch into its slots.
    pub fn into_parts(self) -> (Option<T>, Option<T>, Option<T>) {
        (self.create, self.update, self.delete)
    }
}
