//! Name-keyed diff between current and desired collections.

use std::collections::HashMap;

use itertools::{Either, Itertools};
use keel_core::{Error, Result};

use crate::patch::Patch;

/// Items identified by a unique name within a collection.
pub trait Named {
    fn name(&self) -> &str;
}

/// Field-level equality used to decide whether an item needs an update.
///
/// Implementations must be reflexive and symmetric and must ignore fields the
/// platform generates itself (revision counters, uids, creation timestamps).
/// Comparing those would make every pass produce an update.
pub trait Equivalent {
    fn equivalent(&self, other: &Self) -> bool;
}

/// Create/update/delete sets computed by [`diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<T> {
    /// Desired items with no current counterpart, in desired order.
    pub create: Vec<T>,
    /// Desired items whose current counterpart is not equivalent, in desired
    /// order.
    pub update: Vec<T>,
    /// Current items with no desired counterpart, in current order.
    pub delete: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<T> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Convert into a patch. Empty sets become empty slots.
    pub fn into_patch(self) -> Patch<Vec<T>> {
        let non_empty = |items: Vec<T>| (!items.is_empty()).then_some(items);
        Patch::from_parts(
            non_empty(self.create),
            non_empty(self.update),
            non_empty(self.delete),
        )
    }
}

/// Diff two collections using the items' [`Equivalent`] implementation.
pub fn diff<T>(current: &[T], desired: &[T]) -> Result<Diff<T>>
where
    T: Named + Equivalent + Clone,
{
    diff_by(current, desired, T::equivalent)
}

/// Diff two collections with an explicit equality predicate.
///
/// Names must be unique on each side; a repeated name is an
/// [`Error::DuplicateName`].
pub fn diff_by<T, F>(current: &[T], desired: &[T], mut eq: F) -> Result<Diff<T>>
where
    T: Named + Clone,
    F: FnMut(&T, &T) -> bool,
{
    let current_by_name = index_by_name(current, "current")?;
    let desired_by_name = index_by_name(desired, "desired")?;

    let (create, update): (Vec<T>, Vec<T>) = desired
        .iter()
        .filter_map(|want| match current_by_name.get(want.name()) {
            None => Some((true, want)),
            Some(&have) if !eq(have, want) => Some((false, want)),
            Some(_) => None,
        })
        .partition_map(|(is_new, item)| {
            if is_new {
                Either::Left(item.clone())
            } else {
                Either::Right(item.clone())
            }
        });

    let delete = current
        .iter()
        .filter(|have| !desired_by_name.contains_key(have.name()))
        .cloned()
        .collect();

    Ok(Diff {
        create,
        update,
        delete,
    })
}

fn index_by_name<'a, T: Named>(items: &'a [T], side: &str) -> Result<HashMap<&'a str, &'a T>> {
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        if index.insert(item.name(), item).is_some() {
            return Err(Error::duplicate_name(item.name(), side));
        }
    }
    Ok(index)
}
