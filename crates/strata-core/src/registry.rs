//! A registry of named schemas, each declared exactly once.
//!
//! Every name gets its own declaration lock. Concurrent first uses of the
//! same record type serialise on it and only one of them runs the
//! declarations, while `init` stays free to register other schemas, such as
//! its parent, through the same registry.

use std::{
  cell::RefCell,
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{Error, Result, schema::FieldSchema};

thread_local! {
  /// (registry address, name) pairs whose `init` is running on this thread.
  static DECLARING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
  schemas: Mutex<HashMap<String, Arc<FieldSchema>>>,
  pending: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Marks a name as being declared on this thread until dropped.
struct Declaring {
  key: (usize, String),
}

impl Declaring {
  fn enter(registry: &SchemaRegistry, name: &str) -> Result<Self> {
    let key = (std::ptr::from_ref(registry) as usize, name.to_string());
    DECLARING.with_borrow_mut(|active| {
      if active.contains(&key) {
        return Err(Error::RecursiveSchema(name.to_string()));
      }
      active.push(key.clone());
      Ok(Self { key })
    })
  }
}

impl Drop for Declaring {
  fn drop(&mut self) {
    DECLARING.with_borrow_mut(|active| active.retain(|k| k != &self.key));
  }
}

// Every map is updated with whole entries, so a poisoned lock still guards
// consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SchemaRegistry {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, name: &str) -> Option<Arc<FieldSchema>> {
    lock(&self.schemas).get(name).cloned()
  }

  /// Return the schema registered under `name`, declaring it with `init` if
  /// this is the first request.
  ///
  /// `init` runs at most once per name. If it fails nothing is registered
  /// and a later call may try again. An `init` that asks for its own name
  /// gets [`Error::RecursiveSchema`].
  pub fn get_or_register<F>(
    &self,
    name: &str,
    parent: Option<Arc<FieldSchema>>,
    init: F,
  ) -> Result<Arc<FieldSchema>>
  where
    F: FnOnce(&mut FieldSchema) -> Result<()>,
  {
    if let Some(existing) = self.get(name) {
      return Ok(existing);
    }
    let _declaring = Declaring::enter(self, name)?;
    let gate = lock(&self.pending)
      .entry(name.to_string())
      .or_default()
      .clone();
    let _turn = lock(&*gate);

    // Another thread may have finished while we waited.
    if let Some(existing) = self.get(name) {
      return Ok(existing);
    }
    let mut schema = match parent {
      Some(parent) => FieldSchema::extending(name, parent),
      None => FieldSchema::new(name),
    };
    init(&mut schema)?;
    let schema = Arc::new(schema);
    lock(&self.schemas).insert(name.to_string(), schema.clone());
    lock(&self.pending).remove(name);
    tracing::debug!(
      schema = %name,
      fields = schema.fields().count(),
      "registered schema"
    );
    Ok(schema)
  }

  /// Registered names, sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = lock(&self.schemas).keys().cloned().collect();
    names.sort();
    names
  }

  pub fn len(&self) -> usize { lock(&self.schemas).len() }

  pub fn is_empty(&self) -> bool { lock(&self.schemas).is_empty() }
}
