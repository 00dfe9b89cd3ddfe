//! Live objects referenced from the host

use boa_engine::JsObject;
use std::collections::HashMap;

/// Append-only table of objects handed to the host by reference.
///
/// Entries live as long as the worker: the host may hold a proxy to any of
/// them at any time and there is no release message.
///
/// Objects hash and compare by identity, so both directions are lookups.
#[derive(Default)]
pub struct ResourceRepository {
    objects: Vec<JsObject>,
    ids: Vec<String>,
    index: HashMap<String, usize>,
    positions: HashMap<JsObject, usize>,
}

impl ResourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `object` and return its identifier. Storing the same object again
    /// returns the identifier it already has.
    pub fn store(&mut self, object: &JsObject) -> String {
        if let Some(&position) = self.positions.get(object) {
            return self.ids[position].clone();
        }

        let id = self.generate_id();
        let position = self.objects.len();
        self.index.insert(id.clone(), position);
        self.positions.insert(object.clone(), position);
        self.objects.push(object.clone());
        self.ids.push(id.clone());
        id
    }

    /// The object stored under `id`
    pub fn retrieve(&self, id: &str) -> Option<&JsObject> {
        self.index.get(id).map(|&position| &self.objects[position])
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn generate_id(&self) -> String {
        loop {
            let id = format!(
                "{}{:06}",
                chrono::Utc::now().timestamp_micros(),
                fastrand::u32(0..1_000_000)
            );
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }
}
