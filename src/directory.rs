use std::{
    collections::{btree_map, BTreeMap, HashMap},
    path::Path,
};

use anyhow::Result;
use tracing::warn;

use crate::{
    feature::{Feature, Record},
    geojson::{self, FeatureCollection},
};

/// Records keyed by id. Iteration (and so output) is in id order.
pub struct Directory<T: Record = Feature> {
    pub name: String,
    records: BTreeMap<String, T>,
}

/// One entry of a key-priority list for [`Directory::merge_by_external_key`]: the
/// record property to read and the external table to look its value up in.
pub struct Lookup<V> {
    pub property: &'static str,
    pub table: HashMap<String, V>,
}

impl<V> Lookup<V> {
    pub fn new(property: &'static str) -> Self {
        Self {
            property,
            table: HashMap::new(),
        }
    }
}

impl<T: Record> Directory<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn values_mut(&mut self) -> btree_map::ValuesMut<'_, String, T> {
        self.records.values_mut()
    }

    /// Replaces any record already stored under `id`.
    pub fn insert(&mut self, id: String, record: T) {
        self.records.insert(id, record);
    }

    /// Merges `feature` into the record stored under `id`, creating it if needed.
    pub fn upsert(&mut self, id: String, feature: Feature) {
        match self.records.entry(id) {
            btree_map::Entry::Occupied(mut x) => x
                .get_mut()
                .feature_mut()
                .update(feature.properties, feature.geometry),
            btree_map::Entry::Vacant(x) => {
                x.insert(T::from_feature(feature));
            }
        }
    }

    /// Merges every feature of `collection` by its `properties.id`. Features without an
    /// id are dropped; their count is returned so the caller can report them.
    pub fn load_collection(&mut self, collection: FeatureCollection, keep_name: bool) -> usize {
        if let Some(name) = collection.name.filter(|x| !x.is_empty()) {
            if !keep_name {
                self.name = name;
            }
        }

        let mut skipped = 0;
        for x in collection.features {
            let feature = Feature::from(x);
            match feature.key("id") {
                Some(id) => self.upsert(id, feature),
                None => skipped += 1,
            }
        }
        skipped
    }

    pub fn load_geojson(&mut self, path: &Path, keep_name: bool) -> Result<()> {
        let skipped = self.load_collection(geojson::read(path)?, keep_name);
        if skipped > 0 {
            warn!("{}: skipped {skipped} features without an id", path.display());
        }
        Ok(())
    }

    pub fn to_collection(&self) -> FeatureCollection {
        FeatureCollection::new(
            &self.name,
            self.records
                .values()
                .map(|x| x.feature().to_geojson())
                .collect(),
        )
    }

    pub fn save_geojson(&self, path: &Path) -> Result<()> {
        geojson::write(path, &self.to_collection())
    }

    /// For every record, tries `lookups` in order and applies the first hit. Records
    /// with no hit are left alone. Returns the number of records matched.
    pub fn merge_by_external_key<V>(
        &mut self,
        lookups: &[Lookup<V>],
        mut apply: impl FnMut(&mut T, &V),
    ) -> usize {
        let mut matched = 0;
        for record in self.records.values_mut() {
            let hit = lookups.iter().find_map(|lookup| {
                let key = record.feature().key(lookup.property)?;
                lookup.table.get(&key)
            });
            if let Some(x) = hit {
                apply(record, x);
                matched += 1;
            }
        }
        matched
    }
}
