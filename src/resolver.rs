use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::AutofillError;
use crate::registry::SiteProfile;

/// How long a cached submission stays usable before it is discarded.
pub fn freshness_window() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

/// Where a resolved value came from; later sources shadow earlier ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Profile,
    Cache,
    Override,
}

/// Long-lived stored data for a user: logical field name → value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileData {
    pub values: HashMap<String, String>,
}

impl ProfileData {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        ProfileData {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// The locally persisted automation-intent record: the values a user just
/// submitted through the hosting portal, scoped to one service and usable
/// for a short window only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSubmission {
    pub service: String,
    pub values: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl CachedSubmission {
    pub fn new(service: &str, pairs: &[(&str, &str)]) -> Self {
        CachedSubmission {
            service: service.to_string(),
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            created_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) <= freshness_window()
    }
}

/// One entry of a resolved value map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub value: String,
    pub source: ValueSource,
    pub resolved_at: DateTime<Utc>,
}

/// The final, precedence-ordered set of field values for one automation
/// attempt. Built fresh per attempt; entries shadow rather than merge, and
/// a field that is absent here is "not fillable" — it must be skipped, not
/// written as an empty string (which would clobber select defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedValueMap {
    entries: HashMap<String, ResolvedValue>,
}

impl ResolvedValueMap {
    pub fn get(&self, field: &str) -> Option<&ResolvedValue> {
        self.entries.get(field)
    }

    pub fn value_of(&self, field: &str) -> Option<&str> {
        self.entries.get(field).map(|v| v.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedValue)> {
        self.entries.iter()
    }

    /// Flat `field → value` view for wire formats (the remote backend takes
    /// plain form data without source tags).
    pub fn as_form_data(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    fn shadow(&mut self, field: &str, value: &str, source: ValueSource, now: DateTime<Utc>) {
        // Empty values never enter the map: absent means "skip this field".
        if value.is_empty() {
            return;
        }
        self.entries.insert(
            field.to_string(),
            ResolvedValue {
                value: value.to_string(),
                source,
                resolved_at: now,
            },
        );
    }
}

/// Result of value resolution: the map itself, plus whether a stale cached
/// submission was encountered (the caller owns the store and must purge it).
#[derive(Debug, Clone)]
pub struct Resolution {
    pub values: ResolvedValueMap,
    pub cache_purged: bool,
}

/// Merge the data sources into one value map for the given site, with
/// explicit precedence: override > fresh cache > profile. The map is
/// restricted to the logical fields the site profile declares.
///
/// Fails with [`AutofillError::NoDataAvailable`] when neither profile data
/// nor a cached submission exists — the caller must not start filling.
pub fn resolve(
    site: &SiteProfile,
    profile: Option<&ProfileData>,
    cached: Option<&CachedSubmission>,
    overrides: &HashMap<String, String>,
) -> Result<Resolution, AutofillError> {
    if profile.is_none() && cached.is_none() {
        return Err(AutofillError::NoDataAvailable);
    }

    let now = Utc::now();
    let mut cache_purged = false;
    let fresh_cache = match cached {
        Some(cache) if cache.is_fresh(now) => Some(cache),
        Some(cache) => {
            warn!(
                service = %cache.service,
                age_secs = now.signed_duration_since(cache.created_at).num_seconds(),
                "cached submission expired, excluding it"
            );
            cache_purged = true;
            None
        }
        None => None,
    };

    if profile.is_none() && fresh_cache.is_none() {
        return Err(AutofillError::NoDataAvailable);
    }

    let mut values = ResolvedValueMap::default();
    for spec in &site.fields {
        let field = spec.name.as_str();
        if let Some(profile) = profile
            && let Some(value) = profile.values.get(field)
        {
            values.shadow(field, value, ValueSource::Profile, now);
        }
        if let Some(cache) = fresh_cache
            && let Some(value) = cache.values.get(field)
        {
            values.shadow(field, value, ValueSource::Cache, now);
        }
        if let Some(value) = overrides.get(field) {
            values.shadow(field, value, ValueSource::Override, now);
        }
    }

    debug!(
        site = %site.host,
        resolved = values.len(),
        declared = site.fields.len(),
        "resolved value map"
    );
    Ok(Resolution {
        values,
        cache_purged,
    })
}

/// File-backed store for [`CachedSubmission`] records, one JSON file per
/// service under the platform data directory.
///
/// The store itself does not enforce freshness — that is the consumer's
/// job via [`load_fresh`](Self::load_fresh), which also deletes expired
/// records on sight.
pub struct IntentStore {
    dir: PathBuf,
}

impl IntentStore {
    pub fn new() -> Result<Self> {
        let dir = dirs::data_dir()
            .context("could not determine platform data directory")?
            .join("sevafill");
        Self::at(dir)
    }

    pub fn at(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create intent store at {}", dir.display()))?;
        Ok(IntentStore { dir })
    }

    fn record_path(&self, service: &str) -> PathBuf {
        let safe: String = service
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    pub fn save(&self, record: &CachedSubmission) -> Result<()> {
        let path = self.record_path(&record.service);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)
            .with_context(|| format!("could not write intent record to {}", path.display()))?;
        info!(service = %record.service, fields = record.values.len(), "saved intent record");
        Ok(())
    }

    /// Raw load, freshness unchecked.
    pub fn load(&self, service: &str) -> Result<Option<CachedSubmission>> {
        let path = self.record_path(service);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("could not read intent record at {}", path.display()))?;
        let record = serde_json::from_str(&json)
            .with_context(|| format!("corrupt intent record at {}", path.display()))?;
        Ok(Some(record))
    }

    /// Load only if still within the freshness window; an expired record is
    /// deleted and reported as absent.
    pub fn load_fresh(&self, service: &str) -> Result<Option<CachedSubmission>> {
        match self.load(service)? {
            Some(record) if record.is_fresh(Utc::now()) => Ok(Some(record)),
            Some(record) => {
                info!(service = %record.service, "purging expired intent record");
                self.purge(service)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn purge(&self, service: &str) -> Result<()> {
        let path = self.record_path(service);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("could not remove {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod resolver_test;
