use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AutofillError;
use crate::locator::{FieldSpec, LocatorStrategy};
use crate::page::ControlKind;

/// Registry entry describing one supported external service: its hostname,
/// a human-readable service name, and the ordered field layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub host: String,
    pub service_name: String,
    pub fields: Vec<FieldSpec>,
}

impl SiteProfile {
    pub fn new(host: &str, service_name: &str, fields: Vec<FieldSpec>) -> Self {
        SiteProfile {
            host: host.to_string(),
            service_name: service_name.to_string(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Static hostname → profile mapping. Read-only at runtime; lookup is exact
/// string equality on the hostname — no fuzzy matching, so a staging host
/// needs its own entry and an unknown host can never be mistaken for a
/// supported one.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    profiles: HashMap<String, SiteProfile>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        SiteRegistry::default()
    }

    /// Register a profile; a later profile for the same hostname replaces
    /// the earlier one so a host maps to at most one active profile.
    pub fn with_profile(mut self, profile: SiteProfile) -> Self {
        self.profiles.insert(profile.host.clone(), profile);
        self
    }

    pub fn lookup(&self, hostname: &str) -> Option<&SiteProfile> {
        self.profiles.get(hostname)
    }

    /// Like [`lookup`](Self::lookup), but the "not supported" outcome is the
    /// typed error callers must stop on before touching the DOM.
    pub fn require(&self, hostname: &str) -> Result<&SiteProfile, AutofillError> {
        self.lookup(hostname)
            .ok_or_else(|| AutofillError::SiteNotSupported(hostname.to_string()))
    }

    /// Lookup by full URL; returns `None` for unparseable URLs or URLs
    /// without a host, same as for an unknown host.
    pub fn lookup_url(&self, url: &str) -> Option<&SiteProfile> {
        let parsed = match url::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(%url, %err, "unparseable url in registry lookup");
                return None;
            }
        };
        parsed.host_str().and_then(|host| self.lookup(host))
    }

    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }

    /// The supported Gujarat utility-service portals, with each field's
    /// locator chain ordered most specific first.
    pub fn builtin() -> Self {
        use ControlKind::{Select, Text, TextArea};
        use LocatorStrategy as L;

        SiteRegistry::new()
            .with_profile(SiteProfile::new(
                "portal.guvnl.in",
                "GUVNL Portal (DGVCL/PGVCL/UGVCL/MGVCL)",
                vec![
                    FieldSpec::new(
                        "mobile",
                        Text,
                        vec![
                            L::attr_contains("input", "placeholder", "Mobile"),
                            L::attr_contains("input", "placeholder", "mobile"),
                            L::attr_equals("input", "type", "tel"),
                            L::attr_contains("input", "name", "mobile"),
                            L::attr_contains("input", "id", "mobile"),
                            L::css("input.form-control[type=\"text\"]"),
                        ],
                    ),
                    FieldSpec::new(
                        "discom",
                        Select,
                        vec![
                            L::attr_contains("select", "name", "discom"),
                            L::attr_contains("select", "name", "Discom"),
                            L::attr_contains("select", "id", "discom"),
                            L::css("select.form-control"),
                            L::nth_of_kind("select", 0),
                        ],
                    ),
                ],
            ))
            .with_profile(SiteProfile::new(
                "connect.torrentpower.com",
                "Torrent Power",
                vec![
                    FieldSpec::new(
                        "city",
                        Select,
                        vec![
                            L::attr_contains("select", "name", "city"),
                            L::attr_contains("select", "id", "city"),
                            L::css("select.form-control"),
                            L::css("select.form-select"),
                            L::nth_of_kind("select", 0),
                        ],
                    ),
                    FieldSpec::new(
                        "service_number",
                        Text,
                        vec![
                            L::attr_contains("input", "placeholder", "Service Number"),
                            L::attr_contains("input", "placeholder", "service number"),
                            L::attr_contains("input", "placeholder", "Service"),
                            L::attr_contains("input", "name", "service"),
                            L::attr_contains("input", "id", "service"),
                            L::nth_of_kind("input", 0),
                        ],
                    ),
                    FieldSpec::new(
                        "t_no",
                        Text,
                        vec![
                            L::attr_contains("input", "placeholder", "T No"),
                            L::attr_contains("input", "placeholder", "T-No"),
                            L::attr_contains("input", "placeholder", "TNo"),
                            L::attr_contains("input", "name", "tno"),
                            L::attr_contains("input", "name", "t_no"),
                            L::attr_contains("input", "id", "tno"),
                        ],
                    ),
                    FieldSpec::new(
                        "mobile",
                        Text,
                        vec![
                            L::attr_contains("input", "placeholder", "Mobile"),
                            L::attr_contains("input", "placeholder", "mobile"),
                            L::attr_equals("input", "type", "tel"),
                            L::attr_contains("input", "name", "mobile"),
                            L::attr_contains("input", "id", "mobile"),
                            L::attr_contains("input", "placeholder", "Phone"),
                        ],
                    ),
                    FieldSpec::new(
                        "email",
                        Text,
                        vec![
                            L::attr_contains("input", "placeholder", "Email"),
                            L::attr_contains("input", "placeholder", "email"),
                            L::attr_equals("input", "type", "email"),
                            L::attr_contains("input", "name", "email"),
                            L::attr_contains("input", "id", "email"),
                        ],
                    ),
                ],
            ))
            .with_profile(SiteProfile::new(
                "www.adanigas.com",
                "Adani Gas",
                vec![
                    FieldSpec::new(
                        "consumer_number",
                        Text,
                        vec![
                            L::attr_equals("", "name", "consumerNumber"),
                            L::id("consumerNumber"),
                            L::attr_contains("input", "placeholder", "Consumer"),
                        ],
                    ),
                    FieldSpec::new(
                        "bp_number",
                        Text,
                        vec![L::attr_equals("", "name", "bpNumber"), L::id("bpNumber")],
                    ),
                    FieldSpec::new(
                        "mobile",
                        Text,
                        vec![
                            L::attr_equals("", "name", "mobile"),
                            L::id("mobile"),
                            L::attr_equals("input", "type", "tel"),
                        ],
                    ),
                    FieldSpec::new(
                        "email",
                        Text,
                        vec![
                            L::attr_equals("", "name", "email"),
                            L::id("email"),
                            L::attr_equals("input", "type", "email"),
                        ],
                    ),
                    FieldSpec::new(
                        "full_name",
                        Text,
                        vec![
                            L::attr_equals("", "name", "name"),
                            L::id("name"),
                            L::attr_contains("input", "placeholder", "Name"),
                        ],
                    ),
                ],
            ))
            .with_profile(SiteProfile::new(
                "www.gujaratgas.com",
                "Gujarat Gas",
                vec![
                    FieldSpec::new(
                        "consumer_number",
                        Text,
                        vec![
                            L::attr_equals("", "name", "consumerNo"),
                            L::id("consumerNo"),
                            L::attr_contains("input", "placeholder", "Consumer"),
                        ],
                    ),
                    FieldSpec::new(
                        "mobile",
                        Text,
                        vec![
                            L::attr_equals("", "name", "mobile"),
                            L::id("mobile"),
                            L::attr_equals("input", "type", "tel"),
                        ],
                    ),
                    FieldSpec::new(
                        "email",
                        Text,
                        vec![
                            L::attr_equals("", "name", "email"),
                            L::id("email"),
                            L::attr_equals("input", "type", "email"),
                        ],
                    ),
                ],
            ))
            .with_profile(SiteProfile::new(
                "ahmedabadcity.gov.in",
                "AMC Water Supply",
                vec![
                    FieldSpec::new(
                        "connection_id",
                        Text,
                        vec![
                            L::attr_equals("", "name", "connectionId"),
                            L::id("connectionId"),
                        ],
                    ),
                    FieldSpec::new(
                        "mobile",
                        Text,
                        vec![
                            L::attr_equals("", "name", "mobile"),
                            L::id("mobile"),
                            L::attr_equals("input", "type", "tel"),
                        ],
                    ),
                    FieldSpec::new(
                        "email",
                        Text,
                        vec![
                            L::attr_equals("", "name", "email"),
                            L::id("email"),
                            L::attr_equals("input", "type", "email"),
                        ],
                    ),
                    FieldSpec::new(
                        "full_name",
                        Text,
                        vec![L::attr_equals("", "name", "name"), L::id("name")],
                    ),
                    FieldSpec::new(
                        "address",
                        TextArea,
                        vec![
                            L::attr_equals("textarea", "name", "address"),
                            L::attr_equals("", "name", "address"),
                            L::id("address"),
                        ],
                    ),
                ],
            ))
            .with_profile(SiteProfile::new(
                "anyror.gujarat.gov.in",
                "AnyRoR Gujarat",
                vec![
                    FieldSpec::new(
                        "district",
                        Select,
                        vec![L::id("district"), L::attr_equals("select", "name", "district")],
                    ),
                    FieldSpec::new(
                        "taluka",
                        Select,
                        vec![L::id("taluka"), L::attr_equals("select", "name", "taluka")],
                    ),
                    FieldSpec::new(
                        "village",
                        Select,
                        vec![L::id("village"), L::attr_equals("select", "name", "village")],
                    ),
                    FieldSpec::new(
                        "survey_number",
                        Text,
                        vec![
                            L::attr_equals("", "name", "surveyNo"),
                            L::id("surveyNo"),
                            L::attr_contains("input", "placeholder", "Survey"),
                        ],
                    ),
                ],
            ))
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
