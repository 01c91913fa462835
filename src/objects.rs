//! Monitored objects that apply rules are evaluated against.
//!
//! Only the attributes the apply engine needs are modelled: names, zone,
//! custom variables and the host/service relationship.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::{Dictionary, Value};

/// Type name of host objects.
pub const HOST_TYPE: &str = "Host";
/// Type name of service objects.
pub const SERVICE_TYPE: &str = "Service";

/// A monitored host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Unique host name.
    pub name: String,
    /// Zone the host belongs to, if any.
    pub zone: Option<String>,
    /// Custom variables.
    #[serde(default)]
    pub vars: Dictionary,
}

impl Host {
    /// Creates a host without zone or custom variables.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: None,
            vars: Dictionary::new(),
        }
    }

    /// Sets the zone.
    #[must_use]
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Sets a custom variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// The dictionary bound to `host` in rule frames.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut dict = Dictionary::new();
        dict.insert("type".to_string(), Value::from(HOST_TYPE));
        dict.insert("name".to_string(), Value::from(self.name.as_str()));
        dict.insert("zone".to_string(), zone_value(self.zone.as_deref()));
        dict.insert("vars".to_string(), Value::Dictionary(self.vars.clone()));
        Value::Dictionary(dict)
    }
}

/// A monitored service, owned by a host.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// Owning host.
    pub host: Arc<Host>,
    /// Name unique within the host.
    pub short_name: String,
    /// Zone the service belongs to, if any.
    pub zone: Option<String>,
    /// Custom variables.
    pub vars: Dictionary,
}

impl Service {
    /// Creates a service on `host` without zone or custom variables.
    #[must_use]
    pub fn new(host: Arc<Host>, short_name: impl Into<String>) -> Self {
        Self {
            host,
            short_name: short_name.into(),
            zone: None,
            vars: Dictionary::new(),
        }
    }

    /// Sets the zone.
    #[must_use]
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Sets a custom variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Full name, `<host>!<service>`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}!{}", self.host.name, self.short_name)
    }

    /// The dictionary bound to `service` in rule frames.
    ///
    /// `name` is the short name, which is what `service.name == "..."`
    /// filters compare against.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut dict = Dictionary::new();
        dict.insert("type".to_string(), Value::from(SERVICE_TYPE));
        dict.insert("name".to_string(), Value::from(self.short_name.as_str()));
        dict.insert("__name".to_string(), Value::from(self.full_name()));
        dict.insert("host_name".to_string(), Value::from(self.host.name.as_str()));
        dict.insert("zone".to_string(), zone_value(self.zone.as_deref()));
        dict.insert("vars".to_string(), Value::Dictionary(self.vars.clone()));
        Value::Dictionary(dict)
    }
}

fn zone_value(zone: Option<&str>) -> Value {
    zone.map_or(Value::Null, Value::from)
}

/// A host or a service: the candidates apply rules are matched against.
#[derive(Debug, Clone, PartialEq)]
pub enum Checkable {
    /// A host.
    Host(Arc<Host>),
    /// A service on a host.
    Service(Arc<Service>),
}

impl Checkable {
    /// The host, and the service if this is one.
    #[must_use]
    pub fn host_service(&self) -> (&Host, Option<&Service>) {
        match self {
            Self::Host(host) => (host, None),
            Self::Service(service) => (&service.host, Some(service)),
        }
    }

    /// Object name; services use their full name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Host(host) => host.name.clone(),
            Self::Service(service) => service.full_name(),
        }
    }

    /// Object type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Host(_) => HOST_TYPE,
            Self::Service(_) => SERVICE_TYPE,
        }
    }

    /// Zone of this object.
    #[must_use]
    pub fn zone_name(&self) -> Option<&str> {
        match self {
            Self::Host(host) => host.zone.as_deref(),
            Self::Service(service) => service.zone.as_deref(),
        }
    }
}

impl From<Host> for Checkable {
    fn from(host: Host) -> Self {
        Self::Host(Arc::new(host))
    }
}

impl From<Service> for Checkable {
    fn from(service: Service) -> Self {
        Self::Service(Arc::new(service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names() {
        let host = Arc::new(Host::new("web1").with_zone("dmz"));
        let service = Service::new(Arc::clone(&host), "http");
        assert_eq!(service.full_name(), "web1!http");

        let checkable = Checkable::from(service);
        assert_eq!(checkable.name(), "web1!http");
        assert_eq!(checkable.type_name(), SERVICE_TYPE);
        let (h, s) = checkable.host_service();
        assert_eq!(h.name, "web1");
        assert_eq!(s.map(|s| s.short_name.as_str()), Some("http"));
        assert_eq!(checkable.zone_name(), None);
    }

    #[test]
    fn test_host_value_shape() {
        let host = Host::new("db1").with_zone("master").with_var("os", "linux");
        let value = host.to_value();
        let dict = value.as_dictionary().unwrap();
        assert_eq!(dict.get("name"), Some(&Value::from("db1")));
        assert_eq!(dict.get("zone"), Some(&Value::from("master")));
        let vars = dict.get("vars").and_then(Value::as_dictionary).unwrap();
        assert_eq!(vars.get("os"), Some(&Value::from("linux")));
    }
}
