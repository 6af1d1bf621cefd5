use serde_json::{Map, Value};

/// Fixed properties resolved once at logger construction and attached to
/// every event that does not already carry a property of the same name.
#[derive(Debug, Clone, Default)]
pub struct Enrichers {
    properties: Vec<(String, Value)>,
}

impl Enrichers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    pub fn with_machine_name(self) -> Self {
        self.with_property("MachineName", machine_name())
    }

    pub fn with_environment_user_name(self) -> Self {
        self.with_property("EnvironmentUserName", environment_user_name())
    }

    /// Name and version of the running crate.
    pub fn with_assembly(self) -> Self {
        self.with_property("AssemblyName", env!("CARGO_PKG_NAME"))
            .with_property("AssemblyVersion", env!("CARGO_PKG_VERSION"))
    }

    pub fn apply(&self, properties: &mut Map<String, Value>) {
        for (name, value) in &self.properties {
            properties
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

fn machine_name() -> String {
    sysinfo::System::host_name()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn environment_user_name() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    match std::env::var("USERDOMAIN") {
        Ok(domain) if !domain.is_empty() => format!("{}\\{}", domain, user),
        _ => user,
    }
}
