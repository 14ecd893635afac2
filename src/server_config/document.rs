//! The server's `config.json`, held as an ordered JSON tree so that fields
//! this crate does not know about survive a load/overlay/save cycle.

use serde_json::{json, Map, Value};

use crate::identity::ServerIdentity;

pub const SERVER: &str = "Server";
pub const HTTP_SERVER: &str = "HttpServer";

/// Network values written over the document on every launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOverlay {
    /// `None` when the public-IP lookup failed; written as an empty string.
    pub public_ip: Option<String>,
    pub public_port: u16,
    pub listen_ip: String,
    pub listen_port: u16,
    pub http_listen_ip: String,
    pub http_listen_port: u16,
}

impl NetworkOverlay {
    pub fn from_identity(identity: &ServerIdentity, public_ip: Option<String>) -> Self {
        Self {
            public_ip,
            public_port: identity.port,
            listen_ip: identity.listen_ip.clone(),
            listen_port: identity.port,
            http_listen_ip: identity.listen_ip.clone(),
            http_listen_port: identity.query_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfigDocument {
    root: Map<String, Value>,
}

impl ServerConfigDocument {
    /// Parse and check the shape: a JSON object whose `Server` and
    /// `HttpServer` members are objects. Everything else is carried as-is.
    pub fn parse(content: &str) -> Result<Self, String> {
        let content = content.trim_start_matches('\u{feff}');
        let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let Value::Object(root) = value else {
            return Err("top-level value is not an object".to_string());
        };

        for section in [SERVER, HTTP_SERVER] {
            match root.get(section) {
                Some(Value::Object(_)) => {}
                Some(other) => return Err(format!("'{}' must be an object, found {}", section, kind(other))),
                None => return Err(format!("missing '{}' section", section)),
            }
        }

        Ok(Self { root })
    }

    /// Stable, indented serialization (two-space indent, input key order).
    pub fn to_pretty_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.root)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.root.get(name).and_then(Value::as_object)
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)?.as_str()
    }

    /// Reads a port stored either as a number or as a numeric string.
    pub fn get_port(&self, section: &str, key: &str) -> Option<u16> {
        match self.section(section)?.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Overwrite exactly the six network fields; nothing else is touched.
    pub fn apply_network(&mut self, overlay: &NetworkOverlay) {
        let public_ip = overlay.public_ip.clone().unwrap_or_default();
        self.set_text(SERVER, "PublicIp", public_ip);
        self.set_port(SERVER, "PublicPort", overlay.public_port);
        self.set_text(SERVER, "ListenIp", overlay.listen_ip.clone());
        self.set_port(SERVER, "ListenPort", overlay.listen_port);

        self.set_text(HTTP_SERVER, "ListenIp", overlay.http_listen_ip.clone());
        self.set_port(HTTP_SERVER, "ListenPort", overlay.http_listen_port);
    }

    /// `Server` and `HttpServer` are guaranteed objects by [`parse`](Self::parse).
    fn section_mut(&mut self, name: &str) -> Option<&mut Map<String, Value>> {
        self.root.get_mut(name).and_then(Value::as_object_mut)
    }

    fn set_text(&mut self, section: &str, key: &str, value: String) {
        if let Some(map) = self.section_mut(section) {
            map.insert(key.to_string(), Value::String(value));
        }
    }

    /// Keeps the representation already on disk: a port written as a string
    /// stays a string.
    fn set_port(&mut self, section: &str, key: &str, port: u16) {
        let Some(map) = self.section_mut(section) else {
            return;
        };
        let value = match map.get(key) {
            Some(Value::String(_)) => Value::String(port.to_string()),
            _ => Value::from(port),
        };
        map.insert(key.to_string(), value);
    }

    /// Default document written when an install ships no configuration.
    pub fn defaults(identity: &ServerIdentity) -> Self {
        let sections = [
            (
                SERVER,
                json!({
                    "PublicIp": "127.0.0.1",
                    "PublicPort": identity.port,
                    "ListenIp": identity.listen_ip,
                    "ListenPort": identity.port,
                }),
            ),
            (
                HTTP_SERVER,
                json!({
                    "Enabled": true,
                    "ListenIp": identity.listen_ip,
                    "ListenPort": identity.query_port,
                }),
            ),
            ("AntiCheat", json!({ "Enabled": true, "BanIpFromGame": true })),
            ("Timeout", json!({ "SpawnTimeout": 2500, "ConnectionTimeout": 2500 })),
            (
                "Compatibility",
                json!({ "AllowFutureGameVersions": false, "AllowVersionMixing": false }),
            ),
            ("Debug", json!({ "GameRecorderEnabled": false, "GameRecorderPath": "" })),
        ];

        Self {
            root: sections.into_iter().map(|(name, section)| (name.to_string(), section)).collect(),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
