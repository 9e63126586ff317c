//! Post-validation document finalization
//!
//! Cross-cutting derivations applied after a document validates: every
//! `hostname`/`*_hostname` key without a sibling `<key>_ip` gets one
//! injected (resolved IPv4 or the `dns_error` sentinel), with symmetric
//! handling for `;`-separated `hostnames`/`*_hostnames` lists. A
//! [`ConfigHook`] strategy object may then reshape the final document.

use crate::error::{Error, Result};
use crate::validator::{ConfigValue, ValidatedDocument};
use std::net::ToSocketAddrs;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Sentinel value injected when a hostname does not resolve.
pub const DNS_ERROR: &str = "dns_error";

/// Hostname-to-IPv4 resolution seam. Pure from the caller's point of view:
/// no error channel, just `Some(ip)` or `None`.
pub trait Resolver {
    fn resolve(&self, hostname: &str) -> Option<String>;
}

/// System resolver with a bounded wait.
///
/// Resolution runs on a helper thread; if it does not answer within the
/// timeout the lookup counts as failed. `"null"` and local socket paths
/// (values starting with `/`) are returned unchanged without any lookup.
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for SystemResolver {
    fn resolve(&self, hostname: &str) -> Option<String> {
        if hostname == "null" || hostname.starts_with('/') {
            return Some(hostname.to_string());
        }
        let (tx, rx) = mpsc::channel();
        let host = hostname.to_string();
        thread::spawn(move || {
            let resolved = format!("{host}:0")
                .to_socket_addrs()
                .ok()
                .and_then(|mut addrs| addrs.find(|a| a.is_ipv4()))
                .map(|a| a.ip().to_string());
            let _ = tx.send(resolved);
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => None,
        }
    }
}

/// Final shaping hook applied after the built-in derivations.
pub trait ConfigHook {
    fn finalize(&self, doc: ValidatedDocument) -> Result<ValidatedDocument>;
}

/// Default hook: identity.
pub struct NoopHook;

impl ConfigHook for NoopHook {
    fn finalize(&self, doc: ValidatedDocument) -> Result<ValidatedDocument> {
        Ok(doc)
    }
}

/// Apply hostname derivations, then the hook.
///
/// A hook failure that is not already a domain error is logged together
/// with a dump of the pre-hook document, then wrapped as an internal
/// error — it is never silently swallowed.
pub fn finalize(
    doc: ValidatedDocument,
    resolver: &dyn Resolver,
    hook: &dyn ConfigHook,
) -> Result<ValidatedDocument> {
    let derived = derive_ips(doc, resolver);
    let dump = dump_document(&derived);
    match hook.finalize(derived) {
        Ok(final_doc) => Ok(final_doc),
        Err(err @ Error::BadPlugin { .. }) => Err(err),
        Err(other) => {
            tracing::error!(
                "configuration hook failed: {other}; document before hook:\n{dump}"
            );
            Err(Error::internal(format!("configuration hook failed: {other}")))
        }
    }
}

fn derive_ips(doc: ValidatedDocument, resolver: &dyn Resolver) -> ValidatedDocument {
    let mut out = doc.clone();
    for section in doc.sections() {
        for (key, value) in section.iter() {
            if key == "hostname" || key.ends_with("_hostname") {
                let ip_key = format!("{key}_ip");
                if section.contains_key(&ip_key) {
                    continue;
                }
                let resolved = value
                    .as_str()
                    .and_then(|host| resolver.resolve(host))
                    .unwrap_or_else(|| DNS_ERROR.to_string());
                if let Some(target) = out.section_mut(&section.name) {
                    target.set(&ip_key, ConfigValue::Str(resolved));
                }
            } else if key == "hostnames" || key.ends_with("_hostnames") {
                let ips_key = format!("{key}_ips");
                if section.contains_key(&ips_key) {
                    continue;
                }
                let Some(hosts) = value.as_str() else { continue };
                let resolved: Vec<String> = hosts
                    .split(';')
                    .map(|host| {
                        resolver
                            .resolve(host)
                            .unwrap_or_else(|| DNS_ERROR.to_string())
                    })
                    .collect();
                if let Some(target) = out.section_mut(&section.name) {
                    target.set(&ips_key, ConfigValue::Str(resolved.join(";")));
                }
            }
        }
    }
    out
}

/// Pretty JSON dump of a document (diagnostics only).
pub fn dump_document(doc: &ValidatedDocument) -> String {
    let mut map = serde_json::Map::new();
    for section in doc.sections() {
        let mut entries = serde_json::Map::new();
        for (key, value) in section.iter() {
            let json = match value {
                ConfigValue::Str(s) => serde_json::Value::String(s.clone()),
                ConfigValue::Int(i) => serde_json::Value::from(*i),
                ConfigValue::Bool(b) => serde_json::Value::from(*b),
            };
            entries.insert(key.to_string(), json);
        }
        map.insert(section.name.clone(), serde_json::Value::Object(entries));
    }
    serde_json::to_string_pretty(&serde_json::Value::Object(map))
        .unwrap_or_else(|_| "<dump failed>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidatedSection;

    /// Resolver answering from a fixed table.
    struct FakeResolver(Vec<(&'static str, &'static str)>);

    impl Resolver for FakeResolver {
        fn resolve(&self, hostname: &str) -> Option<String> {
            if hostname == "null" || hostname.starts_with('/') {
                return Some(hostname.to_string());
            }
            self.0
                .iter()
                .find(|(h, _)| *h == hostname)
                .map(|(_, ip)| ip.to_string())
        }
    }

    fn doc_with(section: &str, entries: &[(&str, &str)]) -> ValidatedDocument {
        let mut doc = ValidatedDocument::new();
        let mut s = ValidatedSection::new(section);
        for (k, v) in entries {
            s.set(k, ConfigValue::Str(v.to_string()));
        }
        doc.push_section(s);
        doc
    }

    #[test]
    fn test_hostname_ip_injected() {
        let doc = doc_with("general", &[("hostname", "db.example.org")]);
        let resolver = FakeResolver(vec![("db.example.org", "10.0.0.1")]);
        let out = finalize(doc, &resolver, &NoopHook).unwrap();
        assert_eq!(
            out.get("general", "hostname_ip").unwrap().as_str(),
            Some("10.0.0.1")
        );
    }

    #[test]
    fn test_hostname_failure_degrades_to_sentinel() {
        let doc = doc_with("general", &[("db_hostname", "unknown.invalid")]);
        let resolver = FakeResolver(vec![]);
        let out = finalize(doc, &resolver, &NoopHook).unwrap();
        assert_eq!(
            out.get("general", "db_hostname_ip").unwrap().as_str(),
            Some(DNS_ERROR)
        );
    }

    #[test]
    fn test_null_and_socket_paths_pass_through() {
        let doc = doc_with(
            "general",
            &[("hostname", "null"), ("db_hostname", "/var/run/db.sock")],
        );
        let resolver = FakeResolver(vec![]);
        let out = finalize(doc, &resolver, &NoopHook).unwrap();
        // still routed through resolve(), which returns them unchanged
        assert_eq!(
            out.get("general", "hostname_ip").unwrap().as_str(),
            Some("null")
        );
        assert_eq!(
            out.get("general", "db_hostname_ip").unwrap().as_str(),
            Some("/var/run/db.sock")
        );
    }

    #[test]
    fn test_existing_ip_key_not_overwritten() {
        let doc = doc_with(
            "general",
            &[("hostname", "db.example.org"), ("hostname_ip", "1.2.3.4")],
        );
        let resolver = FakeResolver(vec![("db.example.org", "10.0.0.1")]);
        let out = finalize(doc, &resolver, &NoopHook).unwrap();
        assert_eq!(
            out.get("general", "hostname_ip").unwrap().as_str(),
            Some("1.2.3.4")
        );
    }

    #[test]
    fn test_hostnames_list_resolution() {
        let doc = doc_with("general", &[("hostnames", "a.example.org;b.example.org;c")]);
        let resolver = FakeResolver(vec![
            ("a.example.org", "10.0.0.1"),
            ("b.example.org", "10.0.0.2"),
        ]);
        let out = finalize(doc, &resolver, &NoopHook).unwrap();
        assert_eq!(
            out.get("general", "hostnames_ips").unwrap().as_str(),
            Some("10.0.0.1;10.0.0.2;dns_error")
        );
    }

    #[test]
    fn test_hook_domain_error_passes_through() {
        struct Failing;
        impl ConfigHook for Failing {
            fn finalize(&self, _doc: ValidatedDocument) -> Result<ValidatedDocument> {
                Err(Error::bad_plugin("rejected by hook"))
            }
        }
        let doc = doc_with("general", &[]);
        let err = finalize(doc, &FakeResolver(vec![]), &Failing).unwrap_err();
        assert!(matches!(err, Error::BadPlugin { .. }));
    }

    #[test]
    fn test_hook_unexpected_error_wrapped_as_internal() {
        struct Exploding;
        impl ConfigHook for Exploding {
            fn finalize(&self, _doc: ValidatedDocument) -> Result<ValidatedDocument> {
                Err(Error::internal("boom"))
            }
        }
        let doc = doc_with("general", &[]);
        let err = finalize(doc, &FakeResolver(vec![]), &Exploding).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_system_resolver_passthrough_values() {
        let resolver = SystemResolver::new();
        assert_eq!(resolver.resolve("null").as_deref(), Some("null"));
        assert_eq!(
            resolver.resolve("/var/run/x.sock").as_deref(),
            Some("/var/run/x.sock")
        );
    }
}
