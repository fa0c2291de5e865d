//! Role selection and the parameters each role needs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{Error, Result};

/// Address both roles listen on unless told otherwise (all interfaces)
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Line the responder writes to the callback address
pub const CALLBACK_GREETING: &[u8] = b"hello from the internet!\n";

/// Raw operator input, before the role is known to be complete
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Run as the responder (SIP listener) instead of the initiator
    pub listen: bool,
    /// Port to listen on locally (both roles)
    pub local_port: Option<String>,
    /// Port of the responder to connect to (initiator)
    pub remote_port: Option<String>,
    /// Local NAT address advertised for the connect-back (initiator)
    pub local_ip: Option<String>,
    /// Responder host to connect to (initiator)
    pub host: Option<String>,
    /// Interface to bind listening sockets on
    pub bind_ip: Option<IpAddr>,
    /// Optional cap on a single inbound message (responder)
    pub max_message_size: Option<usize>,
}

/// A fully specified role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Responder(ResponderConfig),
    Initiator(InitiatorConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderConfig {
    pub bind_ip: IpAddr,
    pub local_port: String,
    /// `None` keeps the inbound buffer unbounded
    pub max_message_size: Option<usize>,
}

impl ResponderConfig {
    pub fn new(local_port: impl Into<String>) -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP,
            local_port: local_port.into(),
            max_message_size: None,
        }
    }

    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = Some(max);
        self
    }

    pub fn bind_addr(&self) -> String {
        join_host_port(self.bind_ip, &self.local_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatorConfig {
    pub bind_ip: IpAddr,
    pub local_port: String,
    pub remote_port: String,
    pub local_ip: String,
    pub host: String,
}

impl InitiatorConfig {
    pub fn new(
        local_ip: impl Into<String>,
        local_port: impl Into<String>,
        host: impl Into<String>,
        remote_port: impl Into<String>,
    ) -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP,
            local_port: local_port.into(),
            remote_port: remote_port.into(),
            local_ip: local_ip.into(),
            host: host.into(),
        }
    }

    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    pub fn bind_addr(&self) -> String {
        join_host_port(self.bind_ip, &self.local_port)
    }

    /// `host:remote_port`, resolved at dial time
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.remote_port)
    }
}

fn join_host_port(ip: IpAddr, port: &str) -> String {
    match port.parse::<u16>() {
        Ok(port) => SocketAddr::new(ip, port).to_string(),
        // Leave unparsable ports for the socket layer to reject.
        Err(_) => match ip {
            IpAddr::V4(v4) => format!("{}:{}", v4, port),
            IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
        },
    }
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Configuration(format!("you must specify a {}", what))),
    }
}

impl Settings {
    /// Check role-specific parameters and pick the role.
    pub fn resolve(self) -> Result<Role> {
        let bind_ip = self.bind_ip.unwrap_or(DEFAULT_BIND_IP);
        let local_port = required(self.local_port, "local port")?;

        if self.listen {
            return Ok(Role::Responder(ResponderConfig {
                bind_ip,
                local_port,
                max_message_size: self.max_message_size,
            }));
        }

        let remote_port = required(self.remote_port, "remote port")?;
        let local_ip = required(self.local_ip, "local ip address")?;
        let host = required(self.host, "host")?;

        Ok(Role::Initiator(InitiatorConfig {
            bind_ip,
            local_port,
            remote_port,
            local_ip,
            host,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initiator_settings() -> Settings {
        Settings {
            listen: false,
            local_port: Some("4444".into()),
            remote_port: Some("5060".into()),
            local_ip: Some("192.168.1.10".into()),
            host: Some("203.0.113.7".into()),
            ..Default::default()
        }
    }

    #[test]
    fn listen_mode_needs_only_local_port() {
        let settings = Settings {
            listen: true,
            local_port: Some("5060".into()),
            ..Default::default()
        };

        let role = settings.resolve().unwrap();
        assert_eq!(role, Role::Responder(ResponderConfig::new("5060")));
    }

    #[test]
    fn listen_mode_without_port_fails() {
        let settings = Settings {
            listen: true,
            ..Default::default()
        };
        let err = settings.resolve().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: you must specify a local port"
        );
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let settings = Settings {
            listen: true,
            local_port: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(settings.resolve(), Err(Error::Configuration(_))));
    }

    #[test]
    fn initiator_resolves() {
        let role = initiator_settings().resolve().unwrap();
        let Role::Initiator(config) = role else {
            panic!("expected initiator role");
        };
        assert_eq!(config.local_port, "4444");
        assert_eq!(config.target(), "203.0.113.7:5060");
        assert_eq!(config.bind_addr(), "0.0.0.0:4444");
    }

    #[test]
    fn initiator_checks_fields_in_order() {
        let cases = [
            (Settings { local_port: None, ..initiator_settings() }, "local port"),
            (Settings { remote_port: None, ..initiator_settings() }, "remote port"),
            (Settings { local_ip: None, ..initiator_settings() }, "local ip address"),
            (Settings { host: None, ..initiator_settings() }, "host"),
            (
                Settings { remote_port: None, host: None, ..initiator_settings() },
                "remote port",
            ),
        ];

        for (settings, missing) in cases {
            let err = settings.resolve().unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Configuration error: you must specify a {}", missing)
            );
        }
    }

    #[test]
    fn bind_ip_and_size_cap_carry_through() {
        let settings = Settings {
            listen: true,
            local_port: Some("5060".into()),
            bind_ip: Some("127.0.0.1".parse().unwrap()),
            max_message_size: Some(4096),
            ..Default::default()
        };

        let Role::Responder(config) = settings.resolve().unwrap() else {
            panic!("expected responder role");
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:5060");
        assert_eq!(config.max_message_size, Some(4096));
    }

    #[test]
    fn bind_addr_formats_ipv6() {
        let config = ResponderConfig::new("5060").with_bind_ip("::1".parse().unwrap());
        assert_eq!(config.bind_addr(), "[::1]:5060");
    }

    #[test]
    fn bind_addr_keeps_unparsable_port() {
        let config = ResponderConfig::new("sip");
        assert_eq!(config.bind_addr(), "0.0.0.0:sip");
    }
}
