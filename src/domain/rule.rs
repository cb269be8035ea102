//! Client rules.
//!
//! A rule binds a client, either a single address or a network range, to the
//! action taken when that client sends requests. Rules are immutable; updates
//! produce a new value through the `with_*` methods.

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::domain::threshold::{parse_request_rate, ThresholdError};

/// What a rule identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// A single address (or a host name resolving to one)
    Ip,
    /// A network range in prefix notation
    Cidr,
}

impl RuleType {
    fn as_str(&self) -> &'static str {
        match self {
            RuleType::Ip => "IP",
            RuleType::Cidr => "CIDR",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision taken for a client's requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Requests are always processed
    Allow,
    /// Requests are always rejected
    Deny,
    /// Requests are delayed to a maximum rate
    Throttle,
    /// Requests are processed while the client stays under its thresholds
    Auto,
}

impl Action {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Action::Allow => 0,
            Action::Deny => 1,
            Action::Throttle => 2,
            Action::Auto => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Action::Deny,
            2 => Action::Throttle,
            3 => Action::Auto,
            _ => Action::Allow,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Allow => "ALLOW",
            Action::Deny => "DENY",
            Action::Throttle => "THROTTLE",
            Action::Auto => "AUTO",
        };
        f.write_str(name)
    }
}

/// Whether an action restricts the client when its rule is enforced.
pub fn applies(action: Action) -> bool {
    matches!(action, Action::Deny | Action::Throttle)
}

/// Why a client was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// The client was seen for the first time
    Discovery,
    /// Sustained traffic against valid endpoints
    Dos,
    /// Repeated authentication or authorization failures
    Security,
    /// Probing for endpoints (not found, invalid, failing requests)
    Scan,
}

impl Reason {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Reason::Discovery => 0,
            Reason::Dos => 1,
            Reason::Security => 2,
            Reason::Scan => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Reason::Dos,
            2 => Reason::Security,
            3 => Reason::Scan,
            _ => Reason::Discovery,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reason::Discovery => "DISCOVERY",
            Reason::Dos => "DOS",
            Reason::Security => "SECURITY",
            Reason::Scan => "SCAN",
        };
        f.write_str(name)
    }
}

/// Error returned when a rule cannot be built.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    /// The address is empty
    EmptyAddress,
    /// A CIDR rule address is not a network range
    InvalidNetwork(String),
    /// A host name was attached to a CIDR rule
    HostNameNotAllowed(String),
    /// A THROTTLE action was requested without a request rate
    MissingRequestRate,
    /// The request rate could not be parsed
    InvalidRequestRate(ThresholdError),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::EmptyAddress => write!(f, "rule address cannot be empty"),
            RuleError::InvalidNetwork(address) => {
                write!(f, "'{}' is not a valid network range", address)
            }
            RuleError::HostNameNotAllowed(address) => {
                write!(f, "a host name only applies to IP rules (rule '{}')", address)
            }
            RuleError::MissingRequestRate => {
                write!(f, "a throttling rule requires a request rate")
            }
            RuleError::InvalidRequestRate(e) => write!(f, "invalid request rate: {}", e),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleError::InvalidRequestRate(e) => Some(e),
            _ => None,
        }
    }
}

/// Derive the identifier of a rule from its type and address.
///
/// The identifier is lower case with every character other than ASCII letters
/// and digits replaced by `_`, so `("10.0.0.0/8", Cidr)` becomes
/// `"cidr_10_0_0_0_8"`.
pub fn rule_id(address: &str, rule_type: RuleType) -> String {
    format!("{}_{}", rule_type.as_str(), address)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// An immutable client rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    id: String,
    name: String,
    description: Option<String>,
    address: String,
    rule_type: RuleType,
    action: Action,
    active: bool,
    host_name: Option<String>,
    request_rate_text: Option<String>,
    request_rate: Option<f64>,
    network: Option<IpNet>,
}

impl Rule {
    /// Start building a rule for the given address.
    pub fn builder(address: impl Into<String>, rule_type: RuleType) -> RuleBuilder {
        RuleBuilder::new(address, rule_type)
    }

    /// Deterministic identifier derived from the type and address.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, the address unless one was provided.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional free text description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The address or network range this rule identifies.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the rule targets one address or a range.
    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    /// The configured action.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Whether the rule is enforced.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Host name of the client, IP rules only.
    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    /// The throttling rate as written, for example `"5 r/s"`.
    pub fn request_rate_text(&self) -> Option<&str> {
        self.request_rate_text.as_deref()
    }

    /// The throttling rate in requests per second.
    pub fn request_rate(&self) -> Option<f64> {
        self.request_rate
    }

    /// The network covered by the rule, `None` for IP rules addressed by host name.
    pub fn network(&self) -> Option<IpNet> {
        self.network
    }

    /// Prefix length of the covered network; longer means more specific.
    pub fn prefix_len(&self) -> u8 {
        self.network.map(|net| net.prefix_len()).unwrap_or(0)
    }

    /// Whether the address is a host name that still needs resolving.
    pub fn needs_resolution(&self) -> bool {
        self.rule_type == RuleType::Ip && self.network.is_none()
    }

    /// Whether the given address is covered by this rule.
    pub fn matches(&self, ip: IpAddr) -> bool {
        match (self.rule_type, self.network) {
            (RuleType::Ip, Some(net)) => net.addr() == ip,
            (RuleType::Cidr, Some(net)) => net.contains(&ip),
            (_, None) => self.address.eq_ignore_ascii_case(&ip.to_string()),
        }
    }

    /// A copy of this rule with a different action.
    ///
    /// # Errors
    /// Returns [`RuleError::MissingRequestRate`] when switching a rule without
    /// a request rate to THROTTLE; use [`with_request_rate`](Self::with_request_rate)
    /// for that.
    pub fn with_action(&self, action: Action) -> Result<Rule, RuleError> {
        if action == Action::Throttle && self.request_rate.is_none() {
            return Err(RuleError::MissingRequestRate);
        }
        Ok(Rule {
            action,
            ..self.clone()
        })
    }

    /// A copy of this rule throttled at `request_rate`.
    ///
    /// # Errors
    /// Returns [`RuleError::InvalidRequestRate`] when the rate does not parse.
    pub fn with_request_rate(&self, request_rate: impl Into<String>) -> Result<Rule, RuleError> {
        let text = request_rate.into();
        let rate = parse_request_rate(&text).map_err(RuleError::InvalidRequestRate)?;
        Ok(Rule {
            action: Action::Throttle,
            request_rate_text: Some(text),
            request_rate: Some(rate),
            ..self.clone()
        })
    }

    /// A copy of this rule with a different activity flag.
    pub fn with_active(&self, active: bool) -> Rule {
        Rule {
            active,
            ..self.clone()
        }
    }

    /// A copy of a host name rule pinned to the address the host resolved to.
    pub fn with_resolved_address(&self, ip: IpAddr) -> Rule {
        let address = ip.to_string();
        let name = if self.name == self.address {
            address.clone()
        } else {
            self.name.clone()
        };
        Rule {
            id: rule_id(&address, self.rule_type),
            name,
            host_name: self.host_name.clone().or_else(|| Some(self.address.clone())),
            network: Some(IpNet::from(ip)),
            address,
            ..self.clone()
        }
    }

    /// Short human readable summary, used in audit records.
    pub fn to_description(&self) -> String {
        format!(
            "name={},address={},type={},action={}",
            self.name, self.address, self.rule_type, self.action
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.id, self.action, self.address)
    }
}

/// Builder for [`Rule`].
///
/// New rules default to [`Action::Auto`] and active. Setting a request rate
/// turns the rule into a THROTTLE rule.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    address: String,
    rule_type: RuleType,
    name: Option<String>,
    description: Option<String>,
    action: Action,
    active: bool,
    host_name: Option<String>,
    request_rate: Option<String>,
}

impl RuleBuilder {
    fn new(address: impl Into<String>, rule_type: RuleType) -> Self {
        Self {
            address: address.into().trim().to_string(),
            rule_type,
            name: None,
            description: None,
            action: Action::Auto,
            active: true,
            host_name: None,
            request_rate: None,
        }
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the action.
    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Enable or disable the rule.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Attach a host name (IP rules only).
    pub fn host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    /// Set the throttling rate, switching the action to THROTTLE.
    pub fn request_rate(mut self, request_rate: impl Into<String>) -> Self {
        let request_rate = request_rate.into();
        if !request_rate.trim().is_empty() {
            self.action = Action::Throttle;
            self.request_rate = Some(request_rate);
        }
        self
    }

    /// Build the rule.
    ///
    /// # Errors
    /// Returns an error when the address is empty, a CIDR address is not a
    /// network, a host name is attached to a CIDR rule, or a THROTTLE rule has
    /// no valid request rate.
    pub fn build(self) -> Result<Rule, RuleError> {
        if self.address.is_empty() {
            return Err(RuleError::EmptyAddress);
        }
        let host_name = self.host_name.filter(|host| !host.trim().is_empty());
        let network = match self.rule_type {
            RuleType::Ip => self.address.parse::<IpAddr>().ok().map(IpNet::from),
            RuleType::Cidr => {
                if host_name.is_some() {
                    return Err(RuleError::HostNameNotAllowed(self.address));
                }
                let network = self
                    .address
                    .parse::<IpNet>()
                    .or_else(|_| self.address.parse::<IpAddr>().map(IpNet::from))
                    .map_err(|_| RuleError::InvalidNetwork(self.address.clone()))?;
                Some(network.trunc())
            }
        };
        let host_name = match (self.rule_type, network) {
            (RuleType::Ip, None) => host_name.or_else(|| Some(self.address.clone())),
            _ => host_name,
        };

        let request_rate = match (&self.request_rate, self.action) {
            (Some(text), _) => {
                Some(parse_request_rate(text).map_err(RuleError::InvalidRequestRate)?)
            }
            (None, Action::Throttle) => return Err(RuleError::MissingRequestRate),
            (None, _) => None,
        };

        let loopback = network
            .map(|net| net.addr().is_loopback())
            .unwrap_or(false);
        let name = if loopback {
            "Local".to_string()
        } else {
            self.name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| self.address.clone())
        };

        Ok(Rule {
            id: rule_id(&self.address, self.rule_type),
            name,
            description: self.description,
            address: self.address,
            rule_type: self.rule_type,
            action: self.action,
            active: self.active,
            host_name,
            request_rate_text: self.request_rate,
            request_rate,
            network,
        })
    }
}
