//! The ten JSON-RPC methods a Guardian dispatches, one per `DataServer`
//! operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardianMethod {
    Create,
    Write,
    Append,
    Read,
    Delete,
    Mkdir,
    List,
    Subscribe,
    Unsubscribe,
    Terminate,
}

impl GuardianMethod {
    pub const ALL: [GuardianMethod; 10] = [
        GuardianMethod::Create,
        GuardianMethod::Write,
        GuardianMethod::Append,
        GuardianMethod::Read,
        GuardianMethod::Delete,
        GuardianMethod::Mkdir,
        GuardianMethod::List,
        GuardianMethod::Subscribe,
        GuardianMethod::Unsubscribe,
        GuardianMethod::Terminate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardianMethod::Create => "create",
            GuardianMethod::Write => "write",
            GuardianMethod::Append => "append",
            GuardianMethod::Read => "read",
            GuardianMethod::Delete => "delete",
            GuardianMethod::Mkdir => "mkdir",
            GuardianMethod::List => "list",
            GuardianMethod::Subscribe => "subscribe",
            GuardianMethod::Unsubscribe => "unsubscribe",
            GuardianMethod::Terminate => "terminate",
        }
    }
}

impl fmt::Display for GuardianMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown method \"{0}\"")]
pub struct UnknownMethod(pub String);

impl FromStr for GuardianMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GuardianMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_round_trips_through_its_str_form() {
        for method in GuardianMethod::ALL {
            assert_eq!(GuardianMethod::from_str(method.as_str()).unwrap(), method);
        }
    }

    #[test]
    fn unknown_method_name_is_rejected() {
        assert!(GuardianMethod::from_str("rename").is_err());
    }

    #[test]
    fn serde_uses_lowercase_method_names() {
        let json = serde_json::to_string(&GuardianMethod::Mkdir).unwrap();
        assert_eq!(json, "\"mkdir\"");
    }
}
