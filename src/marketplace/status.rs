use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The two mutually exclusive account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Professional,
}

impl Role {
    pub fn from_flag(is_professional: bool) -> Self {
        if is_professional {
            Role::Professional
        } else {
            Role::Client
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Professional => "professional",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a service request.
///
/// `Accepted` is a legal stored value, but no transition produces it: accepting
/// an offer moves the demanda straight to `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandaStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl DemandaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandaStatus::Pending => "pending",
            DemandaStatus::Accepted => "accepted",
            DemandaStatus::InProgress => "in_progress",
            DemandaStatus::Completed => "completed",
            DemandaStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DemandaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemandaStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DemandaStatus::Pending),
            "accepted" => Ok(DemandaStatus::Accepted),
            "in_progress" => Ok(DemandaStatus::InProgress),
            "completed" => Ok(DemandaStatus::Completed),
            "cancelled" => Ok(DemandaStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Lifecycle of a professional's proposal. Both non-pending states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OfferStatus::Pending),
            "accepted" => Ok(OfferStatus::Accepted),
            "rejected" => Ok(OfferStatus::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value '{0}'")]
pub struct UnknownStatus(pub String);
