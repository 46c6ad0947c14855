use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SharedError;

// Serialize as the human label, deserialize through `FromStr`.
macro_rules! label_serde {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Upper-case and collapse `_` / `-` separators so "in_progress",
/// "In-Progress" and "IN PROGRESS" compare equal.
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .to_uppercase()
}

// ---------------------------------------------------------------------------
// TicketType
// ---------------------------------------------------------------------------

/// The fixed set of ticket categories. Each maps to the short code used in
/// ticket and document numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketType {
    DocumentApproval,
    MeetingMinutes,
    IncidentReport,
    AssetManagement,
    ComplaintHandling,
    MonthlyQualityReport,
    RequestFulfillment,
    ChangeRequest,
}

impl TicketType {
    pub const ALL: [TicketType; 8] = [
        TicketType::DocumentApproval,
        TicketType::MeetingMinutes,
        TicketType::IncidentReport,
        TicketType::AssetManagement,
        TicketType::ComplaintHandling,
        TicketType::MonthlyQualityReport,
        TicketType::RequestFulfillment,
        TicketType::ChangeRequest,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::DocumentApproval => "Document Approval",
            Self::MeetingMinutes => "Meeting Minutes",
            Self::IncidentReport => "Incident Report",
            Self::AssetManagement => "Asset Management",
            Self::ComplaintHandling => "Complaint Handling",
            Self::MonthlyQualityReport => "Monthly Quality Report",
            Self::RequestFulfillment => "Request Fulfillment",
            Self::ChangeRequest => "RFC Submission",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::DocumentApproval => "DOC",
            Self::MeetingMinutes => "NOT",
            Self::IncidentReport => "INC",
            Self::AssetManagement => "INV",
            Self::ComplaintHandling => "COM",
            Self::MonthlyQualityReport => "ADD",
            Self::RequestFulfillment => "REQ",
            Self::ChangeRequest => "RFC",
        }
    }
}

impl FromStr for TicketType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|t| normalize(t.label()) == wanted)
            .ok_or_else(|| SharedError::UnknownTicketType(s.to_string()))
    }
}

label_serde!(TicketType);

// ---------------------------------------------------------------------------
// TicketStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    Open,
    InProgress,
    Pending,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Pending,
        TicketStatus::Closed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Pending => "Pending",
            Self::Closed => "Closed",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|st| normalize(st.label()) == wanted)
            .ok_or_else(|| SharedError::UnknownStatus(s.to_string()))
    }
}

label_serde!(TicketStatus);

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Caller role. Unrecognised labels fall back to `Standard` so an unexpected
/// value never widens visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Management,
    Standard,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Management => "management",
            Self::Standard => "user",
        }
    }

    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "super_admin" => Self::Admin,
            "management" | "project_manager" => Self::Management,
            _ => Self::Standard,
        }
    }

    /// Admin and management see every ticket; everyone else only sees the
    /// tickets assigned to them.
    pub fn can_view_all_tickets(self) -> bool {
        matches!(self, Self::Admin | Self::Management)
    }

    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

label_serde!(Role);

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// Already-authenticated identity handed to the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: i64,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_type_parse_is_case_insensitive() {
        assert_eq!(
            "incident report".parse::<TicketType>().unwrap(),
            TicketType::IncidentReport
        );
        assert_eq!(
            "  REQUEST FULFILLMENT ".parse::<TicketType>().unwrap(),
            TicketType::RequestFulfillment
        );
        assert_eq!(TicketType::IncidentReport.code(), "INC");
    }

    #[test]
    fn unknown_ticket_type_is_an_error() {
        let err = "Lunch Order".parse::<TicketType>().unwrap_err();
        assert!(matches!(err, SharedError::UnknownTicketType(ref s) if s == "Lunch Order"));
    }

    #[test]
    fn status_accepts_separator_variants() {
        for raw in ["In Progress", "in_progress", "IN-PROGRESS"] {
            assert_eq!(raw.parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        }
        assert!("Resolved".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn role_visibility() {
        assert!(Role::from_label("admin").can_view_all_tickets());
        assert!(Role::from_label("super_admin").is_admin());
        assert!(Role::from_label("management").can_view_all_tickets());
        assert!(!Role::from_label("user").can_view_all_tickets());
        assert_eq!(Role::from_label("something-else"), Role::Standard);
    }

    #[test]
    fn labels_serialize_as_strings() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let back: TicketType = serde_json::from_str("\"incident report\"").unwrap();
        assert_eq!(back, TicketType::IncidentReport);
    }
}
