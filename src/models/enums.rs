use crate::db::StoreError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The canonical string doubles as the serde wire form and the stored value.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(StoreError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AlertType {
    Sos => "SOS",
    MedicalEmergency => "Medical Emergency",
    SafetyConcern => "Safety Concern",
    LocationShare => "Location Share",
    BeaconActivation => "Beacon Activation",
});

str_enum!(Severity {
    Low => "Low",
    Medium => "Medium",
    High => "High",
    Critical => "Critical",
});

str_enum!(AlertStatus {
    Active => "Active",
    Acknowledged => "Acknowledged",
    Resolved => "Resolved",
    Cancelled => "Cancelled",
});

str_enum!(NotifyChannel {
    EmergencyServices => "emergency_services",
    CampusPolice => "campus_police",
    PrimaryContact => "primary_contact",
    SecondaryContact => "secondary_contact",
});

impl AlertStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }
}
