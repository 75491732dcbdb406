use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a string-backed identifier newtype with the usual conversions.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// A tenant (business account). Every row and policy is scoped by it.
    TenantId
);

string_id!(
    /// The client an appointment is booked for.
    SubjectId
);

string_id!(
    /// A catalog service (haircut, massage, ...).
    ServiceId
);

string_id!(
    /// Appointment primary key (UUIDv7, time-sortable for log correlation).
    AppointmentId
);

impl AppointmentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for AppointmentId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = TenantId::from("barbershop");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""barbershop""#);
        let back: TenantId = serde_json::from_str(r#""barbershop""#).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn appointment_ids_are_unique() {
        let a = AppointmentId::new();
        let b = AppointmentId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }
}
