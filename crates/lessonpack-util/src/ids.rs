//! Strongly-typed identifiers for lessonpack

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

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

string_id! {
    /// Identifier of a sellable package template
    TemplateId
}

string_id! {
    /// Identifier of a student account
    StudentId
}

string_id! {
    /// Identifier of a tutor account
    TutorId
}

string_id! {
    /// Identifier of whoever performed an administrative action
    AdminId
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a purchased or assigned package instance
    InstanceId
}

uuid_id! {
    /// Unique identifier for an offline payment recorded by an admin
    PaymentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_id_equality() {
        let id1 = TemplateId::new("math-10h");
        let id2 = TemplateId::new("math-10h");
        let id3 = TemplateId::new("physics-5h");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn instance_id_uniqueness() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn instance_id_parses_its_display_form() {
        let id = InstanceId::new();
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<InstanceId>().is_err());

        let payment = PaymentId::new();
        assert_eq!(payment.to_string().parse::<PaymentId>().unwrap(), payment);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let student = StudentId::new("stu-42");
        let json = serde_json::to_string(&student).unwrap();
        assert_eq!(json, "\"stu-42\"");

        let instance = InstanceId::new();
        let json = serde_json::to_string(&instance).unwrap();
        let parsed: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(instance, parsed);
    }
}
