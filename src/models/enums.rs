use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
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
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(InvoiceStatus {
    Pending => "pending",
    Paid => "paid",
    Cancelled => "cancelled",
});

str_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    Insurance => "insurance",
    Online => "online",
});

// Soft-delete state. Inactive records are invisible to every read.
str_enum!(RecordLifecycle {
    Active => "active",
    Inactive => "inactive",
});

impl Default for AppointmentStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::Cash
    }
}

impl AppointmentStatus {
    /// Whether the appointment still holds its doctor's instant.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
